//! Headless backend running submissions on a worker thread
//!
//! Submissions are processed strictly in order on a dedicated thread, which
//! plays the role of the GPU queue: `submit` returns as soon as the job is
//! queued, `wait` blocks on a condition variable until the worker has passed
//! the requested submission. Instead of tracing rays the worker summarizes
//! each frame into a [`FrameReport`], readable through a [`HeadlessProbe`].
//! The most recent reports are kept, up to [`HeadlessConfig::max_reports`].
//!
//! A frame with a render target also produces a shadow mask that can be read
//! back. No rays are traced, so every pixel is written fully lit.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::HeadlessConfig;
use crate::foundation::collections::{MeshDataHandle, MeshInstanceHandle, RendererHandle};
use crate::resources::{GpuResource, RenderTarget, RenderTargetFormat, UpdateFlags};
use crate::scene::{HitMask, LightKind, RenderSettings};

use super::{BackendCapabilities, BackendError, BackendResult, SceneSubmission, ShadowBackend, SubmissionId};

/// Summary of one geometry entry as the worker consumed it
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryReport {
    /// Source instance
    pub instance: MeshInstanceHandle,
    /// Mesh Data placed by the instance
    pub mesh: MeshDataHandle,
    /// Receiver/caster role
    pub hit_mask: HitMask,
    /// Changes pending for this instance
    pub update_flags: UpdateFlags,
    /// Triangles traced
    pub triangle_count: u32,
    /// Bone matrices supplied
    pub bone_count: usize,
    /// Blend weights after applying render flags
    pub blend_shape_weights: Vec<f32>,
}

/// Summary of one completed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Submission id
    pub id: SubmissionId,
    /// Issuing renderer
    pub renderer: RendererHandle,
    /// Whether the scene had a camera
    pub has_camera: bool,
    /// Light kinds in order
    pub lights: Vec<LightKind>,
    /// Geometry entries in order
    pub geometry: Vec<GeometryReport>,
    /// Settings captured at render
    pub settings: RenderSettings,
    /// Render target captured at render
    pub target: Option<RenderTarget>,
}

impl FrameReport {
    /// Triangles across all geometry
    pub fn triangle_count(&self) -> u64 {
        self.geometry.iter().map(|g| u64::from(g.triangle_count)).sum()
    }
}

struct Job {
    id: SubmissionId,
    submission: SceneSubmission,
}

/// Last shadow mask written for a renderer
#[derive(Debug)]
struct ShadowMask {
    target: RenderTarget,
    pixels: Vec<u8>,
}

impl ShadowMask {
    fn lit(target: RenderTarget) -> Self {
        let texel: &[u8] = match target.format {
            RenderTargetFormat::Unknown => &[],
            RenderTargetFormat::Ru8 => &[0xff],
            // 1.0 as a little-endian half float
            RenderTargetFormat::Rf16 => &[0x00, 0x3c],
            RenderTargetFormat::Rf32 => &[0x00, 0x00, 0x80, 0x3f],
        };
        let pixel_count = target.width as usize * target.height as usize;
        Self { target, pixels: texel.repeat(pixel_count) }
    }
}

#[derive(Debug, Default)]
struct WorkerState {
    completed_through: u64,
    running: bool,
    failures: HashMap<u64, String>,
    reports: VecDeque<FrameReport>,
    masks: HashMap<RendererHandle, ShadowMask>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<WorkerState>,
    done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        // Reports stay readable even if a worker panicked mid-frame
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the worker stopped however its loop exits
struct StopGuard(Arc<Shared>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.lock().running = false;
        self.0.done.notify_all();
    }
}

/// Read access to what a [`HeadlessBackend`] has rendered
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    shared: Arc<Shared>,
}

impl HeadlessProbe {
    /// Reports of the retained successfully completed frames, oldest first
    pub fn reports(&self) -> Vec<FrameReport> {
        self.shared.lock().reports.iter().cloned().collect()
    }

    /// Most recent successful frame
    pub fn last_report(&self) -> Option<FrameReport> {
        self.shared.lock().reports.back().cloned()
    }

    /// Highest submission id the worker has finished
    pub fn completed_through(&self) -> u64 {
        self.shared.lock().completed_through
    }
}

/// CPU-side backend emulating an asynchronous GPU queue
pub struct HeadlessBackend {
    config: HeadlessConfig,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    next_id: u64,
}

impl HeadlessBackend {
    /// Start the worker thread
    pub fn new(config: HeadlessConfig) -> BackendResult<Self> {
        let shared = Arc::new(Shared::default());
        shared.lock().running = true;

        let (sender, receiver) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("shadow-headless".to_string())
            .spawn(move || run_worker(&receiver, &worker_shared, &worker_config))
            .map_err(|e| BackendError::Unavailable(format!("failed to start headless worker: {e}")))?;

        log::info!("Headless shadow backend started (latency {} ms)", config.simulated_latency_ms);
        Ok(Self { config, sender: Some(sender), worker: Some(worker), shared, next_id: 0 })
    }

    /// Handle for inspecting completed frames
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe { shared: Arc::clone(&self.shared) }
    }

    /// Configuration the worker runs with
    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }
}

impl ShadowBackend for HeadlessBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { name: "headless".to_string(), raytracing: true }
    }

    fn submit(&mut self, submission: SceneSubmission) -> BackendResult<SubmissionId> {
        let sender = self.sender.as_ref().ok_or(BackendError::WorkerLost)?;
        let id = SubmissionId(self.next_id + 1);
        sender
            .send(Job { id, submission })
            .map_err(|_| BackendError::SubmissionFailed("headless worker stopped".to_string()))?;
        self.next_id = id.0;
        log::trace!("Queued headless submission {}", id);
        Ok(id)
    }

    fn is_complete(&self, id: SubmissionId) -> bool {
        self.shared.lock().completed_through >= id.0
    }

    fn wait(&mut self, id: SubmissionId) -> BackendResult<()> {
        let mut state = self.shared.lock();
        while state.completed_through < id.0 {
            if !state.running {
                return Err(BackendError::WorkerLost);
            }
            state = self.shared.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        match state.failures.remove(&id.0) {
            Some(message) => Err(BackendError::RenderFailed { id, message }),
            None => Ok(()),
        }
    }

    fn frame_begin(&mut self, frame: u64) {
        log::trace!("Headless frame {} begin", frame);
    }

    fn frame_end(&mut self, frame: u64) {
        log::trace!("Headless frame {} end", frame);
    }

    fn readback_render_target(&mut self, renderer: RendererHandle, dst: &mut [u8]) -> bool {
        let state = self.shared.lock();
        let Some(mask) = state.masks.get(&renderer) else {
            return false;
        };
        let size = mask.pixels.len();
        if dst.len() < size {
            log::warn!("Readback buffer of {} bytes is smaller than the {} byte shadow mask", dst.len(), size);
            return false;
        }
        dst[..size].copy_from_slice(&mask.pixels);
        true
    }

    fn render_texture(&self, renderer: RendererHandle) -> Option<GpuResource> {
        self.shared.lock().masks.get(&renderer).and_then(|mask| mask.target.texture)
    }

    fn renderer_released(&mut self, renderer: RendererHandle) {
        self.shared.lock().masks.remove(&renderer);
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued jobs drain
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Headless worker panicked");
            }
        }
    }
}

fn run_worker(receiver: &Receiver<Job>, shared: &Arc<Shared>, config: &HeadlessConfig) {
    let _stop = StopGuard(Arc::clone(shared));
    let latency = Duration::from_millis(config.simulated_latency_ms);

    for job in receiver {
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let outcome = evaluate(&job, config);

        let mut state = shared.lock();
        match outcome {
            Ok(report) => {
                log::debug!(
                    "Headless submission {} done: {} geometries, {} lights, {} triangles",
                    job.id,
                    report.geometry.len(),
                    report.lights.len(),
                    report.triangle_count()
                );
                if let Some(target) = report.target.filter(|t| t.byte_size() > 0) {
                    state.masks.insert(report.renderer, ShadowMask::lit(target));
                }
                if config.max_reports > 0 {
                    if state.reports.len() == config.max_reports {
                        state.reports.pop_front();
                    }
                    state.reports.push_back(report);
                }
            }
            Err(message) => {
                state.failures.insert(job.id.0, message);
            }
        }
        state.completed_through = job.id.0;
        drop(state);
        shared.done.notify_all();
    }
}

fn evaluate(job: &Job, config: &HeadlessConfig) -> Result<FrameReport, String> {
    let submission = &job.submission;
    let scene = &submission.scene;

    if config.fail_without_camera && scene.camera.is_none() {
        return Err("scene has no camera".to_string());
    }

    let flags = submission.settings.flags;
    let geometry = scene
        .geometry
        .iter()
        .map(|entry| GeometryReport {
            instance: entry.instance,
            mesh: entry.mesh_handle,
            hit_mask: entry.hit_mask,
            update_flags: entry.update_flags,
            triangle_count: entry.triangle_count(),
            bone_count: entry.bones.len(),
            blend_shape_weights: entry.blend_shape_weights_for(flags).into_owned(),
        })
        .collect();

    Ok(FrameReport {
        id: job.id,
        renderer: submission.renderer,
        has_camera: scene.camera.is_some(),
        lights: scene.lights.iter().map(|light| light.kind()).collect(),
        geometry,
        settings: submission.settings,
        target: submission.target,
    })
}
