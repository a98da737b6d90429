//! Backend abstraction for the raytracing pipeline
//!
//! The acceleration-structure build, ray dispatch and denoising live behind
//! [`ShadowBackend`]. This crate hands a backend one [`SceneSubmission`] per
//! rendered frame and later joins on it; everything the backend does in between
//! is opaque.
//!
//! Two implementations ship with the crate:
//! - [`NullBackend`]: reports no raytracing capability, so every `create_*`
//!   call on a context using it yields a null handle.
//! - [`HeadlessBackend`]: runs submissions on a worker thread and records a
//!   [`FrameReport`] per frame, standing in for a GPU queue in tools and tests.

pub mod headless;
pub mod null;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::foundation::collections::{MeshDataHandle, MeshInstanceHandle, RendererHandle};
use crate::resources::{GpuResource, RenderTarget};
use crate::scene::{FrozenScene, RenderSettings};

pub use headless::{FrameReport, GeometryReport, HeadlessBackend, HeadlessProbe};
pub use null::NullBackend;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No raytracing-capable device
    #[error("raytracing backend unavailable: {0}")]
    Unavailable(String),

    /// The submission could not be queued
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Raytracing work reported a failure
    #[error("render {id} failed: {message}")]
    RenderFailed {
        /// Failed submission
        id: SubmissionId,
        /// Backend message
        message: String,
    },

    /// The execution stream stopped before completing the work
    #[error("backend worker is no longer running")]
    WorkerLost,
}

/// Identifies one submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a backend can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Human-readable backend name
    pub name: String,
    /// Hardware raytracing is available
    pub raytracing: bool,
}

/// Everything a backend needs to render one frame
#[derive(Debug, Clone)]
pub struct SceneSubmission {
    /// Renderer that issued the frame
    pub renderer: RendererHandle,
    /// Camera, lights and geometry frozen at `end_scene`
    pub scene: Arc<FrozenScene>,
    /// Flags and scalars captured at `render`
    pub settings: RenderSettings,
    /// Render target captured at `render`, if one was set
    pub target: Option<RenderTarget>,
}

/// Execution stream computing shadows for submitted scenes
pub trait ShadowBackend: Send {
    /// Report capabilities; contexts create no resources without raytracing
    fn capabilities(&self) -> BackendCapabilities;

    /// Queue a frame and return immediately
    fn submit(&mut self, submission: SceneSubmission) -> BackendResult<SubmissionId>;

    /// Non-blocking completion check
    fn is_complete(&self, id: SubmissionId) -> bool;

    /// Block until the submission completes
    ///
    /// Runtime failures of the submitted work are returned here.
    fn wait(&mut self, id: SubmissionId) -> BackendResult<()>;

    /// Host frame started
    fn frame_begin(&mut self, _frame: u64) {}

    /// Host frame ended
    fn frame_end(&mut self, _frame: u64) {}

    /// Mesh Data storage was reclaimed; drop any cached acceleration structures
    fn mesh_data_released(&mut self, _mesh: MeshDataHandle) {}

    /// Mesh Instance was released
    fn mesh_instance_released(&mut self, _instance: MeshInstanceHandle) {}

    /// Renderer was released; drop anything kept for it
    fn renderer_released(&mut self, _renderer: RendererHandle) {}

    /// Copy the renderer's last completed shadow mask into `dst`
    ///
    /// Returns `false` when no mask is available or `dst` is smaller than
    /// [`RenderTarget::byte_size`].
    fn readback_render_target(&mut self, _renderer: RendererHandle, _dst: &mut [u8]) -> bool {
        false
    }

    /// Texture the renderer last wrote its shadow mask into
    fn render_texture(&self, _renderer: RendererHandle) -> Option<GpuResource> {
        None
    }
}
