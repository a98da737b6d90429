//! Shadow demo application
//!
//! Drives the per-frame shadow protocol against the headless backend: a field
//! of boxes and one skinned, blend-shaped character under a sun and a spot
//! light. Pass a `.toml` or `.ron` config path to override the defaults.

use std::time::Instant;

use rand::Rng;
use raytraced_shadow::backend::{HeadlessBackend, HeadlessProbe};
use raytraced_shadow::config::ConfigError;
use raytraced_shadow::foundation::logging;
use raytraced_shadow::prelude::*;
use raytraced_shadow::resources::{BlendShape, BlendShapeFrame};
use thiserror::Error;

const FRAME_COUNT: u64 = 120;
const BOX_COUNT: usize = 24;
const FIELD_EXTENT: f32 = 20.0;
const MASK_WIDTH: u32 = 160;
const MASK_HEIGHT: u32 = 90;

#[derive(Debug, Error)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
    #[error("scene: {0}")]
    Scene(#[from] SceneError),
    #[error("mesh encoding: {0}")]
    Encode(#[from] EncodeError),
    #[error("backend has no raytracing support")]
    Unavailable,
}

/// Stand-in for a mesh uploaded by the host's graphics API
struct HostMesh {
    vertex_buffer: Option<GpuResource>,
    index_buffer: Option<GpuResource>,
    vertex_count: u32,
    submeshes: Vec<Submesh>,
    bindposes: Vec<Mat4>,
    influence_counts: Vec<u8>,
    influences: Vec<BoneWeight>,
    blend_shapes: Vec<BlendShape>,
}

impl HostMesh {
    /// Box whose faces were split into two triangle submeshes plus an edge overlay
    fn cube(buffer_id: u64) -> Self {
        Self {
            vertex_buffer: GpuResource::from_raw(buffer_id),
            index_buffer: GpuResource::from_raw(buffer_id + 1),
            vertex_count: 24,
            submeshes: vec![
                Submesh::triangles(0, 30),
                Submesh::triangles(30, 6),
                Submesh { topology: Topology::Lines, index_start: 36, index_count: 24 },
            ],
            bindposes: Vec::new(),
            influence_counts: Vec::new(),
            influences: Vec::new(),
            blend_shapes: Vec::new(),
        }
    }

    /// Two-bone strip with a variable number of influences per vertex
    fn character(buffer_id: u64) -> Self {
        let influence_counts = vec![1, 2, 2, 1, 1, 2, 2, 1];
        let influences = influence_counts
            .iter()
            .enumerate()
            .flat_map(|(vertex, &count)| {
                let lower = if vertex % 4 < 2 { 0 } else { 1 };
                match count {
                    1 => vec![BoneWeight::new(lower, 1.0)],
                    _ => vec![BoneWeight::new(lower, 0.6), BoneWeight::new(1 - lower, 0.4)],
                }
            })
            .collect();

        let vertex_count = 8;
        Self {
            vertex_buffer: GpuResource::from_raw(buffer_id),
            index_buffer: GpuResource::from_raw(buffer_id + 1),
            vertex_count,
            submeshes: vec![Submesh::triangles(0, 18)],
            bindposes: vec![Mat4::identity(), Mat4::new_translation(&Vec3::new(0.0, -1.0, 0.0))],
            influence_counts,
            influences,
            blend_shapes: vec![BlendShape {
                frames: vec![BlendShapeFrame { deltas: vec![Vec3::new(0.1, 0.0, 0.0); vertex_count as usize], weight: 100.0 }],
            }],
        }
    }
}

impl MeshSource for HostMesh {
    fn vertex_buffer(&self) -> Option<GpuResource> {
        self.vertex_buffer
    }

    fn index_buffer(&self) -> Option<GpuResource> {
        self.index_buffer
    }

    fn vertex_stride(&self) -> u32 {
        32
    }

    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn index_format(&self) -> IndexFormat {
        IndexFormat::U16
    }

    fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    fn bindposes(&self) -> &[Mat4] {
        &self.bindposes
    }

    fn skin_weights(&self) -> Option<SourceSkinWeights<'_>> {
        (!self.influence_counts.is_empty())
            .then_some(SourceSkinWeights::Variable { counts: &self.influence_counts, weights: &self.influences })
    }

    fn blend_shapes(&self) -> &[BlendShape] {
        &self.blend_shapes
    }
}

struct Scene {
    boxes: Vec<MeshInstanceHandle>,
    character: MeshInstanceHandle,
    meshes: Vec<MeshDataHandle>,
}

fn build_scene(ctx: &mut ShadowContext) -> Result<Scene, DemoError> {
    let mut rng = rand::thread_rng();

    let box_mesh = ctx.encode_mesh(&HostMesh::cube(1))?;
    let character_mesh = ctx.encode_mesh(&HostMesh::character(3))?;
    if box_mesh.is_null() || character_mesh.is_null() {
        return Err(DemoError::Unavailable);
    }

    let boxes = (0..BOX_COUNT)
        .map(|_| {
            let instance = ctx.create_mesh_instance(box_mesh);
            let position = Vec3::new(
                rng.gen_range(-FIELD_EXTENT..FIELD_EXTENT),
                rng.gen_range(0.0..2.0),
                rng.gen_range(-FIELD_EXTENT..FIELD_EXTENT),
            );
            ctx.set_instance_transform(instance, &Mat4::new_translation(&position));
            instance
        })
        .collect();

    let character = ctx.create_mesh_instance(character_mesh);
    log::info!("Scene built: {} boxes and one character", BOX_COUNT);
    Ok(Scene { boxes, character, meshes: vec![box_mesh, character_mesh] })
}

fn camera(aspect: f32) -> Camera {
    let transform = Mat4::new_translation(&Vec3::new(0.0, 8.0, -30.0));
    let view = transform.try_inverse().unwrap_or_else(Mat4::identity);
    let fov: f32 = 50.0;
    let projection = Mat4::new_perspective(aspect, fov.to_radians(), 0.1, 200.0);
    Camera::new(transform, view, projection, 0.1, 200.0, fov)
}

fn animate(ctx: &mut ShadowContext, scene: &Scene, frame: u64) {
    let time = frame as f32 / 60.0;
    let mut rng = rand::thread_rng();

    // A few boxes drift every frame; the rest keep their transform
    for &instance in scene.boxes.iter().take(4) {
        if let Some(current) = ctx.mesh_instance(instance).map(|i| *i.transform()) {
            let nudge = Vec3::new(rng.gen_range(-0.05..0.05), 0.0, rng.gen_range(-0.05..0.05));
            ctx.set_instance_transform(instance, &(Mat4::new_translation(&nudge) * current));
        }
    }

    let sway = Mat4::new_rotation(Vec3::z() * (time * 2.0).sin() * 0.5);
    ctx.set_instance_bones(scene.character, &[Mat4::identity(), sway]);
    // Overshoots [0, 1] on purpose; the clamp flag in the config bounds it
    ctx.set_instance_blend_shape_weights(scene.character, &[(time * 3.0).sin() * 1.25]);
}

fn run_frame(ctx: &mut ShadowContext, renderer: RendererHandle, scene: &Scene, frame: u64) -> Result<(), DemoError> {
    ctx.mark_frame_begin();
    animate(ctx, scene, frame);

    ctx.begin_scene(renderer)?;
    ctx.set_camera(renderer, camera(16.0 / 9.0))?;

    let sun = Mat4::new_rotation(Vec3::x() * 0.9);
    ctx.add_light(renderer, &LightDescriptor::directional(sun))?;
    let spot = Mat4::new_translation(&Vec3::new(0.0, 10.0, 0.0)) * Mat4::new_rotation(Vec3::x() * 1.5);
    ctx.add_light(renderer, &LightDescriptor::spot(spot, 30.0, 40.0))?;
    if frame == 0 {
        // Area lights cannot cast raytraced shadows; shows up once in the error log
        ctx.add_light(renderer, &LightDescriptor::with_kind(LightKind::Area, Mat4::identity()))?;
    }

    for &instance in &scene.boxes {
        ctx.add_geometry(renderer, instance, HitMask::all())?;
    }
    ctx.add_geometry(renderer, scene.character, HitMask::CASTER)?;
    ctx.end_scene(renderer)?;

    ctx.render(renderer)?;
    if !ctx.is_render_complete(renderer) {
        log::trace!("Frame {} still tracing; host keeps working", frame);
    }
    ctx.finish(renderer);
    ctx.mark_frame_end();
    Ok(())
}

fn summarize(probe: &HeadlessProbe, elapsed_ms: u128) {
    let reports = probe.reports();
    let triangles: u64 = reports.iter().map(|r| r.triangle_count()).sum();
    let refits: usize = reports
        .iter()
        .flat_map(|r| r.geometry.iter())
        .filter(|g| !g.update_flags.is_empty())
        .count();

    log::info!("Rendered {} frames in {} ms; {} reports retained", FRAME_COUNT, elapsed_ms, reports.len());
    log::info!("Traced {} triangles, {} geometry entries needed a refit", triangles, refits);
    if let Some(last) = reports.last() {
        log::info!("Last frame: {} lights, {} geometries", last.lights.len(), last.geometry.len());
    }
}

fn run() -> Result<(), DemoError> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading config from {}", path);
            ShadowConfig::load_from_file(&path)?
        }
        None => ShadowConfig::default(),
    };

    let backend = HeadlessBackend::new(config.headless.clone())?;
    let probe = backend.probe();
    let mut ctx = ShadowContext::new(Box::new(backend), config);

    let renderer = ctx.create_renderer();
    if renderer.is_null() {
        return Err(DemoError::Unavailable);
    }
    let target = ctx.create_render_target();
    ctx.setup_render_target(target, MASK_WIDTH, MASK_HEIGHT, RenderTargetFormat::Ru8);
    ctx.set_render_target(renderer, target);
    let scene = build_scene(&mut ctx)?;

    let start = Instant::now();
    for frame in 0..FRAME_COUNT {
        run_frame(&mut ctx, renderer, &scene, frame)?;
    }
    summarize(&probe, start.elapsed().as_millis());

    let mut mask = vec![0u8; MASK_WIDTH as usize * MASK_HEIGHT as usize];
    if ctx.readback_render_target(renderer, &mut mask) {
        let lit = mask.iter().filter(|&&texel| texel > 0x7f).count();
        log::info!("Shadow mask {}x{}: {} of {} texels lit", MASK_WIDTH, MASK_HEIGHT, lit, mask.len());
    }

    let error_log = ctx.take_error_log();
    if !error_log.is_empty() {
        log::warn!("Shadow error log:\n{}", error_log.trim_end());
    }

    for &instance in scene.boxes.iter().chain(std::iter::once(&scene.character)) {
        ctx.release_mesh_instance(instance);
    }
    for &mesh in &scene.meshes {
        ctx.release_mesh_data(mesh);
    }
    ctx.release_renderer(renderer);
    ctx.release_render_target(target);
    Ok(())
}

fn main() {
    logging::init();
    log::info!("Starting shadow demo...");

    if let Err(e) = run() {
        log::error!("Shadow demo failed: {}", e);
        std::process::exit(1);
    }
    log::info!("Shadow demo finished");
}
