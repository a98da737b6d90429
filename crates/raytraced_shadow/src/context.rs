//! Shadow Context - the handle-routed public API
//!
//! [`ShadowContext`] owns every resource and renderer and the backend they are
//! submitted to. Hosts hold only handles; every operation takes a handle plus
//! arguments and is routed here.
//!
//! ## Handle rules
//! - `create_*` returns a null handle when the backend has no raytracing
//!   support. Check with [`Key::is_null`] or the `is_valid_*` methods.
//! - Every operation on a null, stale or released handle is a no-op.
//! - `release_*` is idempotent; see [`ReleaseOutcome`].
//!
//! ## Frame protocol
//! `begin_scene` → `set_camera` / `add_light` / `add_geometry` → `end_scene` →
//! `render` → `finish`. Out-of-order calls are rejected with a [`SceneError`]
//! and recorded in the diagnostics; the renderer keeps its state.
//!
//! GPU buffer *contents* are referenced, not copied. Writing to a vertex or
//! index buffer between `end_scene` and `finish` races with the backend; that
//! is the host's responsibility.

use std::sync::Arc;

use bytemuck::Pod;
use log::Level;

use crate::backend::{BackendCapabilities, BackendError, HeadlessBackend, SceneSubmission, ShadowBackend};
use crate::config::ShadowConfig;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::foundation::collections::{
    HandleMap, Key, MeshDataHandle, MeshInstanceHandle, RenderTargetHandle, RendererHandle,
};
use crate::foundation::math::{Mat4, Vec3};
use crate::resources::{
    BoneWeight, BoneWeight4, BufferLayout, EncodeError, GpuResource, MeshData, MeshInstance, ReleaseOutcome,
    RenderTarget, RenderTargetFormat, ResourceRegistry,
};
use crate::scene::{
    Camera, HitMask, Light, LightDescriptor, RenderFlags, RenderSettings, Renderer, SceneError, SceneState,
};

/// Owner of all resources, renderers and the backend
pub struct ShadowContext {
    backend: Box<dyn ShadowBackend>,
    capabilities: BackendCapabilities,
    config: ShadowConfig,
    resources: ResourceRegistry,
    renderers: HandleMap<RendererHandle, Renderer>,
    error_log: Diagnostics,
    frame: u64,
}

impl ShadowContext {
    /// Create a context on top of a backend
    pub fn new(backend: Box<dyn ShadowBackend>, config: ShadowConfig) -> Self {
        let capabilities = backend.capabilities();
        if capabilities.raytracing {
            log::info!("Shadow context using backend '{}'", capabilities.name);
        } else {
            log::warn!("Backend '{}' has no raytracing support; all resources will be null", capabilities.name);
        }
        Self {
            backend,
            capabilities,
            config,
            resources: ResourceRegistry::new(),
            renderers: HandleMap::with_key(),
            error_log: Diagnostics::new(),
            frame: 0,
        }
    }

    /// Create a context backed by a [`HeadlessBackend`] configured from `config`
    pub fn headless(config: ShadowConfig) -> Result<Self, BackendError> {
        let backend = HeadlessBackend::new(config.headless.clone())?;
        Ok(Self::new(Box::new(backend), config))
    }

    /// Whether the backend can create resources
    pub fn is_available(&self) -> bool {
        self.capabilities.raytracing
    }

    /// Backend capabilities captured at construction
    pub fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    /// Configuration in use
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Resource storage, for inspection
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Frames started with [`Self::mark_frame_begin`]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    // === Mesh Data ===

    /// Allocate empty Mesh Data, or a null handle without raytracing support
    pub fn create_mesh_data(&mut self) -> MeshDataHandle {
        if !self.is_available() {
            return MeshDataHandle::null();
        }
        let handle = self.resources.create_mesh_data();
        log::trace!("Created mesh data {:?}", handle);
        handle
    }

    /// Release Mesh Data; storage is kept while instances reference it
    pub fn release_mesh_data(&mut self, handle: MeshDataHandle) -> ReleaseOutcome {
        let outcome = self.resources.release_mesh_data(handle);
        if outcome == ReleaseOutcome::Released {
            self.backend.mesh_data_released(handle);
        }
        outcome
    }

    /// Whether the owner's Mesh Data handle is live
    pub fn is_valid_mesh_data(&self, handle: MeshDataHandle) -> bool {
        self.resources.is_mesh_data_valid(handle)
    }

    /// Read Mesh Data through a live owner handle
    pub fn mesh_data(&self, handle: MeshDataHandle) -> Option<&MeshData> {
        if !self.resources.is_mesh_data_valid(handle) {
            return None;
        }
        self.resources.mesh_data(handle).map(Arc::as_ref)
    }

    /// Reference host GPU buffers; contents are read by the backend at render time
    pub fn set_gpu_buffers(&mut self, handle: MeshDataHandle, vertices: GpuResource, indices: GpuResource, layout: BufferLayout) {
        if let Some(mesh) = self.resources.mesh_data_mut(handle) {
            mesh.set_gpu_buffers(vertices, indices, layout);
        }
    }

    /// Copy CPU vertex and index bytes borrowed for the duration of the call
    pub fn set_cpu_buffers(&mut self, handle: MeshDataHandle, vertices: &[u8], indices: &[u8], layout: BufferLayout) {
        if let Some(mesh) = self.resources.mesh_data_mut(handle) {
            mesh.set_cpu_buffers(vertices, indices, layout);
        }
    }

    /// Copy typed CPU vertices and indices, deriving strides and counts
    pub fn set_cpu_buffers_typed<V: Pod, I: Pod>(&mut self, handle: MeshDataHandle, vertices: &[V], indices: &[I]) {
        let layout = BufferLayout {
            vertex_stride: saturating_u32(std::mem::size_of::<V>()),
            vertex_count: saturating_u32(vertices.len()),
            vertex_offset: 0,
            index_stride: saturating_u32(std::mem::size_of::<I>()),
            index_count: saturating_u32(indices.len()),
            index_offset: 0,
        };
        self.set_cpu_buffers(handle, bytemuck::cast_slice(vertices), bytemuck::cast_slice(indices), layout);
    }

    /// Replace the skin bind poses
    pub fn set_skin_bindposes(&mut self, handle: MeshDataHandle, bindposes: &[Mat4]) {
        if let Some(mesh) = self.resources.mesh_data_mut(handle) {
            mesh.set_skin_bindposes(bindposes);
        }
    }

    /// Set variable-length skin weights
    pub fn set_skin_weights_variable(&mut self, handle: MeshDataHandle, counts: &[u8], weights: &[BoneWeight]) -> Result<(), EncodeError> {
        match self.resources.mesh_data_mut(handle) {
            Some(mesh) => mesh.set_skin_weights_variable(counts, weights),
            None => Ok(()),
        }
    }

    /// Set fixed four-bone skin weights
    pub fn set_skin_weights_fixed4(&mut self, handle: MeshDataHandle, weights: &[BoneWeight4]) -> Result<(), EncodeError> {
        match self.resources.mesh_data_mut(handle) {
            Some(mesh) => mesh.set_skin_weights_fixed4(weights),
            None => Ok(()),
        }
    }

    /// Pre-allocate blend shape slots
    pub fn set_blend_shape_count(&mut self, handle: MeshDataHandle, count: usize) {
        if let Some(mesh) = self.resources.mesh_data_mut(handle) {
            mesh.set_blend_shape_count(count);
        }
    }

    /// Append a frame to a blend shape slot
    pub fn add_blend_shape_frame(&mut self, handle: MeshDataHandle, shape: usize, deltas: &[Vec3], weight: f32) -> Result<(), EncodeError> {
        match self.resources.mesh_data_mut(handle) {
            Some(mesh) => mesh.add_blend_shape_frame(shape, deltas, weight),
            None => Ok(()),
        }
    }

    // === Mesh Instances ===

    /// Place Mesh Data; null without raytracing support or for a dead mesh handle
    pub fn create_mesh_instance(&mut self, mesh: MeshDataHandle) -> MeshInstanceHandle {
        if !self.is_available() {
            return MeshInstanceHandle::null();
        }
        self.resources.create_mesh_instance(mesh)
    }

    /// Release an instance, reclaiming deferred Mesh Data it kept alive
    pub fn release_mesh_instance(&mut self, handle: MeshInstanceHandle) -> ReleaseOutcome {
        let (outcome, reclaimed) = self.resources.release_mesh_instance(handle);
        if outcome == ReleaseOutcome::Released {
            self.backend.mesh_instance_released(handle);
        }
        if let Some(mesh) = reclaimed {
            self.backend.mesh_data_released(mesh);
        }
        outcome
    }

    /// Whether an instance handle is live
    pub fn is_valid_mesh_instance(&self, handle: MeshInstanceHandle) -> bool {
        self.resources.is_mesh_instance_valid(handle)
    }

    /// Read an instance
    pub fn mesh_instance(&self, handle: MeshInstanceHandle) -> Option<&MeshInstance> {
        self.resources.mesh_instance(handle)
    }

    /// Set an instance's world transform
    pub fn set_instance_transform(&mut self, handle: MeshInstanceHandle, transform: &Mat4) {
        if let Some((instance, _)) = self.resources.instance_with_mesh_mut(handle) {
            instance.set_transform(transform);
        }
    }

    /// Set bone matrices; an empty slice clears them
    ///
    /// Arrays shorter than the bind pose count are padded with identity,
    /// longer ones are truncated. Either way a warning is recorded.
    pub fn set_instance_bones(&mut self, handle: MeshInstanceHandle, bones: &[Mat4]) {
        let mismatch = self
            .resources
            .instance_with_mesh_mut(handle)
            .and_then(|(instance, mesh)| instance.set_bones(bones, mesh));
        if let Some(message) = mismatch {
            self.warn(format!("Mesh instance {handle:?}: {message}"));
        }
    }

    /// Set blend shape weights; an empty slice clears them
    ///
    /// Length mismatches are padded with zero or truncated, with a warning.
    pub fn set_instance_blend_shape_weights(&mut self, handle: MeshInstanceHandle, weights: &[f32]) {
        let mismatch = self
            .resources
            .instance_with_mesh_mut(handle)
            .and_then(|(instance, mesh)| instance.set_blend_shape_weights(weights, mesh));
        if let Some(message) = mismatch {
            self.warn(format!("Mesh instance {handle:?}: {message}"));
        }
    }

    // === Render Targets ===

    /// Allocate a render target description
    pub fn create_render_target(&mut self) -> RenderTargetHandle {
        if !self.is_available() {
            return RenderTargetHandle::null();
        }
        self.resources.create_render_target()
    }

    /// Release a render target
    pub fn release_render_target(&mut self, handle: RenderTargetHandle) -> ReleaseOutcome {
        self.resources.release_render_target(handle)
    }

    /// Read a render target
    pub fn render_target(&self, handle: RenderTargetHandle) -> Option<&RenderTarget> {
        self.resources.render_target(handle)
    }

    /// Point a render target at a host texture
    pub fn set_render_target_gpu_texture(&mut self, handle: RenderTargetHandle, texture: GpuResource) {
        if let Some(target) = self.resources.render_target_mut(handle) {
            target.texture = Some(texture);
        }
    }

    /// Describe a render target's size and format
    pub fn setup_render_target(&mut self, handle: RenderTargetHandle, width: u32, height: u32, format: RenderTargetFormat) {
        if let Some(target) = self.resources.render_target_mut(handle) {
            target.width = width;
            target.height = height;
            target.format = format;
        }
    }

    // === Renderers ===

    /// Create a renderer with the configured defaults
    pub fn create_renderer(&mut self) -> RendererHandle {
        if !self.is_available() {
            log::warn!("Cannot create renderer: backend '{}' has no raytracing support", self.capabilities.name);
            return RendererHandle::null();
        }
        let settings = RenderSettings {
            flags: self.config.render_flags(),
            shadow_ray_offset: self.config.shadow_ray_offset,
            self_shadow_threshold: self.config.self_shadow_threshold,
        };
        let handle = self.renderers.insert(Renderer::new(settings));
        log::info!("Created renderer {:?}", handle);
        handle
    }

    /// Release a renderer, first joining any frame it has in flight
    pub fn release_renderer(&mut self, handle: RendererHandle) -> ReleaseOutcome {
        if !self.renderers.contains_key(handle) {
            return ReleaseOutcome::Ignored;
        }
        self.finish(handle);
        self.renderers.remove(handle);
        self.backend.renderer_released(handle);
        ReleaseOutcome::Released
    }

    /// Whether a renderer handle is live
    pub fn is_valid_renderer(&self, handle: RendererHandle) -> bool {
        self.renderers.contains_key(handle)
    }

    /// Read a renderer
    pub fn renderer(&self, handle: RendererHandle) -> Option<&Renderer> {
        self.renderers.get(handle)
    }

    /// Diagnostics of the renderer's current scene
    pub fn scene_diagnostics(&self, handle: RendererHandle) -> Option<&Diagnostics> {
        self.renderers.get(handle).map(Renderer::diagnostics)
    }

    /// Select the render target; takes effect at the next `render`
    ///
    /// Null targets are ignored.
    pub fn set_render_target(&mut self, handle: RendererHandle, target: RenderTargetHandle) {
        if target.is_null() {
            return;
        }
        if let Some(renderer) = self.renderers.get_mut(handle) {
            renderer.set_render_target(target);
        }
    }

    /// Set raytracing flags; captured at the next `render`
    pub fn set_render_flags(&mut self, handle: RendererHandle, flags: RenderFlags) {
        if let Some(renderer) = self.renderers.get_mut(handle) {
            renderer.settings_mut().flags = flags;
        }
    }

    /// Set the shadow ray origin offset; captured at the next `render`
    pub fn set_shadow_ray_offset(&mut self, handle: RendererHandle, offset: f32) {
        if let Some(renderer) = self.renderers.get_mut(handle) {
            renderer.settings_mut().shadow_ray_offset = offset;
        }
    }

    /// Set the self shadow distance threshold; captured at the next `render`
    pub fn set_self_shadow_threshold(&mut self, handle: RendererHandle, threshold: f32) {
        if let Some(renderer) = self.renderers.get_mut(handle) {
            renderer.settings_mut().self_shadow_threshold = threshold;
        }
    }

    /// Open a scene
    pub fn begin_scene(&mut self, handle: RendererHandle) -> Result<(), SceneError> {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return Ok(());
        };
        let result = renderer.begin_scene();
        self.check(handle, result)
    }

    /// Freeze camera, lights and geometry
    pub fn end_scene(&mut self, handle: RendererHandle) -> Result<(), SceneError> {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return Ok(());
        };
        let result = renderer.end_scene().map(|frozen| {
            log::debug!(
                "Renderer {:?} froze {} geometries and {} lights",
                handle,
                frozen.geometry.len(),
                frozen.lights.len()
            );
        });
        self.check(handle, result)
    }

    /// Record the camera verbatim
    pub fn set_camera(&mut self, handle: RendererHandle, camera: Camera) -> Result<(), SceneError> {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return Ok(());
        };
        let result = renderer.set_camera(camera);
        self.check(handle, result)
    }

    /// Add a light; returns `false` for kinds that cannot cast raytraced shadows
    pub fn add_light(&mut self, handle: RendererHandle, light: &LightDescriptor) -> Result<bool, SceneError> {
        let Some(renderer) = self.renderers.get(handle) else {
            return Ok(false);
        };
        let ensure = renderer.ensure_building("add_light");
        self.check(handle, ensure)?;

        match Light::try_from(light) {
            Ok(light) => {
                let result = self.renderer_mut(handle).map_or(Ok(()), |r| r.push_light(light));
                self.check(handle, result).map(|()| true)
            }
            Err(unsupported) => {
                self.report(handle, Level::Warn, format!("Shadow renderer: {unsupported}"));
                Ok(false)
            }
        }
    }

    /// Add a mesh instance with the given receiver/caster role
    ///
    /// The instance's transform, bones and blend weights are copied now.
    /// Unknown instances and meshes without geometry are skipped with a warning
    /// and `false`.
    pub fn add_geometry(&mut self, handle: RendererHandle, instance: MeshInstanceHandle, hit_mask: HitMask) -> Result<bool, SceneError> {
        let Some(renderer) = self.renderers.get(handle) else {
            return Ok(false);
        };
        let ensure = renderer.ensure_building("add_geometry");
        self.check(handle, ensure)?;

        let Some(snapshot) = self.resources.snapshot(instance, hit_mask) else {
            self.report(handle, Level::Warn, format!("Shadow renderer: unknown mesh instance {instance:?} skipped"));
            return Ok(false);
        };
        if !snapshot.mesh.has_geometry() {
            self.report(
                handle,
                Level::Warn,
                format!("Shadow renderer: mesh instance {instance:?} has no renderable geometry; skipped"),
            );
            return Ok(false);
        }

        let result = self.renderer_mut(handle).map_or(Ok(()), |r| r.push_geometry(snapshot));
        self.check(handle, result).map(|()| true)
    }

    /// Submit the frozen scene and return without waiting
    ///
    /// Submission failures are reported in the error log and drop the frame.
    pub fn render(&mut self, handle: RendererHandle) -> Result<(), SceneError> {
        let Some(renderer) = self.renderers.get(handle) else {
            return Ok(());
        };
        let scene = renderer.scene_for_render();
        let scene = self.check(handle, scene)?;

        let Some(renderer) = self.renderers.get(handle) else {
            return Ok(());
        };
        let submission = SceneSubmission {
            renderer: handle,
            scene,
            settings: renderer.settings(),
            target: self.resources.render_target(renderer.render_target()).copied(),
        };

        match self.backend.submit(submission) {
            Ok(id) => {
                log::debug!("Renderer {:?} submitted frame {}", handle, id);
                if let Some(renderer) = self.renderers.get_mut(handle) {
                    renderer.mark_rendering(id);
                }
            }
            Err(err) => {
                self.report(handle, Level::Error, format!("Shadow renderer: {err}"));
                if let Some(renderer) = self.renderers.get_mut(handle) {
                    renderer.close();
                }
            }
        }
        Ok(())
    }

    /// Block until the submitted frame completes, then close the cycle
    ///
    /// Without a preceding `render` this returns immediately. A frame that was
    /// ended but never rendered is discarded. Backend failures are recorded
    /// in the error log.
    pub fn finish(&mut self, handle: RendererHandle) {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return;
        };
        if matches!(renderer.state(), SceneState::Closed | SceneState::Building) {
            log::trace!("finish on renderer {:?} with nothing to wait for", handle);
            return;
        }

        let (in_flight, frozen) = renderer.close();
        let Some(id) = in_flight else {
            log::debug!("Renderer {:?} discarded a frame that was never rendered", handle);
            return;
        };

        if let Err(err) = self.backend.wait(id) {
            self.report(handle, Level::Error, format!("Shadow renderer: {err}"));
        }
        if let Some(frozen) = frozen {
            for geometry in &frozen.geometry {
                self.resources.consume_update_flags(geometry);
            }
        }
    }

    /// Whether the renderer has no frame still being processed; never blocks
    pub fn is_render_complete(&self, handle: RendererHandle) -> bool {
        self.renderers
            .get(handle)
            .and_then(Renderer::in_flight)
            .map_or(true, |id| self.backend.is_complete(id))
    }

    /// Copy the renderer's last finished shadow mask into `dst`
    ///
    /// `dst` must hold at least [`RenderTarget::byte_size`] bytes of the target
    /// that frame rendered into. Returns `false` if no mask is available or a
    /// frame is still in flight; call `finish` first.
    pub fn readback_render_target(&mut self, handle: RendererHandle, dst: &mut [u8]) -> bool {
        let Some(renderer) = self.renderers.get(handle) else {
            return false;
        };
        if renderer.in_flight().is_some() {
            self.report(
                handle,
                Level::Warn,
                "Shadow renderer: readback requested while a frame is in flight; call finish first".to_string(),
            );
            return false;
        }
        self.backend.readback_render_target(handle, dst)
    }

    /// Texture the renderer's last finished frame wrote its shadow mask into
    pub fn render_texture(&self, handle: RendererHandle) -> Option<GpuResource> {
        if !self.renderers.contains_key(handle) {
            return None;
        }
        self.backend.render_texture(handle)
    }

    /// Render every renderer whose scene is ready; returns how many were submitted
    pub fn render_all(&mut self) -> usize {
        let ready: Vec<RendererHandle> = self
            .renderers
            .iter()
            .filter(|(_, renderer)| renderer.state() == SceneState::Ready)
            .map(|(handle, _)| handle)
            .collect();

        let mut submitted = 0;
        for handle in ready {
            if self.render(handle).is_ok()
                && self.renderers.get(handle).is_some_and(|r| r.state() == SceneState::Rendering)
            {
                submitted += 1;
            }
        }
        submitted
    }

    /// Host frame started
    pub fn mark_frame_begin(&mut self) {
        self.frame += 1;
        self.backend.frame_begin(self.frame);
    }

    /// Host frame ended
    pub fn mark_frame_end(&mut self) {
        self.backend.frame_end(self.frame);
    }

    // === Diagnostics ===

    /// Snapshot of every warning and error since the log was last cleared
    pub fn error_log(&self) -> String {
        self.error_log.to_log_string()
    }

    /// Structured view of the error log
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.error_log
    }

    /// Return the error log and clear it
    pub fn take_error_log(&mut self) -> String {
        let log = self.error_log.to_log_string();
        self.error_log.clear();
        log
    }

    /// Forget every recorded warning and error
    pub fn clear_error_log(&mut self) {
        self.error_log.clear();
    }

    /// Record rejected input that is not tied to a renderer
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.error_log.warn(message);
    }

    fn renderer_mut(&mut self, handle: RendererHandle) -> Option<&mut Renderer> {
        self.renderers.get_mut(handle)
    }

    /// Record a protocol violation before handing it back
    fn check<T>(&mut self, handle: RendererHandle, result: Result<T, SceneError>) -> Result<T, SceneError> {
        if let Err(err) = &result {
            self.report(handle, Level::Error, format!("Shadow renderer: {err}"));
        }
        result
    }

    fn report(&mut self, handle: RendererHandle, level: Level, message: String) {
        log::log!(level, "{}", message);
        let entry = DiagnosticEntry { level, message };
        if let Some(renderer) = self.renderers.get_mut(handle) {
            renderer.diagnostics_mut().push(entry.clone());
        }
        self.error_log.push(entry);
    }
}

impl Drop for ShadowContext {
    fn drop(&mut self) {
        let handles: Vec<RendererHandle> = self.renderers.keys().collect();
        for handle in handles {
            self.finish(handle);
        }
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::config::HeadlessConfig;

    fn context() -> ShadowContext {
        ShadowContext::headless(ShadowConfig::default()).unwrap()
    }

    #[test]
    fn test_null_backend_yields_null_handles() {
        let mut ctx = ShadowContext::new(Box::new(NullBackend), ShadowConfig::default());
        assert!(!ctx.is_available());
        assert!(ctx.create_mesh_data().is_null());
        assert!(ctx.create_mesh_instance(MeshDataHandle::null()).is_null());
        assert!(ctx.create_render_target().is_null());
        assert!(ctx.create_renderer().is_null());
    }

    #[test]
    fn test_typed_cpu_buffers_derive_layout() {
        let mut ctx = context();
        let mesh = ctx.create_mesh_data();
        let vertices = [[0.0f32; 3]; 4];
        let indices = [0u16, 1, 2, 2, 1, 3];
        ctx.set_cpu_buffers_typed(mesh, &vertices, &indices);

        let data = ctx.mesh_data(mesh).unwrap();
        assert_eq!(
            data.layout(),
            BufferLayout { vertex_stride: 12, vertex_count: 4, vertex_offset: 0, index_stride: 2, index_count: 6, index_offset: 0 }
        );
        assert!(data.has_geometry());
    }

    #[test]
    fn test_setters_on_released_mesh_are_ignored() {
        let mut ctx = context();
        let mesh = ctx.create_mesh_data();
        let instance = ctx.create_mesh_instance(mesh);
        assert_eq!(ctx.release_mesh_data(mesh), ReleaseOutcome::Deferred { instances: 1 });

        ctx.set_blend_shape_count(mesh, 3);
        assert!(ctx.mesh_data(mesh).is_none());
        assert!(ctx.set_skin_weights_fixed4(mesh, &[BoneWeight4::default(); 7]).is_ok());

        assert_eq!(ctx.release_mesh_instance(instance), ReleaseOutcome::Released);
        assert_eq!(ctx.resources().mesh_data_count(), 0);
    }

    #[test]
    fn test_blend_shape_frame_outside_allocated_slots_is_rejected() {
        let mut ctx = context();
        let mesh = ctx.create_mesh_data();
        ctx.set_cpu_buffers_typed(mesh, &[[0.0f32; 3]; 3], &[0u32, 1, 2]);
        ctx.set_blend_shape_count(mesh, 1);

        let err = ctx.add_blend_shape_frame(mesh, usize::MAX, &[Vec3::zeros(); 3], 1.0).unwrap_err();
        assert_eq!(err, EncodeError::BlendShapeIndex { shape: usize::MAX, count: 1 });
        assert!(ctx.add_blend_shape_frame(mesh, 0, &[Vec3::zeros(); 3], 1.0).is_ok());
        assert_eq!(ctx.mesh_data(mesh).unwrap().blend_shapes().len(), 1);
    }

    #[test]
    fn test_render_target_captured_at_render() {
        let mut ctx = ShadowContext::headless(ShadowConfig {
            headless: HeadlessConfig { simulated_latency_ms: 0, ..Default::default() },
            ..Default::default()
        })
        .unwrap();
        let renderer = ctx.create_renderer();
        let target = ctx.create_render_target();
        ctx.setup_render_target(target, 64, 32, RenderTargetFormat::Ru8);
        ctx.set_render_target_gpu_texture(target, GpuResource::from_raw(77).unwrap());
        ctx.set_render_target(renderer, target);
        ctx.set_render_target(renderer, RenderTargetHandle::null());
        assert_eq!(ctx.renderer(renderer).unwrap().render_target(), target);

        ctx.begin_scene(renderer).unwrap();
        ctx.end_scene(renderer).unwrap();
        ctx.render(renderer).unwrap();
        // Changing the target now only affects the next cycle
        ctx.setup_render_target(target, 128, 128, RenderTargetFormat::Rf32);
        ctx.finish(renderer);
        assert!(ctx.error_log().is_empty());
    }
}
