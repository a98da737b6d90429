//! Renderer: per-frame scene builder and its state machine
//!
//! ```text
//! Closed --begin_scene--> Building --end_scene--> Ready --render--> Rendering
//!    ^                                              |                   |
//!    +--------------------- finish -----------------+-------------------+
//! ```
//!
//! A renderer only tracks state. Resolving handles and talking to the backend
//! happens in [`crate::ShadowContext`], which drives these
//! transitions.

use std::sync::Arc;

use crate::backend::SubmissionId;
use crate::diagnostics::Diagnostics;
use crate::foundation::collections::{Key, RenderTargetHandle};

use super::camera::Camera;
use super::frame::{FrozenScene, GeometrySnapshot, RenderSettings};
use super::light::Light;
use super::{SceneError, SceneState};

/// One renderer and the scene it is building or rendering
#[derive(Debug)]
pub struct Renderer {
    state: SceneState,
    settings: RenderSettings,
    render_target: RenderTargetHandle,
    camera: Option<Camera>,
    lights: Vec<Light>,
    geometry: Vec<GeometrySnapshot>,
    frozen: Option<Arc<FrozenScene>>,
    in_flight: Option<SubmissionId>,
    diagnostics: Diagnostics,
}

impl Renderer {
    pub(crate) fn new(settings: RenderSettings) -> Self {
        Self {
            state: SceneState::Closed,
            settings,
            render_target: RenderTargetHandle::null(),
            camera: None,
            lights: Vec::new(),
            geometry: Vec::new(),
            frozen: None,
            in_flight: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Settings the next `render` will capture
    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub(crate) fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    /// Render target the next `render` will use
    pub fn render_target(&self) -> RenderTargetHandle {
        self.render_target
    }

    pub(crate) fn set_render_target(&mut self, target: RenderTargetHandle) {
        self.render_target = target;
    }

    /// Scene frozen by the last `end_scene`, until `finish`
    pub fn frozen_scene(&self) -> Option<&Arc<FrozenScene>> {
        self.frozen.as_ref()
    }

    /// Submission awaiting `finish`
    pub fn in_flight(&self) -> Option<SubmissionId> {
        self.in_flight
    }

    /// Diagnostics recorded since the last `begin_scene`
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub(crate) fn begin_scene(&mut self) -> Result<(), SceneError> {
        if self.state != SceneState::Closed {
            return Err(SceneError::InvalidTransition { operation: "begin_scene", state: self.state });
        }
        self.camera = None;
        self.lights.clear();
        self.geometry.clear();
        self.diagnostics.clear();
        self.state = SceneState::Building;
        Ok(())
    }

    /// Reject scene mutation outside Building
    pub(crate) fn ensure_building(&self, operation: &'static str) -> Result<(), SceneError> {
        match self.state {
            SceneState::Building => Ok(()),
            SceneState::Ready | SceneState::Rendering => Err(SceneError::SceneFrozen { operation }),
            SceneState::Closed => Err(SceneError::InvalidTransition { operation, state: self.state }),
        }
    }

    pub(crate) fn set_camera(&mut self, camera: Camera) -> Result<(), SceneError> {
        self.ensure_building("set_camera")?;
        self.camera = Some(camera);
        Ok(())
    }

    pub(crate) fn push_light(&mut self, light: Light) -> Result<(), SceneError> {
        self.ensure_building("add_light")?;
        self.lights.push(light);
        Ok(())
    }

    pub(crate) fn push_geometry(&mut self, geometry: GeometrySnapshot) -> Result<(), SceneError> {
        self.ensure_building("add_geometry")?;
        self.geometry.push(geometry);
        Ok(())
    }

    pub(crate) fn end_scene(&mut self) -> Result<Arc<FrozenScene>, SceneError> {
        if self.state != SceneState::Building {
            return Err(SceneError::InvalidTransition { operation: "end_scene", state: self.state });
        }
        let frozen = Arc::new(FrozenScene {
            camera: self.camera.take(),
            lights: std::mem::take(&mut self.lights),
            geometry: std::mem::take(&mut self.geometry),
        });
        self.frozen = Some(Arc::clone(&frozen));
        self.state = SceneState::Ready;
        Ok(frozen)
    }

    /// Frozen scene for submission; only valid in Ready
    pub(crate) fn scene_for_render(&self) -> Result<Arc<FrozenScene>, SceneError> {
        match (&self.frozen, self.state) {
            (Some(frozen), SceneState::Ready) => Ok(Arc::clone(frozen)),
            _ => Err(SceneError::InvalidTransition { operation: "render", state: self.state }),
        }
    }

    pub(crate) fn mark_rendering(&mut self, id: SubmissionId) {
        self.in_flight = Some(id);
        self.state = SceneState::Rendering;
    }

    /// Close the cycle, returning the submission to wait on and the scene it used
    pub(crate) fn close(&mut self) -> (Option<SubmissionId>, Option<Arc<FrozenScene>>) {
        self.state = SceneState::Closed;
        (self.in_flight.take(), self.frozen.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::scene::RenderFlags;

    fn renderer() -> Renderer {
        Renderer::new(RenderSettings {
            flags: RenderFlags::empty(),
            shadow_ray_offset: 0.0,
            self_shadow_threshold: 0.0,
        })
    }

    #[test]
    fn test_begin_scene_only_from_closed() {
        let mut renderer = renderer();
        renderer.begin_scene().unwrap();
        let err = renderer.begin_scene().unwrap_err();
        assert_eq!(err, SceneError::InvalidTransition { operation: "begin_scene", state: SceneState::Building });
        assert_eq!(renderer.state(), SceneState::Building);
    }

    #[test]
    fn test_mutation_rejected_after_end_scene() {
        let mut renderer = renderer();
        renderer.begin_scene().unwrap();
        renderer.push_light(Light::Directional { transform: Mat4::identity() }).unwrap();
        let frozen = renderer.end_scene().unwrap();

        let err = renderer.push_light(Light::Point { transform: Mat4::identity(), range: 1.0 }).unwrap_err();
        assert_eq!(err, SceneError::SceneFrozen { operation: "add_light" });
        assert_eq!(frozen.lights.len(), 1);
        assert_eq!(renderer.frozen_scene().unwrap().lights.len(), 1);
    }

    #[test]
    fn test_mutation_rejected_while_closed() {
        let mut renderer = renderer();
        assert!(matches!(
            renderer.set_camera(Camera::new(Mat4::identity(), Mat4::identity(), Mat4::identity(), 0.1, 1.0, 60.0)),
            Err(SceneError::InvalidTransition { operation: "set_camera", state: SceneState::Closed })
        ));
    }

    #[test]
    fn test_render_requires_ready() {
        let mut renderer = renderer();
        assert!(renderer.scene_for_render().is_err());
        renderer.begin_scene().unwrap();
        assert!(renderer.scene_for_render().is_err());
        renderer.end_scene().unwrap();
        assert!(renderer.scene_for_render().is_ok());
    }

    #[test]
    fn test_close_returns_to_closed() {
        let mut renderer = renderer();
        renderer.begin_scene().unwrap();
        renderer.end_scene().unwrap();
        renderer.mark_rendering(SubmissionId(3));
        assert_eq!(renderer.state(), SceneState::Rendering);

        let (in_flight, frozen) = renderer.close();
        assert_eq!(in_flight, Some(SubmissionId(3)));
        assert!(frozen.is_some());
        assert_eq!(renderer.state(), SceneState::Closed);
        assert!(renderer.frozen_scene().is_none());
    }
}
