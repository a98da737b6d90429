//! Scene model and frame state machine
//!
//! - [`light`]: tagged-union lights and host light descriptors
//! - [`camera`]: camera parameters recorded verbatim
//! - [`frame`]: render flags, hit masks and the frozen scene handed to backends
//! - [`renderer`]: the BeginScene / EndScene / Render / Finish state machine

pub mod camera;
pub mod frame;
pub mod light;
pub mod renderer;

use std::fmt;

use thiserror::Error;

pub use camera::Camera;
pub use frame::{FrozenScene, GeometrySnapshot, HitMask, RenderFlags, RenderSettings};
pub use light::{Light, LightDescriptor, LightKind, UnsupportedLight};
pub use renderer::Renderer;

/// Where a renderer is in its frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneState {
    /// No scene open
    Closed,
    /// Between `begin_scene` and `end_scene`
    Building,
    /// Frozen, waiting for `render`
    Ready,
    /// Submitted, waiting for `finish`
    Rendering,
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "Closed",
            Self::Building => "Building",
            Self::Ready => "Ready",
            Self::Rendering => "Rendering",
        };
        f.write_str(name)
    }
}

/// Frame protocol violations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SceneError {
    /// Operation not allowed in the renderer's current state
    #[error("{operation} is not allowed while the scene is {state}")]
    InvalidTransition {
        /// Rejected operation
        operation: &'static str,
        /// State the renderer was in
        state: SceneState,
    },

    /// Scene mutation after `end_scene`
    #[error("{operation} rejected: the scene is frozen until the next begin_scene")]
    SceneFrozen {
        /// Rejected operation
        operation: &'static str,
    },
}
