//! # Raytraced Shadow
//!
//! Scene assembly and resource lifecycle for hardware-raytraced hard shadows.
//!
//! The host application describes each frame (geometry, skinning state,
//! blend shape state, lights and a camera) through opaque handles. This crate
//! turns that into a consistent frozen scene, submits it to a
//! [`backend::ShadowBackend`] and joins on completion.
//!
//! ## Features
//!
//! - **Handle model**: generation-checked handles, idempotent release, deferred
//!   Mesh Data reclamation while instances still reference it
//! - **Geometry encoding**: submesh merging, fixed and variable skin weights,
//!   blend shape frames
//! - **Frame state machine**: `begin_scene` → `end_scene` → `render` → `finish`
//! - **Diagnostics**: warnings and errors logged through `log` and kept as a
//!   readable error log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use raytraced_shadow::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctx = ShadowContext::headless(ShadowConfig::default())?;
//!     let renderer = ctx.create_renderer();
//!
//!     let mesh = ctx.create_mesh_data();
//!     ctx.set_cpu_buffers_typed(mesh, &[[0.0f32; 3]; 3], &[0u16, 1, 2]);
//!     let instance = ctx.create_mesh_instance(mesh);
//!
//!     ctx.begin_scene(renderer)?;
//!     ctx.add_light(renderer, &LightDescriptor::directional(Mat4::identity()))?;
//!     ctx.add_geometry(renderer, instance, HitMask::all())?;
//!     ctx.end_scene(renderer)?;
//!     ctx.render(renderer)?;
//!     ctx.finish(renderer);
//!
//!     print!("{}", ctx.error_log());
//!     Ok(())
//! }
//! ```

pub mod foundation;
pub mod config;
pub mod resources;
pub mod encoder;
pub mod scene;
pub mod backend;
pub mod diagnostics;

mod context;

#[cfg(test)]
mod tests;

pub use context::ShadowContext;

/// Common imports for hosts
pub mod prelude {
    pub use crate::{
        ShadowContext,
        backend::{BackendError, HeadlessBackend, NullBackend, ShadowBackend},
        config::{Config, HeadlessConfig, ShadowConfig},
        diagnostics::Diagnostics,
        encoder::{IndexFormat, MeshSource, SourceSkinWeights, Submesh, Topology},
        foundation::{
            collections::{Key, MeshDataHandle, MeshInstanceHandle, RenderTargetHandle, RendererHandle},
            math::{Mat4, Vec3},
        },
        resources::{
            BoneWeight, BoneWeight4, BufferLayout, EncodeError, GpuResource, ReleaseOutcome, RenderTargetFormat,
        },
        scene::{Camera, HitMask, LightDescriptor, LightKind, RenderFlags, SceneError, SceneState},
    };
}
