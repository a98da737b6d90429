//! Frame data: render settings and the frozen scene handed to backends

use std::borrow::Cow;
use std::sync::Arc;

use bitflags::bitflags;

use crate::foundation::collections::{MeshDataHandle, MeshInstanceHandle};
use crate::foundation::math::{utils, Mat4};
use crate::resources::{MeshData, UpdateFlags};

use super::camera::Camera;
use super::light::Light;

bitflags! {
    /// Renderer-wide raytracing switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Back-facing triangles do not occlude
        const CULL_BACK_FACES = 1 << 0;
        /// An instance never shadows itself
        const IGNORE_SELF_SHADOW = 1 << 1;
        /// With self shadows ignored, still keep drop shadows onto the same instance
        const KEEP_SELF_DROP_SHADOW = 1 << 2;
        /// Skinning and blend shapes are evaluated on the GPU
        const GPU_SKINNING = 1 << 3;
        /// Blend shape weights are clamped to [0, 1]
        const CLAMP_BLEND_SHAPE_WEIGHTS = 1 << 4;
    }
}

bitflags! {
    /// Role of a geometry entry in shadow computation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HitMask: u8 {
        /// Receives shadows
        const RECEIVER = 1 << 0;
        /// Casts shadows
        const CASTER = 1 << 1;
    }
}

impl Default for HitMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Scalars and flags captured when a frame is rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Raytracing switches
    pub flags: RenderFlags,
    /// Offset applied to shadow ray origins
    pub shadow_ray_offset: f32,
    /// Distance under which self hits are ignored
    pub self_shadow_threshold: f32,
}

/// One geometry entry copied at `add_geometry` time
#[derive(Debug, Clone)]
pub struct GeometrySnapshot {
    /// Instance the entry was taken from
    pub instance: MeshInstanceHandle,
    /// Mesh Data handle the instance placed
    pub mesh_handle: MeshDataHandle,
    /// Shared Mesh Data, kept alive for the frame's whole lifetime
    pub mesh: Arc<MeshData>,
    /// World transform
    pub transform: Mat4,
    /// Bone matrices
    pub bones: Vec<Mat4>,
    /// Blend shape weights
    pub blend_shape_weights: Vec<f32>,
    /// Receiver/caster role
    pub hit_mask: HitMask,
    /// Instance changes pending when the entry was taken
    pub update_flags: UpdateFlags,
    /// Instance change counter when the entry was taken
    pub revision: u64,
}

impl GeometrySnapshot {
    /// Blend weights as the backend should apply them under `flags`
    pub fn blend_shape_weights_for(&self, flags: RenderFlags) -> Cow<'_, [f32]> {
        if flags.contains(RenderFlags::CLAMP_BLEND_SHAPE_WEIGHTS) {
            Cow::Owned(self.blend_shape_weights.iter().copied().map(utils::saturate).collect())
        } else {
            Cow::Borrowed(&self.blend_shape_weights)
        }
    }

    /// Triangles drawn by this entry
    pub fn triangle_count(&self) -> u32 {
        self.mesh.layout().index_count / 3
    }
}

/// Camera, lights and geometry frozen by `end_scene`
#[derive(Debug, Clone, Default)]
pub struct FrozenScene {
    /// Camera, if one was set
    pub camera: Option<Camera>,
    /// Lights in insertion order
    pub lights: Vec<Light>,
    /// Geometry in insertion order
    pub geometry: Vec<GeometrySnapshot>,
}
