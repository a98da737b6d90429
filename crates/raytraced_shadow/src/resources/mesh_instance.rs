//! Mesh Instance: a placement of Mesh Data with animation state
//!
//! Instances remember which parts of their state changed since the last
//! rendered frame ([`UpdateFlags`]) so a backend can skip refitting geometry
//! whose transform, bones and blend weights are unchanged.

use bitflags::bitflags;

use crate::foundation::collections::MeshDataHandle;
use crate::foundation::math::Mat4;

use super::mesh_data::MeshData;

bitflags! {
    /// Parts of an instance that changed since its last rendered frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdateFlags: u32 {
        /// World transform changed
        const TRANSFORM = 1 << 0;
        /// Bone matrices changed
        const BONES = 1 << 1;
        /// Blend shape weights changed
        const BLEND_SHAPES = 1 << 2;
    }
}

/// Placement of one Mesh Data in the scene
#[derive(Debug, Clone)]
pub struct MeshInstance {
    mesh: MeshDataHandle,
    transform: Mat4,
    bones: Vec<Mat4>,
    blend_shape_weights: Vec<f32>,
    update_flags: UpdateFlags,
    revision: u64,
}

impl MeshInstance {
    pub(crate) fn new(mesh: MeshDataHandle) -> Self {
        Self {
            mesh,
            transform: Mat4::identity(),
            bones: Vec::new(),
            blend_shape_weights: Vec::new(),
            // A fresh instance has never been seen by the backend
            update_flags: UpdateFlags::all(),
            revision: 0,
        }
    }

    /// Mesh Data this instance places
    pub fn mesh(&self) -> MeshDataHandle {
        self.mesh
    }

    /// World transform
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Bone matrices, one per bind pose, or empty when not skinned
    pub fn bones(&self) -> &[Mat4] {
        &self.bones
    }

    /// Blend shape weights, parallel to the mesh's blend shapes, or empty
    pub fn blend_shape_weights(&self) -> &[f32] {
        &self.blend_shape_weights
    }

    /// Changes not yet consumed by a finished frame
    pub fn update_flags(&self) -> UpdateFlags {
        self.update_flags
    }

    /// Counter bumped by every change that sets an update flag
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Clear flags a finished frame consumed, unless the instance changed since
    pub(crate) fn consume_update_flags(&mut self, consumed: UpdateFlags, revision: u64) {
        if revision == self.revision {
            self.update_flags.remove(consumed);
        }
    }

    fn mark(&mut self, changed: UpdateFlags) {
        self.update_flags |= changed;
        self.revision = self.revision.wrapping_add(1);
    }

    pub(crate) fn set_transform(&mut self, transform: &Mat4) {
        if self.transform != *transform {
            self.transform = *transform;
            self.mark(UpdateFlags::TRANSFORM);
        }
    }

    /// Assign bone matrices, padded with identity or truncated to the bind pose count
    ///
    /// Returns a description of the length mismatch, if there was one.
    pub(crate) fn set_bones(&mut self, bones: &[Mat4], mesh: &MeshData) -> Option<String> {
        if !mesh.skin().is_valid() {
            log::debug!("Ignoring bones for an instance whose mesh has no skin");
            return None;
        }

        let bone_count = mesh.skin().bindposes.len();
        let mut mismatch = None;
        let resolved: Vec<Mat4> = if bones.is_empty() {
            Vec::new()
        } else {
            if bones.len() != bone_count {
                mismatch = Some(format!(
                    "Instance received {} bone matrices for {} bind poses; {}",
                    bones.len(),
                    bone_count,
                    if bones.len() < bone_count { "padding with identity" } else { "truncating" }
                ));
            }
            bones
                .iter()
                .copied()
                .chain(std::iter::repeat(Mat4::identity()))
                .take(bone_count)
                .collect()
        };

        if resolved != self.bones {
            self.bones = resolved;
            self.mark(UpdateFlags::BONES);
        }
        mismatch
    }

    /// Assign blend weights, padded with zero or truncated to the blend shape count
    ///
    /// Returns a description of the length mismatch, if there was one.
    pub(crate) fn set_blend_shape_weights(&mut self, weights: &[f32], mesh: &MeshData) -> Option<String> {
        let shape_count = mesh.blend_shapes().len();
        if shape_count == 0 {
            log::debug!("Ignoring blend shape weights for an instance whose mesh has no blend shapes");
            return None;
        }

        let mut mismatch = None;
        let resolved: Vec<f32> = if weights.is_empty() {
            Vec::new()
        } else {
            if weights.len() != shape_count {
                mismatch = Some(format!(
                    "Instance received {} blend shape weights for {} blend shapes; {}",
                    weights.len(),
                    shape_count,
                    if weights.len() < shape_count { "padding with zero" } else { "truncating" }
                ));
            }
            weights.iter().copied().chain(std::iter::repeat(0.0)).take(shape_count).collect()
        };

        if resolved != self.blend_shape_weights {
            self.blend_shape_weights = resolved;
            self.mark(UpdateFlags::BLEND_SHAPES);
        }
        mismatch
    }
}
