//! Resource Registry - handle-addressed storage for scene resources
//!
//! Mesh Data, Mesh Instances and Render Targets are stored in generation-checked
//! slot maps and addressed by the handles in
//! [`crate::foundation::collections`]. The registry enforces the lifetime rules
//! of the handle model:
//!
//! - Releasing a handle twice, or releasing a null handle, is a no-op
//!   ([`ReleaseOutcome::Ignored`]).
//! - Mesh Data counts the instances referencing it. Releasing it while
//!   instances remain revokes the owner's handle but keeps the storage alive
//!   until the last instance is released ([`ReleaseOutcome::Deferred`]).
//! - Mesh Data is held in an [`Arc`] and copied on write, so frozen frames that
//!   still hold a snapshot are never affected by later edits or releases.

pub mod mesh_data;
pub mod mesh_instance;
pub mod render_target;

use std::sync::Arc;

use crate::foundation::collections::{HandleMap, Key, MeshDataHandle, MeshInstanceHandle, RenderTargetHandle};
use crate::scene::{GeometrySnapshot, HitMask};

pub use mesh_data::{
    BlendShape, BlendShapeFrame, BoneWeight, BoneWeight4, BufferLayout, EncodeError, GpuResource, MeshBuffers,
    MeshData, SkinData, SkinWeights, VariableWeights,
};
pub use mesh_instance::{MeshInstance, UpdateFlags};
pub use render_target::{RenderTarget, RenderTargetFormat};

/// Result of a release call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The resource was destroyed
    Released,
    /// The handle was revoked; storage lives on until the listed number of
    /// instances referencing it are released
    Deferred {
        /// Instances still referencing the resource
        instances: usize,
    },
    /// The handle was null, stale or already released
    Ignored,
}

#[derive(Debug)]
struct MeshDataEntry {
    data: Arc<MeshData>,
    instance_refs: usize,
    owner_released: bool,
}

/// Storage for every resource created through a context
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    meshes: HandleMap<MeshDataHandle, MeshDataEntry>,
    instances: HandleMap<MeshInstanceHandle, MeshInstance>,
    targets: HandleMap<RenderTargetHandle, RenderTarget>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // === Mesh Data ===

    /// Allocate empty Mesh Data
    pub fn create_mesh_data(&mut self) -> MeshDataHandle {
        self.meshes.insert(MeshDataEntry {
            data: Arc::new(MeshData::default()),
            instance_refs: 0,
            owner_released: false,
        })
    }

    /// Whether the owner's handle is still live
    pub fn is_mesh_data_valid(&self, handle: MeshDataHandle) -> bool {
        self.meshes.get(handle).is_some_and(|entry| !entry.owner_released)
    }

    /// Read Mesh Data, including data kept alive only by instances
    pub fn mesh_data(&self, handle: MeshDataHandle) -> Option<&Arc<MeshData>> {
        self.meshes.get(handle).map(|entry| &entry.data)
    }

    /// Mutable access for the owner; copies the data if a frozen frame shares it
    pub(crate) fn mesh_data_mut(&mut self, handle: MeshDataHandle) -> Option<&mut MeshData> {
        self.meshes
            .get_mut(handle)
            .filter(|entry| !entry.owner_released)
            .map(|entry| Arc::make_mut(&mut entry.data))
    }

    /// Release the owner's handle
    pub fn release_mesh_data(&mut self, handle: MeshDataHandle) -> ReleaseOutcome {
        let Some(entry) = self.meshes.get_mut(handle) else {
            return ReleaseOutcome::Ignored;
        };
        if entry.owner_released {
            return ReleaseOutcome::Ignored;
        }

        if entry.instance_refs > 0 {
            entry.owner_released = true;
            log::debug!(
                "Mesh data {:?} released while {} instance(s) reference it; deferring",
                handle,
                entry.instance_refs
            );
            return ReleaseOutcome::Deferred { instances: entry.instance_refs };
        }

        self.meshes.remove(handle);
        ReleaseOutcome::Released
    }

    /// Number of Mesh Data entries still holding storage
    pub fn mesh_data_count(&self) -> usize {
        self.meshes.len()
    }

    // === Mesh Instances ===

    /// Place Mesh Data; returns a null handle when the mesh handle is not live
    pub fn create_mesh_instance(&mut self, mesh: MeshDataHandle) -> MeshInstanceHandle {
        let Some(entry) = self.meshes.get_mut(mesh).filter(|entry| !entry.owner_released) else {
            log::warn!("Cannot create a mesh instance for invalid mesh data {:?}", mesh);
            return MeshInstanceHandle::null();
        };
        entry.instance_refs += 1;
        self.instances.insert(MeshInstance::new(mesh))
    }

    /// Whether an instance handle is live
    pub fn is_mesh_instance_valid(&self, handle: MeshInstanceHandle) -> bool {
        self.instances.contains_key(handle)
    }

    /// Read an instance
    pub fn mesh_instance(&self, handle: MeshInstanceHandle) -> Option<&MeshInstance> {
        self.instances.get(handle)
    }

    /// Mutable instance together with the Mesh Data it places
    pub(crate) fn instance_with_mesh_mut(&mut self, handle: MeshInstanceHandle) -> Option<(&mut MeshInstance, &MeshData)> {
        let instance = self.instances.get_mut(handle)?;
        let mesh = self.meshes.get(instance.mesh())?;
        Some((instance, &mesh.data))
    }

    /// Release an instance
    ///
    /// Also returns the Mesh Data handle if this was the last reference to
    /// Mesh Data whose owner already released it, i.e. its storage was
    /// reclaimed here.
    pub fn release_mesh_instance(&mut self, handle: MeshInstanceHandle) -> (ReleaseOutcome, Option<MeshDataHandle>) {
        let Some(instance) = self.instances.remove(handle) else {
            return (ReleaseOutcome::Ignored, None);
        };

        let mesh = instance.mesh();
        let mut reclaimed = None;
        if let Some(entry) = self.meshes.get_mut(mesh) {
            entry.instance_refs = entry.instance_refs.saturating_sub(1);
            if entry.owner_released && entry.instance_refs == 0 {
                self.meshes.remove(mesh);
                log::debug!("Reclaimed deferred mesh data {:?}", mesh);
                reclaimed = Some(mesh);
            }
        }
        (ReleaseOutcome::Released, reclaimed)
    }

    /// Number of live instances
    pub fn mesh_instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Copy an instance's current state for a frame
    ///
    /// Returns `None` for unknown instances.
    pub fn snapshot(&self, handle: MeshInstanceHandle, hit_mask: HitMask) -> Option<GeometrySnapshot> {
        let instance = self.instances.get(handle)?;
        let mesh = self.meshes.get(instance.mesh())?;
        Some(GeometrySnapshot {
            instance: handle,
            mesh_handle: instance.mesh(),
            mesh: Arc::clone(&mesh.data),
            transform: *instance.transform(),
            bones: instance.bones().to_vec(),
            blend_shape_weights: instance.blend_shape_weights().to_vec(),
            hit_mask,
            update_flags: instance.update_flags(),
            revision: instance.revision(),
        })
    }

    /// Mark the changes a finished frame saw as consumed
    ///
    /// Nothing is cleared if the instance changed again after the snapshot
    /// was taken.
    pub(crate) fn consume_update_flags(&mut self, snapshot: &GeometrySnapshot) {
        if let Some(instance) = self.instances.get_mut(snapshot.instance) {
            instance.consume_update_flags(snapshot.update_flags, snapshot.revision);
        }
    }

    // === Render Targets ===

    /// Allocate an empty render target description
    pub fn create_render_target(&mut self) -> RenderTargetHandle {
        self.targets.insert(RenderTarget::default())
    }

    /// Read a render target
    pub fn render_target(&self, handle: RenderTargetHandle) -> Option<&RenderTarget> {
        self.targets.get(handle)
    }

    pub(crate) fn render_target_mut(&mut self, handle: RenderTargetHandle) -> Option<&mut RenderTarget> {
        self.targets.get_mut(handle)
    }

    /// Release a render target
    pub fn release_render_target(&mut self, handle: RenderTargetHandle) -> ReleaseOutcome {
        match self.targets.remove(handle) {
            Some(_) => ReleaseOutcome::Released,
            None => ReleaseOutcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_release_is_ignored() {
        let mut registry = ResourceRegistry::new();
        let mesh = registry.create_mesh_data();
        assert_eq!(registry.release_mesh_data(mesh), ReleaseOutcome::Released);
        assert_eq!(registry.release_mesh_data(mesh), ReleaseOutcome::Ignored);
        assert_eq!(registry.release_mesh_data(MeshDataHandle::null()), ReleaseOutcome::Ignored);
    }

    #[test]
    fn test_release_with_instances_is_deferred() {
        let mut registry = ResourceRegistry::new();
        let mesh = registry.create_mesh_data();
        let a = registry.create_mesh_instance(mesh);
        let b = registry.create_mesh_instance(mesh);

        assert_eq!(registry.release_mesh_data(mesh), ReleaseOutcome::Deferred { instances: 2 });
        assert!(!registry.is_mesh_data_valid(mesh));
        assert!(registry.mesh_data_mut(mesh).is_none());
        assert!(registry.mesh_data(mesh).is_some());
        assert_eq!(registry.release_mesh_data(mesh), ReleaseOutcome::Ignored);

        assert_eq!(registry.release_mesh_instance(a), (ReleaseOutcome::Released, None));
        assert_eq!(registry.mesh_data_count(), 1);
        assert_eq!(registry.release_mesh_instance(b), (ReleaseOutcome::Released, Some(mesh)));
        assert_eq!(registry.mesh_data_count(), 0);
    }

    #[test]
    fn test_instance_of_released_mesh_is_null() {
        let mut registry = ResourceRegistry::new();
        let mesh = registry.create_mesh_data();
        registry.release_mesh_data(mesh);
        assert!(registry.create_mesh_instance(mesh).is_null());
        assert!(registry.create_mesh_instance(MeshDataHandle::null()).is_null());
    }

    #[test]
    fn test_snapshot_survives_later_edits() {
        let mut registry = ResourceRegistry::new();
        let mesh = registry.create_mesh_data();
        let instance = registry.create_mesh_instance(mesh);
        let snapshot = registry.snapshot(instance, HitMask::all()).unwrap();

        registry.mesh_data_mut(mesh).unwrap().set_blend_shape_count(4);
        assert!(snapshot.mesh.blend_shapes().is_empty());
        assert_eq!(registry.mesh_data(mesh).unwrap().blend_shapes().len(), 4);
    }

    #[test]
    fn test_render_target_release_is_idempotent() {
        let mut registry = ResourceRegistry::new();
        let target = registry.create_render_target();
        registry.render_target_mut(target).unwrap().width = 64;
        assert_eq!(registry.render_target(target).unwrap().width, 64);
        assert_eq!(registry.release_render_target(target), ReleaseOutcome::Released);
        assert_eq!(registry.release_render_target(target), ReleaseOutcome::Ignored);
    }
}
