//! Specialized collection types
//!
//! Every resource crossing the host/backend boundary is addressed by a
//! generation-checked slot map key. A key that was never issued is "null"
//! (`Key::null()`), and a key whose slot has been freed no longer resolves, so
//! double releases and use-after-release are detected instead of corrupting
//! memory.

pub use slotmap::{Key, SlotMap};

/// Handle-based map using slot map for stable references
pub type HandleMap<K, T> = SlotMap<K, T>;

slotmap::new_key_type! {
    /// Handle to Mesh Data (buffers, skin, blend shapes)
    pub struct MeshDataHandle;

    /// Handle to a placement of Mesh Data in the scene
    pub struct MeshInstanceHandle;

    /// Handle to a render target description
    pub struct RenderTargetHandle;

    /// Handle to a renderer, which owns one scene at a time
    pub struct RendererHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handles_are_null() {
        assert!(MeshDataHandle::default().is_null());
        assert!(MeshInstanceHandle::default().is_null());
        assert!(RenderTargetHandle::default().is_null());
        assert!(RendererHandle::default().is_null());
    }

    #[test]
    fn test_removed_key_no_longer_resolves() {
        let mut map: HandleMap<MeshDataHandle, u32> = HandleMap::with_key();
        let key = map.insert(7);
        assert_eq!(map.remove(key), Some(7));
        assert!(map.get(key).is_none());

        // A reused slot gets a new generation, so the stale key stays dead
        let fresh = map.insert(8);
        assert_ne!(key, fresh);
        assert!(map.get(key).is_none());
    }
}
