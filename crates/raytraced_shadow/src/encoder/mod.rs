//! Geometry Encoder
//!
//! Translates a host mesh description into Mesh Data: buffer parameters,
//! skin and blend shapes.
//!
//! ## Submesh merging
//!
//! Submeshes are scanned from the first one. Each following submesh is folded
//! into the draw range while it uses triangle topology and starts exactly
//! where the range ends. The first submesh that breaks either rule stops the
//! scan, so a gap or a non-triangle submesh never pulls unrelated indices into
//! the traced geometry.
//!
//! ```text
//! [tri 0..10][tri 10..15][quad ...]  ->  draw 0..15
//! [tri 0..10][tri 20..25]            ->  draw 0..10
//! ```

use crate::context::ShadowContext;
use crate::foundation::collections::{Key, MeshDataHandle};
use crate::foundation::math::Mat4;
use crate::resources::{BlendShape, BoneWeight, BoneWeight4, BufferLayout, EncodeError, GpuResource};

/// Primitive topology of a submesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Indexed triangle list
    Triangles,
    /// Quads
    Quads,
    /// Line list
    Lines,
    /// Line strip
    LineStrip,
    /// Points
    Points,
}

/// Width of one index element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices
    #[default]
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    /// Bytes per index
    pub fn stride(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Index range drawn with one topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    /// Primitive topology
    pub topology: Topology,
    /// First index
    pub index_start: u32,
    /// Number of indices
    pub index_count: u32,
}

impl Submesh {
    /// Triangle submesh covering `index_start..index_start + index_count`
    pub fn triangles(index_start: u32, index_count: u32) -> Self {
        Self { topology: Topology::Triangles, index_start, index_count }
    }
}

/// Merged index range handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    /// First index
    pub offset: u32,
    /// Number of indices
    pub count: u32,
}

impl DrawRange {
    /// Whether the range draws nothing
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Merge the leading run of contiguous triangle submeshes into one draw range
pub fn merge_submeshes(submeshes: &[Submesh]) -> DrawRange {
    let Some(first) = submeshes.first().filter(|s| s.topology == Topology::Triangles) else {
        return DrawRange::default();
    };

    let mut range = DrawRange { offset: first.index_start, count: first.index_count };
    for submesh in &submeshes[1..] {
        let end = range.offset.saturating_add(range.count);
        if submesh.topology != Topology::Triangles || submesh.index_start != end {
            break;
        }
        range.count = range.count.saturating_add(submesh.index_count);
    }
    range
}

/// Skin weights as a host mesh provides them
#[derive(Debug, Clone, Copy)]
pub enum SourceSkinWeights<'a> {
    /// Exactly four influences per vertex
    Fixed4(&'a [BoneWeight4]),
    /// Per-vertex influence counts plus the flattened influences
    Variable {
        /// Influence count per vertex
        counts: &'a [u8],
        /// Influences of all vertices, in vertex order
        weights: &'a [BoneWeight],
    },
}

/// Host-side mesh the encoder reads from
pub trait MeshSource {
    /// Vertex buffer on the host's graphics API
    fn vertex_buffer(&self) -> Option<GpuResource>;

    /// Index buffer on the host's graphics API
    fn index_buffer(&self) -> Option<GpuResource>;

    /// Bytes per vertex
    fn vertex_stride(&self) -> u32;

    /// Number of vertices
    fn vertex_count(&self) -> u32;

    /// Index element width
    fn index_format(&self) -> IndexFormat;

    /// Submeshes in draw order
    fn submeshes(&self) -> &[Submesh];

    /// Skin bind poses; empty for rigid meshes
    fn bindposes(&self) -> &[Mat4] {
        &[]
    }

    /// Skin weights, if the mesh is skinned
    fn skin_weights(&self) -> Option<SourceSkinWeights<'_>> {
        None
    }

    /// Blend shapes with their frames
    fn blend_shapes(&self) -> &[BlendShape] {
        &[]
    }
}

impl ShadowContext {
    /// Point Mesh Data at a source mesh's GPU buffers, merging its submeshes
    ///
    /// Returns the merged draw range. An empty range means the mesh has no
    /// renderable geometry; the Mesh Data is left untouched and a warning is
    /// recorded.
    pub fn encode_gpu_buffers(&mut self, handle: MeshDataHandle, source: &dyn MeshSource) -> DrawRange {
        let range = merge_submeshes(source.submeshes());
        if range.is_empty() {
            self.warn(format!("Mesh data {handle:?}: no triangle submesh to trace; skipped"));
            return range;
        }
        let (Some(vertices), Some(indices)) = (source.vertex_buffer(), source.index_buffer()) else {
            self.warn(format!("Mesh data {handle:?}: source mesh has no GPU buffers; skipped"));
            return DrawRange::default();
        };

        log::debug!(
            "Mesh data {:?}: {} submeshes traced as {} indices from {}",
            handle,
            source.submeshes().len(),
            range.count,
            range.offset
        );

        let layout = BufferLayout {
            vertex_stride: source.vertex_stride(),
            vertex_count: source.vertex_count(),
            vertex_offset: 0,
            index_stride: source.index_format().stride(),
            index_count: range.count,
            index_offset: range.offset,
        };
        self.set_gpu_buffers(handle, vertices, indices, layout);
        range
    }

    /// Create Mesh Data from a source mesh: buffers, skin and blend shapes
    ///
    /// Returns a null handle when the backend has no raytracing support or the
    /// mesh has nothing to trace. On a validation error the partially filled
    /// Mesh Data is released.
    pub fn encode_mesh(&mut self, source: &dyn MeshSource) -> Result<MeshDataHandle, EncodeError> {
        let handle = self.create_mesh_data();
        if handle.is_null() {
            return Ok(handle);
        }

        if self.encode_gpu_buffers(handle, source).is_empty() {
            self.release_mesh_data(handle);
            return Ok(MeshDataHandle::null());
        }

        if let Err(err) = self.encode_deformation(handle, source) {
            self.warn(format!("Mesh data {handle:?}: {err}"));
            self.release_mesh_data(handle);
            return Err(err);
        }
        Ok(handle)
    }

    fn encode_deformation(&mut self, handle: MeshDataHandle, source: &dyn MeshSource) -> Result<(), EncodeError> {
        if !source.bindposes().is_empty() {
            self.set_skin_bindposes(handle, source.bindposes());
        }
        match source.skin_weights() {
            Some(SourceSkinWeights::Fixed4(weights)) => self.set_skin_weights_fixed4(handle, weights)?,
            Some(SourceSkinWeights::Variable { counts, weights }) => {
                self.set_skin_weights_variable(handle, counts, weights)?;
            }
            None => {}
        }

        let shapes = source.blend_shapes();
        if !shapes.is_empty() {
            self.set_blend_shape_count(handle, shapes.len());
            for (index, shape) in shapes.iter().enumerate() {
                for frame in &shape.frames {
                    self.add_blend_shape_frame(handle, index, &frame.deltas, frame.weight)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::config::ShadowConfig;
    use crate::foundation::math::Vec3;
    use crate::resources::{BlendShapeFrame, MeshBuffers, SkinWeights};

    fn quad(index_start: u32, index_count: u32) -> Submesh {
        Submesh { topology: Topology::Quads, index_start, index_count }
    }

    #[test]
    fn test_contiguous_triangles_merge_until_quad() {
        let range = merge_submeshes(&[Submesh::triangles(0, 10), Submesh::triangles(10, 5), quad(15, 8)]);
        assert_eq!(range, DrawRange { offset: 0, count: 15 });
    }

    #[test]
    fn test_gap_stops_merge() {
        let range = merge_submeshes(&[Submesh::triangles(0, 10), Submesh::triangles(20, 5)]);
        assert_eq!(range, DrawRange { offset: 0, count: 10 });
    }

    #[test]
    fn test_no_triangles_yields_empty_range() {
        assert!(merge_submeshes(&[]).is_empty());
        assert!(merge_submeshes(&[quad(0, 4), Submesh::triangles(4, 6)]).is_empty());
    }

    #[test]
    fn test_submesh_after_gap_is_not_merged_even_if_contiguous_later() {
        let range = merge_submeshes(&[
            Submesh::triangles(0, 3),
            Submesh::triangles(6, 3),
            Submesh::triangles(3, 3),
        ]);
        assert_eq!(range.count, 3);
    }

    #[test]
    fn test_index_format_stride() {
        assert_eq!(IndexFormat::U16.stride(), 2);
        assert_eq!(IndexFormat::U32.stride(), 4);
    }

    struct TestMesh {
        submeshes: Vec<Submesh>,
        weights: Vec<BoneWeight4>,
        shapes: Vec<BlendShape>,
    }

    impl MeshSource for TestMesh {
        fn vertex_buffer(&self) -> Option<GpuResource> {
            GpuResource::from_raw(1)
        }

        fn index_buffer(&self) -> Option<GpuResource> {
            GpuResource::from_raw(2)
        }

        fn vertex_stride(&self) -> u32 {
            32
        }

        fn vertex_count(&self) -> u32 {
            3
        }

        fn index_format(&self) -> IndexFormat {
            IndexFormat::U32
        }

        fn submeshes(&self) -> &[Submesh] {
            &self.submeshes
        }

        fn skin_weights(&self) -> Option<SourceSkinWeights<'_>> {
            (!self.weights.is_empty()).then_some(SourceSkinWeights::Fixed4(&self.weights))
        }

        fn blend_shapes(&self) -> &[BlendShape] {
            &self.shapes
        }
    }

    fn context() -> ShadowContext {
        ShadowContext::headless(ShadowConfig::default()).unwrap()
    }

    #[test]
    fn test_encode_mesh_fills_buffers_skin_and_shapes() {
        let mut ctx = context();
        let source = TestMesh {
            submeshes: vec![Submesh::triangles(0, 3)],
            weights: vec![BoneWeight4 { indices: [0; 4], weights: [1.0, 0.0, 0.0, 0.0] }; 3],
            shapes: vec![BlendShape {
                frames: vec![BlendShapeFrame { deltas: vec![Vec3::x(); 3], weight: 100.0 }],
            }],
        };

        let handle = ctx.encode_mesh(&source).unwrap();
        let mesh = ctx.mesh_data(handle).unwrap();
        assert!(matches!(mesh.buffers(), MeshBuffers::Gpu { .. }));
        assert_eq!(mesh.layout().index_stride, 4);
        assert_eq!(mesh.layout().index_count, 3);
        assert!(matches!(mesh.skin().weights, Some(SkinWeights::Fixed4(_))));
        assert_eq!(mesh.blend_shapes().len(), 1);
        assert_relative_eq!(mesh.blend_shapes()[0].frames[0].weight, 100.0);
    }

    #[test]
    fn test_encode_mesh_without_triangles_is_skipped() {
        let mut ctx = context();
        let source = TestMesh { submeshes: vec![quad(0, 4)], weights: Vec::new(), shapes: Vec::new() };

        let handle = ctx.encode_mesh(&source).unwrap();
        assert!(handle.is_null());
        assert_eq!(ctx.resources().mesh_data_count(), 0);
        assert!(ctx.error_log().contains("no triangle submesh"));
    }

    #[test]
    fn test_encode_mesh_releases_on_bad_weights() {
        let mut ctx = context();
        let source = TestMesh {
            submeshes: vec![Submesh::triangles(0, 3)],
            weights: vec![BoneWeight4::default(); 2],
            shapes: Vec::new(),
        };

        let err = ctx.encode_mesh(&source).unwrap_err();
        assert_eq!(err, EncodeError::FixedWeightCount { expected: 3, actual: 2 });
        assert_eq!(ctx.resources().mesh_data_count(), 0);
    }
}
