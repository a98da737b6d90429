//! Mesh Data: buffers, skin and blend shapes
//!
//! A [`MeshData`] describes geometry that lives on the backend side. Buffer
//! *contents* are referenced through opaque [`GpuResource`] ids (or copied
//! CPU bytes); everything else (bind poses, weights, blend shape deltas) is
//! copied in when the setter runs, so later changes to the host's arrays never
//! leak into a frame that has already been frozen.

use std::num::NonZeroU64;

use thiserror::Error;

use crate::foundation::math::{Mat4, Vec3};

/// Validation errors raised while filling Mesh Data
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    /// Fixed 4-bone weights must provide exactly one entry per vertex
    #[error("fixed skin weights: expected {expected} entries (one per vertex), got {actual}")]
    FixedWeightCount {
        /// Vertex count of the mesh
        expected: usize,
        /// Number of weight entries supplied
        actual: usize,
    },

    /// Variable weights must provide one influence count per vertex
    #[error("variable skin weights: expected {expected} influence counts, got {actual}")]
    InfluenceCountLength {
        /// Vertex count of the mesh
        expected: usize,
        /// Number of counts supplied
        actual: usize,
    },

    /// Flattened weight list length must equal the sum of influence counts
    #[error("variable skin weights: counts sum to {expected} but {actual} weights were supplied")]
    WeightTotal {
        /// Sum of the per-vertex influence counts
        expected: usize,
        /// Length of the flattened weight list
        actual: usize,
    },

    /// Blend shape frame deltas must cover every vertex
    #[error("blend shape {shape}: expected {expected} vertex deltas, got {actual}")]
    BlendShapeDeltaLength {
        /// Blend shape slot the frame was added to
        shape: usize,
        /// Vertex count of the mesh
        expected: usize,
        /// Number of deltas supplied
        actual: usize,
    },

    /// Frames can only be added to slots allocated by `set_blend_shape_count`
    #[error("blend shape {shape} is out of range; the mesh has {count} blend shape slots")]
    BlendShapeIndex {
        /// Requested slot
        shape: usize,
        /// Slots allocated
        count: usize,
    },
}

/// Opaque reference to a buffer or texture owned by the host's graphics API
///
/// The id is never dereferenced on this side of the boundary; backends map it
/// back to a native resource. Zero is reserved as "no resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuResource(NonZeroU64);

impl GpuResource {
    /// Wrap a raw native pointer or id, returning `None` for zero
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw id handed over by the host
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Where the vertex and index bytes live
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MeshBuffers {
    /// Nothing assigned yet
    #[default]
    None,
    /// Host GPU buffers, referenced not copied
    Gpu {
        /// Vertex buffer
        vertices: GpuResource,
        /// Index buffer
        indices: GpuResource,
    },
    /// CPU copies of the buffers, uploaded by the backend
    Cpu {
        /// Raw vertex bytes
        vertices: Vec<u8>,
        /// Raw index bytes
        indices: Vec<u8>,
    },
}

/// Strides, counts and offsets describing how to read the buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferLayout {
    /// Bytes per vertex
    pub vertex_stride: u32,
    /// Number of vertices
    pub vertex_count: u32,
    /// First vertex read
    pub vertex_offset: u32,
    /// Bytes per index (2 or 4)
    pub index_stride: u32,
    /// Number of indices drawn
    pub index_count: u32,
    /// First index read
    pub index_offset: u32,
}

/// One joint influence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneWeight {
    /// Joint index into the bind pose array
    pub index: u32,
    /// Influence weight
    pub weight: f32,
}

impl BoneWeight {
    /// Create a joint influence
    pub fn new(index: u32, weight: f32) -> Self {
        Self { index, weight }
    }
}

/// Four joint influences for one vertex, heaviest first
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneWeight4 {
    /// Joint indices
    pub indices: [u32; 4],
    /// Influence weights; a zero weight ends the list
    pub weights: [f32; 4],
}

/// Per-vertex influence counts plus the flattened influences
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableWeights {
    counts: Vec<u8>,
    weights: Vec<BoneWeight>,
    offsets: Vec<usize>,
}

impl VariableWeights {
    /// Build from counts and flattened weights, checking that they agree
    pub fn new(counts: &[u8], weights: &[BoneWeight]) -> Result<Self, EncodeError> {
        let mut offsets = Vec::with_capacity(counts.len());
        let mut total = 0usize;
        for &count in counts {
            offsets.push(total);
            total += usize::from(count);
        }
        if total != weights.len() {
            return Err(EncodeError::WeightTotal { expected: total, actual: weights.len() });
        }
        Ok(Self { counts: counts.to_vec(), weights: weights.to_vec(), offsets })
    }

    /// Per-vertex influence counts
    pub fn counts(&self) -> &[u8] {
        &self.counts
    }

    /// Flattened influences in vertex order
    pub fn weights(&self) -> &[BoneWeight] {
        &self.weights
    }

    /// Start of each vertex's influences in [`Self::weights`]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of vertices described
    pub fn vertex_count(&self) -> usize {
        self.counts.len()
    }

    /// Influences of one vertex
    pub fn influences(&self, vertex: usize) -> Option<&[BoneWeight]> {
        let start = *self.offsets.get(vertex)?;
        let count = usize::from(self.counts[vertex]);
        self.weights.get(start..start + count)
    }
}

/// Skin weights in whichever representation the host supplied
#[derive(Debug, Clone, PartialEq)]
pub enum SkinWeights {
    /// Exactly four influences per vertex
    Fixed4(Vec<BoneWeight4>),
    /// Variable number of influences per vertex
    Variable(VariableWeights),
}

impl SkinWeights {
    /// Number of vertices the weights cover
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Fixed4(weights) => weights.len(),
            Self::Variable(weights) => weights.vertex_count(),
        }
    }

    /// Variable representation of the weights
    ///
    /// Fixed weights keep each vertex's leading positive influences and stop at
    /// the first zero, negative or NaN weight.
    pub fn to_variable(&self) -> VariableWeights {
        match self {
            Self::Variable(weights) => weights.clone(),
            Self::Fixed4(fixed) => {
                let mut counts = Vec::with_capacity(fixed.len());
                let mut offsets = Vec::with_capacity(fixed.len());
                let mut weights = Vec::with_capacity(fixed.len() * 4);
                for vertex in fixed {
                    offsets.push(weights.len());
                    let mut count = 0u8;
                    for (&index, &weight) in vertex.indices.iter().zip(&vertex.weights) {
                        if weight.is_nan() || weight <= 0.0 {
                            break;
                        }
                        weights.push(BoneWeight::new(index, weight));
                        count += 1;
                    }
                    counts.push(count);
                }
                weights.shrink_to_fit();
                VariableWeights { counts, weights, offsets }
            }
        }
    }
}

/// Skinning inputs: bind poses and weights
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinData {
    /// Bone-space matrices, one per joint
    pub bindposes: Vec<Mat4>,
    /// Per-vertex joint influences
    pub weights: Option<SkinWeights>,
}

impl SkinData {
    /// Whether the mesh can be skinned
    pub fn is_valid(&self) -> bool {
        !self.bindposes.is_empty() && self.weights.is_some()
    }
}

/// One animation frame of a blend shape
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShapeFrame {
    /// Position delta per vertex
    pub deltas: Vec<Vec3>,
    /// Weight at which this frame is fully applied
    pub weight: f32,
}

/// A blend shape: frames in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShape {
    /// Frames in the order they were added
    pub frames: Vec<BlendShapeFrame>,
}

/// Geometry description shared by every instance placing it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    buffers: MeshBuffers,
    layout: BufferLayout,
    skin: SkinData,
    blend_shapes: Vec<BlendShape>,
}

impl MeshData {
    /// Vertex and index buffers
    pub fn buffers(&self) -> &MeshBuffers {
        &self.buffers
    }

    /// Buffer strides, counts and offsets
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    /// Skinning data
    pub fn skin(&self) -> &SkinData {
        &self.skin
    }

    /// Blend shape slots
    pub fn blend_shapes(&self) -> &[BlendShape] {
        &self.blend_shapes
    }

    /// Whether the mesh has anything to trace
    pub fn has_geometry(&self) -> bool {
        !matches!(self.buffers, MeshBuffers::None) && self.layout.index_count > 0
    }

    pub(crate) fn set_gpu_buffers(&mut self, vertices: GpuResource, indices: GpuResource, layout: BufferLayout) {
        self.buffers = MeshBuffers::Gpu { vertices, indices };
        self.layout = layout;
    }

    pub(crate) fn set_cpu_buffers(&mut self, vertices: &[u8], indices: &[u8], layout: BufferLayout) {
        self.buffers = MeshBuffers::Cpu { vertices: vertices.to_vec(), indices: indices.to_vec() };
        self.layout = layout;
    }

    pub(crate) fn set_skin_bindposes(&mut self, bindposes: &[Mat4]) {
        self.skin.bindposes = bindposes.to_vec();
    }

    pub(crate) fn set_skin_weights_variable(&mut self, counts: &[u8], weights: &[BoneWeight]) -> Result<(), EncodeError> {
        let expected = self.layout.vertex_count as usize;
        if counts.len() != expected {
            return Err(EncodeError::InfluenceCountLength { expected, actual: counts.len() });
        }
        self.skin.weights = Some(SkinWeights::Variable(VariableWeights::new(counts, weights)?));
        Ok(())
    }

    pub(crate) fn set_skin_weights_fixed4(&mut self, weights: &[BoneWeight4]) -> Result<(), EncodeError> {
        let expected = self.layout.vertex_count as usize;
        if weights.len() != expected {
            return Err(EncodeError::FixedWeightCount { expected, actual: weights.len() });
        }
        self.skin.weights = Some(SkinWeights::Fixed4(weights.to_vec()));
        Ok(())
    }

    pub(crate) fn set_blend_shape_count(&mut self, count: usize) {
        self.blend_shapes.resize_with(count, BlendShape::default);
    }

    pub(crate) fn add_blend_shape_frame(&mut self, shape: usize, deltas: &[Vec3], weight: f32) -> Result<(), EncodeError> {
        let count = self.blend_shapes.len();
        let Some(slot) = self.blend_shapes.get_mut(shape) else {
            return Err(EncodeError::BlendShapeIndex { shape, count });
        };
        let expected = self.layout.vertex_count as usize;
        if deltas.len() != expected {
            return Err(EncodeError::BlendShapeDeltaLength { shape, expected, actual: deltas.len() });
        }
        slot.frames.push(BlendShapeFrame { deltas: deltas.to_vec(), weight });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_with_vertices(vertex_count: u32) -> MeshData {
        let mut mesh = MeshData::default();
        let vb = GpuResource::from_raw(1).unwrap();
        let ib = GpuResource::from_raw(2).unwrap();
        mesh.set_gpu_buffers(vb, ib, BufferLayout { vertex_count, index_count: 3, index_stride: 2, ..Default::default() });
        mesh
    }

    #[test]
    fn test_zero_is_not_a_resource() {
        assert!(GpuResource::from_raw(0).is_none());
        assert_eq!(GpuResource::from_raw(42).unwrap().raw(), 42);
    }

    #[test]
    fn test_variable_weight_offsets_follow_prefix_sums() {
        let weights: Vec<_> = (0..6).map(|i| BoneWeight::new(i, 0.1 * (i + 1) as f32)).collect();
        let variable = VariableWeights::new(&[2, 1, 3], &weights).unwrap();

        assert_eq!(variable.offsets(), &[0, 2, 3]);
        assert_eq!(variable.influences(0).unwrap(), &weights[0..2]);
        assert_eq!(variable.influences(1).unwrap(), &weights[2..3]);
        assert_eq!(variable.influences(2).unwrap(), &weights[3..6]);
        assert!(variable.influences(3).is_none());
    }

    #[test]
    fn test_variable_weight_total_mismatch_is_rejected() {
        let weights = vec![BoneWeight::new(0, 1.0); 5];
        let err = VariableWeights::new(&[2, 1, 3], &weights).unwrap_err();
        assert_eq!(err, EncodeError::WeightTotal { expected: 6, actual: 5 });
    }

    #[test]
    fn test_fixed_weights_require_one_entry_per_vertex() {
        let mut mesh = mesh_with_vertices(3);
        let err = mesh.set_skin_weights_fixed4(&[BoneWeight4::default(); 2]).unwrap_err();
        assert_eq!(err, EncodeError::FixedWeightCount { expected: 3, actual: 2 });
        assert!(mesh.skin().weights.is_none());

        mesh.set_skin_weights_fixed4(&[BoneWeight4::default(); 3]).unwrap();
        assert!(matches!(mesh.skin().weights, Some(SkinWeights::Fixed4(_))));
    }

    #[test]
    fn test_fixed_weights_normalize_by_dropping_trailing_zeros() {
        let fixed = SkinWeights::Fixed4(vec![
            BoneWeight4 { indices: [3, 1, 0, 0], weights: [0.75, 0.25, 0.0, 0.0] },
            BoneWeight4 { indices: [2, 0, 0, 0], weights: [1.0, 0.0, 0.0, 0.0] },
            BoneWeight4 { indices: [4, 5, 6, 7], weights: [0.4, 0.3, 0.2, 0.1] },
        ]);
        let variable = fixed.to_variable();
        assert_eq!(variable.counts(), &[2, 1, 4]);
        assert_eq!(variable.offsets(), &[0, 2, 3]);
        assert_eq!(variable.influences(1).unwrap(), &[BoneWeight::new(2, 1.0)]);
        assert_eq!(variable.weights().len(), 7);
    }

    #[test]
    fn test_fixed_weights_stop_at_nan() {
        let fixed = SkinWeights::Fixed4(vec![
            BoneWeight4 { indices: [1, 2, 3, 0], weights: [0.5, f32::NAN, 0.5, 0.0] },
            BoneWeight4 { indices: [4, 0, 0, 0], weights: [f32::NAN, 1.0, 0.0, 0.0] },
        ]);
        let variable = fixed.to_variable();
        assert_eq!(variable.counts(), &[1, 0]);
        assert_eq!(variable.weights(), &[BoneWeight::new(1, 0.5)]);
        assert!(variable.weights().iter().all(|w| !w.weight.is_nan()));
    }

    #[test]
    fn test_last_weight_setter_decides_representation() {
        let mut mesh = mesh_with_vertices(1);
        mesh.set_skin_weights_fixed4(&[BoneWeight4::default()]).unwrap();
        mesh.set_skin_weights_variable(&[1], &[BoneWeight::new(0, 1.0)]).unwrap();
        assert!(matches!(mesh.skin().weights, Some(SkinWeights::Variable(_))));
    }

    #[test]
    fn test_blend_shape_frames_keep_insertion_order() {
        let mut mesh = mesh_with_vertices(2);
        mesh.set_blend_shape_count(1);
        let deltas = [Vec3::zeros(); 2];
        mesh.add_blend_shape_frame(0, &deltas, 100.0).unwrap();
        mesh.add_blend_shape_frame(0, &deltas, 50.0).unwrap();

        let weights: Vec<f32> = mesh.blend_shapes()[0].frames.iter().map(|f| f.weight).collect();
        assert_eq!(weights, vec![100.0, 50.0]);
    }

    #[test]
    fn test_blend_shape_frame_needs_allocated_slot_and_full_deltas() {
        let mut mesh = mesh_with_vertices(2);
        let err = mesh.add_blend_shape_frame(0, &[Vec3::zeros(); 2], 1.0).unwrap_err();
        assert!(matches!(err, EncodeError::BlendShapeIndex { shape: 0, count: 0 }));

        mesh.set_blend_shape_count(3);
        mesh.add_blend_shape_frame(2, &[Vec3::zeros(); 2], 1.0).unwrap();
        assert_eq!(mesh.blend_shapes()[2].frames.len(), 1);
        let err = mesh.add_blend_shape_frame(usize::MAX, &[Vec3::zeros(); 2], 1.0).unwrap_err();
        assert!(matches!(err, EncodeError::BlendShapeIndex { shape: usize::MAX, count: 3 }));
        assert_eq!(mesh.blend_shapes().len(), 3);

        let err = mesh.add_blend_shape_frame(0, &[Vec3::zeros(); 1], 1.0).unwrap_err();
        assert!(matches!(err, EncodeError::BlendShapeDeltaLength { shape: 0, expected: 2, actual: 1 }));
        assert!(mesh.blend_shapes()[0].frames.is_empty());
    }

    #[test]
    fn test_skin_validity_needs_bindposes_and_weights() {
        let mut mesh = mesh_with_vertices(1);
        assert!(!mesh.skin().is_valid());
        mesh.set_skin_bindposes(&[Mat4::identity()]);
        assert!(!mesh.skin().is_valid());
        mesh.set_skin_weights_variable(&[1], &[BoneWeight::new(0, 1.0)]).unwrap();
        assert!(mesh.skin().is_valid());
    }
}
