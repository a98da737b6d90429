//! Cross-module tests driving the public context API end to end


use crate::backend::{HeadlessBackend, HeadlessProbe};
use crate::config::{HeadlessConfig, ShadowConfig};
use crate::context::ShadowContext;
use crate::foundation::collections::{MeshDataHandle, MeshInstanceHandle};
use crate::foundation::logging;
use crate::foundation::math::{Mat4, Vec3};
use crate::resources::BoneWeight4;
use crate::scene::Camera;

/// Context on a headless backend plus a probe into what it rendered
pub(crate) fn headless_context(headless: HeadlessConfig) -> (ShadowContext, HeadlessProbe) {
    logging::init_for_tests();
    let config = ShadowConfig { headless, ..Default::default() };
    let backend = HeadlessBackend::new(config.headless.clone()).unwrap();
    let probe = backend.probe();
    (ShadowContext::new(Box::new(backend), config), probe)
}

pub(crate) fn camera() -> Camera {
    let transform = Mat4::new_translation(&Vec3::new(0.0, 2.0, -5.0));
    let view = transform.try_inverse().unwrap();
    let projection = Mat4::new_perspective(16.0 / 9.0, 1.0, 0.1, 100.0);
    Camera::new(transform, view, projection, 0.1, 100.0, 60.0)
}

/// One triangle in CPU buffers
pub(crate) fn triangle_mesh(ctx: &mut ShadowContext) -> MeshDataHandle {
    let mesh = ctx.create_mesh_data();
    let vertices = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    ctx.set_cpu_buffers_typed(mesh, &vertices, &[0u32, 1, 2]);
    mesh
}

/// Triangle with two bones and two single-frame blend shapes
pub(crate) fn deforming_mesh(ctx: &mut ShadowContext) -> MeshDataHandle {
    let mesh = triangle_mesh(ctx);
    ctx.set_skin_bindposes(mesh, &[Mat4::identity(); 2]);
    let weight = BoneWeight4 { indices: [0, 1, 0, 0], weights: [0.75, 0.25, 0.0, 0.0] };
    ctx.set_skin_weights_fixed4(mesh, &[weight; 3]).unwrap();
    ctx.set_blend_shape_count(mesh, 2);
    ctx.add_blend_shape_frame(mesh, 0, &[Vec3::y(); 3], 100.0).unwrap();
    ctx.add_blend_shape_frame(mesh, 1, &[Vec3::z(); 3], 100.0).unwrap();
    mesh
}

pub(crate) fn instance_of(ctx: &mut ShadowContext, mesh: MeshDataHandle) -> MeshInstanceHandle {
    let instance = ctx.create_mesh_instance(mesh);
    ctx.set_instance_transform(instance, &Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0)));
    instance
}
