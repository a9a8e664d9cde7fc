use std::borrow::Cow;

use glam::Vec3;
use wgpu::VertexFormat;

use crate::resources::geometry::{Attribute, Geometry};

/// Axis-aligned box centred on the origin: 24 vertices, 12 triangles.
#[must_use]
pub fn create_box(id: impl Into<Cow<'static, str>>, width: f32, height: f32, depth: f32) -> Geometry {
    let half = Vec3::new(width, height, depth) * 0.5;

    // (normal, u axis, v axis) per face; corners are normal ± u ± v.
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    ];

    let mut positions: Vec<[f32; 3]> = Vec::with_capacity(24);
    let mut normals: Vec<[f32; 3]> = Vec::with_capacity(24);
    let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(24);
    let mut indices: Vec<u32> = Vec::with_capacity(36);

    for (face, (normal, u, v)) in faces.into_iter().enumerate() {
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (su, sv) in corners {
            let p = (normal + u * su + v * sv) * half;
            positions.push(p.to_array());
            normals.push(normal.to_array());
            uvs.push([(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5]);
        }
        let base = face as u32 * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let mut geo = Geometry::new(id);
    geo.set_attribute("position", Attribute::new_planar(&positions, VertexFormat::Float32x3));
    geo.set_attribute("normal", Attribute::new_planar(&normals, VertexFormat::Float32x3));
    geo.set_attribute("uv", Attribute::new_planar(&uvs, VertexFormat::Float32x2));
    geo.set_indices(indices);
    geo
}
