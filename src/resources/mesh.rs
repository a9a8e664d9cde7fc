use std::sync::Arc;

use crate::resources::geometry::Geometry;
use crate::resources::material::Material;

/// A drawable: one geometry and one material, both shared.
///
/// LOD levels and instanced proxies reuse the same `Arc`s, so cloning a mesh
/// never copies vertex or pixel data.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,

    pub cast_shadows: bool,
    pub receive_shadows: bool,

    // Draw order
    pub render_order: i32,
}

impl Mesh {
    #[must_use]
    pub fn new(geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            cast_shadows: true,
            receive_shadows: true,
            render_order: 0,
        }
    }

    /// Same draw settings, different resources.
    #[must_use]
    pub fn with_resources(&self, geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            ..self.clone()
        }
    }

    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.geometry.triangle_count()
    }
}
