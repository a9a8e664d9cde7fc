use std::borrow::Cow;
use std::sync::Arc;

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;
use wgpu::{VertexFormat, VertexStepMode};

use crate::resources::primitives;

/// Attribute holds CPU-side vertex data (shared via `Arc`) and metadata.
///
/// Decimated copies of a geometry share attribute data with the original;
/// only the index list differs.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub data: Arc<Vec<u8>>,
    pub format: VertexFormat,
    pub offset: u64,
    pub count: u32,
    pub stride: u64,
    pub step_mode: VertexStepMode,
}

impl Attribute {
    /// Creates a planar (non-interleaved) per-vertex attribute.
    pub fn new_planar<T: bytemuck::Pod>(data: &[T], format: VertexFormat) -> Self {
        Self {
            data: Arc::new(bytemuck::cast_slice(data).to_vec()),
            format,
            offset: 0,
            count: data.len() as u32,
            stride: std::mem::size_of::<T>() as u64,
            step_mode: VertexStepMode::Vertex,
        }
    }

    /// Byte length of the CPU copy.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn read_vec3(&self, i: u32) -> Option<Vec3> {
        if self.format != VertexFormat::Float32x3 {
            return None;
        }
        let start = self.offset as usize + (i as usize) * self.stride as usize;
        let bytes: &[u8; 12] = self.data.get(start..start + 12)?.try_into().ok()?;
        let vals: [f32; 3] = bytemuck::cast(*bytes);
        Some(Vec3::from_array(vals))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut new_min = Vec3::splat(f32::INFINITY);
        let mut new_max = Vec3::splat(f32::NEG_INFINITY);
        for point in corners {
            let transformed = matrix.transform_point3(point);
            new_min = new_min.min(transformed);
            new_max = new_max.max(transformed);
        }

        Self {
            min: new_min,
            max: new_max,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Transforms the sphere, scaling the radius by the largest axis scale.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let max_scale = matrix
            .matrix3
            .x_axis
            .length()
            .max(matrix.matrix3.y_axis.length())
            .max(matrix.matrix3.z_axis.length());
        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius * max_scale,
        }
    }

    /// Smallest sphere (centred on the combined box) enclosing both.
    #[must_use]
    pub fn merge(&self, other: &BoundingSphere) -> Self {
        let to_other = other.center - self.center;
        let distance = to_other.length();
        if distance + other.radius <= self.radius {
            return *self;
        }
        if distance + self.radius <= other.radius {
            return *other;
        }
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + to_other.normalize_or_zero() * (radius - self.radius);
        Self { center, radius }
    }
}

/// Vertex attributes, an optional index list and cached bounding volumes.
///
/// Geometry is built mutably, then shared immutably behind an `Arc` by every
/// mesh that draws it. Its `id` is the identity the instancing batcher and
/// the LOD detail cache key on; two geometries with the same id are assumed
/// interchangeable.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: Cow<'static, str>,

    attributes: FxHashMap<String, Attribute>,
    indices: Option<Vec<u32>>,

    bounding_box: Option<BoundingBox>,
    bounding_sphere: Option<BoundingSphere>,
}

impl Geometry {
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            attributes: FxHashMap::default(),
            indices: None,
            bounding_box: None,
            bounding_sphere: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn attributes(&self) -> &FxHashMap<String, Attribute> {
        &self.attributes
    }

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Sets an attribute. Setting `"position"` refreshes the bounding volumes.
    pub fn set_attribute(&mut self, name: &str, attr: Attribute) {
        let is_position = name == "position";
        self.attributes.insert(name.to_string(), attr);
        if is_position {
            self.compute_bounding_volume();
        }
    }

    pub fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = Some(indices);
    }

    #[must_use]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.attributes.get("position").map_or(0, |a| a.count)
    }

    /// Number of indices drawn: the index list length, or the vertex count
    /// for non-indexed geometry.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.vertex_count() as usize, Vec::len)
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.index_count() / 3
    }

    /// Approximate CPU/GPU footprint in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        let attrs: usize = self.attributes.values().map(Attribute::byte_len).sum();
        attrs + self.indices.as_ref().map_or(0, |i| i.len() * 4)
    }

    #[inline]
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    #[inline]
    #[must_use]
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounding_sphere
    }

    /// Recomputes the AABB and a sphere centred on it from `"position"`.
    ///
    /// Geometry without readable positions keeps no bounding volume.
    pub fn compute_bounding_volume(&mut self) {
        self.bounding_box = None;
        self.bounding_sphere = None;

        let Some(pos_attr) = self.attributes.get("position") else {
            return;
        };
        if pos_attr.format != VertexFormat::Float32x3 {
            return;
        }

        let points: Vec<Vec3> = (0..pos_attr.count)
            .map_while(|i| pos_attr.read_vec3(i))
            .collect();
        if points.is_empty() {
            return;
        }

        let (min, max) = points.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max)
            .sqrt();

        self.bounding_box = Some(BoundingBox { min, max });
        self.bounding_sphere = Some(BoundingSphere { center, radius });
    }

    /// Coarse simplification: keeps `floor(triangles × quality)` triangles,
    /// spread evenly over the index list with a fractional stride. Triangle
    /// `t` survives when `floor((t + 1) × quality) > floor(t × quality)`.
    ///
    /// Vertex data is shared with `self`. This is not an error-metric
    /// simplifier; silhouettes degrade quickly below `quality = 0.5`.
    /// At least one triangle is always kept.
    #[must_use]
    pub fn decimated(&self, quality: f32, id: impl Into<Cow<'static, str>>) -> Geometry {
        let quality = f64::from(quality.clamp(f32::EPSILON, 1.0));

        let source: Vec<u32> = match &self.indices {
            Some(indices) => indices.clone(),
            None => (0..self.vertex_count()).collect(),
        };

        let mut kept: Vec<u32> = source
            .chunks_exact(3)
            .enumerate()
            .filter(|(t, _)| {
                let t = *t as f64;
                ((t + 1.0) * quality).floor() > (t * quality).floor()
            })
            .flat_map(|(_, triangle)| triangle.iter().copied())
            .collect();
        if kept.is_empty() {
            kept = source.iter().take(3).copied().collect();
        }

        Geometry {
            id: id.into(),
            attributes: self.attributes.clone(),
            indices: Some(kept),
            bounding_box: self.bounding_box,
            bounding_sphere: self.bounding_sphere,
        }
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub fn new_box(id: impl Into<Cow<'static, str>>, width: f32, height: f32, depth: f32) -> Self {
        primitives::create_box(id, width, height, depth)
    }

    pub fn new_sphere(id: impl Into<Cow<'static, str>>, radius: f32) -> Self {
        primitives::create_sphere(
            id,
            primitives::SphereOptions {
                radius,
                ..Default::default()
            },
        )
    }
}
