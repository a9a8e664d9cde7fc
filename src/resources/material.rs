use std::borrow::Cow;

use bitflags::bitflags;
use glam::Vec4;

use crate::resources::texture::Texture;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFeatures: u32 {
        const USE_MAP           = 1 << 0;
        const USE_NORMAL_MAP    = 1 << 1;
        const USE_ROUGHNESS_MAP = 1 << 2;
        const USE_METALNESS_MAP = 1 << 3;
        const USE_EMISSIVE_MAP  = 1 << 4;
    }
}

/// Below this quality, textures are downsampled.
pub const DOWNSAMPLE_QUALITY: f32 = 0.5;
/// Below this quality, detail maps are dropped.
pub const DROP_DETAIL_MAPS_QUALITY: f32 = 0.3;
/// Smallest texture scale applied by [`Material::degraded`].
pub const MIN_TEXTURE_SCALE: f32 = 0.25;

/// Physically based surface description.
///
/// The `id` is the identity the instancing batcher and the LOD detail cache
/// key on; two materials with the same id are assumed interchangeable.
#[derive(Debug, Clone)]
pub struct Material {
    id: Cow<'static, str>,

    pub color: Vec4,
    pub roughness: f32,
    pub metalness: f32,
    pub transparent: bool,

    pub map: Option<Texture>,
    pub normal_map: Option<Texture>,
    pub roughness_map: Option<Texture>,
    pub metalness_map: Option<Texture>,
    pub emissive_map: Option<Texture>,
}

impl Material {
    #[must_use]
    pub fn new(id: impl Into<Cow<'static, str>>, color: Vec4) -> Self {
        Self {
            id: id.into(),
            color,
            roughness: 1.0,
            metalness: 0.0,
            transparent: false,
            map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
            emissive_map: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn with_map(mut self, texture: Texture) -> Self {
        self.map = Some(texture);
        self
    }

    #[must_use]
    pub fn with_normal_map(mut self, texture: Texture) -> Self {
        self.normal_map = Some(texture);
        self
    }

    #[must_use]
    pub fn with_roughness_map(mut self, texture: Texture) -> Self {
        self.roughness_map = Some(texture);
        self
    }

    #[must_use]
    pub fn with_metalness_map(mut self, texture: Texture) -> Self {
        self.metalness_map = Some(texture);
        self
    }

    #[must_use]
    pub fn features(&self) -> MaterialFeatures {
        let mut features = MaterialFeatures::empty();
        features.set(MaterialFeatures::USE_MAP, self.map.is_some());
        features.set(MaterialFeatures::USE_NORMAL_MAP, self.normal_map.is_some());
        features.set(MaterialFeatures::USE_ROUGHNESS_MAP, self.roughness_map.is_some());
        features.set(MaterialFeatures::USE_METALNESS_MAP, self.metalness_map.is_some());
        features.set(MaterialFeatures::USE_EMISSIVE_MAP, self.emissive_map.is_some());
        features
    }

    /// Every texture this material references.
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        [
            &self.map,
            &self.normal_map,
            &self.roughness_map,
            &self.metalness_map,
            &self.emissive_map,
        ]
        .into_iter()
        .flatten()
    }

    fn textures_mut(&mut self) -> impl Iterator<Item = &mut Texture> {
        [
            &mut self.map,
            &mut self.normal_map,
            &mut self.roughness_map,
            &mut self.metalness_map,
            &mut self.emissive_map,
        ]
        .into_iter()
        .flatten()
    }

    /// Sum of the pixel data referenced by this material.
    #[must_use]
    pub fn texture_memory_bytes(&self) -> usize {
        self.textures().map(Texture::memory_bytes).sum()
    }

    /// Cheaper variant of this material for a detail level of `quality`.
    ///
    /// - `quality >= 0.5`: unchanged apart from the id.
    /// - `quality < 0.5`: every texture downsampled by `max(0.25, quality)`.
    /// - `quality < 0.3`: normal, roughness and metalness maps dropped.
    #[must_use]
    pub fn degraded(&self, quality: f32, id: impl Into<Cow<'static, str>>) -> Material {
        let mut out = self.clone();
        out.id = id.into();

        if quality < DROP_DETAIL_MAPS_QUALITY {
            out.normal_map = None;
            out.roughness_map = None;
            out.metalness_map = None;
        }

        if quality < DOWNSAMPLE_QUALITY {
            let scale = quality.max(MIN_TEXTURE_SCALE);
            for texture in out.textures_mut() {
                *texture = texture.downsampled(scale);
            }
        }

        out
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", Vec4::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured() -> Material {
        Material::new("mat", Vec4::ONE)
            .with_map(Texture::create_checkerboard("albedo", 64, 64, 8))
            .with_normal_map(Texture::create_solid_color("normal", [128, 128, 255, 255]))
            .with_roughness_map(Texture::create_checkerboard("rough", 32, 32, 4))
            .with_metalness_map(Texture::create_checkerboard("metal", 32, 32, 4))
    }

    #[test]
    fn high_quality_keeps_everything() {
        let mat = textured();
        let lod = mat.degraded(0.75, "mat-lod1");
        assert_eq!(lod.id(), "mat-lod1");
        assert_eq!(lod.features(), mat.features());
        assert_eq!(lod.map.as_ref().map(Texture::width), Some(64));
    }

    #[test]
    fn low_quality_downsamples() {
        let lod = textured().degraded(0.4, "mat-lod");
        assert_eq!(lod.map.as_ref().map(Texture::width), Some(26));
        assert!(lod.normal_map.is_some());
    }

    #[test]
    fn very_low_quality_drops_detail_maps() {
        let lod = textured().degraded(0.1, "mat-lod");
        assert_eq!(lod.features(), MaterialFeatures::USE_MAP);
        // Scale is floored at 0.25.
        assert_eq!(lod.map.as_ref().map(Texture::width), Some(16));
    }
}
