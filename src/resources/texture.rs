use std::borrow::Cow;

use crate::resources::image::Image;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSampler {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    /// Anisotropic filtering level (1 = off).
    pub anisotropy_clamp: u16,
}

impl Default for TextureSampler {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            anisotropy_clamp: 1,
        }
    }
}

/// A 2D texture: shared pixel data plus how it is sampled.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: Cow<'static, str>,
    pub image: Image,
    pub sampler: TextureSampler,
}

impl Texture {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, image: Image) -> Self {
        Self {
            name: name.into(),
            image,
            sampler: TextureSampler::default(),
        }
    }

    /// 1×1 texture of a single colour.
    #[must_use]
    pub fn create_solid_color(name: &'static str, color: [u8; 4]) -> Self {
        Self::new(name, Image::solid(name, 1, 1, color))
    }

    #[must_use]
    pub fn create_checkerboard(name: &'static str, width: u32, height: u32, check_size: u32) -> Self {
        Self::new(name, Image::checkerboard(name, width, height, check_size))
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.image.byte_len()
    }

    /// Returns a copy scaled by `factor` on both axes, never below 1×1.
    ///
    /// Factors at or above 1.0 share the original image.
    #[must_use]
    pub fn downsampled(&self, factor: f32) -> Texture {
        if factor.is_nan() || factor >= 1.0 {
            return self.clone();
        }
        let factor = factor.max(0.0);
        let width = ((self.width() as f32 * factor).round() as u32).max(1);
        let height = ((self.height() as f32 * factor).round() as u32).max(1);

        Texture {
            name: self.name.clone(),
            image: self.image.resized(width, height),
            sampler: self.sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_scales_and_clamps() {
        let tex = Texture::create_checkerboard("checker", 64, 32, 8);

        let quarter = tex.downsampled(0.25);
        assert_eq!((quarter.width(), quarter.height()), (16, 8));

        let tiny = tex.downsampled(0.001);
        assert_eq!((tiny.width(), tiny.height()), (1, 1));

        let same = tex.downsampled(1.0);
        assert_eq!(same.image, tex.image);
    }
}
