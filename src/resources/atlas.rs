//! Texture Atlas
//!
//! Packs many small images into one page so meshes that only differ by
//! texture can share a material (and therefore an instance batch).
//!
//! Packing uses shelves: images are placed left to right on the current
//! row, and a new row opens below when the current one is full. Images are
//! placed in insertion order; callers that want tighter pages should insert
//! tallest first.

use std::borrow::Cow;

use glam::Vec2;
use image::RgbaImage;
use image::imageops;

use crate::errors::{GovernorError, Result};
use crate::resources::image::Image;
use crate::resources::texture::Texture;

/// Where an image landed, in pixels and in normalised UVs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl AtlasRegion {
    /// Maps a UV in the source image's `[0, 1]` space into the atlas.
    #[must_use]
    pub fn remap_uv(&self, uv: Vec2) -> Vec2 {
        self.uv_min + (self.uv_max - self.uv_min) * uv
    }
}

#[derive(Debug, Clone, Copy)]
struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

#[derive(Debug)]
pub struct TextureAtlas {
    label: Cow<'static, str>,
    width: u32,
    height: u32,
    padding: u32,

    shelves: Vec<Shelf>,
    entries: Vec<(Image, AtlasRegion)>,
}

impl TextureAtlas {
    /// Creates an empty page. Sizes are rounded up to a power of two.
    #[must_use]
    pub fn new(label: impl Into<Cow<'static, str>>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width: width.max(1).next_power_of_two(),
            height: height.max(1).next_power_of_two(),
            padding: 1,
            shelves: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Pixels left empty around each image to avoid filtering bleed.
    #[must_use]
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn regions(&self) -> impl Iterator<Item = &AtlasRegion> {
        self.entries.iter().map(|(_, region)| region)
    }

    /// Reserves space for `image` and returns its region.
    ///
    /// Fails with [`GovernorError::AtlasFull`] if no shelf can hold it; the
    /// atlas is left unchanged in that case.
    pub fn insert(&mut self, image: &Image) -> Result<AtlasRegion> {
        let w = image.width() + self.padding * 2;
        let h = image.height() + self.padding * 2;
        let full = GovernorError::AtlasFull {
            width: image.width(),
            height: image.height(),
        };
        if w > self.width || h > self.height {
            return Err(full);
        }

        let existing = self
            .shelves
            .iter_mut()
            .find(|shelf| shelf.height >= h && self.width - shelf.cursor_x >= w);

        let (x, y) = if let Some(shelf) = existing {
            let pos = (shelf.cursor_x, shelf.y);
            shelf.cursor_x += w;
            pos
        } else {
            let next_y = self.shelves.last().map_or(0, |s| s.y + s.height);
            if self.height - next_y < h {
                return Err(full);
            }
            self.shelves.push(Shelf {
                y: next_y,
                height: h,
                cursor_x: w,
            });
            (0, next_y)
        };

        let region = self.region_at(x + self.padding, y + self.padding, image);
        self.entries.push((image.clone(), region));
        Ok(region)
    }

    fn region_at(&self, x: u32, y: u32, image: &Image) -> AtlasRegion {
        let size = Vec2::new(self.width as f32, self.height as f32);
        AtlasRegion {
            x,
            y,
            width: image.width(),
            height: image.height(),
            uv_min: Vec2::new(x as f32, y as f32) / size,
            uv_max: Vec2::new((x + image.width()) as f32, (y + image.height()) as f32) / size,
        }
    }

    /// Blits every inserted image into one RGBA8 page.
    #[must_use]
    pub fn build_image(&self) -> Image {
        let mut page = RgbaImage::new(self.width, self.height);
        for (image, region) in &self.entries {
            imageops::replace(
                &mut page,
                &image.to_rgba(),
                i64::from(region.x),
                i64::from(region.y),
            );
        }
        Image::from_rgba(self.label.clone(), page)
    }

    #[must_use]
    pub fn build_texture(&self) -> Texture {
        let mut texture = Texture::new(self.label.clone(), self.build_image());
        texture.sampler.address_mode_u = wgpu::AddressMode::ClampToEdge;
        texture.sampler.address_mode_v = wgpu::AddressMode::ClampToEdge;
        texture
    }
}
