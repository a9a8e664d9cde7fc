use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::errors::{GovernorError, Result};

// Global Image ID generator
static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct ImageInner {
    pub id: u64,
    label: Cow<'static, str>,

    pub width: u32,
    pub height: u32,

    /// Tightly packed RGBA8 pixels, row-major.
    data: Vec<u8>,
}

/// Immutable RGBA8 pixel data, shared by reference count.
///
/// Cloning an `Image` never copies pixels; resampling produces a new image
/// with a new id.
#[derive(Debug, Clone)]
pub struct Image(Arc<ImageInner>);

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for Image {}
impl std::hash::Hash for Image {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Image {
    /// Wraps raw RGBA8 pixels. The byte length must be `width × height × 4`.
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(GovernorError::ImageSizeMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self::from_parts(label.into(), width, height, data))
    }

    fn from_parts(label: Cow<'static, str>, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self(Arc::new(ImageInner {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            label,
            width,
            height,
            data,
        }))
    }

    /// Converts an `image` crate buffer without copying.
    #[must_use]
    pub fn from_rgba(label: impl Into<Cow<'static, str>>, buffer: RgbaImage) -> Self {
        let (width, height) = buffer.dimensions();
        Self::from_parts(label.into(), width, height, buffer.into_raw())
    }

    /// Single-colour image.
    #[must_use]
    pub fn solid(label: impl Into<Cow<'static, str>>, width: u32, height: u32, color: [u8; 4]) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let data = color.repeat(width as usize * height as usize);
        Self::from_parts(label.into(), width, height, data)
    }

    /// Black and white checkerboard test pattern.
    #[must_use]
    pub fn checkerboard(
        label: impl Into<Cow<'static, str>>,
        width: u32,
        height: u32,
        check_size: u32,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let check_size = check_size.max(1);
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);

        for y in 0..height {
            for x in 0..width {
                let is_a = ((x / check_size) + (y / check_size)) % 2 == 0;
                if is_a {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    data.extend_from_slice(&[0, 0, 0, 255]);
                }
            }
        }

        Self::from_parts(label.into(), width, height, data)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.0.data.len()
    }

    /// Copies the pixels into an `image` crate buffer.
    #[must_use]
    pub fn to_rgba(&self) -> RgbaImage {
        // Length is validated at construction, so `from_raw` cannot fail;
        // fall back to an empty-sized buffer rather than panic.
        RgbaImage::from_raw(self.width(), self.height(), self.0.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width(), self.height()))
    }

    /// Resamples to `width × height` with a triangle (bilinear) filter.
    ///
    /// Dimensions are clamped to at least 1×1. Same-size requests return a
    /// cheap clone.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Image {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        let resized = imageops::resize(&self.to_rgba(), width, height, FilterType::Triangle);
        Self::from_rgba(format!("{}@{width}x{height}", self.label()), resized)
    }
}

impl std::ops::Deref for Image {
    type Target = ImageInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_data() {
        let err = Image::new("bad", 2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, GovernorError::ImageSizeMismatch { actual: 15, .. }));
    }

    #[test]
    fn resize_keeps_solid_colour() {
        let img = Image::solid("red", 8, 8, [255, 0, 0, 255]);
        let half = img.resized(4, 4);
        assert_eq!(half.width(), 4);
        assert_eq!(half.byte_len(), 4 * 4 * 4);
        assert_eq!(&half.data()[0..4], &[255, 0, 0, 255]);
        assert_ne!(half.id(), img.id());
    }
}
