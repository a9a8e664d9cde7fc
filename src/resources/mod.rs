pub mod atlas;
pub mod geometry;
pub mod image;
pub mod material;
pub mod mesh;
pub mod primitives;
pub mod texture;

pub use atlas::{AtlasRegion, TextureAtlas};
pub use geometry::{Attribute, BoundingBox, BoundingSphere, Geometry};
pub use image::Image;
pub use material::{Material, MaterialFeatures};
pub use mesh::Mesh;
pub use texture::{Texture, TextureSampler};
