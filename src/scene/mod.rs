//! Scene Graph Module
//!
//! A minimal hierarchical scene graph standing in for the host's graph.
//! The governor only reads and tags it, apart from the structural edits made
//! by the LOD manager and the instancing batcher.
//!
//! - [`Node`]: hierarchy, transform, visibility and a drawable kind
//! - [`Transform`]: position / rotation / scale with cached matrices
//! - [`Scene`]: slotmap-backed node container
//! - [`Camera`] / [`Frustum`]: projection and view-volume planes

pub mod camera;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;

pub use camera::{Camera, Frustum, ProjectionType};
pub use node::{Node, NodeKind};
pub use scene::Scene;
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to a node stored in a [`Scene`].
    pub struct NodeHandle;
}
