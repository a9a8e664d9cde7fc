use std::borrow::Cow;

use glam::Affine3A;

use crate::instancing::InstancedMesh;
use crate::resources::geometry::BoundingSphere;
use crate::resources::mesh::Mesh;
use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

/// What a node carries besides its place in the hierarchy.
///
/// Traversal code matches on this instead of probing types at runtime:
/// only [`NodeKind::Mesh`] and [`NodeKind::Instanced`] are drawables.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    /// Pure transform node.
    #[default]
    Group,
    /// A single drawable: one geometry, one material.
    Mesh(Mesh),
    /// An instanced proxy drawing many copies in one call.
    Instanced(InstancedMesh),
    /// A light source. Never culled and never batched.
    Light,
}

impl NodeKind {
    /// Returns `true` for kinds that submit draw calls.
    #[inline]
    #[must_use]
    pub fn is_drawable(&self) -> bool {
        matches!(self, Self::Mesh(_) | Self::Instanced(_))
    }

    #[inline]
    #[must_use]
    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_instanced(&self) -> Option<&InstancedMesh> {
        match self {
            Self::Instanced(instanced) => Some(instanced),
            _ => None,
        }
    }

    #[inline]
    pub fn as_instanced_mut(&mut self) -> Option<&mut InstancedMesh> {
        match self {
            Self::Instanced(instanced) => Some(instanced),
            _ => None,
        }
    }

    /// World-space bounding sphere, if this kind has one.
    ///
    /// Meshes transform their geometry's local sphere; instanced proxies
    /// transform the sphere enclosing all of their instances.
    #[must_use]
    pub fn world_bounding_sphere(&self, world: &Affine3A) -> Option<BoundingSphere> {
        match self {
            Self::Mesh(mesh) => mesh
                .geometry
                .bounding_sphere()
                .map(|sphere| sphere.transform(world)),
            Self::Instanced(instanced) => instanced
                .bounding_sphere()
                .map(|sphere| sphere.transform(world)),
            Self::Group | Self::Light => None,
        }
    }
}

/// A scene node: hierarchy links, transform, visibility and a [`NodeKind`].
///
/// # Hierarchy
///
/// Nodes form a tree through parent-child relationships:
/// - `parent`: Optional handle to parent node (None for root nodes)
/// - `children`: List of child node handles
///
/// A node stored in the [`Scene`](crate::scene::Scene) but linked to neither a
/// parent nor the root list is *detached*: it stays alive but is never
/// traversed. The LOD manager parks inactive detail levels this way.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: Cow<'static, str>,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,

    /// Visibility flag written by the frustum culler.
    pub visible: bool,

    pub kind: NodeKind,
}

impl Node {
    /// Creates a group node with default transform and visibility.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visible: true,
            kind: NodeKind::Group,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Creates a mesh node.
    #[must_use]
    pub fn from_mesh(name: impl Into<Cow<'static, str>>, mesh: Mesh) -> Self {
        Self::new(name).with_kind(NodeKind::Mesh(mesh))
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Returns a reference to the world transformation matrix.
    ///
    /// Refreshed by [`Scene::update_matrix_world`](crate::scene::Scene::update_matrix_world).
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        self.transform.world_matrix()
    }

    /// World-space bounding sphere of this node's drawable, if any.
    #[inline]
    #[must_use]
    pub fn world_bounding_sphere(&self) -> Option<BoundingSphere> {
        self.kind.world_bounding_sphere(self.transform.world_matrix())
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new("Node")
    }
}
