//! Instancing
//!
//! Collapses many drawables that share a geometry and a material into one
//! instanced draw call.
//!
//! # Automatic batching
//!
//! Every frame [`InstancingBatcher::maintain`] groups the visible, attached,
//! leaf mesh nodes that no LOD group manages by [`BatchKey`]. A group larger
//! than the threshold (and with no batch yet) is converted once:
//!
//! 1. a transform buffer sized to the group is filled with world matrices
//! 2. the original nodes are removed from the scene
//! 3. one [`InstancedMesh`] proxy is inserted at the root
//!
//! Conversion is one-way. Objects with the same key that appear later are
//! not merged into the existing batch, and batches are never split.
//!
//! Automatic batches are tracked by [`BatchKey`]. Their string id is the
//! key's display form, suffixed with `#n` when that id is already taken.

use std::fmt;
use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{GovernorError, Result};
use crate::lod::LodManager;
use crate::resources::geometry::BoundingSphere;
use crate::resources::{Geometry, Material, Mesh};
use crate::scene::{Node, NodeHandle, NodeKind, Scene};

/// Default group size that must be exceeded before batching.
pub const DEFAULT_INSTANCING_THRESHOLD: usize = 10;

// ============================================================================
// Batch key
// ============================================================================

/// Identifies drawables that can share one instanced draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub geometry_id: String,
    pub material_id: String,
}

impl BatchKey {
    #[must_use]
    pub fn new(geometry_id: impl Into<String>, material_id: impl Into<String>) -> Self {
        Self {
            geometry_id: geometry_id.into(),
            material_id: material_id.into(),
        }
    }

    #[must_use]
    pub fn of(mesh: &Mesh) -> Self {
        Self::new(mesh.geometry.id(), mesh.material.id())
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.geometry_id, self.material_id)
    }
}

// ============================================================================
// Instanced mesh
// ============================================================================

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    5 => Float32x4,
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4,
];

/// One mesh drawn at many transforms.
///
/// The transform buffer length is fixed at construction. Individual
/// transforms may be rewritten.
#[derive(Debug, Clone)]
pub struct InstancedMesh {
    mesh: Mesh,
    transforms: Vec<Mat4>,
    bounds: Option<BoundingSphere>,
}

impl InstancedMesh {
    pub fn new(mesh: Mesh, transforms: Vec<Mat4>) -> Result<Self> {
        if transforms.is_empty() {
            return Err(GovernorError::EmptyInstanceBatch);
        }
        let mut instanced = Self {
            mesh,
            transforms,
            bounds: None,
        };
        instanced.compute_bounds();
        Ok(instanced)
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.transforms.len()
    }

    #[must_use]
    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    /// Rewrites one instance transform. Returns `false` if out of range.
    pub fn set_transform(&mut self, index: usize, transform: Mat4) -> bool {
        let Some(slot) = self.transforms.get_mut(index) else {
            return false;
        };
        *slot = transform;
        self.compute_bounds();
        true
    }

    /// Sphere enclosing every instance, in the proxy node's local space.
    #[inline]
    #[must_use]
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounds
    }

    fn compute_bounds(&mut self) {
        let Some(local) = self.mesh.geometry.bounding_sphere() else {
            self.bounds = None;
            return;
        };
        self.bounds = self
            .transforms
            .iter()
            .map(|m| local.transform(&glam::Affine3A::from_mat4(*m)))
            .reduce(|a, b| a.merge(&b));
    }

    /// Column-major instance matrices, ready for a vertex buffer upload.
    #[must_use]
    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.transforms)
    }

    /// Per-instance layout: four `Float32x4` columns at locations 5..=8.
    #[must_use]
    pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Mat4>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        }
    }
}

// ============================================================================
// Batcher
// ============================================================================

/// Record of a converted or explicitly created batch.
#[derive(Debug, Clone)]
pub struct InstanceBatch {
    pub id: String,
    /// Source pair of an automatic batch; `None` for explicit ones.
    pub key: Option<BatchKey>,
    pub proxy: NodeHandle,
    pub count: usize,
}

#[derive(Debug)]
pub struct InstancingBatcher {
    threshold: usize,
    enabled: bool,
    batches: FxHashMap<String, InstanceBatch>,
    by_key: FxHashMap<BatchKey, String>,
}

impl InstancingBatcher {
    /// Creates a batcher. Without hardware instancing, automatic batching
    /// is disabled for the batcher's lifetime.
    #[must_use]
    pub fn new(threshold: usize, supports_instancing: bool) -> Self {
        if !supports_instancing {
            log::warn!("Hardware instancing unavailable: automatic batching disabled");
        }
        Self {
            threshold,
            enabled: supports_instancing,
            batches: FxHashMap::default(),
            by_key: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    #[must_use]
    pub fn batch(&self, id: &str) -> Option<&InstanceBatch> {
        self.batches.get(id)
    }

    /// Looks up the automatic batch built from `key`.
    #[must_use]
    pub fn batch_for_key(&self, key: &BatchKey) -> Option<&InstanceBatch> {
        self.by_key.get(key).and_then(|id| self.batches.get(id))
    }

    pub fn batches(&self) -> impl Iterator<Item = &InstanceBatch> {
        self.batches.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Runs the automatic batching pass. Returns the number of new batches.
    pub fn maintain(&mut self, scene: &mut Scene, lod: &LodManager) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut groups: FxHashMap<BatchKey, SmallVec<[NodeHandle; 16]>> = FxHashMap::default();
        scene.traverse(|handle, node| {
            if let NodeKind::Mesh(mesh) = &node.kind
                && node.visible
                && node.children().is_empty()
                && !lod.is_managed(handle)
            {
                groups.entry(BatchKey::of(mesh)).or_default().push(handle);
            }
        });

        let mut created = 0;
        for (key, members) in groups {
            if members.len() <= self.threshold {
                continue;
            }
            if self.by_key.contains_key(&key) {
                continue;
            }
            let id = self.unique_id(&key);
            match Self::convert(scene, &members) {
                Some(batch) => {
                    log::info!("Batched {} x {id} into one instanced draw", batch.count());
                    let proxy = scene.add_node(
                        Node::new(format!("instanced:{id}")).with_kind(NodeKind::Instanced(batch)),
                    );
                    self.register(id, Some(key), proxy, members.len());
                    created += 1;
                }
                None => log::warn!("Batch {id}: members vanished during conversion"),
            }
        }
        created
    }

    fn convert(scene: &mut Scene, members: &[NodeHandle]) -> Option<InstancedMesh> {
        let mut transforms = Vec::with_capacity(members.len());
        let mut mesh = None;
        for &handle in members {
            let node = scene.get_node(handle)?;
            transforms.push(node.transform.world_matrix_as_mat4());
            if mesh.is_none() {
                mesh = node.kind.as_mesh().cloned();
            }
        }
        let instanced = InstancedMesh::new(mesh?, transforms).ok()?;

        for &handle in members {
            scene.remove_node(handle);
        }
        Some(instanced)
    }

    fn unique_id(&self, key: &BatchKey) -> String {
        let base = key.to_string();
        if !self.batches.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}#{n}");
            if !self.batches.contains_key(&candidate) {
                log::warn!("Batch id {base} already taken; registering {key:?} as {candidate}");
                return candidate;
            }
            n += 1;
        }
    }

    fn register(&mut self, id: String, key: Option<BatchKey>, proxy: NodeHandle, count: usize) {
        if let Some(key) = &key {
            self.by_key.insert(key.clone(), id.clone());
        }
        self.batches.insert(
            id.clone(),
            InstanceBatch {
                id,
                key,
                proxy,
                count,
            },
        );
    }

    /// Creates an explicit instanced proxy of `count` identity transforms at
    /// the scene root, registered under `id`.
    pub fn create_instanced_mesh(
        &mut self,
        scene: &mut Scene,
        geometry: Arc<Geometry>,
        material: Arc<Material>,
        count: usize,
        id: &str,
    ) -> Result<NodeHandle> {
        if !self.enabled {
            return Err(GovernorError::InstancingUnsupported);
        }
        if self.batches.contains_key(id) {
            return Err(GovernorError::DuplicateBatch(id.to_owned()));
        }

        let instanced = InstancedMesh::new(Mesh::new(geometry, material), vec![Mat4::IDENTITY; count])?;
        let proxy = scene.add_node(Node::new(id.to_owned()).with_kind(NodeKind::Instanced(instanced)));
        self.register(id.to_owned(), None, proxy, count);
        Ok(proxy)
    }

    /// Forgets every batch record. Proxy nodes stay in the scene.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.by_key.clear();
    }
}
