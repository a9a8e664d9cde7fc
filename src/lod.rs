//! Level of Detail
//!
//! An LOD group is an ordered list of `(switch distance, node)` pairs for a
//! single object. Level 0 is the original scene node; deeper levels are
//! cheaper copies generated once at creation and parked detached from the
//! hierarchy until selected.
//!
//! # Selection
//!
//! The active level is the last one whose `distance × multiplier` does not
//! exceed the camera distance. Selection is a pure function of distance with
//! no hysteresis, so an object sitting exactly on a boundary can switch on
//! every frame.
//!
//! # Generated levels
//!
//! For `n` distances, level `i` has `quality = 1 - i / n`. Geometry keeps
//! `floor(quality × triangles)` evenly spaced triangles and materials are
//! degraded per
//! [`Material::degraded`](crate::resources::Material::degraded). Derived
//! geometry and materials are cached by source id, so many objects sharing
//! a mesh also share its detail levels.

use std::sync::Arc;

use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{SlotMap, new_key_type};

use crate::errors::{GovernorError, Result};
use crate::resources::{Geometry, Material};
use crate::scene::{Node, NodeHandle, NodeKind, Scene};

new_key_type! {
    pub struct LodGroupHandle;
}

/// Returns the level index for `distance`.
///
/// `distances` must be strictly increasing. Level 0 is returned when no
/// switch distance has been reached.
#[must_use]
pub fn select_level(distances: &[f32], multiplier: f32, distance: f32) -> usize {
    distances
        .iter()
        .rposition(|&d| d * multiplier <= distance)
        .unwrap_or(0)
}

/// Checks that switch distances are usable for an LOD group.
pub fn validate_distances(distances: &[f32]) -> Result<()> {
    let fail = |reason| {
        Err(GovernorError::InvalidLodDistances {
            distances: distances.to_vec(),
            reason,
        })
    };

    if distances.is_empty() {
        return fail("at least one distance is required");
    }
    if distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
        return fail("distances must be finite and non-negative");
    }
    if distances.windows(2).any(|w| w[1] <= w[0]) {
        return fail("distances must be strictly increasing");
    }
    Ok(())
}

/// Quality of level `index` out of `count`.
#[inline]
#[must_use]
pub fn level_quality(index: usize, count: usize) -> f32 {
    1.0 - index as f32 / count.max(1) as f32
}

#[derive(Debug, Clone, Copy)]
pub struct LodLevel {
    pub distance: f32,
    pub node: NodeHandle,
    pub quality: f32,
}

#[derive(Debug, Clone)]
pub struct LodGroup {
    levels: Vec<LodLevel>,
    distances: Vec<f32>,
    active: usize,
}

impl LodGroup {
    #[must_use]
    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    #[must_use]
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    #[inline]
    #[must_use]
    pub fn active_level(&self) -> usize {
        self.active
    }

    #[inline]
    #[must_use]
    pub fn active_node(&self) -> NodeHandle {
        self.levels[self.active].node
    }

    /// The node the group was created from.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> NodeHandle {
        self.levels[0].node
    }
}

type DetailKey = (String, u32);

#[derive(Debug, Default)]
pub struct LodManager {
    groups: SlotMap<LodGroupHandle, LodGroup>,
    /// Every level node, original included, maps back to its group.
    by_node: FxHashMap<NodeHandle, LodGroupHandle>,

    geometry_cache: FxHashMap<DetailKey, Arc<Geometry>>,
    material_cache: FxHashMap<DetailKey, Arc<Material>>,

    warned_missing: FxHashSet<LodGroupHandle>,
}

impl LodManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn group(&self, handle: LodGroupHandle) -> Option<&LodGroup> {
        self.groups.get(handle)
    }

    #[must_use]
    pub fn group_for_node(&self, node: NodeHandle) -> Option<LodGroupHandle> {
        self.by_node.get(&node).copied()
    }

    #[must_use]
    pub fn is_managed(&self, node: NodeHandle) -> bool {
        self.by_node.contains_key(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LodGroupHandle, &LodGroup)> {
        self.groups.iter()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Builds an LOD group for a mesh node.
    ///
    /// Fails without touching the scene if the distances are invalid, the
    /// node is missing or not a mesh, or it already belongs to a group.
    pub fn create_lod(
        &mut self,
        scene: &mut Scene,
        node: NodeHandle,
        distances: &[f32],
    ) -> Result<LodGroupHandle> {
        validate_distances(distances)?;

        let source = scene.get_node(node).ok_or(GovernorError::NodeNotFound(node))?;
        let NodeKind::Mesh(mesh) = &source.kind else {
            return Err(GovernorError::NotDrawable(node));
        };
        if self.is_managed(node) {
            return Err(GovernorError::AlreadyManaged(node));
        }

        let mesh = mesh.clone();
        let name = source.name.clone();
        let transform = source.transform.clone();
        let count = distances.len();

        let mut levels = Vec::with_capacity(count);
        levels.push(LodLevel {
            distance: distances[0],
            node,
            quality: 1.0,
        });

        for (i, &distance) in distances.iter().enumerate().skip(1) {
            let quality = level_quality(i, count);
            let geometry = self.detail_geometry(&mesh.geometry, quality, i);
            let material = self.detail_material(&mesh.material, quality, i);

            let mut detail = Node::from_mesh(format!("{name}-lod{i}"), mesh.with_resources(geometry, material));
            detail.transform.copy_from(&transform);

            levels.push(LodLevel {
                distance,
                node: scene.insert_detached(detail),
                quality,
            });
        }

        let handle = self.groups.insert(LodGroup {
            levels,
            distances: distances.to_vec(),
            active: 0,
        });
        if let Some(group) = self.groups.get(handle) {
            for level in &group.levels {
                self.by_node.insert(level.node, handle);
            }
        }

        log::debug!("Created LOD group {handle:?} for {name} with {count} level(s)");
        Ok(handle)
    }

    fn detail_geometry(&mut self, source: &Arc<Geometry>, quality: f32, level: usize) -> Arc<Geometry> {
        let key = (source.id().to_owned(), quality.to_bits());
        self.geometry_cache
            .entry(key)
            .or_insert_with(|| {
                let id = format!("{}-lod{level}", source.id());
                Arc::new(source.decimated(quality, id))
            })
            .clone()
    }

    fn detail_material(&mut self, source: &Arc<Material>, quality: f32, level: usize) -> Arc<Material> {
        let key = (source.id().to_owned(), quality.to_bits());
        self.material_cache
            .entry(key)
            .or_insert_with(|| {
                let id = format!("{}-lod{level}", source.id());
                Arc::new(source.degraded(quality, id))
            })
            .clone()
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Selects and swaps in the active level of every group.
    ///
    /// Returns how many groups switched level this call.
    pub fn update(&mut self, scene: &mut Scene, camera_position: Vec3, multiplier: f32) -> usize {
        let mut switched = 0;

        for (handle, group) in &mut self.groups {
            let current = group.active_node();
            let Some(active) = scene.get_node(current) else {
                if self.warned_missing.insert(handle) {
                    log::warn!("LOD group {handle:?}: active node {current:?} no longer exists");
                }
                continue;
            };

            let distance = camera_position.distance(active.transform.world_position());
            let level = select_level(&group.distances, multiplier, distance);
            if level == group.active {
                continue;
            }

            let visible = active.visible;
            let incoming = group.levels[level].node;
            if !scene.contains(incoming) {
                if self.warned_missing.insert(handle) {
                    log::warn!("LOD group {handle:?}: level {level} node {incoming:?} no longer exists");
                }
                continue;
            }

            scene.swap_in_place(current, incoming);
            if let Some(node) = scene.get_node_mut(incoming) {
                node.visible = visible;
            }
            group.active = level;
            switched += 1;
            log::trace!("LOD group {handle:?} -> level {level} at distance {distance:.1}");
        }

        switched
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Restores the original node in place and removes the generated levels.
    ///
    /// Returns `false` for unknown handles.
    pub fn release(&mut self, scene: &mut Scene, handle: LodGroupHandle) -> bool {
        let Some(group) = self.groups.remove(handle) else {
            return false;
        };

        let origin = group.origin();
        if group.active != 0 {
            scene.swap_in_place(group.active_node(), origin);
        }
        for level in &group.levels {
            self.by_node.remove(&level.node);
            if level.node != origin {
                scene.remove_node(level.node);
            }
        }
        self.warned_missing.remove(&handle);
        true
    }

    /// Releases every group and drops cached detail resources.
    pub fn release_all(&mut self, scene: &mut Scene) {
        let handles: Vec<LodGroupHandle> = self.groups.keys().collect();
        for handle in handles {
            self.release(scene, handle);
        }
        self.clear();
    }

    /// Forgets all groups without touching the scene.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.by_node.clear();
        self.geometry_cache.clear();
        self.material_cache.clear();
        self.warned_missing.clear();
    }
}
