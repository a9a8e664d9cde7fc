//! Frustum Culling
//!
//! Each frame the culler rebuilds the six frustum planes from the camera and
//! writes `visible` on every attached node.
//!
//! Nodes with a bounding volume are tested as world-space spheres. Nodes
//! without one (groups, lights, meshes with no positions) stay visible.

use crate::scene::{Camera, Frustum, Scene};

/// Per-call counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    /// Nodes tested against the frustum.
    pub tested: usize,
    /// Tested nodes found outside and hidden.
    pub culled: usize,
    /// Drawables with no bounding volume, left visible.
    pub unbounded: usize,
}

#[derive(Debug, Default)]
pub struct FrustumCuller {
    frustum: Frustum,
    warned_unbounded: bool,
}

impl FrustumCuller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Planes used by the most recent [`cull`](Self::cull).
    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Marks every attached node visible or invisible.
    ///
    /// World matrices must be current; see
    /// [`Scene::update_matrix_world`](crate::scene::Scene::update_matrix_world).
    pub fn cull(&mut self, scene: &mut Scene, camera: &Camera) -> CullStats {
        self.frustum = camera.frustum();
        let mut stats = CullStats::default();

        for handle in scene.attached_nodes() {
            let Some(node) = scene.get_node_mut(handle) else {
                continue;
            };

            match node.world_bounding_sphere() {
                Some(sphere) => {
                    stats.tested += 1;
                    node.visible = self.frustum.intersects_bounding_sphere(&sphere);
                    if !node.visible {
                        stats.culled += 1;
                    }
                }
                None => {
                    node.visible = true;
                    if node.kind.is_drawable() {
                        stats.unbounded += 1;
                    }
                }
            }
        }

        if stats.unbounded > 0 && !self.warned_unbounded {
            self.warned_unbounded = true;
            log::warn!(
                "{} drawable(s) have no bounding volume; they are never culled",
                stats.unbounded
            );
        }

        stats
    }
}
