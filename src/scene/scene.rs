use glam::Affine3A;
use slotmap::SlotMap;

use crate::resources::mesh::Mesh;
use crate::scene::NodeHandle;
use crate::scene::node::{Node, NodeKind};

/// Scene graph container.
///
/// Nodes live in a [`SlotMap`]; handles stay valid until the node is removed.
/// Only nodes reachable from `root_nodes` are traversed.
#[derive(Debug, Default)]
pub struct Scene {
    pub nodes: SlotMap<NodeHandle, Node>,
    pub root_nodes: Vec<NodeHandle>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Adds a node at the root level.
    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        handle
    }

    /// Adds a mesh node at the root level.
    pub fn add_mesh(&mut self, name: &str, mesh: Mesh) -> NodeHandle {
        self.add_node(Node::from_mesh(name.to_owned(), mesh))
    }

    pub fn add_to_parent(&mut self, mut child: Node, parent: NodeHandle) -> NodeHandle {
        if !self.nodes.contains_key(parent) {
            log::warn!("Parent {parent:?} not found, adding node at root level");
            return self.add_node(child);
        }
        child.parent = Some(parent);
        let handle = self.nodes.insert(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(handle);
        }
        handle
    }

    /// Stores a node without linking it into the hierarchy.
    pub fn insert_detached(&mut self, node: Node) -> NodeHandle {
        self.nodes.insert(node)
    }

    /// Removes a node and its whole subtree.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        if !self.nodes.contains_key(handle) {
            return;
        }
        self.unlink(handle);

        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
    }

    // ========================================================================
    // Hierarchy edits
    // ========================================================================

    /// Makes `child` a child of `parent`, detaching it from its old slot.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) {
        if child == parent {
            log::warn!("Cannot attach node to itself!");
            return;
        }
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            log::error!("Node not found during attach!");
            return;
        }

        self.unlink(child);

        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            c.transform.mark_dirty();
        }
    }

    /// Links a detached node at the root level.
    pub fn attach_to_root(&mut self, handle: NodeHandle) {
        if !self.nodes.contains_key(handle) {
            return;
        }
        self.unlink(handle);
        self.root_nodes.push(handle);
        if let Some(node) = self.nodes.get_mut(handle) {
            node.transform.mark_dirty();
        }
    }

    /// Unlinks a node from its parent (or the root list) but keeps it stored.
    ///
    /// Returns `false` if the node does not exist.
    pub fn detach(&mut self, handle: NodeHandle) -> bool {
        if !self.nodes.contains_key(handle) {
            return false;
        }
        self.unlink(handle);
        true
    }

    /// Puts `incoming` in the exact hierarchy slot of `outgoing`, which is left
    /// detached. The incoming node takes over the outgoing node's transform
    /// and its children, so the subtree stays attached.
    pub fn swap_in_place(&mut self, outgoing: NodeHandle, incoming: NodeHandle) {
        if outgoing == incoming {
            return;
        }
        let Some(out_node) = self.nodes.get(outgoing) else {
            return;
        };
        if !self.nodes.contains_key(incoming) {
            return;
        }
        let parent = out_node.parent;
        let transform = out_node.transform.clone();

        self.unlink(incoming);

        match parent {
            Some(p) => {
                if let Some(slot) = self
                    .nodes
                    .get_mut(p)
                    .and_then(|n| n.children.iter_mut().find(|c| **c == outgoing))
                {
                    *slot = incoming;
                }
            }
            None => {
                if let Some(slot) = self.root_nodes.iter_mut().find(|r| **r == outgoing) {
                    *slot = incoming;
                }
            }
        }

        let children = match self.nodes.get_mut(outgoing) {
            Some(out_node) => {
                out_node.parent = None;
                std::mem::take(&mut out_node.children)
            }
            None => Vec::new(),
        };
        for &child in &children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = Some(incoming);
            }
        }
        if let Some(in_node) = self.nodes.get_mut(incoming) {
            in_node.parent = parent;
            in_node.transform.copy_from(&transform);
            in_node.children.extend(children);
        }
    }

    fn unlink(&mut self, handle: NodeHandle) {
        let parent = self.nodes.get(handle).and_then(|n| n.parent);
        match parent {
            Some(p) => {
                if let Some(parent_node) = self.nodes.get_mut(p)
                    && let Some(pos) = parent_node.children.iter().position(|&c| c == handle)
                {
                    parent_node.children.remove(pos);
                }
            }
            None => {
                if let Some(pos) = self.root_nodes.iter().position(|&r| r == handle) {
                    self.root_nodes.remove(pos);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(handle) {
            node.parent = None;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    /// Returns `true` if the node is reachable from a root.
    #[must_use]
    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        let mut current = handle;
        loop {
            let Some(node) = self.nodes.get(current) else {
                return false;
            };
            match node.parent {
                Some(parent) => current = parent,
                None => return self.root_nodes.contains(&current),
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attached nodes in depth-first pre-order.
    #[must_use]
    pub fn attached_nodes(&self) -> Vec<NodeHandle> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.traverse(|handle, _| out.push(handle));
        out
    }

    /// Visits every attached node, depth-first, parents before children.
    pub fn traverse(&self, mut visit: impl FnMut(NodeHandle, &Node)) {
        let mut stack: Vec<NodeHandle> = self.root_nodes.iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            visit(handle, node);
            stack.extend(node.children.iter().rev());
        }
    }

    /// Number of attached drawables, i.e. draw calls if nothing is culled.
    #[must_use]
    pub fn count_drawables(&self) -> usize {
        let mut count = 0;
        self.traverse(|_, node| {
            if node.kind.is_drawable() {
                count += 1;
            }
        });
        count
    }

    /// Attached drawables with the given geometry and material ids.
    #[must_use]
    pub fn find_meshes(&self, geometry_id: &str, material_id: &str) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        self.traverse(|handle, node| {
            if let NodeKind::Mesh(mesh) = &node.kind
                && mesh.geometry.id() == geometry_id
                && mesh.material.id() == material_id
            {
                out.push(handle);
            }
        });
        out
    }

    // ========================================================================
    // Matrix update pipeline
    // ========================================================================

    /// Refreshes world matrices of every attached node.
    ///
    /// Iterative, so deep hierarchies cannot overflow the stack.
    pub fn update_matrix_world(&mut self) {
        let mut stack: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(64);
        for &root in self.root_nodes.iter().rev() {
            stack.push((root, Affine3A::IDENTITY, false));
        }

        while let Some((handle, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };

            let local_changed = node.transform.update_local_matrix();
            let world_needs_update = local_changed || parent_changed;
            if world_needs_update {
                let world = parent_world * *node.transform.local_matrix();
                node.transform.set_world_matrix(world);
            }

            let current_world = *node.transform.world_matrix();
            for &child in node.children.iter().rev() {
                stack.push((child, current_world, world_needs_update));
            }
        }
    }
}
