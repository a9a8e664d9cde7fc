//! Scene Graph Tests
//!
//! Tests for:
//! - Parent-child relationships and world matrix propagation
//! - Subtree removal
//! - Detached nodes and in-place swapping

use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};

use myth_governor::resources::{Geometry, Material, Mesh};
use myth_governor::scene::{Node, Scene};

const EPSILON: f32 = 1e-4;

fn approx_vec3(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

fn mesh() -> Mesh {
    Mesh::new(
        Arc::new(Geometry::new_sphere("ball", 1.0)),
        Arc::new(Material::new("rubber", Vec4::ONE)),
    )
}

// ============================================================================
// Hierarchy & World Matrices
// ============================================================================

#[test]
fn world_matrix_composes_parent_transforms() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new("parent"));
    {
        let node = scene.get_node_mut(parent).unwrap();
        node.transform.position = Vec3::new(10.0, 0.0, 0.0);
        node.transform.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    }
    let mut child = Node::new("child");
    child.transform.position = Vec3::new(0.0, 0.0, -5.0);
    let child = scene.add_to_parent(child, parent);

    scene.update_matrix_world();

    // Rotating (0, 0, -5) by +90° about Y gives (-5, 0, 0).
    let world = scene.get_node(child).unwrap().transform.world_position();
    assert!(approx_vec3(world, Vec3::new(5.0, 0.0, 0.0)), "Got {world:?}");
}

#[test]
fn moving_parent_moves_children() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new("parent"));
    let mut child = Node::new("child");
    child.transform.position = Vec3::new(1.0, 0.0, 0.0);
    let child = scene.add_to_parent(child, parent);
    scene.update_matrix_world();

    scene.get_node_mut(parent).unwrap().transform.position = Vec3::new(0.0, 3.0, 0.0);
    scene.update_matrix_world();

    let world = scene.get_node(child).unwrap().transform.world_position();
    assert!(approx_vec3(world, Vec3::new(1.0, 3.0, 0.0)));
}

#[test]
fn deep_hierarchy_does_not_overflow() {
    let mut scene = Scene::new();
    let mut parent = scene.add_node(Node::new("root"));
    for _ in 0..10_000 {
        let mut node = Node::new("link");
        node.transform.position = Vec3::new(0.0, 0.001, 0.0);
        parent = scene.add_to_parent(node, parent);
    }
    scene.update_matrix_world();

    let tip = scene.get_node(parent).unwrap().transform.world_position();
    assert!((tip.y - 10.0).abs() < 0.01);
}

#[test]
fn traverse_visits_parents_first() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("a"));
    let b = scene.add_to_parent(Node::new("b"), a);
    let c = scene.add_to_parent(Node::new("c"), b);
    let d = scene.add_node(Node::new("d"));

    assert_eq!(scene.attached_nodes(), vec![a, b, c, d]);
}

// ============================================================================
// Removal & Detachment
// ============================================================================

#[test]
fn remove_node_removes_subtree() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new("parent"));
    let child = scene.add_to_parent(Node::new("child"), parent);
    let grandchild = scene.add_to_parent(Node::from_mesh("leaf", mesh()), child);
    let other = scene.add_node(Node::new("other"));

    scene.remove_node(child);

    assert!(!scene.contains(child));
    assert!(!scene.contains(grandchild));
    assert!(scene.get_node(parent).unwrap().children().is_empty());
    assert_eq!(scene.len(), 2);
    assert!(scene.contains(other));
}

#[test]
fn detached_nodes_stay_stored_but_unreachable() {
    let mut scene = Scene::new();
    let ball = scene.add_mesh("ball", mesh());
    assert_eq!(scene.count_drawables(), 1);

    assert!(scene.detach(ball));
    assert!(scene.contains(ball));
    assert!(!scene.is_attached(ball));
    assert_eq!(scene.count_drawables(), 0);

    scene.attach_to_root(ball);
    assert!(scene.is_attached(ball));
}

#[test]
fn swap_in_place_keeps_slot_and_transform() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new("parent"));
    let first = scene.add_to_parent(Node::new("first"), parent);
    let mut outgoing = Node::from_mesh("outgoing", mesh());
    outgoing.transform.position = Vec3::new(2.0, 0.0, 0.0);
    let outgoing = scene.add_to_parent(outgoing, parent);
    let last = scene.add_to_parent(Node::new("last"), parent);
    let incoming = scene.insert_detached(Node::from_mesh("incoming", mesh()));
    scene.update_matrix_world();

    scene.swap_in_place(outgoing, incoming);

    assert_eq!(scene.get_node(parent).unwrap().children(), &[first, incoming, last]);
    assert!(!scene.is_attached(outgoing));
    assert!(scene.contains(outgoing));

    let node = scene.get_node(incoming).unwrap();
    assert_eq!(node.parent(), Some(parent));
    assert_eq!(node.transform.position, Vec3::new(2.0, 0.0, 0.0));
    assert!(approx_vec3(node.transform.world_position(), Vec3::new(2.0, 0.0, 0.0)));
}

#[test]
fn swap_in_place_at_root() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new("a"));
    let b = scene.add_node(Node::new("b"));
    let spare = scene.insert_detached(Node::new("spare"));

    scene.swap_in_place(a, spare);
    assert_eq!(scene.root_nodes, vec![spare, b]);

    scene.swap_in_place(spare, a);
    assert_eq!(scene.root_nodes, vec![a, b]);
}

#[test]
fn swap_in_place_hands_over_children() {
    let mut scene = Scene::new();
    let outgoing = scene.add_node(Node::new("outgoing"));
    let a = scene.add_to_parent(Node::new("a"), outgoing);
    let b = scene.add_to_parent(Node::new("b"), outgoing);
    let incoming = scene.insert_detached(Node::new("incoming"));

    scene.swap_in_place(outgoing, incoming);

    assert_eq!(scene.get_node(incoming).unwrap().children(), &[a, b]);
    assert!(scene.get_node(outgoing).unwrap().children().is_empty());
    assert_eq!(scene.get_node(a).unwrap().parent(), Some(incoming));
    assert!(scene.is_attached(a) && scene.is_attached(b));
    assert_eq!(scene.attached_nodes().len(), 3);
}

#[test]
fn find_meshes_matches_resource_ids() {
    let mut scene = Scene::new();
    let x = scene.add_mesh("x", mesh());
    scene.add_node(Node::new("group"));
    let y = scene.add_mesh("y", mesh());

    assert_eq!(scene.find_meshes("ball", "rubber"), vec![x, y]);
    assert!(scene.find_meshes("ball", "metal").is_empty());
}
