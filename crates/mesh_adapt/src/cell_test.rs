use super::*;

#[test]
fn kind_tables_are_consistent() {
  for kind in CellKind::ALL {
    for edge in kind.edges() {
      assert!(edge[0] < kind.node_per());
      assert!(edge[1] < kind.node_per());
      assert_ne!(edge[0], edge[1]);
    }
    for face in kind.faces() {
      for &corner in face {
        assert!(corner < kind.node_per());
      }
    }
  }
  assert_eq!(CellKind::Tet.edge_per(), 6);
  assert_eq!(CellKind::Tet.face_per(), 4);
  assert_eq!(CellKind::Pri.edge_per(), 9);
  assert_eq!(CellKind::Pri.face_per(), 5);
  assert_eq!(CellKind::Hex.edge_per(), 12);
  assert!(CellKind::Tri.has_id());
  assert!(!CellKind::Tet.has_id());
}

#[test]
fn add_remove_updates_adjacency() {
  let mut tets = CellStore::new(CellKind::Tet);
  let cell = tets.add(&[0, 1, 2, 3], 0).unwrap();
  assert_eq!(tets.n(), 1);
  assert!(tets.valid(cell));
  assert_eq!(tets.nodes(cell).unwrap(), &[0, 1, 2, 3]);
  for node in 0..4 {
    assert_eq!(tets.adj().degree(node), 1);
  }

  tets.remove(cell).unwrap();
  assert_eq!(tets.n(), 0);
  assert!(!tets.valid(cell));
  for node in 0..4 {
    assert!(tets.node_empty(node));
  }
}

#[test]
fn slots_are_reused_before_growth() {
  let mut tris = CellStore::new(CellKind::Tri);
  let a = tris.add(&[0, 1, 2], 10).unwrap();
  let _b = tris.add(&[1, 2, 3], 10).unwrap();
  tris.remove(a).unwrap();
  let c = tris.add(&[2, 3, 4], 20).unwrap();
  assert_eq!(c, a);
  assert_eq!(tris.id(c).unwrap(), 20);
}

#[test]
fn canonical_lookup_ignores_node_order() {
  let mut tets = CellStore::new(CellKind::Tet);
  let cell = tets.add(&[4, 7, 2, 9], 0).unwrap();
  assert_eq!(tets.with(&[9, 2, 7, 4]), Some(cell));
  assert_eq!(tets.with(&[9, 2, 7, 5]), None);
}

#[test]
fn list_with2_returns_edge_cavity() {
  let mut tets = CellStore::new(CellKind::Tet);
  let a = tets.add(&[0, 1, 2, 3], 0).unwrap();
  let b = tets.add(&[0, 1, 3, 4], 0).unwrap();
  let _c = tets.add(&[1, 4, 5, 6], 0).unwrap();
  let mut cavity = tets.list_with2(0, 1).to_vec();
  cavity.sort_unstable();
  assert_eq!(cavity, vec![a, b]);
}

#[test]
fn with_face_finds_both_sharers() {
  let mut tets = CellStore::new(CellKind::Tet);
  let a = tets.add(&[0, 1, 2, 3], 0).unwrap();
  let b = tets.add(&[0, 2, 1, 4], 0).unwrap();
  let (c0, c1) = tets.with_face(&[0, 1, 2, 0]).unwrap();
  let mut found = vec![c0.unwrap(), c1.unwrap()];
  found.sort_unstable();
  assert_eq!(found, vec![a, b]);

  let (only, none) = tets.with_face(&[1, 3, 2, 1]).unwrap();
  assert_eq!(only, Some(a));
  assert_eq!(none, None);
}

#[test]
fn replace_node_rewrites_every_reference() {
  let mut tets = CellStore::new(CellKind::Tet);
  let a = tets.add(&[0, 1, 2, 3], 0).unwrap();
  let b = tets.add(&[1, 2, 3, 4], 0).unwrap();
  tets.replace_node(2, 9).unwrap();
  assert_eq!(tets.nodes(a).unwrap(), &[0, 1, 9, 3]);
  assert_eq!(tets.nodes(b).unwrap(), &[1, 9, 3, 4]);
  assert!(tets.node_empty(2));
  assert_eq!(tets.adj().degree(9), 2);
}

#[test]
fn has_side_follows_edge_tables() {
  let mut tets = CellStore::new(CellKind::Tet);
  tets.add(&[0, 1, 2, 3], 0).unwrap();
  assert!(tets.has_side(0, 3));
  assert!(tets.has_side(3, 0));
  assert!(!tets.has_side(0, 4));

  let mut tris = CellStore::new(CellKind::Tri);
  tris.add(&[5, 6, 7], 2).unwrap();
  assert!(tris.side_has_id(5, 6, 2));
  assert!(!tris.side_has_id(5, 6, 3));
}

#[test]
fn node_list_around_is_unique() {
  let mut tets = CellStore::new(CellKind::Tet);
  tets.add(&[0, 1, 2, 3], 0).unwrap();
  tets.add(&[0, 1, 3, 4], 0).unwrap();
  let mut around = tets.node_list_around(0).to_vec();
  around.sort_unstable();
  assert_eq!(around, vec![1, 2, 3, 4]);
}

#[test]
fn part_uses_lowest_global_node() {
  use crate::node::NodeStore;
  let mut nodes = NodeStore::new();
  for g in 0..4 {
    nodes.add_global(g, (g % 2) as i32);
  }
  let mut tets = CellStore::new(CellKind::Tet);
  let cell = tets.add(&[3, 2, 1, 0], 0).unwrap();
  // node with global 0 has part 0
  assert_eq!(tets.part(&nodes, cell).unwrap(), 0);
  assert!(!tets.local_gem(&nodes, 0, 1, 0));
  nodes.set_part(1, 0).unwrap();
  nodes.set_part(3, 0).unwrap();
  assert!(tets.local_gem(&nodes, 0, 1, 0));
}

#[test]
fn orient_node0_preserves_tet_orientation() {
  // permutations must be even: parity via explicit check on one case
  let mut nodes = [10, 11, 12, 13];
  orient_node0(12, &mut nodes).unwrap();
  assert_eq!(nodes[0], 12);
  assert_eq!(nodes, [12, 13, 10, 11]);

  let mut tri = [7, 8, 9];
  orient_node0(9, &mut tri).unwrap();
  assert_eq!(tri, [9, 7, 8]);
}
