use super::*;
use crate::grid::Grid;

fn surface_pair() -> Grid {
  // two triangles on CAD face 1 sharing edge (1, 2)
  //   3 ---- 2
  //   |    / |
  //   |   /  |
  //   0 ---- 1
  let mut grid = Grid::new(0);
  use glam::DVec3;
  let coords = [
    DVec3::new(0.0, 0.0, 0.0),
    DVec3::new(1.0, 0.0, 0.0),
    DVec3::new(1.0, 1.0, 0.0),
    DVec3::new(0.0, 1.0, 0.0),
  ];
  for (g, &xyz) in coords.iter().enumerate() {
    let n = grid.nodes.add_global(g as i64, 0);
    grid.nodes.set_xyz(n, xyz).unwrap();
    grid
      .geom
      .add(n, GeomType::Face, 1, [xyz.x, xyz.y]);
  }
  grid.tri_mut().add(&[0, 1, 2], 1).unwrap();
  grid.tri_mut().add(&[0, 2, 3], 1).unwrap();
  grid
}

#[test]
fn add_is_idempotent_and_updates_params() {
  let mut store = GeomStore::new();
  let a = store.add(5, GeomType::Face, 1, [0.25, 0.5]);
  let b = store.add(5, GeomType::Face, 1, [0.75, 0.5]);
  assert_eq!(a, b);
  assert_eq!(store.n(), 1);
  assert_eq!(store.tuv(5, GeomType::Face, 1).unwrap(), [0.75, 0.5]);
}

#[test]
fn remove_all_clears_every_record() {
  let mut store = GeomStore::new();
  store.add(3, GeomType::Node, 2, [0.0; 2]);
  store.add(3, GeomType::Edge, 4, [0.5, 0.0]);
  store.add(3, GeomType::Face, 1, [0.5, 0.5]);
  assert_eq!(store.n(), 3);
  assert!(store.is_a(3, GeomType::Node));

  store.remove_all(3).unwrap();
  assert_eq!(store.n(), 0);
  assert!(!store.supported(3));
  assert!(store.find(3, GeomType::Edge, 4).is_none());
}

#[test]
fn unique_id_flags_seams() {
  let mut store = GeomStore::new();
  assert_eq!(store.unique_id(0, GeomType::Face).unwrap(), None);
  store.add(0, GeomType::Face, 1, [0.0; 2]);
  assert_eq!(store.unique_id(0, GeomType::Face).unwrap(), Some(1));
  store.add(0, GeomType::Face, 2, [0.0; 2]);
  assert!(store.unique_id(0, GeomType::Face).is_err());
}

#[test]
fn jump_and_degen_survive_until_removal() {
  let mut store = GeomStore::new();
  let geom = store.add(1, GeomType::Edge, 7, [0.1, 0.0]);
  store.set_jump(geom, 3).unwrap();
  assert_eq!(store.record(geom).unwrap().jump, 3);
  // a jump record refuses the plain parameter query
  assert!(store.tuv(1, GeomType::Edge, 7).is_err());
}

#[test]
fn uv_area_matches_geometry() {
  let grid = surface_pair();
  let tri0: Vec<usize> = grid.tri().nodes(grid.tri().each_valid().next().unwrap()).unwrap().to_vec();
  let area = grid.geom.uv_area(&NoCad, &tri0, 1).unwrap();
  assert!((area - 0.5).abs() < 1.0e-14);
}

#[test]
fn support_between_requires_shared_face_side() {
  let grid = surface_pair();
  assert!(support_between(&grid, 0, 2));
  // (1, 3) is not a side of any triangle
  assert!(!support_between(&grid, 1, 3));
}

#[test]
fn add_between_interpolates_face_params() {
  let mut grid = surface_pair();
  let new_node = grid.nodes.add_fresh(0);
  let mid = 0.5 * (grid.nodes.xyz(0) + grid.nodes.xyz(2));
  grid.nodes.set_xyz(new_node, mid).unwrap();

  add_between(&mut grid, &NoCad, 0, 2, 0.5, new_node).unwrap();
  let uv = grid.geom.tuv(new_node, GeomType::Face, 1).unwrap();
  assert!((uv[0] - 0.5).abs() < 1.0e-14);
  assert!((uv[1] - 0.5).abs() < 1.0e-14);
  // no edg cell between the nodes: no edge record materializes
  assert!(!grid.geom.is_a(new_node, GeomType::Edge));
}

#[test]
fn add_between_with_edge_cell_adds_edge_record() {
  let mut grid = surface_pair();
  grid.edg_mut().add(&[0, 1], 9).unwrap();
  grid.geom.add(0, GeomType::Edge, 9, [0.0, 0.0]);
  grid.geom.add(1, GeomType::Edge, 9, [2.0, 0.0]);

  let new_node = grid.nodes.add_fresh(0);
  add_between(&mut grid, &NoCad, 0, 1, 0.5, new_node).unwrap();
  let t = grid.geom.tuv(new_node, GeomType::Edge, 9).unwrap()[0];
  assert!((t - 1.0).abs() < 1.0e-14);
}

#[test]
fn verify_topo_accepts_and_rejects() {
  let mut grid = surface_pair();
  verify_topo(&grid).unwrap();

  // strip node 2's face record: invariant broken
  grid.geom.remove_all(2).unwrap();
  grid.geom.add(2, GeomType::Edge, 1, [0.0, 0.0]);
  assert!(verify_topo(&grid).is_err());
}
