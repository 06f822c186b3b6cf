use glam::DVec3;

use super::*;
use crate::comm::SingleRank;
use crate::fixture;
use crate::geom::NoCad;
use crate::matrix::SymMat3;

#[test]
fn split_tet_in_two() {
  let mut grid = fixture::tet_grid();
  let new_node = grid.nodes.add_fresh(0);
  let mid = 0.5 * (grid.nodes.xyz(0) + grid.nodes.xyz(3));
  grid.nodes.set_xyz(new_node, mid).unwrap();

  split_edge(&mut grid, 0, 3, new_node).unwrap();

  assert_eq!(grid.nodes.n(), 5);
  assert_eq!(grid.tet().n(), 2);
  // the base triangle does not ride edge (0, 3)
  assert_eq!(grid.tri().n(), 1);
  assert_eq!(grid.nodes.xyz(new_node), DVec3::new(0.0, 0.0, 0.5));
  // the split edge is gone
  assert!(!grid.tet().has_side(0, 3));
  assert!(grid.tet().has_side(0, new_node));
  assert!(grid.tet().has_side(new_node, 3));
  grid.audit().unwrap();
}

#[test]
fn split_tet_and_boundary_tri_in_two() {
  let mut grid = fixture::tet_grid();
  let new_node = grid.nodes.add_fresh(0);
  let mid = 0.5 * (grid.nodes.xyz(0) + grid.nodes.xyz(1));
  grid.nodes.set_xyz(new_node, mid).unwrap();

  split_edge(&mut grid, 0, 1, new_node).unwrap();

  assert_eq!(grid.nodes.n(), 5);
  assert_eq!(grid.tet().n(), 2);
  assert_eq!(grid.tri().n(), 2);
  // both halves keep the CAD id
  for cell in grid.tri().each_valid() {
    assert_eq!(grid.tri().id(cell).unwrap(), 1);
  }
  grid.audit().unwrap();
}

#[test]
fn split_at_exact_threshold_declines() {
  let mut grid = fixture::tet_grid();
  // an exactly representable ratio: metric 4 on both ends of a unit
  // edge measures exactly 2, and the trigger is set right on it
  let mut config = AdaptConfig::default();
  config.split_ratio = 2.0;
  for node in 0..4 {
    grid
      .nodes
      .set_metric(node, SymMat3::from_diag(4.0, 4.0, 4.0))
      .unwrap();
  }
  assert_eq!(crate::quality::ratio(&grid.nodes, 0, 1), 2.0);

  let outcome = split_edge_guarded(&mut grid, &NoCad, &config, 0, 1).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Ratio));
  assert_eq!(grid.nodes.n(), 4);
}

#[test]
fn split_declines_on_foreign_cavity() {
  let mut grid = fixture::tet_grid();
  let config = AdaptConfig::default();
  grid
    .nodes
    .set_metric(0, SymMat3::from_diag(100.0, 100.0, 100.0))
    .unwrap();
  grid.nodes.set_part(2, 1).unwrap(); // ghost in the cavity

  let outcome = split_edge_guarded(&mut grid, &NoCad, &config, 0, 1).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Locality));
}

#[test]
fn split_declines_on_mixed_edge() {
  let mut grid = fixture::tet_grid();
  let config = AdaptConfig::default();
  // hang a prism off edge (0, 1)
  for g in 4..8 {
    let n = grid.nodes.add_global(g, 0);
    grid.nodes.set_xyz(n, DVec3::new(g as f64, -1.0, 0.0)).unwrap();
  }
  grid.pri_mut().add(&[0, 1, 4, 5, 6, 7], 0).unwrap();
  grid
    .nodes
    .set_metric(0, SymMat3::from_diag(100.0, 100.0, 100.0))
    .unwrap();

  let outcome = split_edge_guarded(&mut grid, &NoCad, &config, 0, 1).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::MixedKind));
}

#[test]
fn split_pass_refines_toward_hot_corner() {
  // unit metric except the apex, which wants quarter-length edges
  let mut grid = fixture::regular_tet_grid();
  let mut config = AdaptConfig::default();
  config.split_quality_relative = 0.0; // isolate the ratio behavior
  grid
    .nodes
    .set_metric(3, SymMat3::from_diag(1.0, 1.0, 1.0 / (0.25 * 0.25)))
    .unwrap();

  let nsplit = pass(&mut grid, &NoCad, &config, &SingleRank).unwrap();

  assert_eq!(nsplit, 3);
  assert_eq!(grid.nodes.n(), 7);
  assert_eq!(grid.tet().n(), 4);
  assert_eq!(grid.tri().n(), 1);
  // every new node half-way up an edge into the apex
  for new_node in 4..7 {
    assert!(grid.tet().has_side(new_node, 3));
  }
  grid.audit().unwrap();
}

#[test]
fn split_then_collapse_round_trips_connectivity() {
  let mut grid = fixture::tet_grid();
  let config = AdaptConfig::default();
  let new_node = grid.nodes.add_fresh(0);
  let mid = 0.5 * (grid.nodes.xyz(0) + grid.nodes.xyz(3));
  grid.nodes.set_xyz(new_node, mid).unwrap();
  split_edge(&mut grid, 0, 3, new_node).unwrap();
  assert_eq!(grid.tet().n(), 2);

  // force the collapse of one half regardless of length
  let mut eager = config.clone();
  eager.collapse_ratio = f64::INFINITY;
  let outcome = crate::collapse::edge_guarded(&mut grid, &NoCad, &eager, 3, new_node).unwrap();
  assert!(outcome.applied());

  assert_eq!(grid.nodes.n(), 4);
  assert_eq!(grid.tet().n(), 1);
  assert_eq!(grid.tri().n(), 1);
  let tet = grid.tet().each_valid().next().unwrap();
  let mut nodes = grid.tet().nodes(tet).unwrap().to_vec();
  nodes.sort_unstable();
  assert_eq!(nodes, vec![0, 1, 2, 3]);
  grid.audit().unwrap();
}

#[test]
fn prism_column_pass_splits_hot_column() {
  let mut grid = fixture::prism_column_grid();
  let config = AdaptConfig::default();

  let nsplit = pass(&mut grid, &NoCad, &config, &SingleRank).unwrap();

  assert_eq!(nsplit, 2);
  assert_eq!(grid.nodes.n(), 10);
  assert_eq!(grid.pri().n(), 3);
  assert_eq!(grid.tri().n(), 6);
  assert_eq!(grid.qua().n(), 5);
  grid.audit().unwrap();
}

#[test]
fn twod_split_keeps_layers_in_lockstep() {
  let mut grid = fixture::prism_column_grid();
  let config = AdaptConfig::default();
  pass(&mut grid, &NoCad, &config, &SingleRank).unwrap();

  // every floor node has a top partner straight above it
  for node in grid.nodes.each_valid().collect::<Vec<_>>() {
    if crate::twod::node_active(&grid, node) {
      let opp = crate::twod::opposite_node(grid.pri(), node).unwrap();
      let floor = grid.nodes.xyz(node);
      let top = grid.nodes.xyz(opp);
      assert!((floor.x - top.x).abs() < 1.0e-14);
      assert!((floor.z - top.z).abs() < 1.0e-14);
      assert!((top.y - 1.0).abs() < 1.0e-14);
    }
  }
}
