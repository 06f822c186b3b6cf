use glam::DVec3;

use super::*;
use crate::comm::SingleRank;
use crate::fixture;
use crate::geom::{GeomType, NoCad};
use crate::matrix::SymMat3;
use crate::split::split_edge;

fn eager() -> AdaptConfig {
  // accept any length; the test aims at a later guard
  let mut config = AdaptConfig::default();
  config.collapse_ratio = f64::INFINITY;
  config
}

#[test]
fn collapse_removes_node_and_cavity_cells() {
  let mut grid = fixture::tet_grid();
  let mid = grid.nodes.add_fresh(0);
  grid.nodes.set_xyz(mid, DVec3::new(0.0, 0.0, 0.5)).unwrap();
  split_edge(&mut grid, 0, 3, mid).unwrap();
  assert_eq!(grid.tet().n(), 2);

  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, mid).unwrap();
  assert!(outcome.applied());

  assert!(!grid.nodes.valid(mid));
  assert_eq!(grid.nodes.n(), 4);
  // one collapsing tet disappeared, one was rewritten
  assert_eq!(grid.tet().n(), 1);
  grid.audit().unwrap();
}

#[test]
fn collapse_pass_takes_short_edges() {
  let mut grid = fixture::tet_grid();
  let mid = grid.nodes.add_fresh(0);
  grid.nodes.set_xyz(mid, DVec3::new(0.0, 0.0, 0.5)).unwrap();
  split_edge(&mut grid, 0, 3, mid).unwrap();

  // both halves of the old edge measure 0.5 < 1/(sqrt(2)*1.1)
  let config = AdaptConfig::default();
  let ncollapse = pass(&mut grid, &NoCad, &config, &SingleRank).unwrap();

  assert_eq!(ncollapse, 1);
  assert_eq!(grid.nodes.n(), 4);
  assert_eq!(grid.tet().n(), 1);
  grid.audit().unwrap();
}

#[test]
fn collapse_noop_on_unit_mesh() {
  let mut grid = fixture::regular_tet_grid();
  let config = AdaptConfig::default();
  let ncollapse = pass(&mut grid, &NoCad, &config, &SingleRank).unwrap();
  assert_eq!(ncollapse, 0);
  assert_eq!(grid.nodes.n(), 4);
  assert_eq!(grid.tet().n(), 1);
}

#[test]
fn collapse_at_exact_threshold_declines() {
  let mut grid = fixture::tet_grid();
  let mut config = AdaptConfig::default();
  config.collapse_ratio = 0.5;
  // metric 0.25 on both ends of a unit edge measures exactly 0.5
  for node in 0..4 {
    grid
      .nodes
      .set_metric(node, SymMat3::from_diag(0.25, 0.25, 0.25))
      .unwrap();
  }
  assert_eq!(crate::quality::ratio(&grid.nodes, 0, 1), 0.5);

  let outcome = edge_guarded(&mut grid, &NoCad, &config, 0, 1).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Ratio));
  assert_eq!(grid.nodes.n(), 4);
}

#[test]
fn collapse_never_removes_a_cad_vertex() {
  let mut grid = fixture::tet_grid();
  grid.geom.add(3, GeomType::Node, 1, [0.0; 2]);

  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, 3).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Geometry));
  assert!(grid.nodes.valid(3));
}

#[test]
fn collapse_requires_matching_cad_support() {
  let mut grid = fixture::tet_grid();
  // the removed node sits on CAD face 7, the keeper does not
  grid.geom.add(3, GeomType::Face, 7, [0.1, 0.1]);

  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, 3).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Geometry));

  // give the keeper the same face and the geometry guard passes
  grid.geom.add(0, GeomType::Face, 7, [0.0, 0.0]);
  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, 3).unwrap();
  assert!(outcome.applied());
}

#[test]
fn collapse_declines_duplicate_cells() {
  let mut grid = Grid::new(0);
  for (g, xyz) in [
    DVec3::new(0.0, 0.0, 0.0),
    DVec3::new(1.0, 0.0, 0.0),
    DVec3::new(0.5, 1.0, 0.0),
    DVec3::new(0.5, 0.4, 1.0),
    DVec3::new(0.5, 0.4, 2.0),
  ]
  .into_iter()
  .enumerate()
  {
    let n = grid.nodes.add_global(g as i64, 0);
    grid.nodes.set_xyz(n, xyz).unwrap();
  }
  grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
  grid.tet_mut().add(&[1, 2, 3, 4], 0).unwrap();

  // welding 4 onto 0 would duplicate tet (0, 1, 2, 3)
  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, 4).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Manifold));
  assert_eq!(grid.tet().n(), 2);
}

#[test]
fn collapse_declines_surface_fold() {
  let mut grid = Grid::new(0);
  for (g, xyz) in [
    DVec3::new(0.0, 0.0, 0.0),
    DVec3::new(1.0, 0.0, 0.0),
    DVec3::new(0.5, 1.0, 0.0),
    DVec3::new(1.5, 1.0, 0.0),
  ]
  .into_iter()
  .enumerate()
  {
    let n = grid.nodes.add_global(g as i64, 0);
    grid.nodes.set_xyz(n, xyz).unwrap();
  }
  grid.tri_mut().add(&[1, 3, 2], 1).unwrap();

  // welding 3 onto 0 spins the triangle's normal around
  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, 3).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::NormalDeviation));
}

#[test]
fn collapse_declines_on_foreign_cavity() {
  let mut grid = fixture::tet_grid();
  let mid = grid.nodes.add_fresh(0);
  grid.nodes.set_xyz(mid, DVec3::new(0.0, 0.0, 0.5)).unwrap();
  split_edge(&mut grid, 0, 3, mid).unwrap();
  grid.nodes.set_part(1, 1).unwrap();

  let outcome = edge_guarded(&mut grid, &NoCad, &eager(), 0, mid).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Locality));
}

#[test]
fn collapse_quality_guard_declines() {
  let mut grid = fixture::tet_grid();
  let mid = grid.nodes.add_fresh(0);
  grid.nodes.set_xyz(mid, DVec3::new(0.0, 0.0, 0.5)).unwrap();
  split_edge(&mut grid, 0, 3, mid).unwrap();

  let mut config = eager();
  config.collapse_quality_absolute = 0.99; // nothing survives this
  let outcome = edge_guarded(&mut grid, &NoCad, &config, 0, mid).unwrap();
  assert_eq!(outcome, OpOutcome::Declined(DeclineReason::Quality));
  assert_eq!(grid.tet().n(), 2);
}
