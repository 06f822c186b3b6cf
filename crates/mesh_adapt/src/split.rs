//! Edge split.
//!
//! A long edge (metric ratio above the split threshold) gets a new node
//! at its weighted midpoint; every cell riding the edge is bisected.
//! The operator is advisory: any failed precondition declines without
//! touching the mesh, and the pass moves to the next candidate.
//!
//! Pass shape: build the edge table once, mark owned edges past the
//! threshold, process longest-first. Each accepted split is immediately
//! followed by a local interior smooth of the new node; each locality
//! decline ages the edge's endpoints so a future repartition can make
//! progress.

use smallvec::SmallVec;
use tracing::debug;

use crate::cell::CellKind;
use crate::comm::Collective;
use crate::config::AdaptConfig;
use crate::edge::EdgeTable;
use crate::error::{DeclineReason, OpOutcome, Result};
use crate::geom::{self, CadOracle};
use crate::grid::Grid;
use crate::quality::{ratio, tet_quality, tri_quality};
use crate::{smooth, twod};

/// One split sub-pass. Returns the number of committed splits.
pub fn pass(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  comm: &dyn Collective,
) -> Result<usize> {
  let table = EdgeTable::build(grid)?;
  let rank = grid.rank;

  let mut marked: Vec<(f64, usize, usize)> = Vec::new();
  for (edge, [node0, node1]) in table.each() {
    if table.part(grid, edge)? != rank {
      continue;
    }
    if grid.twod && !(twod::node_active(grid, node0) && twod::node_active(grid, node1)) {
      continue;
    }
    let r = ratio(&grid.nodes, node0, node1);
    if r > config.split_ratio {
      marked.push((r, node0, node1));
    }
  }
  // longest first
  marked.sort_by(|a, b| b.0.total_cmp(&a.0));

  let mut nsplit = 0;
  let mut ndecline = 0;
  for (_, node0, node1) in marked {
    let outcome = if grid.twod {
      split_edge_twod_guarded(grid, config, node0, node1)?
    } else {
      split_edge_guarded(grid, cad, config, node0, node1)?
    };
    match outcome {
      OpOutcome::Applied => nsplit += 1,
      OpOutcome::Declined(DeclineReason::Locality) => {
        grid.nodes.age_increment(node0);
        grid.nodes.age_increment(node1);
        ndecline += 1;
      }
      OpOutcome::Declined(_) => ndecline += 1,
    }
  }
  debug!(nsplit, ndecline, "split sub-pass");

  grid.nodes.shift_new_globals(comm)?;
  Ok(nsplit)
}

// =============================================================================
// 3D split
// =============================================================================

/// Check every precondition, then commit a split of `(node0, node1)`.
pub fn split_edge_guarded(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  node0: usize,
  node1: usize,
) -> Result<OpOutcome> {
  if !grid.nodes.valid(node0) || !grid.nodes.valid(node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  // a previous split this pass may have consumed the edge
  if !grid.tet().has_side(node0, node1) && !grid.tri().has_side(node0, node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  // strict: an edge exactly at the threshold stays
  if ratio(&grid.nodes, node0, node1) <= config.split_ratio {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if grid.mixed_cell_near_edge(node0, node1) {
    return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
  }
  let rank = grid.rank;
  if !grid.tet().local_gem(&grid.nodes, node0, node1, rank)
    || !grid.tri().local_gem(&grid.nodes, node0, node1, rank)
  {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  // allocate and place the new node; CAD projection may reshape it
  let new_node = grid.nodes.add_fresh(rank);
  interpolate_node(grid, node0, node1, 0.5, new_node)?;
  geom::add_between(grid, cad, node0, node1, 0.5, new_node)?;

  if !split_quality_ok(grid, config, node0, node1, new_node)? {
    grid.remove_node(new_node)?;
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  split_edge(grid, node0, node1, new_node)?;
  grid.nodes.age_reset(node0);
  grid.nodes.age_reset(node1);
  smooth::post_edge_split(grid, cad, config, new_node)?;
  Ok(OpOutcome::Applied)
}

/// Linear interpolation of coordinates and metric onto the new node.
fn interpolate_node(
  grid: &mut Grid,
  node0: usize,
  node1: usize,
  node1_weight: f64,
  new_node: usize,
) -> Result<()> {
  let xyz = (1.0 - node1_weight) * grid.nodes.xyz(node0) + node1_weight * grid.nodes.xyz(node1);
  grid.nodes.set_xyz(new_node, xyz)?;
  let metric = grid
    .nodes
    .metric(node0)
    .weighted(&grid.nodes.metric(node1), node1_weight);
  grid.nodes.set_metric(new_node, metric)?;
  Ok(())
}

/// The worst bisected cell must clear both the absolute floor and the
/// relative fraction of the cavity's pre-split minimum.
fn split_quality_ok(
  grid: &Grid,
  config: &AdaptConfig,
  node0: usize,
  node1: usize,
  new_node: usize,
) -> Result<bool> {
  let mut cavity_min = 1.0f64;
  let mut post_min = 1.0f64;

  for cell in grid.tet().list_with2(node0, node1) {
    let nodes = grid.tet().nodes(cell)?;
    cavity_min = cavity_min.min(tet_quality(&grid.nodes, nodes));
    for replace in [node0, node1] {
      let mut half: SmallVec<[usize; 4]> = SmallVec::from_slice(nodes);
      for slot in half.iter_mut() {
        if *slot == replace {
          *slot = new_node;
        }
      }
      post_min = post_min.min(tet_quality(&grid.nodes, &half));
    }
  }
  for cell in grid.tri().list_with2(node0, node1) {
    let nodes = grid.tri().nodes(cell)?;
    cavity_min = cavity_min.min(tri_quality(&grid.nodes, nodes));
    for replace in [node0, node1] {
      let mut half: SmallVec<[usize; 3]> = SmallVec::from_slice(nodes);
      for slot in half.iter_mut() {
        if *slot == replace {
          *slot = new_node;
        }
      }
      post_min = post_min.min(tri_quality(&grid.nodes, &half));
    }
  }

  let floor = config
    .split_quality_absolute
    .max(config.split_quality_relative * cavity_min);
  Ok(post_min >= floor)
}

/// Mechanical bisection: every tet, boundary triangle, and boundary
/// segment riding the edge is replaced by its two halves. Adjacency
/// tracks itself through add/remove.
pub fn split_edge(grid: &mut Grid, node0: usize, node1: usize, new_node: usize) -> Result<()> {
  for kind in [CellKind::Tet, CellKind::Tri, CellKind::Edg] {
    let cavity = grid.cell(kind).list_with2(node0, node1);
    for cell in cavity {
      let nodes: SmallVec<[usize; 8]> = SmallVec::from_slice(grid.cell(kind).nodes(cell)?);
      let id = if kind.has_id() {
        grid.cell(kind).id(cell)?
      } else {
        0
      };
      grid.cell_mut(kind).remove(cell)?;
      for replace in [node0, node1] {
        let mut half = nodes.clone();
        for slot in half.iter_mut() {
          if *slot == replace {
            *slot = new_node;
          }
        }
        grid.cell_mut(kind).add(&half, id)?;
      }
    }
  }
  Ok(())
}

// =============================================================================
// Two-layer split
// =============================================================================

/// Guarded prism-column split of a floor edge.
pub fn split_edge_twod_guarded(
  grid: &mut Grid,
  config: &AdaptConfig,
  node0: usize,
  node1: usize,
) -> Result<OpOutcome> {
  if !grid.nodes.valid(node0) || !grid.nodes.valid(node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if !grid.pri().has_side(node0, node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if ratio(&grid.nodes, node0, node1) <= config.split_ratio {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  // other volume kinds touching the column edge make it mixed
  for kind in [CellKind::Tet, CellKind::Pyr, CellKind::Hex] {
    if grid.cell(kind).has_side(node0, node1) {
      return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
    }
  }
  let rank = grid.rank;
  if !grid.pri().local_gem(&grid.nodes, node0, node1, rank) {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  let opp0 = twod::opposite_node(grid.pri(), node0)?;
  let opp1 = twod::opposite_node(grid.pri(), node1)?;

  let new_floor = grid.nodes.add_fresh(rank);
  interpolate_node(grid, node0, node1, 0.5, new_floor)?;
  let new_top = grid.nodes.add_fresh(rank);
  interpolate_node(grid, opp0, opp1, 0.5, new_top)?;

  // floor-triangle quality guard, mirroring the 3D relative rule
  let mut cavity_min = 1.0f64;
  let mut post_min = 1.0f64;
  for cell in grid.tri().list_with2(node0, node1) {
    let nodes = grid.tri().nodes(cell)?;
    cavity_min = cavity_min.min(tri_quality(&grid.nodes, nodes));
    for replace in [node0, node1] {
      let mut half: SmallVec<[usize; 3]> = SmallVec::from_slice(nodes);
      for slot in half.iter_mut() {
        if *slot == replace {
          *slot = new_floor;
        }
      }
      post_min = post_min.min(tri_quality(&grid.nodes, &half));
    }
  }
  let floor = config
    .split_quality_absolute
    .max(config.split_quality_relative * cavity_min);
  if post_min < floor {
    grid.remove_node(new_top)?;
    grid.remove_node(new_floor)?;
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  split_edge_twod(grid, node0, node1, opp0, opp1, new_floor, new_top)?;
  for node in [node0, node1, opp0, opp1] {
    grid.nodes.age_reset(node);
  }
  Ok(OpOutcome::Applied)
}

/// Mechanical column bisection: prisms split into prism pairs, both cap
/// triangles split with their layer's new node, and side quads under
/// the edge split into quad pairs.
pub fn split_edge_twod(
  grid: &mut Grid,
  node0: usize,
  node1: usize,
  opp0: usize,
  opp1: usize,
  new_floor: usize,
  new_top: usize,
) -> Result<()> {
  // prisms of the column
  let cavity = grid.pri().list_with2(node0, node1);
  for cell in cavity {
    let nodes: SmallVec<[usize; 8]> = SmallVec::from_slice(grid.pri().nodes(cell)?);
    grid.pri_mut().remove(cell)?;
    for (floor_sub, top_sub) in [(node1, opp1), (node0, opp0)] {
      let mut half = nodes.clone();
      for slot in half.iter_mut() {
        if *slot == floor_sub {
          *slot = new_floor;
        } else if *slot == top_sub {
          *slot = new_top;
        }
      }
      grid.pri_mut().add(&half, 0)?;
    }
  }

  // cap triangles, one layer at a time
  for (a, b, mid) in [(node0, node1, new_floor), (opp0, opp1, new_top)] {
    let cavity = grid.tri().list_with2(a, b);
    for cell in cavity {
      let nodes: SmallVec<[usize; 8]> = SmallVec::from_slice(grid.tri().nodes(cell)?);
      let id = grid.tri().id(cell)?;
      grid.tri_mut().remove(cell)?;
      for replace in [a, b] {
        let mut half = nodes.clone();
        for slot in half.iter_mut() {
          if *slot == replace {
            *slot = mid;
          }
        }
        grid.tri_mut().add(&half, id)?;
      }
    }
  }

  // the side quad under the edge
  let cavity = grid.qua().list_with2(node0, node1);
  for cell in cavity {
    let nodes: SmallVec<[usize; 8]> = SmallVec::from_slice(grid.qua().nodes(cell)?);
    let id = grid.qua().id(cell)?;
    grid.qua_mut().remove(cell)?;
    for (floor_sub, top_sub) in [(node1, opp1), (node0, opp0)] {
      let mut half = nodes.clone();
      for slot in half.iter_mut() {
        if *slot == floor_sub {
          *slot = new_floor;
        } else if *slot == top_sub {
          *slot = new_top;
        }
      }
      grid.qua_mut().add(&half, id)?;
    }
  }

  Ok(())
}

#[cfg(test)]
#[path = "split_test.rs"]
mod split_test;
