//! Edge and face swap.
//!
//! Surface: the classic diagonal flip between two triangles sharing an
//! edge, taken only when the minimum metric quality strictly improves
//! and, on CAD faces, the normal deviation stays above the post
//! threshold.
//!
//! Volume: the 2↔3 exchange between two tets sharing a face and the
//! reverse 3↔2 around an interior edge ringed by exactly three tets.
//! A reconfiguration is accepted when its minimum quality beats the
//! current configuration's by a small margin.

use smallvec::SmallVec;
use tracing::debug;

use crate::config::AdaptConfig;
use crate::edge::EdgeTable;
use crate::error::{DeclineReason, OpOutcome, Result};
use crate::geom::{self, CadOracle};
use crate::grid::Grid;
use crate::quality::{tet_quality, tri_quality};

// =============================================================================
// Surface swap
// =============================================================================

/// One surface-swap sub-pass over the current triangulation.
pub fn surf_pass(grid: &mut Grid, cad: &dyn CadOracle, config: &AdaptConfig) -> Result<usize> {
  let table = EdgeTable::build(grid)?;
  let mut nswap = 0;
  for (_, [node0, node1]) in table.each() {
    if tri_edge_guarded(grid, cad, config, node0, node1)?.applied() {
      nswap += 1;
    }
  }
  debug!(nswap, "surface swap sub-pass");
  Ok(nswap)
}

/// Guarded diagonal flip of the surface edge `(node0, node1)`.
pub fn tri_edge_guarded(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  node0: usize,
  node1: usize,
) -> Result<OpOutcome> {
  if !grid.nodes.valid(node0) || !grid.nodes.valid(node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  let cavity = grid.tri().list_with2(node0, node1);
  if cavity.len() != 2 {
    return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
  }
  // a CAD edge is a feature line, never flipped across
  if grid.edg().has_side(node0, node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }
  let (t0, t1) = (cavity[0], cavity[1]);
  let id0 = grid.tri().id(t0)?;
  let id1 = grid.tri().id(t1)?;
  if id0 != id1 {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }

  let apex = |cell: usize| -> Result<usize> {
    let nodes = grid.tri().nodes(cell)?;
    nodes
      .iter()
      .copied()
      .find(|&n| n != node0 && n != node1)
      .ok_or_else(|| crate::error::MeshError::Fatal(format!("tri {cell} degenerate")))
  };
  let apex0 = apex(t0)?;
  let apex1 = apex(t1)?;
  if apex0 == apex1 || grid.tri().has_side(apex0, apex1) {
    return Ok(OpOutcome::Declined(DeclineReason::Manifold));
  }

  let rank = grid.rank;
  if [node0, node1, apex0, apex1]
    .iter()
    .any(|&n| !grid.nodes.owned(n, rank))
  {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  // orient the new pair consistently with the old: walk the quad cycle
  // node0 -> apex1 -> node1 -> apex0
  let old_nodes0: SmallVec<[usize; 4]> = SmallVec::from_slice(grid.tri().nodes(t0)?);
  let winding = {
    // position of node1 relative to node0 in t0 fixes the cycle sense
    let p0 = old_nodes0.iter().position(|&n| n == node0).unwrap_or(0);
    old_nodes0[(p0 + 1) % 3] == node1
  };
  let (new0, new1): ([usize; 3], [usize; 3]) = if winding {
    ([apex0, node0, apex1], [apex1, node1, apex0])
  } else {
    ([apex1, node0, apex0], [apex0, node1, apex1])
  };

  let before = tri_quality(&grid.nodes, grid.tri().nodes(t0)?)
    .min(tri_quality(&grid.nodes, grid.tri().nodes(t1)?));
  let after = tri_quality(&grid.nodes, &new0).min(tri_quality(&grid.nodes, &new1));
  if after <= before + config.swap_improvement {
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  if cad.loaded() {
    for tri in [&new0[..], &new1[..]] {
      if geom::tri_norm_deviation(grid, cad, tri, id0)? < config.post_min_normdev {
        return Ok(OpOutcome::Declined(DeclineReason::NormalDeviation));
      }
    }
  }

  grid.tri_mut().remove(t0)?;
  grid.tri_mut().remove(t1)?;
  grid.tri_mut().add(&new0, id0)?;
  grid.tri_mut().add(&new1, id0)?;
  for node in [node0, node1, apex0, apex1] {
    grid.nodes.age_reset(node);
  }
  Ok(OpOutcome::Applied)
}

// =============================================================================
// Volume swap
// =============================================================================

/// One volume-swap sub-pass: try 3↔2 around every interior edge, then
/// 2↔3 across every interior face that improves.
pub fn tet_pass(grid: &mut Grid, config: &AdaptConfig) -> Result<usize> {
  let mut nswap = 0;
  let table = EdgeTable::build(grid)?;
  for (_, [node0, node1]) in table.each() {
    if swap32_guarded(grid, config, node0, node1)?.applied() {
      nswap += 1;
    }
  }
  // faces move under us; snapshot the current tets first
  let tets: Vec<usize> = grid.tet().each_valid().collect();
  for cell in tets {
    if !grid.tet().valid(cell) {
      continue;
    }
    let faces: SmallVec<[[usize; 3]; 4]> = {
      let nodes = grid.tet().nodes(cell)?;
      crate::cell::CellKind::Tet
        .faces()
        .iter()
        .map(|f| [nodes[f[0]], nodes[f[1]], nodes[f[2]]])
        .collect()
    };
    for face in faces {
      if !grid.tet().valid(cell) {
        break;
      }
      if swap23_guarded(grid, config, &face)?.applied() {
        nswap += 1;
      }
    }
  }
  debug!(nswap, "volume swap sub-pass");
  Ok(nswap)
}

/// Replace the two tets sharing `face` with three around the new edge
/// joining their apexes.
pub fn swap23_guarded(
  grid: &mut Grid,
  config: &AdaptConfig,
  face: &[usize; 3],
) -> Result<OpOutcome> {
  let (Some(c0), Some(c1)) = grid.tet().with_face(&[face[0], face[1], face[2], face[0]])? else {
    return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
  };
  // a boundary triangle on the shared face pins it
  if grid.tri().with(face).is_some() {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }

  let other = |cell: usize| -> Result<usize> {
    grid
      .tet()
      .nodes(cell)?
      .iter()
      .copied()
      .find(|n| !face.contains(n))
      .ok_or_else(|| crate::error::MeshError::Fatal(format!("tet {cell} inside its own face")))
  };
  let apex0 = other(c0)?;
  let apex1 = other(c1)?;
  if grid.tet().has_side(apex0, apex1) {
    return Ok(OpOutcome::Declined(DeclineReason::Manifold));
  }
  let rank = grid.rank;
  if face
    .iter()
    .chain([apex0, apex1].iter())
    .any(|&n| !grid.nodes.owned(n, rank))
  {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  let mut candidates: SmallVec<[[usize; 4]; 3]> = SmallVec::new();
  for i in 0..3 {
    let (fa, fb) = (face[i], face[(i + 1) % 3]);
    let tet = [fa, fb, apex1, apex0];
    let fixed = if crate::quality::tet_vol(&grid.nodes, &tet) >= 0.0 {
      tet
    } else {
      [fa, fb, apex0, apex1]
    };
    candidates.push(fixed);
  }

  let before = tet_quality(&grid.nodes, grid.tet().nodes(c0)?)
    .min(tet_quality(&grid.nodes, grid.tet().nodes(c1)?));
  let after = candidates
    .iter()
    .map(|t| tet_quality(&grid.nodes, t))
    .fold(f64::INFINITY, f64::min);
  if after <= before + config.swap_improvement {
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  grid.tet_mut().remove(c0)?;
  grid.tet_mut().remove(c1)?;
  for tet in candidates {
    grid.tet_mut().add(&tet, 0)?;
  }
  Ok(OpOutcome::Applied)
}

/// Replace the three tets ringing the interior edge `(node0, node1)`
/// with the two sharing the ring triangle.
pub fn swap32_guarded(
  grid: &mut Grid,
  config: &AdaptConfig,
  node0: usize,
  node1: usize,
) -> Result<OpOutcome> {
  if !grid.nodes.valid(node0) || !grid.nodes.valid(node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  let ring = grid.tet().list_with2(node0, node1);
  if ring.len() != 3 {
    return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
  }
  // the edge must be interior
  if grid.tri().has_side(node0, node1) || grid.edg().has_side(node0, node1) {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }

  let mut ring_nodes: SmallVec<[usize; 3]> = SmallVec::new();
  for &cell in &ring {
    for &n in grid.tet().nodes(cell)? {
      if n != node0 && n != node1 && !ring_nodes.contains(&n) {
        ring_nodes.push(n);
      }
    }
  }
  if ring_nodes.len() != 3 {
    return Ok(OpOutcome::Declined(DeclineReason::Manifold));
  }
  let rank = grid.rank;
  if ring_nodes
    .iter()
    .chain([node0, node1].iter())
    .any(|&n| !grid.nodes.owned(n, rank))
  {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  let [a, b, c] = [ring_nodes[0], ring_nodes[1], ring_nodes[2]];
  let mut new0 = [a, b, c, node0];
  if crate::quality::tet_vol(&grid.nodes, &new0) < 0.0 {
    new0 = [a, c, b, node0];
  }
  let mut new1 = [a, c, b, node1];
  if crate::quality::tet_vol(&grid.nodes, &new1) < 0.0 {
    new1 = [a, b, c, node1];
  }

  let mut before = f64::INFINITY;
  for &cell in &ring {
    before = before.min(tet_quality(&grid.nodes, grid.tet().nodes(cell)?));
  }
  let after = tet_quality(&grid.nodes, &new0).min(tet_quality(&grid.nodes, &new1));
  if after <= before + config.swap_improvement {
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  for cell in ring {
    grid.tet_mut().remove(cell)?;
  }
  grid.tet_mut().add(&new0, 0)?;
  grid.tet_mut().add(&new1, 0)?;
  Ok(OpOutcome::Applied)
}

#[cfg(test)]
#[path = "swap_test.rs"]
mod swap_test;
