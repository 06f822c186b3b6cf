//! Edge collapse.
//!
//! A short edge (metric ratio below the collapse threshold) is removed
//! by welding one endpoint onto the other: cells containing both
//! endpoints vanish, cells containing only the removed node are
//! rewritten in place, and the removed node (with all of its CAD
//! records) leaves the mesh. The keep node keeps its position and
//! metric.
//!
//! The operator tries the ordered pair as given; the pass tries both
//! directions before giving up on an edge. Every guard declines rather
//! than errors.

use smallvec::SmallVec;
use tracing::debug;

use crate::cell::CellKind;
use crate::comm::Collective;
use crate::config::AdaptConfig;
use crate::edge::EdgeTable;
use crate::error::{DeclineReason, OpOutcome, Result};
use crate::geom::{self, CadOracle, GeomType};
use crate::grid::Grid;
use crate::math::try_unit;
use crate::quality::{ratio, tet_quality, tri_normal, tri_quality};
use crate::twod;

/// One collapse sub-pass. Returns the number of committed collapses.
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
    if r < config.collapse_ratio {
      marked.push((r, node0, node1));
    }
  }
  // shortest first
  marked.sort_by(|a, b| a.0.total_cmp(&b.0));

  let mut ncollapse = 0;
  let mut ndecline = 0;
  for (_, node0, node1) in marked {
    if !grid.nodes.valid(node0) || !grid.nodes.valid(node1) {
      continue;
    }
    let mut outcome = edge_guarded(grid, cad, config, node0, node1)?;
    if !outcome.applied() {
      outcome = edge_guarded(grid, cad, config, node1, node0)?;
    }
    match outcome {
      OpOutcome::Applied => ncollapse += 1,
      OpOutcome::Declined(DeclineReason::Locality) => {
        grid.nodes.age_increment(node0);
        grid.nodes.age_increment(node1);
        ndecline += 1;
      }
      OpOutcome::Declined(_) => ndecline += 1,
    }
  }
  debug!(ncollapse, ndecline, "collapse sub-pass");

  grid.nodes.shift_new_globals(comm)?;
  Ok(ncollapse)
}

/// All guards, then commit: weld `remove` onto `keep`.
pub fn edge_guarded(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  keep: usize,
  remove: usize,
) -> Result<OpOutcome> {
  if grid.twod {
    return column_guarded(grid, config, keep, remove);
  }

  // CAD topology vertices are pinned
  if grid.geom.is_a(remove, GeomType::Node) {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }
  let r = ratio(&grid.nodes, keep, remove);
  if r >= config.collapse_ratio {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if !cad_constrained_ok(grid, keep, remove) {
    return Ok(OpOutcome::Declined(DeclineReason::Geometry));
  }
  if grid.mixed_cell_near_edge(keep, remove) {
    return Ok(OpOutcome::Declined(DeclineReason::MixedKind));
  }
  if !local_around(grid, remove) {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }
  if !manifold_ok(grid, keep, remove)? {
    return Ok(OpOutcome::Declined(DeclineReason::Manifold));
  }
  if !surface_weld_ok(grid, cad, config, keep, remove)? {
    return Ok(OpOutcome::Declined(DeclineReason::NormalDeviation));
  }
  if !quality_ok(grid, config, keep, remove)? {
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  commit(grid, keep, remove)?;
  grid.nodes.age_reset(keep);
  Ok(OpOutcome::Applied)
}

/// The removed node's CAD support must be a subset of the keeper's:
/// same edge ids, same face ids.
fn cad_constrained_ok(grid: &Grid, keep: usize, remove: usize) -> bool {
  for (_, record) in grid.geom.records_of(remove) {
    match record.ty {
      GeomType::Node => return false,
      GeomType::Edge | GeomType::Face => {
        if grid.geom.find(keep, record.ty, record.id).is_none() {
          return false;
        }
      }
    }
  }
  true
}

/// Every cell of every kind around the removed node must be fully
/// owned here, because the whole cavity is rewritten.
fn local_around(grid: &Grid, remove: usize) -> bool {
  let rank = grid.rank;
  for kind in CellKind::ALL {
    let store = grid.cell(kind);
    for cell in store.adj().iter(remove) {
      let Ok(nodes) = store.nodes(cell) else {
        return false;
      };
      if nodes.iter().any(|&n| !grid.nodes.owned(n, rank)) {
        return false;
      }
    }
  }
  true
}

/// Substituted cells must stay non-degenerate and must not duplicate a
/// surviving cell's node set.
fn manifold_ok(grid: &Grid, keep: usize, remove: usize) -> Result<bool> {
  for kind in [CellKind::Tet, CellKind::Tri, CellKind::Edg] {
    let store = grid.cell(kind);
    for cell in store.adj().iter(remove) {
      let nodes = store.nodes(cell)?;
      if nodes.contains(&keep) {
        continue; // collapsing cell, it disappears
      }
      let mut welded: SmallVec<[usize; 8]> = SmallVec::from_slice(nodes);
      for slot in welded.iter_mut() {
        if *slot == remove {
          *slot = keep;
        }
      }
      let mut set = welded.clone();
      set.sort_unstable();
      set.dedup();
      if set.len() != kind.node_per() {
        return Ok(false);
      }
      if store.with(&welded).is_some() {
        return Ok(false);
      }
    }
  }
  Ok(true)
}

/// Surface guards on the triangles welded onto the keeper: chord height
/// in the metric, agreement with the pre-weld normal, and (with CAD)
/// the post normal-deviation floor.
fn surface_weld_ok(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  keep: usize,
  remove: usize,
) -> Result<bool> {
  let updating: SmallVec<[usize; 8]> = grid
    .tri()
    .adj()
    .list(remove)
    .into_iter()
    .filter(|&cell| {
      grid
        .tri()
        .nodes(cell)
        .map(|nodes| !nodes.contains(&keep))
        .unwrap_or(false)
    })
    .collect();

  for cell in updating {
    let nodes: SmallVec<[usize; 4]> = SmallVec::from_slice(grid.tri().nodes(cell)?);
    let id = grid.tri().id(cell)?;
    let before = tri_normal(&grid.nodes, &nodes);
    let mut welded = nodes.clone();
    for slot in welded.iter_mut() {
      if *slot == remove {
        *slot = keep;
      }
    }
    let after = tri_normal(&grid.nodes, &welded);

    let (Some(before), Some(after)) = (try_unit(before), try_unit(after)) else {
      return Ok(false);
    };
    if before.dot(after) < config.collapse_same_normal {
      return Ok(false);
    }

    // chord height: metric distance from the removed node to the welded
    // plane, measured in the removed node's metric
    let offset = grid.nodes.xyz(remove) - grid.nodes.xyz(keep);
    let height = offset.dot(after).abs();
    if grid.nodes.metric(remove).length(height * after) > config.collapse_chord_height {
      return Ok(false);
    }

    if cad.loaded() {
      let normdev = geom::tri_norm_deviation(grid, cad, &welded, id)?;
      if normdev < config.post_min_normdev {
        return Ok(false);
      }
    }
  }
  Ok(true)
}

/// Every surviving cell around the removed node keeps its quality above
/// the adaptive absolute floor.
fn quality_ok(grid: &Grid, config: &AdaptConfig, keep: usize, remove: usize) -> Result<bool> {
  for kind in [CellKind::Tet, CellKind::Tri] {
    let store = grid.cell(kind);
    for cell in store.adj().iter(remove) {
      let nodes = store.nodes(cell)?;
      if nodes.contains(&keep) {
        continue;
      }
      let mut welded: SmallVec<[usize; 8]> = SmallVec::from_slice(nodes);
      for slot in welded.iter_mut() {
        if *slot == remove {
          *slot = keep;
        }
      }
      let quality = match kind {
        CellKind::Tet => tet_quality(&grid.nodes, &welded),
        _ => tri_quality(&grid.nodes, &welded),
      };
      if quality < config.collapse_quality_absolute {
        return Ok(false);
      }
    }
  }
  Ok(true)
}

/// Delete collapsing cells, rewrite updating ones, drop the node.
fn commit(grid: &mut Grid, keep: usize, remove: usize) -> Result<()> {
  for kind in CellKind::ALL {
    let collapsing = grid.cell(kind).list_with2(keep, remove);
    for cell in collapsing {
      grid.cell_mut(kind).remove(cell)?;
    }
    grid.cell_mut(kind).replace_node(remove, keep)?;
  }
  grid.remove_node(remove)
}

// =============================================================================
// Two-layer collapse
// =============================================================================

/// Collapse a floor edge and its mirrored top edge in lockstep.
fn column_guarded(
  grid: &mut Grid,
  config: &AdaptConfig,
  keep: usize,
  remove: usize,
) -> Result<OpOutcome> {
  let r = ratio(&grid.nodes, keep, remove);
  if r >= config.collapse_ratio {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if !grid.pri().has_side(keep, remove) {
    return Ok(OpOutcome::Declined(DeclineReason::Ratio));
  }
  if !local_around(grid, remove) {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }
  let keep_top = twod::opposite_node(grid.pri(), keep)?;
  let remove_top = twod::opposite_node(grid.pri(), remove)?;
  if !local_around(grid, remove_top) {
    return Ok(OpOutcome::Declined(DeclineReason::Locality));
  }

  // floor triangulation guards carry the column
  if !manifold_ok(grid, keep, remove)? {
    return Ok(OpOutcome::Declined(DeclineReason::Manifold));
  }
  if !quality_ok(grid, config, keep, remove)? {
    return Ok(OpOutcome::Declined(DeclineReason::Quality));
  }

  commit(grid, keep, remove)?;
  commit(grid, keep_top, remove_top)?;
  grid.nodes.age_reset(keep);
  grid.nodes.age_reset(keep_top);
  Ok(OpOutcome::Applied)
}

#[cfg(test)]
#[path = "collapse_test.rs"]
mod collapse_test;
