//! Adaptation driver.
//!
//! One outer pass: survey the mesh, derive the adaptive thresholds,
//! then run the operator sub-passes: collapse, (re-survey), split,
//! surface swap, smooth, surface swap again. Every sub-pass ends at a
//! global barrier that also synchronizes ghosts, so cross-rank effects
//! become visible exactly once per sub-pass.
//!
//! Termination is proposed locally (the post ratio band moved less than
//! one percent and nobody is starving) and agreed by broadcast.

use rayon::prelude::*;
use tracing::info;

use crate::cell::CellKind;
use crate::comm::Collective;
use crate::config::{AdaptConfig, MAX_NODE_AGE, RATIO_CONVERGENCE};
use crate::edge::EdgeTable;
use crate::error::Result;
use crate::geom::{self, CadOracle};
use crate::ghost::ghost_sync;
use crate::grid::Grid;
use crate::quality::{ratio, tet_quality, tet_vol, tri_area, tri_quality};
use crate::{collapse, smooth, split, swap, twod};

/// Globally-reduced mesh health measures from one parameter survey.
#[derive(Clone, Copy, Debug, Default)]
pub struct Survey {
  pub min_quality: f64,
  pub min_volume: f64,
  pub max_volume: f64,
  pub complexity: f64,
  pub ncell: i64,
  pub nnode: i64,
  pub nodes_per_complexity: f64,
  pub max_degree: i64,
  pub max_age: i64,
  pub min_normdev: f64,
  pub min_ratio: f64,
  pub max_ratio: f64,
}

/// Survey the mesh, update the adaptive thresholds, and propose
/// termination. All ranks agree on the outcome.
pub fn parameter(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &mut AdaptConfig,
  comm: &dyn Collective,
) -> Result<(Survey, bool)> {
  let rank = grid.rank;
  let kind = grid.survey_kind();
  let store = grid.cell(kind);

  // local per-cell folds, read-only and embarrassingly parallel
  let cells: Vec<usize> = store.each_valid().collect();
  let (mut min_quality, mut min_volume, mut max_volume) = (1.0f64, f64::INFINITY, f64::NEG_INFINITY);
  let mut complexity = 0.0f64;
  let mut ncell = 0i64;
  let folded: Vec<(f64, f64, f64)> = cells
    .par_iter()
    .map(|&cell| {
      let nodes = store.nodes(cell).unwrap_or(&[]);
      if nodes.is_empty() || (grid.twod && !twod::node_active(grid, nodes[0])) {
        return (1.0, f64::INFINITY, f64::NEG_INFINITY);
      }
      let (quality, volume) = match kind {
        CellKind::Tet => (tet_quality(&grid.nodes, nodes), tet_vol(&grid.nodes, nodes)),
        _ => (tri_quality(&grid.nodes, nodes), tri_area(&grid.nodes, nodes)),
      };
      (quality, volume, volume)
    })
    .collect();
  for (quality, vol_min, vol_max) in folded {
    min_quality = min_quality.min(quality);
    min_volume = min_volume.min(vol_min);
    max_volume = max_volume.max(vol_max);
  }
  for &cell in &cells {
    let nodes = store.nodes(cell)?;
    if grid.twod && !twod::node_active(grid, nodes[0]) {
      continue;
    }
    let volume = match kind {
      CellKind::Tet => tet_vol(&grid.nodes, nodes),
      _ => tri_area(&grid.nodes, nodes),
    };
    for &node in nodes {
      if grid.nodes.owned(node, rank) {
        let det = grid.nodes.metric(node).det();
        if det > 0.0 {
          complexity += det.sqrt() * volume / (kind.node_per() as f64);
        }
      }
    }
    if store.part(&grid.nodes, cell)? == rank {
      ncell += 1;
    }
  }

  let min_quality = comm.all_min_f64(min_quality);
  let min_volume = comm.all_min_f64(min_volume);
  let max_volume = comm.all_max_f64(max_volume);
  let complexity = comm.all_sum_f64(complexity);
  let ncell = comm.all_sum_i64(ncell);

  let mut nnode = grid
    .nodes
    .each_valid()
    .filter(|&n| grid.nodes.owned(n, rank))
    .count() as i64;
  nnode = comm.all_sum_i64(nnode);
  if grid.twod {
    nnode /= 2;
  }
  let nodes_per_complexity = if complexity > 0.0 {
    nnode as f64 / complexity
  } else {
    0.0
  };

  let mut max_degree = 0i64;
  let mut max_age = 0i64;
  for node in grid.nodes.each_valid() {
    max_degree = max_degree.max(store.adj().degree(node) as i64);
    max_age = max_age.max(grid.nodes.age(node) as i64);
  }
  let max_degree = comm.all_max_i64(max_degree);
  let max_age = comm.all_max_i64(max_age);

  let mut min_normdev = 2.0f64;
  if cad.loaded() {
    let tris: Vec<usize> = grid.tri().each_valid().collect();
    for cell in tris {
      let nodes: Vec<usize> = grid.tri().nodes(cell)?.to_vec();
      let id = grid.tri().id(cell)?;
      min_normdev = min_normdev.min(geom::tri_norm_deviation(grid, cad, &nodes, id)?);
    }
  }
  let min_normdev = comm.all_min_f64(min_normdev);

  let table = EdgeTable::build(grid)?;
  let mut min_ratio = f64::INFINITY;
  let mut max_ratio = f64::NEG_INFINITY;
  for (edge, [node0, node1]) in table.each() {
    if table.part(grid, edge)? != rank {
      continue;
    }
    if grid.twod && !(twod::node_active(grid, node0) && twod::node_active(grid, node1)) {
      continue;
    }
    let r = ratio(&grid.nodes, node0, node1);
    min_ratio = min_ratio.min(r);
    max_ratio = max_ratio.max(r);
  }
  let min_ratio = comm.all_min_f64(min_ratio);
  let max_ratio = comm.all_max_f64(max_ratio);

  // ---- adaptive thresholds ------------------------------------------------
  config.post_min_normdev = min_normdev.min(0.1).max(1.0e-3);
  let target_quality = min_quality.min(0.1).max(1.0e-3);
  config.collapse_quality_absolute = target_quality;
  config.smooth_min_quality = target_quality;

  let old_min_ratio = config.post_min_ratio;
  let old_max_ratio = config.post_max_ratio;
  config.post_min_ratio = min_ratio.min(config.collapse_ratio);
  config.post_max_ratio = max_ratio.max(config.split_ratio);
  // a wildly long edge means the short side must widen or nothing moves
  if config.post_max_ratio > 4.0 && config.post_min_ratio > 0.4 {
    config.post_min_ratio *= 4.0 / config.post_max_ratio;
  }

  let converged = (old_min_ratio - config.post_min_ratio).abs()
    < RATIO_CONVERGENCE * old_min_ratio
    && (old_max_ratio - config.post_max_ratio).abs() < RATIO_CONVERGENCE * old_max_ratio
    && max_age < MAX_NODE_AGE as i64;
  let all_done = comm.bcast_bool(converged, 0);

  let survey = Survey {
    min_quality,
    min_volume,
    max_volume,
    complexity,
    ncell,
    nnode,
    nodes_per_complexity,
    max_degree,
    max_age,
    min_normdev,
    min_ratio,
    max_ratio,
  };

  if comm.rank() == 0 {
    info!(
      target_quality,
      post_min_normdev = config.post_min_normdev,
      post_min_ratio = config.post_min_ratio,
      post_max_ratio = config.post_max_ratio,
      "adapt limits"
    );
    info!(
      max_degree,
      max_age, min_normdev, nnode, complexity, nodes_per_complexity, ncell, "adapt survey"
    );
    if all_done {
      info!("termination recommended");
    }
  }

  Ok((survey, all_done))
}

/// Fitness snapshot between sub-passes (watch mode).
fn tattle(grid: &mut Grid, cad: &dyn CadOracle, config: &AdaptConfig, comm: &dyn Collective) -> Result<()> {
  let (survey, _) = {
    // the survey mutates thresholds; run it on a scratch copy
    let mut scratch = config.clone();
    parameter(grid, cad, &mut scratch, comm)?
  };
  if comm.rank() == 0 {
    info!(
      quality_met = survey.min_quality >= config.smooth_min_quality,
      short_met = survey.min_ratio >= config.post_min_ratio,
      long_met = survey.max_ratio <= config.post_max_ratio,
      normdev_met = survey.min_normdev >= config.post_min_normdev,
      min_quality = survey.min_quality,
      min_ratio = survey.min_ratio,
      max_ratio = survey.max_ratio,
      nnode = survey.nnode,
      "tattle"
    );
  }
  Ok(())
}

/// Barrier after a sub-pass: ghost refresh plus optional topo audit.
fn barrier(grid: &mut Grid, comm: &dyn Collective, audited: bool) -> Result<()> {
  ghost_sync(grid, comm)?;
  if audited {
    grid.audit()?;
  }
  Ok(())
}

/// One full adaptation pass. Returns `true` when all ranks agree the
/// mesh has stopped moving.
pub fn pass(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &mut AdaptConfig,
  comm: &dyn Collective,
) -> Result<bool> {
  let audited = config.watch_param;
  let (_, all_done) = parameter(grid, cad, config, comm)?;
  if config.watch_param {
    tattle(grid, cad, config, comm)?;
  }

  for _ in 0..config.collapse_per_pass {
    collapse::pass(grid, cad, config, comm)?;
    barrier(grid, comm, audited)?;
    if config.watch_param {
      tattle(grid, cad, config, comm)?;
    }
  }

  // a mesh already close in band gets fresh thresholds before splitting
  if config.post_max_ratio < 3.0 {
    parameter(grid, cad, config, comm)?;
  }

  for _ in 0..config.split_per_pass {
    split::pass(grid, cad, config, comm)?;
    barrier(grid, comm, audited)?;
    if config.watch_param {
      tattle(grid, cad, config, comm)?;
    }
  }

  if grid.surf {
    for _ in 0..config.swap_per_pass {
      swap::surf_pass(grid, cad, config)?;
      barrier(grid, comm, audited)?;
    }
  }

  for _ in 0..config.smooth_per_pass {
    smooth::pass(grid, cad, config)?;
    barrier(grid, comm, audited)?;
    if config.watch_param {
      tattle(grid, cad, config, comm)?;
    }
  }

  if grid.surf {
    for _ in 0..config.swap_per_pass {
      swap::surf_pass(grid, cad, config)?;
      barrier(grid, comm, audited)?;
    }
  }

  Ok(all_done)
}

/// Run passes until the ranks agree the mesh is done or the pass budget
/// runs out. Returns the number of passes executed.
pub fn drive(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &mut AdaptConfig,
  comm: &dyn Collective,
  max_passes: usize,
) -> Result<usize> {
  for i in 0..max_passes {
    if pass(grid, cad, config, comm)? {
      return Ok(i + 1);
    }
  }
  Ok(max_passes)
}

#[cfg(test)]
#[path = "adapt_test.rs"]
mod adapt_test;
