//! Ghost node synchronization.
//!
//! After every operator sub-pass each rank rebuilds the set of nodes it
//! references but does not own, asks the owners for the authoritative
//! state, and overwrites its local ghost slots. Two phases per
//! direction: counts first, then payloads laid out with per-rank offset
//! prefixes, since the CAD-parameter records make the reply variable-length
//! (each node ships its record count, then its records).
//!
//! Pairwise message order is preserved by the transport, so a reply is
//! decoded in the same node order as the request that provoked it.

use smallvec::SmallVec;

use crate::comm::Collective;
use crate::error::{MeshError, Result};
use crate::geom::GeomType;
use crate::grid::Grid;
use crate::matrix::SymMat3;

/// Floats per node in the fixed part of a reply: xyz + metric.
const FLOATS_PER_NODE: usize = 9;

fn geom_type_code(ty: GeomType) -> i64 {
  match ty {
    GeomType::Node => 0,
    GeomType::Edge => 1,
    GeomType::Face => 2,
  }
}

fn geom_type_from(code: i64) -> Result<GeomType> {
  match code {
    0 => Ok(GeomType::Node),
    1 => Ok(GeomType::Edge),
    2 => Ok(GeomType::Face),
    _ => Err(MeshError::Fatal(format!("bad geom type code {code}"))),
  }
}

/// Pull owner-authoritative coords, metric, part, and CAD records into
/// every ghost slot of this rank.
pub fn ghost_sync(grid: &mut Grid, comm: &dyn Collective) -> Result<()> {
  let size = comm.size();
  if size == 1 {
    return Ok(());
  }
  let rank = comm.rank() as i32;

  // ---- phase 1: who do we need, grouped by owner -------------------------
  let mut want_local: Vec<Vec<usize>> = vec![Vec::new(); size];
  let mut want_global: Vec<Vec<i64>> = vec![Vec::new(); size];
  for node in grid.nodes.each_valid() {
    let part = grid.nodes.part(node);
    if part != rank {
      if part < 0 || part as usize >= size {
        return Err(MeshError::Fatal(format!(
          "node {node} owned by out-of-range rank {part}"
        )));
      }
      want_local[part as usize].push(node);
      want_global[part as usize].push(grid.nodes.global(node)?);
    }
  }

  let asked = comm.all_to_all_v_i64(want_global);

  // ---- phase 2: owners assemble replies ----------------------------------
  let mut reply_ints: Vec<Vec<i64>> = vec![Vec::new(); size];
  let mut reply_floats: Vec<Vec<f64>> = vec![Vec::new(); size];
  for (peer, globals) in asked.iter().enumerate() {
    for &global in globals {
      let node = grid.nodes.local(global).ok_or_else(|| {
        MeshError::Fatal(format!("rank {rank} asked for unknown global {global}"))
      })?;
      let xyz = grid.nodes.xyz(node);
      let metric = grid.nodes.metric(node);
      let records: SmallVec<[_; 4]> = grid
        .geom
        .records_of(node)
        .map(|(_, r)| (geom_type_code(r.ty), r.id as i64, r.jump as i64, r.degen as i64, r.param))
        .collect();

      let ints = &mut reply_ints[peer];
      ints.push(grid.nodes.part(node) as i64);
      ints.push(records.len() as i64);
      let floats = &mut reply_floats[peer];
      floats.extend_from_slice(&[xyz.x, xyz.y, xyz.z]);
      floats.extend_from_slice(&metric.0);
      for (ty, id, jump, degen, param) in records {
        ints.extend_from_slice(&[ty, id, jump, degen]);
        floats.extend_from_slice(&param);
      }
    }
  }

  let got_ints = comm.all_to_all_v_i64(reply_ints);
  let got_floats = comm.all_to_all_v_f64(reply_floats);

  // ---- phase 3: write ghost slots ----------------------------------------
  for peer in 0..size {
    let mut int_at = 0usize;
    let mut float_at = 0usize;
    let ints = &got_ints[peer];
    let floats = &got_floats[peer];
    for &node in &want_local[peer] {
      let part = ints[int_at] as i32;
      let nrecords = ints[int_at + 1] as usize;
      int_at += 2;

      let xyz = glam::DVec3::new(floats[float_at], floats[float_at + 1], floats[float_at + 2]);
      let mut metric = [0.0; 6];
      metric.copy_from_slice(&floats[float_at + 3..float_at + FLOATS_PER_NODE]);
      float_at += FLOATS_PER_NODE;

      grid.nodes.set_xyz(node, xyz)?;
      grid.nodes.set_metric(node, SymMat3(metric))?;
      grid.nodes.set_part(node, part)?;

      grid.geom.remove_all(node)?;
      for _ in 0..nrecords {
        let ty = geom_type_from(ints[int_at])?;
        let id = ints[int_at + 1] as i32;
        let jump = ints[int_at + 2] as i32;
        let degen = ints[int_at + 3] as i32;
        int_at += 4;
        let param = [floats[float_at], floats[float_at + 1]];
        float_at += 2;
        let geom = grid.geom.add(node, ty, id, param);
        grid.geom.set_jump(geom, jump)?;
        grid.geom.set_degen(geom, degen)?;
      }
    }
    if int_at != ints.len() || float_at != floats.len() {
      return Err(MeshError::Fatal(format!(
        "ghost reply from rank {peer} has trailing payload"
      )));
    }
  }

  Ok(())
}

#[cfg(test)]
#[path = "ghost_test.rs"]
mod ghost_test;
