//! Node arena: coordinates, metric, global id, owner, age.
//!
//! Local indices are dense but not compact: removal returns the slot to
//! a free list and later insertions reuse it, so indices stay bounded
//! through many adapt passes. The 64-bit global id is invariant across
//! partitions; a hash map carries the global→local direction.
//!
//! Batch insertion (mesh load, ghost sync) allocates provisional globals
//! that are made rank-unique afterwards by [`NodeStore::shift_new_globals`].

use std::collections::HashMap;

use glam::DVec3;

use crate::comm::Collective;
use crate::error::{MeshError, Result};
use crate::matrix::SymMat3;

/// External supplier of the adaptation metric, keyed by global id.
/// Queried at startup and between adapt cycles; never during a pass.
pub trait MetricSource {
  fn metric(&self, global: i64) -> Result<SymMat3>;
}

/// One valid node record.
#[derive(Clone, Debug)]
pub struct Node {
  pub xyz: DVec3,
  pub metric: SymMat3,
  pub global: i64,
  pub part: i32,
  pub age: i32,
}

#[derive(Clone, Debug)]
enum Slot {
  Free,
  Used(Node),
}

/// Slotted node arena with free-list reuse.
#[derive(Clone, Debug, Default)]
pub struct NodeStore {
  slots: Vec<Slot>,
  free: Vec<usize>,
  global_to_local: HashMap<i64, usize>,
  /// Global-id space size agreed across ranks.
  n_global: i64,
  /// Locals holding provisional globals, pending a shift.
  unshifted: Vec<usize>,
}

impl NodeStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of valid nodes.
  pub fn n(&self) -> usize {
    self.slots.len() - self.free.len()
  }

  /// Slot-space upper bound for index iteration.
  pub fn max(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub fn valid(&self, node: usize) -> bool {
    matches!(self.slots.get(node), Some(Slot::Used(_)))
  }

  fn used(&self, node: usize) -> Result<&Node> {
    match self.slots.get(node) {
      Some(Slot::Used(n)) => Ok(n),
      _ => Err(MeshError::Fatal(format!("node {node} is not valid"))),
    }
  }

  fn used_mut(&mut self, node: usize) -> Result<&mut Node> {
    match self.slots.get_mut(node) {
      Some(Slot::Used(n)) => Ok(n),
      _ => Err(MeshError::Fatal(format!("node {node} is not valid"))),
    }
  }

  /// Iterate valid local indices in slot order.
  pub fn each_valid(&self) -> impl Iterator<Item = usize> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, s)| matches!(s, Slot::Used(_)))
      .map(|(i, _)| i)
  }

  // ===========================================================================
  // Allocation
  // ===========================================================================

  fn insert(&mut self, record: Node) -> usize {
    let global = record.global;
    let local = match self.free.pop() {
      Some(slot) => {
        self.slots[slot] = Slot::Used(record);
        slot
      }
      None => {
        self.slots.push(Slot::Used(record));
        self.slots.len() - 1
      }
    };
    self.global_to_local.insert(global, local);
    local
  }

  /// Allocate (or find) the local slot for a global id. Idempotent:
  /// re-adding a known global returns its existing local unchanged.
  pub fn add_global(&mut self, global: i64, part: i32) -> usize {
    if let Some(&local) = self.global_to_local.get(&global) {
      return local;
    }
    self.n_global = self.n_global.max(global + 1);
    self.insert(Node {
      xyz: DVec3::ZERO,
      metric: SymMat3::IDENTITY,
      global,
      part,
      age: 0,
    })
  }

  /// Allocate a fresh node with a provisional global id (owned by
  /// `part`). Call [`Self::shift_new_globals`] after the batch.
  pub fn add_fresh(&mut self, part: i32) -> usize {
    let global = self.n_global;
    self.n_global += 1;
    let local = self.insert(Node {
      xyz: DVec3::ZERO,
      metric: SymMat3::IDENTITY,
      global,
      part,
      age: 0,
    });
    self.unshifted.push(local);
    local
  }

  /// Remove a node and recycle its slot.
  pub fn remove(&mut self, node: usize) -> Result<()> {
    let global = self.used(node)?.global;
    self.global_to_local.remove(&global);
    self.slots[node] = Slot::Free;
    self.free.push(node);
    self.unshifted.retain(|&l| l != node);
    Ok(())
  }

  /// Make provisional globals unique across ranks: every rank shifts its
  /// batch by the number of new globals on lower ranks, and the agreed
  /// global count grows by the all-rank sum.
  pub fn shift_new_globals(&mut self, comm: &dyn Collective) -> Result<()> {
    let counts = comm.all_gather_i64(self.unshifted.len() as i64);
    let total: i64 = counts.iter().sum();
    if total == 0 {
      return Ok(());
    }
    let before: i64 = counts[..comm.rank()].iter().sum();
    let old_base = self.n_global - self.unshifted.len() as i64;
    // drop every provisional entry first; the shifted range overlaps the
    // provisional one, so interleaving removes with inserts would clobber
    for &local in &self.unshifted {
      let node = match &self.slots[local] {
        Slot::Used(n) => n,
        Slot::Free => return Err(MeshError::Fatal(format!("unshifted node {local} freed"))),
      };
      self.global_to_local.remove(&node.global);
    }
    for &local in &self.unshifted {
      let node = match &mut self.slots[local] {
        Slot::Used(n) => n,
        Slot::Free => unreachable!(),
      };
      node.global += before;
      self.global_to_local.insert(node.global, local);
    }
    self.n_global = old_base + total;
    self.unshifted.clear();
    Ok(())
  }

  // ===========================================================================
  // Lookup and field access
  // ===========================================================================

  pub fn local(&self, global: i64) -> Option<usize> {
    self.global_to_local.get(&global).copied()
  }

  pub fn global(&self, node: usize) -> Result<i64> {
    Ok(self.used(node)?.global)
  }

  pub fn xyz(&self, node: usize) -> DVec3 {
    match self.slots.get(node) {
      Some(Slot::Used(n)) => n.xyz,
      _ => DVec3::ZERO,
    }
  }

  pub fn set_xyz(&mut self, node: usize, xyz: DVec3) -> Result<()> {
    self.used_mut(node)?.xyz = xyz;
    Ok(())
  }

  pub fn metric(&self, node: usize) -> SymMat3 {
    match self.slots.get(node) {
      Some(Slot::Used(n)) => n.metric,
      _ => SymMat3::IDENTITY,
    }
  }

  pub fn set_metric(&mut self, node: usize, metric: SymMat3) -> Result<()> {
    self.used_mut(node)?.metric = metric;
    Ok(())
  }

  pub fn part(&self, node: usize) -> i32 {
    match self.slots.get(node) {
      Some(Slot::Used(n)) => n.part,
      _ => -1,
    }
  }

  pub fn set_part(&mut self, node: usize, part: i32) -> Result<()> {
    self.used_mut(node)?.part = part;
    Ok(())
  }

  /// Owned means valid and resident on this rank.
  pub fn owned(&self, node: usize, rank: i32) -> bool {
    matches!(self.slots.get(node), Some(Slot::Used(n)) if n.part == rank)
  }

  pub fn age(&self, node: usize) -> i32 {
    match self.slots.get(node) {
      Some(Slot::Used(n)) => n.age,
      _ => 0,
    }
  }

  pub fn age_increment(&mut self, node: usize) {
    if let Some(Slot::Used(n)) = self.slots.get_mut(node) {
      n.age += 1;
    }
  }

  pub fn age_reset(&mut self, node: usize) {
    if let Some(Slot::Used(n)) = self.slots.get_mut(node) {
      n.age = 0;
    }
  }

  /// Overwrite every valid node's metric from an external source.
  /// Unhealthy tensors are rejected with the offending global id.
  pub fn refresh_metric(&mut self, source: &dyn MetricSource) -> Result<()> {
    let locals: Vec<usize> = self.each_valid().collect();
    for local in locals {
      let global = self.global(local)?;
      let metric = source.metric(global)?;
      if !metric.healthy() {
        return Err(MeshError::Fatal(format!(
          "metric source returned an indefinite tensor for global {global}"
        )));
      }
      self.used_mut(local)?.metric = metric;
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
