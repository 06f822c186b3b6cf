//! Node → incident-item index.
//!
//! One instance backs each cell arena (mapping a node to the cells that
//! reference it) and the CAD record store (mapping a node to its
//! parameter records). Entries are added and removed in lockstep with
//! the owning arena, so iteration enumerates each incident item exactly
//! once. The index is a rebuildable projection of the arena; it never
//! owns anything.

use smallvec::SmallVec;

use crate::error::{MeshError, Result};

/// Incidence lists, indexed by local node id.
#[derive(Clone, Debug, Default)]
pub struct Adjacency {
  items: Vec<SmallVec<[usize; 8]>>,
}

impl Adjacency {
  pub fn new() -> Self {
    Self::default()
  }

  fn ensure(&mut self, node: usize) {
    if node >= self.items.len() {
      self.items.resize_with(node + 1, SmallVec::new);
    }
  }

  /// Register `item` as incident to `node`.
  pub fn add(&mut self, node: usize, item: usize) {
    self.ensure(node);
    self.items[node].push(item);
  }

  /// Unregister `item` from `node`. Fatal if the pair is absent: the
  /// arena and the index have diverged.
  pub fn remove(&mut self, node: usize, item: usize) -> Result<()> {
    let list = self
      .items
      .get_mut(node)
      .ok_or_else(|| MeshError::Fatal(format!("adjacency has no node {node}")))?;
    match list.iter().position(|&i| i == item) {
      Some(at) => {
        list.swap_remove(at);
        Ok(())
      }
      None => Err(MeshError::Fatal(format!(
        "adjacency missing item {item} at node {node}"
      ))),
    }
  }

  /// Number of items incident to `node`.
  #[inline]
  pub fn degree(&self, node: usize) -> usize {
    self.items.get(node).map_or(0, |l| l.len())
  }

  /// True when nothing is incident to `node`.
  #[inline]
  pub fn empty(&self, node: usize) -> bool {
    self.degree(node) == 0
  }

  /// First incident item, if any.
  #[inline]
  pub fn first(&self, node: usize) -> Option<usize> {
    self.items.get(node).and_then(|l| l.first().copied())
  }

  /// Iterate the items incident to `node`, each exactly once.
  pub fn iter(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
    self.items.get(node).into_iter().flatten().copied()
  }

  /// Snapshot of the incidence list; operators that mutate the arena
  /// while walking a cavity iterate the copy.
  pub fn list(&self, node: usize) -> SmallVec<[usize; 8]> {
    self.items.get(node).cloned().unwrap_or_default()
  }
}
