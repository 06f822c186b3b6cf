//! The grid: node store, one cell arena per kind, CAD records.
//!
//! Everything an operator touches hangs off this context object; its
//! lifetime is one adapt invocation. Cross-references between stores
//! are plain indices; the node->cell adjacency inside each arena is a
//! rebuildable projection, never ownership.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::cell::{CellKind, CellStore};
use crate::error::{MeshError, Result};
use crate::geom::GeomStore;
use crate::node::NodeStore;

/// A partitioned simplicial mesh with CAD attachment.
#[derive(Clone, Debug)]
pub struct Grid {
  pub nodes: NodeStore,
  pub geom: GeomStore,

  edg: CellStore,
  tri: CellStore,
  qua: CellStore,
  tet: CellStore,
  pyr: CellStore,
  pri: CellStore,
  hex: CellStore,

  /// Extruded one-layer-of-prisms representation of a 2D problem.
  pub twod: bool,
  /// Pure surface (triangles only) adaptation.
  pub surf: bool,
  /// This rank; operators gate on it, ghost exchange refreshes it.
  pub rank: i32,
}

impl Grid {
  pub fn new(rank: i32) -> Self {
    Self {
      nodes: NodeStore::new(),
      geom: GeomStore::new(),
      edg: CellStore::new(CellKind::Edg),
      tri: CellStore::new(CellKind::Tri),
      qua: CellStore::new(CellKind::Qua),
      tet: CellStore::new(CellKind::Tet),
      pyr: CellStore::new(CellKind::Pyr),
      pri: CellStore::new(CellKind::Pri),
      hex: CellStore::new(CellKind::Hex),
      twod: false,
      surf: false,
      rank,
    }
  }

  // ===========================================================================
  // Store access
  // ===========================================================================

  pub fn edg(&self) -> &CellStore {
    &self.edg
  }
  pub fn tri(&self) -> &CellStore {
    &self.tri
  }
  pub fn qua(&self) -> &CellStore {
    &self.qua
  }
  pub fn tet(&self) -> &CellStore {
    &self.tet
  }
  pub fn pyr(&self) -> &CellStore {
    &self.pyr
  }
  pub fn pri(&self) -> &CellStore {
    &self.pri
  }
  pub fn hex(&self) -> &CellStore {
    &self.hex
  }

  pub fn edg_mut(&mut self) -> &mut CellStore {
    &mut self.edg
  }
  pub fn tri_mut(&mut self) -> &mut CellStore {
    &mut self.tri
  }
  pub fn qua_mut(&mut self) -> &mut CellStore {
    &mut self.qua
  }
  pub fn tet_mut(&mut self) -> &mut CellStore {
    &mut self.tet
  }
  pub fn pyr_mut(&mut self) -> &mut CellStore {
    &mut self.pyr
  }
  pub fn pri_mut(&mut self) -> &mut CellStore {
    &mut self.pri
  }
  pub fn hex_mut(&mut self) -> &mut CellStore {
    &mut self.hex
  }

  pub fn cell(&self, kind: CellKind) -> &CellStore {
    match kind {
      CellKind::Edg => &self.edg,
      CellKind::Tri => &self.tri,
      CellKind::Qua => &self.qua,
      CellKind::Tet => &self.tet,
      CellKind::Pyr => &self.pyr,
      CellKind::Pri => &self.pri,
      CellKind::Hex => &self.hex,
    }
  }

  pub fn cell_mut(&mut self, kind: CellKind) -> &mut CellStore {
    match kind {
      CellKind::Edg => &mut self.edg,
      CellKind::Tri => &mut self.tri,
      CellKind::Qua => &mut self.qua,
      CellKind::Tet => &mut self.tet,
      CellKind::Pyr => &mut self.pyr,
      CellKind::Pri => &mut self.pri,
      CellKind::Hex => &mut self.hex,
    }
  }

  /// Split borrow for callers needing the record store mutable against
  /// the surface triangulation.
  pub fn geom_and_tri_mut(&mut self) -> (&mut GeomStore, &CellStore) {
    (&mut self.geom, &self.tri)
  }

  /// The cell kind the parameter survey measures.
  pub fn survey_kind(&self) -> CellKind {
    if self.twod || self.surf {
      CellKind::Tri
    } else {
      CellKind::Tet
    }
  }

  // ===========================================================================
  // Cross-store conveniences
  // ===========================================================================

  /// Remove a node together with all of its CAD records.
  pub fn remove_node(&mut self, node: usize) -> Result<()> {
    self.geom.remove_all(node)?;
    self.nodes.remove(node)
  }

  /// A non-tet volume cell carries this side, so the simplex operators
  /// decline rather than tear a mixed interface.
  pub fn mixed_cell_near_edge(&self, node0: usize, node1: usize) -> bool {
    for kind in [CellKind::Pyr, CellKind::Pri, CellKind::Hex] {
      if self.cell(kind).has_side(node0, node1) {
        return true;
      }
    }
    false
  }

  /// Is the node on any boundary cell?
  pub fn node_on_boundary(&self, node: usize) -> bool {
    !self.tri.node_empty(node) || !self.qua.node_empty(node) || !self.edg.node_empty(node)
  }

  // ===========================================================================
  // Topology audit
  // ===========================================================================

  /// Check the store invariants: local/global lookup closure, cell node
  /// validity, adjacency ↔ cell agreement, per-kind node-set
  /// uniqueness, and boundary CAD-record coverage. Meant to run after
  /// every sub-pass in watched runs and after every mutating test.
  pub fn audit(&self) -> Result<()> {
    // local <-> global closure
    for local in self.nodes.each_valid() {
      let global = self.nodes.global(local)?;
      if self.nodes.local(global) != Some(local) {
        return Err(MeshError::Fatal(format!(
          "node {local} global {global} does not look back up"
        )));
      }
    }

    for kind in CellKind::ALL {
      let store = self.cell(kind);
      let mut seen: HashSet<SmallVec<[usize; 8]>> = HashSet::new();
      for cell in store.each_valid() {
        let nodes = store.nodes(cell)?;
        for &node in nodes {
          if !self.nodes.valid(node) {
            return Err(MeshError::Fatal(format!(
              "{kind:?} cell {cell} references invalid node {node}"
            )));
          }
          if !store.adj().iter(node).any(|c| c == cell) {
            return Err(MeshError::Fatal(format!(
              "{kind:?} cell {cell} missing from adjacency of node {node}"
            )));
          }
        }
        let mut set: SmallVec<[usize; 8]> = SmallVec::from_slice(nodes);
        set.sort_unstable();
        if !seen.insert(set) {
          return Err(MeshError::Fatal(format!(
            "{kind:?} cell {cell} duplicates another cell's node set"
          )));
        }
      }
      // adjacency -> cells direction
      for node in self.nodes.each_valid() {
        for cell in store.adj().iter(node) {
          if !store.valid(cell) {
            return Err(MeshError::Fatal(format!(
              "adjacency of node {node} holds invalid {kind:?} cell {cell}"
            )));
          }
          if !store.nodes(cell)?.contains(&node) {
            return Err(MeshError::Fatal(format!(
              "adjacency of node {node} holds {kind:?} cell {cell} not referencing it"
            )));
          }
        }
      }
    }

    crate::geom::verify_topo(self)
  }
}

#[cfg(test)]
mod grid_test {
  use super::*;

  #[test]
  fn audit_accepts_fresh_grid() {
    let grid = Grid::new(0);
    grid.audit().unwrap();
  }

  #[test]
  fn audit_catches_invalid_cell_node() {
    let mut grid = Grid::new(0);
    for g in 0..4 {
      grid.nodes.add_global(g, 0);
    }
    grid.tet_mut().add(&[0, 1, 2, 3], 0).unwrap();
    grid.audit().unwrap();

    grid.nodes.remove(3).unwrap();
    assert!(grid.audit().is_err());
  }

  #[test]
  fn mixed_cell_near_edge_sees_prisms() {
    let mut grid = Grid::new(0);
    for g in 0..6 {
      grid.nodes.add_global(g, 0);
    }
    grid.pri_mut().add(&[0, 1, 2, 3, 4, 5], 0).unwrap();
    assert!(grid.mixed_cell_near_edge(0, 1));
    assert!(!grid.mixed_cell_near_edge(0, 4)); // not a prism edge? 0-4 shares no cell edge
  }
}
