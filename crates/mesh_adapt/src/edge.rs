//! Derived edge table.
//!
//! Built on demand by scanning every cell kind and inserting each
//! canonical edge keyed by its sorted endpoints. The table is
//! short-lived relative to the operators: passes rebuild it, nothing
//! patches it in place.

use crate::adjacency::Adjacency;
use crate::error::Result;
use crate::grid::Grid;

/// Unique undirected edges of the current mesh.
#[derive(Clone, Debug, Default)]
pub struct EdgeTable {
  e2n: Vec<[usize; 2]>,
  adj: Adjacency,
}

impl EdgeTable {
  /// Scan the grid and collect each edge exactly once.
  pub fn build(grid: &Grid) -> Result<EdgeTable> {
    let mut table = EdgeTable::default();
    for kind in crate::cell::CellKind::ALL {
      let store = grid.cell(kind);
      for cell in store.each_valid() {
        let nodes = store.nodes(cell)?;
        for edge in kind.edges() {
          table.insert(nodes[edge[0]], nodes[edge[1]]);
        }
      }
    }
    Ok(table)
  }

  fn insert(&mut self, node0: usize, node1: usize) {
    let key = if node0 < node1 {
      [node0, node1]
    } else {
      [node1, node0]
    };
    if self.with(key[0], key[1]).is_some() {
      return;
    }
    let edge = self.e2n.len();
    self.e2n.push(key);
    self.adj.add(key[0], edge);
    self.adj.add(key[1], edge);
  }

  pub fn n(&self) -> usize {
    self.e2n.len()
  }

  /// Sorted endpoints of an edge.
  pub fn nodes(&self, edge: usize) -> [usize; 2] {
    self.e2n[edge]
  }

  /// Find the edge joining two nodes.
  pub fn with(&self, node0: usize, node1: usize) -> Option<usize> {
    self
      .adj
      .iter(node0)
      .find(|&e| self.e2n[e].contains(&node1))
  }

  /// Owning rank of an edge: part of the lower-global endpoint.
  pub fn part(&self, grid: &Grid, edge: usize) -> Result<i32> {
    let [n0, n1] = self.e2n[edge];
    let g0 = grid.nodes.global(n0)?;
    let g1 = grid.nodes.global(n1)?;
    Ok(if g0 < g1 {
      grid.nodes.part(n0)
    } else {
      grid.nodes.part(n1)
    })
  }

  pub fn each(&self) -> impl Iterator<Item = (usize, [usize; 2])> + '_ {
    self.e2n.iter().copied().enumerate()
  }
}
