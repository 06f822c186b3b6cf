//! Derived face table.
//!
//! Companion of [`crate::edge::EdgeTable`]: a rebuilt-on-demand index of
//! the unique faces of the volume cells, canonicalized by sorted
//! corners. Triangular faces repeat their first corner in the 4-wide
//! records, matching the canonical per-kind face tables.

use smallvec::SmallVec;

use crate::adjacency::Adjacency;
use crate::cell::CellKind;
use crate::error::Result;
use crate::grid::Grid;

#[derive(Clone, Debug, Default)]
pub struct FaceTable {
  f2n: Vec<[usize; 4]>,
  adj: Adjacency,
}

impl FaceTable {
  /// Scan the volume kinds and collect each face exactly once.
  pub fn build(grid: &Grid) -> Result<FaceTable> {
    let mut table = FaceTable::default();
    for kind in CellKind::ALL.into_iter().filter(|k| k.is_volume()) {
      let store = grid.cell(kind);
      for cell in store.each_valid() {
        let nodes = store.nodes(cell)?;
        for face in kind.faces() {
          table.insert([
            nodes[face[0]],
            nodes[face[1]],
            nodes[face[2]],
            nodes[face[3]],
          ]);
        }
      }
    }
    Ok(table)
  }

  fn canonical(face: [usize; 4]) -> SmallVec<[usize; 4]> {
    let mut set: SmallVec<[usize; 4]> = SmallVec::from_slice(&face);
    set.sort_unstable();
    set.dedup();
    set
  }

  fn insert(&mut self, face: [usize; 4]) {
    if self.with(&face).is_some() {
      return;
    }
    let index = self.f2n.len();
    self.f2n.push(face);
    for node in Self::canonical(face) {
      self.adj.add(node, index);
    }
  }

  pub fn n(&self) -> usize {
    self.f2n.len()
  }

  /// Face corners as stored (triangles repeat the first corner).
  pub fn nodes(&self, face: usize) -> [usize; 4] {
    self.f2n[face]
  }

  /// Find a face by its (unordered) corners.
  pub fn with(&self, face: &[usize]) -> Option<usize> {
    let target = Self::canonical([face[0], face[1], face[2], face[3 % face.len()]]);
    self
      .adj
      .iter(target[0])
      .find(|&f| Self::canonical(self.f2n[f]) == target)
  }

  /// Owning rank: part of the lowest-global corner.
  pub fn part(&self, grid: &Grid, face: usize) -> Result<i32> {
    let corners = Self::canonical(self.f2n[face]);
    let mut best: Option<(i64, i32)> = None;
    for &node in &corners {
      let global = grid.nodes.global(node)?;
      if best.map_or(true, |(g, _)| global < g) {
        best = Some((global, grid.nodes.part(node)));
      }
    }
    Ok(best.map(|(_, p)| p).unwrap_or(-1))
  }
}
