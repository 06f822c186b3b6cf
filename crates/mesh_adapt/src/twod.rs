//! Two-layer (extruded) mode helpers.
//!
//! A 2D problem is represented as one layer of prisms: the floor
//! triangulation at y = 0 and its copy at y = 1, joined column-wise
//! (floor corner i ↔ top corner i + 3 of the same prism). Operators act
//! on floor nodes and mirror the effect onto the opposite top node so
//! the two layers never drift apart.

use crate::cell::CellStore;
use crate::error::{MeshError, Result};
use crate::grid::Grid;

/// Floor-layer membership: the active half of a twod grid.
pub fn node_active(grid: &Grid, node: usize) -> bool {
  grid.nodes.xyz(node).y < 0.5
}

/// The top-layer partner of a floor node (or vice versa), read from any
/// prism containing it.
pub fn opposite_node(pri: &CellStore, node: usize) -> Result<usize> {
  let cell = pri
    .first_with(node)
    .ok_or_else(|| MeshError::Fatal(format!("node {node} is not on any prism")))?;
  let nodes = pri.nodes(cell)?;
  let at = nodes
    .iter()
    .position(|&n| n == node)
    .ok_or_else(|| MeshError::Fatal(format!("adjacency lied about node {node}")))?;
  Ok(if at < 3 { nodes[at + 3] } else { nodes[at - 3] })
}
