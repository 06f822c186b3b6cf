//! Polymorphic cell arenas and their canonical topology tables.
//!
//! One strongly-typed arena exists per cell kind; all share the slotted
//! layout, the free-list reuse discipline, and a node→cell adjacency
//! kept in lockstep with add/remove. Boundary kinds (segment, triangle,
//! quad) carry a 1-based CAD face/edge id as a distinct field of the
//! record; the adjacency never sees it.
//!
//! # Canonical numbering
//!
//! Local edge and face numbering is fixed per kind and stored once in
//! `'static` tables, node-per first:
//!
//! ```text
//!               3                      tet edges: 01 02 03 12 13 23
//!              /|\                     tet faces: (1 3 2) (0 2 3)
//!             / | \                               (0 3 1) (0 1 2)
//!            /  |  \                   boundary faces wind so the right-
//!           0---|---2                  hand normal points into the
//!            \  |  /                   neighboring volume
//!             \ | /
//!              \|/
//!               1
//!
//!         5                            prism edges: 01 02 03 12 14 25
//!        /|\                                        34 35 45
//!       3---4          floor 0 1 2,    prism quads: (0 3 4 1) (1 4 5 2)
//!       | 2 |          top   3 4 5                  (0 2 5 3)
//!       |/ \|          column i -> i+3  prism tris: (0 1 2) (3 5 4)
//!       0---1
//! ```
//!
//! Quadrilateral faces of triangular faces repeat their first node in
//! the 4-wide face tables.

use smallvec::SmallVec;

use crate::adjacency::Adjacency;
use crate::error::{MeshError, Result};
use crate::node::NodeStore;

/// Widest cell (hex) node count.
pub const MAX_NODE_PER: usize = 8;

/// Arena growth chunk floor; growth is geometric above it.
const GROW_CHUNK_MIN: usize = 5000;

/// Slot budget keeping indices in signed 32-bit range.
const MAX_SLOTS: usize = 1 << 30;

const INITIAL_SLOTS: usize = 100;

// =============================================================================
// CellKind - per-kind canonical tables
// =============================================================================

/// The cell kinds of the data model. Segment/triangle/quad are boundary
/// kinds and carry a CAD association id; the four volume kinds do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellKind {
  Edg,
  Tri,
  Qua,
  Tet,
  Pyr,
  Pri,
  Hex,
}

const EDG_EDGES: [[usize; 2]; 1] = [[0, 1]];
const TRI_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];
const QUA_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];
const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];
const PYR_EDGES: [[usize; 2]; 8] = [
  [0, 1],
  [0, 2],
  [0, 3],
  [1, 2],
  [1, 4],
  [2, 3],
  [2, 4],
  [3, 4],
];
const PRI_EDGES: [[usize; 2]; 9] = [
  [0, 1],
  [0, 2],
  [0, 3],
  [1, 2],
  [1, 4],
  [2, 5],
  [3, 4],
  [3, 5],
  [4, 5],
];
const HEX_EDGES: [[usize; 2]; 12] = [
  [0, 1],
  [0, 3],
  [0, 4],
  [1, 2],
  [1, 5],
  [2, 3],
  [2, 6],
  [3, 7],
  [4, 5],
  [4, 7],
  [5, 6],
  [6, 7],
];

const TRI_FACES: [[usize; 4]; 1] = [[0, 1, 2, 0]];
const QUA_FACES: [[usize; 4]; 1] = [[0, 1, 2, 3]];
const TET_FACES: [[usize; 4]; 4] = [[1, 3, 2, 1], [0, 2, 3, 0], [0, 3, 1, 0], [0, 1, 2, 0]];
const PYR_FACES: [[usize; 4]; 5] = [
  [0, 1, 2, 0],
  [1, 4, 2, 1],
  [2, 4, 3, 2],
  [0, 2, 3, 0],
  [0, 3, 4, 1],
];
const PRI_FACES: [[usize; 4]; 5] = [
  [0, 3, 4, 1],
  [1, 4, 5, 2],
  [0, 2, 5, 3],
  [0, 1, 2, 0],
  [3, 5, 4, 3],
];
const HEX_FACES: [[usize; 4]; 6] = [
  [0, 4, 5, 1],
  [1, 5, 6, 2],
  [2, 6, 7, 3],
  [0, 3, 7, 4],
  [0, 1, 2, 3],
  [4, 7, 6, 5],
];

impl CellKind {
  pub const ALL: [CellKind; 7] = [
    CellKind::Edg,
    CellKind::Tri,
    CellKind::Qua,
    CellKind::Tet,
    CellKind::Pyr,
    CellKind::Pri,
    CellKind::Hex,
  ];

  pub const fn node_per(self) -> usize {
    match self {
      CellKind::Edg => 2,
      CellKind::Tri => 3,
      CellKind::Qua => 4,
      CellKind::Tet => 4,
      CellKind::Pyr => 5,
      CellKind::Pri => 6,
      CellKind::Hex => 8,
    }
  }

  /// Boundary kinds record a CAD face/edge id.
  pub const fn has_id(self) -> bool {
    matches!(self, CellKind::Edg | CellKind::Tri | CellKind::Qua)
  }

  pub const fn is_volume(self) -> bool {
    !self.has_id()
  }

  pub fn edges(self) -> &'static [[usize; 2]] {
    match self {
      CellKind::Edg => &EDG_EDGES,
      CellKind::Tri => &TRI_EDGES,
      CellKind::Qua => &QUA_EDGES,
      CellKind::Tet => &TET_EDGES,
      CellKind::Pyr => &PYR_EDGES,
      CellKind::Pri => &PRI_EDGES,
      CellKind::Hex => &HEX_EDGES,
    }
  }

  pub fn faces(self) -> &'static [[usize; 4]] {
    match self {
      CellKind::Edg => &[],
      CellKind::Tri => &TRI_FACES,
      CellKind::Qua => &QUA_FACES,
      CellKind::Tet => &TET_FACES,
      CellKind::Pyr => &PYR_FACES,
      CellKind::Pri => &PRI_FACES,
      CellKind::Hex => &HEX_FACES,
    }
  }

  pub fn edge_per(self) -> usize {
    self.edges().len()
  }

  pub fn face_per(self) -> usize {
    self.faces().len()
  }
}

// =============================================================================
// CellStore - one arena per kind
// =============================================================================

#[derive(Clone, Debug)]
struct CellRecord {
  nodes: [usize; MAX_NODE_PER],
  id: i32,
}

#[derive(Clone, Debug)]
enum Slot {
  Free,
  Used(CellRecord),
}

/// Slotted cell arena with free-list reuse and node→cell adjacency.
#[derive(Clone, Debug)]
pub struct CellStore {
  kind: CellKind,
  slots: Vec<Slot>,
  free: Vec<usize>,
  n: usize,
  adj: Adjacency,
}

impl CellStore {
  pub fn new(kind: CellKind) -> Self {
    let mut store = Self {
      kind,
      slots: Vec::new(),
      free: Vec::new(),
      n: 0,
      adj: Adjacency::new(),
    };
    store.extend_slots(INITIAL_SLOTS);
    store
  }

  pub fn kind(&self) -> CellKind {
    self.kind
  }

  pub fn node_per(&self) -> usize {
    self.kind.node_per()
  }

  /// Number of valid cells.
  pub fn n(&self) -> usize {
    self.n
  }

  /// Slot-space upper bound for index iteration.
  pub fn max(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub fn valid(&self, cell: usize) -> bool {
    matches!(self.slots.get(cell), Some(Slot::Used(_)))
  }

  pub fn adj(&self) -> &Adjacency {
    &self.adj
  }

  /// True when no cell of this kind touches `node`.
  #[inline]
  pub fn node_empty(&self, node: usize) -> bool {
    self.adj.empty(node)
  }

  /// Any cell touching `node`.
  pub fn first_with(&self, node: usize) -> Option<usize> {
    self.adj.first(node)
  }

  fn extend_slots(&mut self, chunk: usize) {
    let orig = self.slots.len();
    self.slots.resize_with(orig + chunk, || Slot::Free);
    // push in reverse so the lowest new index pops first
    for slot in (orig..orig + chunk).rev() {
      self.free.push(slot);
    }
  }

  fn grow(&mut self) -> Result<()> {
    let orig = self.slots.len();
    if orig >= MAX_SLOTS {
      return Err(MeshError::ArenaFull("cell"));
    }
    let chunk = GROW_CHUNK_MIN.max(orig + orig / 2).min(MAX_SLOTS - orig);
    self.extend_slots(chunk);
    Ok(())
  }

  fn used(&self, cell: usize) -> Result<&CellRecord> {
    match self.slots.get(cell) {
      Some(Slot::Used(c)) => Ok(c),
      _ => Err(MeshError::Fatal(format!(
        "{:?} cell {cell} is not valid",
        self.kind
      ))),
    }
  }

  // ===========================================================================
  // Mutation
  // ===========================================================================

  /// Add a cell. `id` is the CAD association for boundary kinds and
  /// ignored for volume kinds.
  pub fn add(&mut self, nodes: &[usize], id: i32) -> Result<usize> {
    let node_per = self.node_per();
    if nodes.len() != node_per {
      return Err(MeshError::Fatal(format!(
        "{:?} add expected {node_per} nodes, got {}",
        self.kind,
        nodes.len()
      )));
    }
    if self.free.is_empty() {
      self.grow()?;
    }
    let cell = match self.free.pop() {
      Some(c) => c,
      None => return Err(MeshError::ArenaFull("cell")),
    };
    let mut record = CellRecord {
      nodes: [usize::MAX; MAX_NODE_PER],
      id,
    };
    record.nodes[..node_per].copy_from_slice(nodes);
    self.slots[cell] = Slot::Used(record);
    for &node in nodes {
      self.adj.add(node, cell);
    }
    self.n += 1;
    Ok(cell)
  }

  /// Remove a cell, unregistering its adjacency and recycling the slot.
  pub fn remove(&mut self, cell: usize) -> Result<()> {
    let node_per = self.node_per();
    let nodes = self.used(cell)?.nodes;
    for &node in &nodes[..node_per] {
      self.adj.remove(node, cell)?;
    }
    self.slots[cell] = Slot::Free;
    self.free.push(cell);
    self.n -= 1;
    Ok(())
  }

  /// Replace a cell's whole node list (and id) in place.
  pub fn replace_whole(&mut self, cell: usize, nodes: &[usize], id: i32) -> Result<()> {
    let node_per = self.node_per();
    if nodes.len() != node_per {
      return Err(MeshError::Fatal(format!(
        "{:?} replace expected {node_per} nodes",
        self.kind
      )));
    }
    let old = self.used(cell)?.nodes;
    for &node in &old[..node_per] {
      self.adj.remove(node, cell)?;
    }
    match &mut self.slots[cell] {
      Slot::Used(record) => {
        record.nodes[..node_per].copy_from_slice(nodes);
        record.id = id;
      }
      Slot::Free => unreachable!(),
    }
    for &node in nodes {
      self.adj.add(node, cell);
    }
    Ok(())
  }

  /// Substitute `new_node` for `old_node` in every cell touching it.
  pub fn replace_node(&mut self, old_node: usize, new_node: usize) -> Result<()> {
    if old_node == new_node {
      return Ok(());
    }
    let node_per = self.node_per();
    while let Some(cell) = self.adj.first(old_node) {
      let mut changed = false;
      match &mut self.slots[cell] {
        Slot::Used(record) => {
          for slot in record.nodes[..node_per].iter_mut() {
            if *slot == old_node {
              *slot = new_node;
              changed = true;
            }
          }
        }
        Slot::Free => {
          return Err(MeshError::Fatal(format!(
            "adjacency points at freed cell {cell}"
          )))
        }
      }
      if !changed {
        return Err(MeshError::Fatal(format!(
          "cell {cell} in adjacency of node {old_node} but does not reference it"
        )));
      }
      self.adj.remove(old_node, cell)?;
      self.adj.add(new_node, cell);
    }
    Ok(())
  }

  // ===========================================================================
  // Queries
  // ===========================================================================

  /// The cell's node list.
  pub fn nodes(&self, cell: usize) -> Result<&[usize]> {
    Ok(&self.used(cell)?.nodes[..self.node_per()])
  }

  /// CAD association id (boundary kinds).
  pub fn id(&self, cell: usize) -> Result<i32> {
    Ok(self.used(cell)?.id)
  }

  /// Iterate valid cell indices in slot order.
  pub fn each_valid(&self) -> impl Iterator<Item = usize> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, s)| matches!(s, Slot::Used(_)))
      .map(|(i, _)| i)
  }

  fn sorted_set(nodes: &[usize]) -> SmallVec<[usize; MAX_NODE_PER]> {
    let mut set: SmallVec<[usize; MAX_NODE_PER]> = SmallVec::from_slice(nodes);
    set.sort_unstable();
    set.dedup();
    set
  }

  /// Canonical lookup: the unique valid cell with this unordered node
  /// set, in O(degree of the first node).
  pub fn with(&self, nodes: &[usize]) -> Option<usize> {
    let target = Self::sorted_set(nodes);
    for cell in self.adj.iter(nodes[0]) {
      let have = Self::sorted_set(&self.used(cell).ok()?.nodes[..self.node_per()]);
      if have == target {
        return Some(cell);
      }
    }
    None
  }

  /// True when some cell of this kind carries the side `node0`-`node1`
  /// in its canonical edge table.
  pub fn has_side(&self, node0: usize, node1: usize) -> bool {
    for cell in self.adj.iter(node0) {
      let Ok(nodes) = self.nodes(cell) else { continue };
      for edge in self.kind.edges() {
        let (a, b) = (nodes[edge[0]], nodes[edge[1]]);
        if (a == node0 && b == node1) || (a == node1 && b == node0) {
          return true;
        }
      }
    }
    false
  }

  /// True when a boundary cell with the given CAD id carries the side.
  pub fn side_has_id(&self, node0: usize, node1: usize, id: i32) -> bool {
    if !self.kind.has_id() {
      return false;
    }
    for cell in self.adj.iter(node0) {
      let Ok(record) = self.used(cell) else { continue };
      if record.id != id {
        continue;
      }
      let nodes = &record.nodes[..self.node_per()];
      for edge in self.kind.edges() {
        let (a, b) = (nodes[edge[0]], nodes[edge[1]]);
        if (a == node0 && b == node1) || (a == node1 && b == node0) {
          return true;
        }
      }
    }
    false
  }

  /// Every cell containing both nodes: the cavity of an edge.
  pub fn list_with2(&self, node0: usize, node1: usize) -> SmallVec<[usize; 16]> {
    let mut list = SmallVec::new();
    for cell in self.adj.iter(node0) {
      if let Ok(nodes) = self.nodes(cell) {
        if nodes.contains(&node1) {
          list.push(cell);
        }
      }
    }
    list
  }

  /// The two cells sharing a face (tets), `None` slots when absent.
  /// More than two sharers is a topology fatal.
  pub fn with_face(&self, face_nodes: &[usize]) -> Result<(Option<usize>, Option<usize>)> {
    let target = Self::sorted_set(face_nodes);
    let mut found = (None, None);
    for cell in self.adj.iter(face_nodes[0]) {
      let nodes = self.nodes(cell)?;
      for face in self.kind.faces() {
        let candidate =
          Self::sorted_set(&[nodes[face[0]], nodes[face[1]], nodes[face[2]], nodes[face[3]]]);
        if candidate == target {
          match found {
            (None, _) => found.0 = Some(cell),
            (Some(first), None) if first != cell => found.1 = Some(cell),
            (Some(first), None) if first == cell => {}
            _ => {
              return Err(MeshError::Fatal(format!(
                "face {face_nodes:?} shared by more than two {:?} cells",
                self.kind
              )))
            }
          }
          break;
        }
      }
    }
    Ok(found)
  }

  /// Distinct neighbor nodes reachable from `node` through this kind.
  pub fn node_list_around(&self, node: usize) -> SmallVec<[usize; 32]> {
    let mut list: SmallVec<[usize; 32]> = SmallVec::new();
    for cell in self.adj.iter(node) {
      let Ok(nodes) = self.nodes(cell) else { continue };
      for &other in nodes {
        if other != node && !list.contains(&other) {
          list.push(other);
        }
      }
    }
    list
  }

  /// Distinct CAD ids among boundary cells touching `node`.
  pub fn id_list_around(&self, node: usize) -> SmallVec<[i32; 4]> {
    let mut ids: SmallVec<[i32; 4]> = SmallVec::new();
    for cell in self.adj.iter(node) {
      if let Ok(record) = self.used(cell) {
        if !ids.contains(&record.id) {
          ids.push(record.id);
        }
      }
    }
    ids
  }

  /// Owning rank of a cell: the part of its lowest-global-id node.
  pub fn part(&self, nodes_store: &NodeStore, cell: usize) -> Result<i32> {
    let nodes = self.nodes(cell)?;
    let mut best: Option<(i64, i32)> = None;
    for &node in nodes {
      let global = nodes_store.global(node)?;
      let part = nodes_store.part(node);
      if best.map_or(true, |(g, _)| global < g) {
        best = Some((global, part));
      }
    }
    best
      .map(|(_, part)| part)
      .ok_or_else(|| MeshError::Fatal(format!("cell {cell} has no nodes")))
  }

  /// True when every node of every cell in the `node0`-`node1` cavity is
  /// owned by `rank`, the fully-local gate for the operators.
  pub fn local_gem(&self, nodes_store: &NodeStore, node0: usize, node1: usize, rank: i32) -> bool {
    for cell in self.list_with2(node0, node1) {
      let Ok(nodes) = self.nodes(cell) else {
        return false;
      };
      for &node in nodes {
        if nodes_store.part(node) != rank {
          return false;
        }
      }
    }
    true
  }
}

/// Rotate a simplex node list so `node0` leads, preserving orientation.
///
/// Triangles rotate; tetrahedra use the even permutations that bring
/// each position to the front.
pub fn orient_node0(node0: usize, nodes: &mut [usize]) -> Result<()> {
  let position = nodes
    .iter()
    .position(|&n| n == node0)
    .ok_or_else(|| MeshError::Fatal(format!("node {node0} not in {nodes:?}")))?;
  let perm: &[usize] = match (nodes.len(), position) {
    (3, 0) | (4, 0) => return Ok(()),
    (3, 1) => &[1, 2, 0],
    (3, 2) => &[2, 0, 1],
    (4, 1) => &[1, 0, 3, 2],
    (4, 2) => &[2, 3, 0, 1],
    (4, 3) => &[3, 2, 1, 0],
    _ => {
      return Err(MeshError::Fatal(format!(
        "orient_node0 supports simplices, got {} nodes",
        nodes.len()
      )))
    }
  };
  let orig: SmallVec<[usize; 4]> = SmallVec::from_slice(nodes);
  for (slot, &from) in nodes.iter_mut().zip(perm) {
    *slot = orig[from];
  }
  Ok(())
}

#[cfg(test)]
#[path = "cell_test.rs"]
mod cell_test;
