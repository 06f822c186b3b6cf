//! CAD association: parameter records, the geometry oracle, and the
//! constraint/interpolation helpers the operators lean on.
//!
//! Every node that lies on the boundary representation carries zero or
//! more (type, id, parameter) records: `t` on a CAD edge, `(u, v)` on a
//! CAD face, nothing on a CAD node (topology vertices are pinned). A
//! record's `jump` marks an edge-parameter discontinuity threading a
//! periodic face; `degen` marks a face parameter sitting on a
//! collapsed-edge singularity. Records live in their own slotted arena
//! with a node→record adjacency; removing a node removes all of them.
//!
//! The CAD itself is an injected, read-only [`CadOracle`]. Geometry-free
//! adaptation runs against [`NoCad`], which reports no model and leaves
//! interpolated parameters and coordinates untouched.

use glam::DVec3;
use smallvec::SmallVec;
use tracing::warn;

use crate::adjacency::Adjacency;
use crate::cell::CellStore;
use crate::error::{MeshError, Result};
use crate::grid::Grid;
use crate::quality::tri_normal;

// =============================================================================
// Oracle
// =============================================================================

/// Topological entity classes of the boundary representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeomType {
  Node,
  Edge,
  Face,
}

impl GeomType {
  /// Number of parameters carried by a record of this type.
  pub const fn param_count(self) -> usize {
    match self {
      GeomType::Node => 0,
      GeomType::Edge => 1,
      GeomType::Face => 2,
    }
  }
}

/// Evaluation result: position and first parameter derivatives.
#[derive(Clone, Copy, Debug)]
pub struct CadEval {
  pub xyz: DVec3,
  /// d(xyz)/dt for edges; d(xyz)/du and d(xyz)/dv for faces.
  pub deriv: [DVec3; 2],
}

/// Inverse evaluation result.
#[derive(Clone, Copy, Debug)]
pub struct CadInverse {
  pub param: [f64; 2],
  /// Whether the parameters landed inside the entity's range.
  pub inside: bool,
}

/// Principal curvatures and directions at a surface parameter.
#[derive(Clone, Copy, Debug)]
pub struct CadCurvature {
  pub k: [f64; 2],
  pub dir: [DVec3; 2],
}

/// Read-only geometry kernel contract.
///
/// Ids are 1-based; implementations must reject ids outside `[1, n]`
/// with [`MeshError::OutOfRange`].
pub trait CadOracle {
  /// False for geometry-free adaptation; every other method may then
  /// go unanswered.
  fn loaded(&self) -> bool;

  fn nedge(&self) -> i32;
  fn nface(&self) -> i32;

  fn eval(&self, ty: GeomType, id: i32, param: [f64; 2]) -> Result<CadEval>;
  fn inverse_eval(&self, ty: GeomType, id: i32, xyz: DVec3, guess: [f64; 2]) -> Result<CadInverse>;
  fn curvature(&self, ty: GeomType, id: i32, param: [f64; 2]) -> Result<CadCurvature>;

  /// Parameter range of a CAD edge: `[t_min, t_max]`.
  fn edge_range(&self, id: i32) -> Result<[f64; 2]>;
  /// Parameter box of a CAD face: `[[u_min, u_max], [v_min, v_max]]`.
  fn face_range(&self, id: i32) -> Result<[[f64; 2]; 2]>;

  fn tolerance(&self, ty: GeomType, id: i32) -> Result<f64>;
  fn bounding_box(&self, ty: GeomType, id: i32) -> Result<[DVec3; 2]>;

  /// Outward unit normal of a face at (u, v), from the cross of the
  /// parameter derivatives.
  fn face_normal(&self, id: i32, uv: [f64; 2]) -> Result<DVec3> {
    let eval = self.eval(GeomType::Face, id, uv)?;
    crate::math::try_unit(eval.deriv[0].cross(eval.deriv[1]))
      .ok_or_else(|| MeshError::Fatal(format!("face {id} has singular parameterization at {uv:?}")))
  }
}

/// Geometry-free oracle: no model, nothing to consult.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCad;

impl CadOracle for NoCad {
  fn loaded(&self) -> bool {
    false
  }
  fn nedge(&self) -> i32 {
    0
  }
  fn nface(&self) -> i32 {
    0
  }
  fn eval(&self, _ty: GeomType, _id: i32, _param: [f64; 2]) -> Result<CadEval> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn inverse_eval(
    &self,
    _ty: GeomType,
    _id: i32,
    _xyz: DVec3,
    _guess: [f64; 2],
  ) -> Result<CadInverse> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn curvature(&self, _ty: GeomType, _id: i32, _param: [f64; 2]) -> Result<CadCurvature> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn edge_range(&self, _id: i32) -> Result<[f64; 2]> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn face_range(&self, _id: i32) -> Result<[[f64; 2]; 2]> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn tolerance(&self, _ty: GeomType, _id: i32) -> Result<f64> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
  fn bounding_box(&self, _ty: GeomType, _id: i32) -> Result<[DVec3; 2]> {
    Err(MeshError::Fatal("no CAD model loaded".into()))
  }
}

// =============================================================================
// Record store
// =============================================================================

/// One CAD-parameter record attached to a node.
#[derive(Clone, Copy, Debug)]
pub struct GeomRecord {
  pub node: usize,
  pub ty: GeomType,
  pub id: i32,
  pub param: [f64; 2],
  /// Non-zero when an edge-parameter discontinuity threads a periodic
  /// face; carries the discontinuity tag.
  pub jump: i32,
  /// Non-zero when the face parameter sits on a collapsed-edge
  /// singularity.
  pub degen: i32,
}

#[derive(Clone, Debug, Default)]
pub struct GeomStore {
  slots: Vec<Option<GeomRecord>>,
  free: Vec<usize>,
  n: usize,
  adj: Adjacency,
  /// Per-face orientation sign of the uv parameterization, lazily built
  /// from the surface triangulation.
  uv_area_sign: Vec<f64>,
}

impl GeomStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn n(&self) -> usize {
    self.n
  }

  pub fn record(&self, geom: usize) -> Result<&GeomRecord> {
    self
      .slots
      .get(geom)
      .and_then(|s| s.as_ref())
      .ok_or_else(|| MeshError::Fatal(format!("geom record {geom} is not valid")))
  }

  fn record_mut(&mut self, geom: usize) -> Result<&mut GeomRecord> {
    self
      .slots
      .get_mut(geom)
      .and_then(|s| s.as_mut())
      .ok_or_else(|| MeshError::Fatal(format!("geom record {geom} is not valid")))
  }

  /// Iterate records of one type (smoothing walks edges then faces).
  pub fn each_of_type(&self, ty: GeomType) -> impl Iterator<Item = (usize, &GeomRecord)> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(move |(i, s)| match s {
        Some(r) if r.ty == ty => Some((i, r)),
        _ => None,
      })
  }

  /// Records attached to a node.
  pub fn records_of(&self, node: usize) -> impl Iterator<Item = (usize, &GeomRecord)> + '_ {
    self.adj.iter(node).filter_map(move |geom| {
      self.slots[geom].as_ref().map(|r| (geom, r))
    })
  }

  /// Add or update the (type, id) record of a node. Updating an
  /// existing record only refreshes the parameters.
  pub fn add(&mut self, node: usize, ty: GeomType, id: i32, param: [f64; 2]) -> usize {
    if let Some(geom) = self.find(node, ty, id) {
      if let Some(record) = self.slots[geom].as_mut() {
        record.param = param;
      }
      return geom;
    }
    let record = GeomRecord {
      node,
      ty,
      id,
      param,
      jump: 0,
      degen: 0,
    };
    let geom = match self.free.pop() {
      Some(slot) => {
        self.slots[slot] = Some(record);
        slot
      }
      None => {
        self.slots.push(Some(record));
        self.slots.len() - 1
      }
    };
    self.adj.add(node, geom);
    self.n += 1;
    geom
  }

  pub fn set_jump(&mut self, geom: usize, jump: i32) -> Result<()> {
    self.record_mut(geom)?.jump = jump;
    Ok(())
  }

  pub fn set_degen(&mut self, geom: usize, degen: i32) -> Result<()> {
    self.record_mut(geom)?.degen = degen;
    Ok(())
  }

  /// Remove every record of a node (node removal path).
  pub fn remove_all(&mut self, node: usize) -> Result<()> {
    while let Some(geom) = self.adj.first(node) {
      self.adj.remove(node, geom)?;
      self.slots[geom] = None;
      self.free.push(geom);
      self.n -= 1;
    }
    Ok(())
  }

  /// Does the node carry any record of this type?
  pub fn is_a(&self, node: usize, ty: GeomType) -> bool {
    self.records_of(node).any(|(_, r)| r.ty == ty)
  }

  /// Any record at all, meaning "has geometry support".
  pub fn supported(&self, node: usize) -> bool {
    !self.adj.empty(node)
  }

  /// The single id of the node's records of a type. Two different ids
  /// of the same type make the query invalid (the caller is sitting on
  /// a CAD seam and must use cell-relative lookups).
  pub fn unique_id(&self, node: usize, ty: GeomType) -> Result<Option<i32>> {
    let mut found: Option<i32> = None;
    for (_, r) in self.records_of(node) {
      if r.ty == ty {
        if found.is_some() {
          return Err(MeshError::Fatal(format!(
            "node {node} carries multiple {ty:?} records"
          )));
        }
        found = Some(r.id);
      }
    }
    Ok(found)
  }

  /// Locate the (type, id) record of a node.
  pub fn find(&self, node: usize, ty: GeomType, id: i32) -> Option<usize> {
    self
      .records_of(node)
      .find(|(_, r)| r.ty == ty && r.id == id)
      .map(|(geom, _)| geom)
  }

  /// Parameters of a jump/degeneracy-free record.
  pub fn tuv(&self, node: usize, ty: GeomType, id: i32) -> Result<[f64; 2]> {
    let geom = self.find(node, ty, id).ok_or_else(|| {
      MeshError::Fatal(format!("node {node} has no {ty:?} record for id {id}"))
    })?;
    let record = self.record(geom)?;
    if record.jump != 0 || record.degen != 0 {
      return Err(MeshError::Fatal(format!(
        "node {node} {ty:?} {id} requires cell-relative parameters"
      )));
    }
    Ok(record.param)
  }

  /// Parameters of a record as seen from one cell, resolving jumps and
  /// degeneracies through the oracle's entity ranges. Falls back to the
  /// stored parameters when no model is loaded.
  pub fn cell_tuv(
    &self,
    cad: &dyn CadOracle,
    node: usize,
    cell_nodes: &[usize],
    ty: GeomType,
    id: i32,
  ) -> Result<[f64; 2]> {
    let geom = self.find(node, ty, id).ok_or_else(|| {
      MeshError::Fatal(format!("node {node} has no {ty:?} record for id {id}"))
    })?;
    let record = *self.record(geom)?;

    if (record.jump == 0 && record.degen == 0) || !cad.loaded() {
      return Ok(record.param);
    }

    match ty {
      GeomType::Edge => {
        // the parameter at a jump is the range end nearest the partner
        // node's parameter
        let range = cad.edge_range(id)?;
        let partner = cell_nodes
          .iter()
          .find(|&&n| n != node && self.find(n, ty, id).is_some())
          .copied()
          .ok_or_else(|| {
            MeshError::Fatal(format!("edge jump at node {node} has no partner in cell"))
          })?;
        let from = self.tuv(partner, ty, id)?;
        let dist0 = from[0] - range[0];
        let dist1 = range[1] - from[0];
        if dist0 < 0.0 || dist1 < 0.0 {
          return Err(MeshError::Fatal(format!(
            "edge {id} partner parameter {from:?} outside range {range:?}"
          )));
        }
        if dist0 < dist1 {
          Ok([range[0], 0.0])
        } else {
          Ok([range[1], 0.0])
        }
      }
      GeomType::Face => {
        // borrow the uv of a clean partner record on the same face
        let partner = cell_nodes.iter().find(|&&n| {
          n != node
            && self
              .find(n, ty, id)
              .and_then(|g| self.record(g).ok())
              .is_some_and(|r| r.jump == 0 && r.degen == 0)
        });
        match partner {
          Some(&p) => self.tuv(p, ty, id),
          None => Ok(record.param),
        }
      }
      GeomType::Node => Ok(record.param),
    }
  }

  // ===========================================================================
  // uv areas
  // ===========================================================================

  /// Signed parameter-space area of a surface triangle.
  pub fn uv_area(
    &self,
    cad: &dyn CadOracle,
    tri_nodes: &[usize],
    id: i32,
  ) -> Result<f64> {
    let uv0 = self.cell_tuv(cad, tri_nodes[0], tri_nodes, GeomType::Face, id)?;
    let uv1 = self.cell_tuv(cad, tri_nodes[1], tri_nodes, GeomType::Face, id)?;
    let uv2 = self.cell_tuv(cad, tri_nodes[2], tri_nodes, GeomType::Face, id)?;
    Ok(
      0.5
        * (-uv1[0] * uv0[1] + uv2[0] * uv0[1] + uv0[0] * uv1[1] - uv2[0] * uv1[1]
          - uv0[0] * uv2[1] + uv1[0] * uv2[1]),
    )
  }

  /// Orientation sign of a face's uv parameterization, voted by its
  /// current triangulation and cached.
  pub fn uv_area_sign(
    &mut self,
    cad: &dyn CadOracle,
    tri_store: &CellStore,
    id: i32,
  ) -> Result<f64> {
    if self.uv_area_sign.is_empty() {
      let mut nface = cad.nface();
      for cell in tri_store.each_valid() {
        nface = nface.max(tri_store.id(cell)?);
      }
      let mut votes = vec![0.0; nface.max(id) as usize];
      for cell in tri_store.each_valid() {
        let face = tri_store.id(cell)?;
        if face < 1 || face as usize > votes.len() {
          continue;
        }
        let nodes = tri_store.nodes(cell)?;
        if nodes.iter().any(|&n| self.find(n, GeomType::Face, face).is_none()) {
          continue;
        }
        let area = self.uv_area(cad, nodes, face)?;
        votes[face as usize - 1] += if area < 0.0 { -1.0 } else { 1.0 };
      }
      self.uv_area_sign = votes
        .into_iter()
        .map(|v| if v < 0.0 { -1.0 } else { 1.0 })
        .collect();
    }
    if id < 1 || id as usize > self.uv_area_sign.len() {
      return Err(MeshError::OutOfRange {
        what: "face id",
        value: id as i64,
        min: 1,
        max: self.uv_area_sign.len() as i64,
      });
    }
    Ok(self.uv_area_sign[id as usize - 1])
  }

  /// Drop the cached orientation votes (topology changed face ids).
  pub fn clear_uv_area_sign(&mut self) {
    self.uv_area_sign.clear();
  }
}

// =============================================================================
// Grid-level helpers
// =============================================================================

/// Move a node onto its geometry: CAD nodes stay put, edge records win
/// over face records, and the winning record's parameters are evaluated
/// into the node coordinates. A node without records is untouched.
pub fn constrain(grid: &mut Grid, cad: &dyn CadOracle, node: usize) -> Result<()> {
  if !grid.geom.supported(node) || !cad.loaded() {
    return Ok(());
  }

  for want in [GeomType::Node, GeomType::Edge, GeomType::Face] {
    let found = grid
      .geom
      .records_of(node)
      .find(|(_, r)| r.ty == want)
      .map(|(_, r)| *r);
    if let Some(record) = found {
      let eval = cad.eval(record.ty, record.id, record.param)?;
      grid.nodes.set_xyz(node, eval.xyz)?;
      if record.ty == GeomType::Edge {
        refresh_face_uv_from_edge(grid, cad, node, &record)?;
      }
      return Ok(());
    }
  }
  Ok(())
}

/// After moving a node along a CAD edge, re-derive the uv of its face
/// records by inverse evaluation seeded with the stored uv.
fn refresh_face_uv_from_edge(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  node: usize,
  edge_record: &GeomRecord,
) -> Result<()> {
  let xyz = grid.nodes.xyz(node);
  let face_records: SmallVec<[(i32, [f64; 2]); 2]> = grid
    .geom
    .records_of(node)
    .filter(|(_, r)| r.ty == GeomType::Face && r.jump == 0 && r.degen == 0)
    .map(|(_, r)| (r.id, r.param))
    .collect();
  for (face_id, guess) in face_records {
    match cad.inverse_eval(GeomType::Face, face_id, xyz, guess) {
      Ok(inv) if inv.inside => {
        grid.geom.add(node, GeomType::Face, face_id, inv.param);
      }
      Ok(_) | Err(_) => {
        warn!(
          node,
          face_id,
          edge_id = edge_record.id,
          "face uv refresh failed after edge move, keeping previous uv"
        );
      }
    }
  }
  Ok(())
}

/// Is a boundary side between these nodes CAD-supported, meaning a
/// split of the edge must receive parameter records?
pub fn support_between(grid: &Grid, node0: usize, node1: usize) -> bool {
  for (_, r0) in grid.geom.records_of(node0) {
    if r0.ty != GeomType::Face {
      continue;
    }
    if grid.geom.find(node1, GeomType::Face, r0.id).is_some()
      && grid.tri().side_has_id(node0, node1, r0.id)
    {
      return true;
    }
  }
  false
}

/// Attach interpolated CAD records to a node inserted between two
/// others, inverse-projecting through the oracle when a model is
/// loaded. The parameter-space linear interpolant is the fallback
/// whenever the projection leaves the segment's parameter box.
pub fn add_between(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  node0: usize,
  node1: usize,
  node1_weight: f64,
  new_node: usize,
) -> Result<()> {
  if !grid.geom.supported(node0) || !grid.geom.supported(node1) {
    return Ok(());
  }
  let node0_weight = 1.0 - node1_weight;

  // edge support first: an edg cell joining the endpoints names the CAD edge
  let mut has_edge_support = false;
  if let Some(cell) = grid.edg().with(&[node0, node1]) {
    let id = grid.edg().id(cell)?;
    let cell_nodes: SmallVec<[usize; 2]> = SmallVec::from_slice(grid.edg().nodes(cell)?);
    let t0 = grid
      .geom
      .cell_tuv(cad, node0, &cell_nodes, GeomType::Edge, id)?[0];
    let t1 = grid
      .geom
      .cell_tuv(cad, node1, &cell_nodes, GeomType::Edge, id)?[0];
    let interp = node0_weight * t0 + node1_weight * t1;
    let mut t = interp;
    if cad.loaded() {
      match cad.inverse_eval(GeomType::Edge, id, grid.nodes.xyz(new_node), [interp, 0.0]) {
        Ok(inv) if inv.inside => t = inv.param[0],
        Ok(_) | Err(_) => {
          warn!(node0, node1, id, "edge inverse projection failed, using interpolant");
          t = interp;
        }
      }
      if t < t0.min(t1) || t > t0.max(t1) {
        t = interp;
      }
      let eval = cad.eval(GeomType::Edge, id, [t, 0.0])?;
      grid.nodes.set_xyz(new_node, eval.xyz)?;
    }
    grid.geom.add(new_node, GeomType::Edge, id, [t, 0.0]);
    has_edge_support = true;
  }

  // face records for each surface triangle pair straddling the edge
  let tris = grid.tri().list_with2(node0, node1);
  for cell in tris {
    let id = grid.tri().id(cell)?;
    let cell_nodes: SmallVec<[usize; 4]> = SmallVec::from_slice(grid.tri().nodes(cell)?);
    if grid.geom.find(node0, GeomType::Face, id).is_none()
      || grid.geom.find(node1, GeomType::Face, id).is_none()
    {
      continue;
    }
    let uv0 = grid
      .geom
      .cell_tuv(cad, node0, &cell_nodes, GeomType::Face, id)?;
    let uv1 = grid
      .geom
      .cell_tuv(cad, node1, &cell_nodes, GeomType::Face, id)?;
    let interp = [
      node0_weight * uv0[0] + node1_weight * uv1[0],
      node0_weight * uv0[1] + node1_weight * uv1[1],
    ];
    let mut uv = interp;
    if cad.loaded() && !has_edge_support {
      match cad.inverse_eval(GeomType::Face, id, grid.nodes.xyz(new_node), interp) {
        Ok(inv) if inv.inside => uv = inv.param,
        Ok(_) | Err(_) => {
          warn!(node0, node1, id, "face inverse projection failed, using interpolant");
          uv = interp;
        }
      }
      if let Some([uv_min, uv_max]) = tri_uv_bounding_box2(grid, cad, node0, node1)? {
        if uv[0] < uv_min[0] || uv[0] > uv_max[0] || uv[1] < uv_min[1] || uv[1] > uv_max[1] {
          uv = interp;
        }
      }
      let eval = cad.eval(GeomType::Face, id, uv)?;
      grid.nodes.set_xyz(new_node, eval.xyz)?;
    }
    let face_geom = grid.geom.add(new_node, GeomType::Face, id, uv);

    // a jump tag shared by both endpoints rides along
    let jump0 = grid
      .geom
      .find(node0, GeomType::Face, id)
      .map(|g| grid.geom.record(g).map(|r| r.jump))
      .transpose()?
      .unwrap_or(0);
    let jump1 = grid
      .geom
      .find(node1, GeomType::Face, id)
      .map(|g| grid.geom.record(g).map(|r| r.jump))
      .transpose()?
      .unwrap_or(0);
    if jump0 != 0 && jump0 == jump1 {
      grid.geom.set_jump(face_geom, jump0)?;
    }
  }
  Ok(())
}

/// uv bounding box of every triangle around a node (one CAD face).
pub fn tri_uv_bounding_box(
  grid: &Grid,
  cad: &dyn CadOracle,
  node: usize,
) -> Result<[[f64; 2]; 2]> {
  let id = grid
    .geom
    .unique_id(node, GeomType::Face)?
    .ok_or_else(|| MeshError::Fatal(format!("node {node} has no face record")))?;
  let mut uv_min = grid.geom.tuv(node, GeomType::Face, id)?;
  let mut uv_max = uv_min;
  for cell in grid.tri().adj().iter(node) {
    let nodes = grid.tri().nodes(cell)?;
    for &corner in nodes {
      let uv = grid.geom.cell_tuv(cad, corner, nodes, GeomType::Face, id)?;
      for i in 0..2 {
        uv_min[i] = uv_min[i].min(uv[i]);
        uv_max[i] = uv_max[i].max(uv[i]);
      }
    }
  }
  Ok([uv_min, uv_max])
}

/// uv bounding box of the (up to two) triangles sharing an edge.
/// `None` when the edge has no two-triangle surface cavity.
pub fn tri_uv_bounding_box2(
  grid: &Grid,
  cad: &dyn CadOracle,
  node0: usize,
  node1: usize,
) -> Result<Option<[[f64; 2]; 2]>> {
  let cells = grid.tri().list_with2(node0, node1);
  if cells.len() != 2 {
    return Ok(None);
  }
  let mut uv_min = [f64::INFINITY; 2];
  let mut uv_max = [f64::NEG_INFINITY; 2];
  for &cell in &cells {
    let id = grid.tri().id(cell)?;
    let nodes = grid.tri().nodes(cell)?;
    for &corner in nodes {
      if grid.geom.find(corner, GeomType::Face, id).is_none() {
        return Ok(None);
      }
      let uv = grid.geom.cell_tuv(cad, corner, nodes, GeomType::Face, id)?;
      for i in 0..2 {
        uv_min[i] = uv_min[i].min(uv[i]);
        uv_max[i] = uv_max[i].max(uv[i]);
      }
    }
  }
  Ok(Some([uv_min, uv_max]))
}

/// uv centroid of a surface triangle.
pub fn tri_uv_centroid(
  grid: &Grid,
  cad: &dyn CadOracle,
  tri_nodes: &[usize],
  id: i32,
) -> Result<[f64; 2]> {
  let mut uv = [0.0; 2];
  for &node in &tri_nodes[..3] {
    let node_uv = grid.geom.cell_tuv(cad, node, tri_nodes, GeomType::Face, id)?;
    uv[0] += node_uv[0] / 3.0;
    uv[1] += node_uv[1] / 3.0;
  }
  Ok(uv)
}

/// Signed cosine between a surface triangle's mesh normal and the CAD
/// face normal at its uv centroid. −2.0 flags a zero-area triangle so
/// candidate configurations are rejected outright.
pub fn tri_norm_deviation(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  tri_nodes: &[usize],
  id: i32,
) -> Result<f64> {
  let normal = tri_normal(&grid.nodes, tri_nodes);
  let Some(unit) = crate::math::try_unit(normal) else {
    return Ok(-2.0);
  };
  let uv = tri_uv_centroid(grid, cad, tri_nodes, id)?;
  let cad_normal = cad.face_normal(id, uv)?;
  let (geom, tri) = grid.geom_and_tri_mut();
  let sign = geom.uv_area_sign(cad, tri, id)?;
  Ok(sign * cad_normal.dot(unit))
}

/// Verify the boundary-record invariants of the current surface
/// triangulation: every surface-triangle node carries a face record for
/// its triangle's face, and every node on an edg cell carries the edge
/// record.
pub fn verify_topo(grid: &Grid) -> Result<()> {
  for cell in grid.tri().each_valid() {
    let id = grid.tri().id(cell)?;
    for &node in grid.tri().nodes(cell)? {
      if grid.geom.supported(node) && grid.geom.find(node, GeomType::Face, id).is_none() {
        return Err(MeshError::Fatal(format!(
          "surface node {node} missing FACE {id} record"
        )));
      }
    }
  }
  for cell in grid.edg().each_valid() {
    let id = grid.edg().id(cell)?;
    for &node in grid.edg().nodes(cell)? {
      if grid.geom.supported(node) && grid.geom.find(node, GeomType::Edge, id).is_none() {
        return Err(MeshError::Fatal(format!(
          "edge node {node} missing EDGE {id} record"
        )));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;
