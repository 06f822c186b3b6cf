//! Node smoothing.
//!
//! Four flavors, chosen by where the node lives:
//!
//! - interior: move toward the 1/q-weighted average of per-cell ideal
//!   apex positions, backtracking until the minimum incident quality
//!   strictly improves;
//! - CAD edge: one-dimensional in t, rebalancing the two neighbor edge
//!   ratios toward equality;
//! - CAD face: two-dimensional in (u, v), a conjugate-gradient
//!   (Polak–Ribière, clamped at zero) walk of per-triangle ideal uv,
//!   guarded by the uv bounding box and uv-area signs;
//! - nonsmooth: when several incident qualities tie at the minimum, a
//!   projected-gradient active-set step (Charalambous–Conn).
//!
//! Every acceptance requires strict improvement; a smooth whose line
//! search fails at every backoff leaves the node bit-identical.

use glam::DVec3;
use smallvec::SmallVec;
use tracing::debug;

use crate::cell::{orient_node0, CellKind};
use crate::config::AdaptConfig;
use crate::error::{MeshError, Result};
use crate::geom::{self, CadOracle, GeomType};
use crate::grid::Grid;
use crate::math::{divisible, try_unit};
use crate::matrix::inverse_gen;
use crate::quality::{ratio, tet_dquality_dnode0, tet_quality, tri_dquality_dnode0, tri_quality};
use crate::twod;

/// Backtracking halvings shared by every line search.
const MAX_BACKOFF: usize = 8;

/// Cells within this of the worst quality count as active constraints.
const NSO_ACTIVE_TOL: f64 = 1.0e-12;

/// Hard-coded sweep floor: cells below this get their corners
/// re-smoothed at the end of the pass.
const BAD_CELL_QUALITY: f64 = 0.10;

// =============================================================================
// Quality surveys around a node
// =============================================================================

/// Minimum tet quality around a node; `None` without incident tets.
pub fn tet_quality_around(grid: &Grid, node: usize) -> Result<Option<f64>> {
  let mut min_quality: Option<f64> = None;
  for cell in grid.tet().adj().iter(node) {
    let q = tet_quality(&grid.nodes, grid.tet().nodes(cell)?);
    min_quality = Some(min_quality.map_or(q, |m: f64| m.min(q)));
  }
  Ok(min_quality)
}

/// Minimum tri quality around a node; `None` without incident tris.
pub fn tri_quality_around(grid: &Grid, node: usize) -> Result<Option<f64>> {
  let mut min_quality: Option<f64> = None;
  for cell in grid.tri().adj().iter(node) {
    let q = tri_quality(&grid.nodes, grid.tri().nodes(cell)?);
    min_quality = Some(min_quality.map_or(q, |m: f64| m.min(q)));
  }
  Ok(min_quality)
}

/// Minimum signed uv area around a surface node.
fn tri_uv_area_around(grid: &mut Grid, cad: &dyn CadOracle, node: usize) -> Result<f64> {
  let id = grid
    .geom
    .unique_id(node, GeomType::Face)?
    .ok_or_else(|| MeshError::Fatal(format!("node {node} has no face id")))?;
  let sign = {
    let (geom, tri) = grid.geom_and_tri_mut();
    geom.uv_area_sign(cad, tri, id)?
  };
  let mut min_area = f64::INFINITY;
  for cell in grid.tri().adj().iter(node) {
    let nodes = grid.tri().nodes(cell)?;
    min_area = min_area.min(sign * grid.geom.uv_area(cad, nodes, id)?);
  }
  Ok(min_area)
}

/// All cells of a kind around the node are fully owned here.
fn local_about(grid: &Grid, kind: CellKind, node: usize) -> Result<bool> {
  let store = grid.cell(kind);
  for cell in store.adj().iter(node) {
    for &n in store.nodes(cell)? {
      if !grid.nodes.owned(n, grid.rank) {
        return Ok(false);
      }
    }
  }
  Ok(true)
}

// =============================================================================
// Ideal positions
// =============================================================================

/// Ideal spot for `node` as seen by one triangle: the apex of the
/// metric-equilateral triangle erected over the opposite edge.
fn tri_ideal(grid: &Grid, node: usize, tri: usize) -> Result<DVec3> {
  let nodes = grid.tri().nodes(tri)?;
  let mut others = nodes.iter().copied().filter(|&n| n != node);
  let (n0, n1) = (
    others
      .next()
      .ok_or_else(|| MeshError::Fatal(format!("node {node} not in tri {tri}")))?,
    others
      .next()
      .ok_or_else(|| MeshError::Fatal(format!("tri {tri} degenerate around {node}")))?,
  );
  let mid = 0.5 * (grid.nodes.xyz(n0) + grid.nodes.xyz(n1));
  let dt = grid.nodes.xyz(n1) - grid.nodes.xyz(n0);
  let mut dn = grid.nodes.xyz(node) - mid;

  let tangent = dt.dot(dt);
  let projection = dn.dot(dt);
  if !divisible(projection, tangent) {
    return Err(MeshError::Fatal(format!("tri {tri} has zero tangent")));
  }
  dn -= (projection / tangent) * dt;
  let dn = try_unit(dn)
    .ok_or_else(|| MeshError::Fatal(format!("node {node} sits on tri {tri} base")))?;

  let length = grid.nodes.metric(node).length(dn);
  let altitude = 0.5 * 3.0f64.sqrt();
  if !divisible(altitude, length) {
    return Err(MeshError::Fatal(format!("metric collapsed at node {node}")));
  }
  Ok(mid + (altitude / length) * dn)
}

/// Ideal spot for `node` as seen by one tet: the apex of the regular
/// metric tetrahedron erected over the opposite face.
fn tet_ideal(grid: &Grid, node: usize, tet: usize) -> Result<DVec3> {
  let nodes = grid.tet().nodes(tet)?;
  let at = nodes
    .iter()
    .position(|&n| n == node)
    .ok_or_else(|| MeshError::Fatal(format!("node {node} not in tet {tet}")))?;
  let face = CellKind::Tet.faces()[at];
  let tri = [nodes[face[0]], nodes[face[1]], nodes[face[2]]];

  let centroid =
    (grid.nodes.xyz(tri[0]) + grid.nodes.xyz(tri[1]) + grid.nodes.xyz(tri[2])) / 3.0;
  let dn = try_unit(crate::quality::tri_normal(&grid.nodes, &tri))
    .ok_or_else(|| MeshError::Fatal(format!("tet {tet} has zero-area face")))?;

  let length = grid.nodes.metric(node).length(dn);
  let altitude = 6.0f64.sqrt() / 3.0;
  if !divisible(altitude, length) {
    return Err(MeshError::Fatal(format!("metric collapsed at node {node}")));
  }
  Ok(centroid + (altitude / length) * dn)
}

/// 1/q-weighted average of the per-cell ideals around a node.
fn weighted_ideal(
  grid: &Grid,
  config: &AdaptConfig,
  kind: CellKind,
  node: usize,
) -> Result<DVec3> {
  let mut normalization = 0.0;
  let mut ideal = DVec3::ZERO;
  for cell in grid.cell(kind).adj().iter(node) {
    let cell_ideal = match kind {
      CellKind::Tet => tet_ideal(grid, node, cell)?,
      _ => tri_ideal(grid, node, cell)?,
    };
    let quality = match kind {
      CellKind::Tet => tet_quality(&grid.nodes, grid.cell(kind).nodes(cell)?),
      _ => tri_quality(&grid.nodes, grid.cell(kind).nodes(cell)?),
    };
    let weight = 1.0 / quality.max(config.smooth_min_quality);
    normalization += weight;
    ideal += weight * cell_ideal;
  }
  if !divisible(1.0, normalization) {
    return Err(MeshError::Fatal(format!(
      "no cells to weight ideal of node {node}"
    )));
  }
  Ok(ideal / normalization)
}

// =============================================================================
// Interior smoothing
// =============================================================================

/// Move an interior node toward its weighted ideal, halving the step
/// until the minimum incident tet quality strictly improves. A fully
/// failed search restores the original coordinates exactly.
pub fn tet_improve(grid: &mut Grid, config: &AdaptConfig, node: usize) -> Result<bool> {
  if grid.node_on_boundary(node) {
    return Ok(false);
  }
  let Some(quality0) = tet_quality_around(grid, node)? else {
    return Ok(false);
  };
  let original = grid.nodes.xyz(node);
  let ideal = weighted_ideal(grid, config, CellKind::Tet, node)?;

  let mut backoff = 1.0;
  for _ in 0..MAX_BACKOFF {
    grid
      .nodes
      .set_xyz(node, backoff * ideal + (1.0 - backoff) * original)?;
    if let Some(quality) = tet_quality_around(grid, node)? {
      if quality > quality0 {
        return Ok(true);
      }
    }
    backoff *= 0.5;
  }
  grid.nodes.set_xyz(node, original)?;
  Ok(false)
}

/// Post-split touch-up of a freshly inserted interior node.
pub fn post_edge_split(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  node: usize,
) -> Result<()> {
  let _ = cad;
  if !local_about(grid, CellKind::Tet, node)? {
    grid.nodes.age_increment(node);
    return Ok(());
  }
  if !grid.node_on_boundary(node) && !grid.tet().node_empty(node) {
    tet_improve(grid, config, node)?;
    grid.nodes.age_reset(node);
  }
  Ok(())
}

// =============================================================================
// CAD edge smoothing
// =============================================================================

/// Slide a CAD-edge node along t to balance its two neighbor ratios.
/// One percent imbalance is left alone.
pub fn geom_edge(grid: &mut Grid, cad: &dyn CadOracle, config: &AdaptConfig, node: usize) -> Result<()> {
  if grid.geom.is_a(node, GeomType::Node) {
    return Err(MeshError::Fatal(format!("CAD node {node} is pinned")));
  }
  let Some(id) = grid.geom.unique_id(node, GeomType::Edge)? else {
    return Err(MeshError::Fatal(format!("node {node} has no edge record")));
  };
  let neighbors = grid.edg().node_list_around(node);
  if neighbors.len() != 2 {
    return Ok(());
  }
  let (n0, n1) = (neighbors[0], neighbors[1]);

  let r0 = ratio(&grid.nodes, n0, node);
  let r1 = ratio(&grid.nodes, n1, node);
  let rsum = r0 + r1;
  if !divisible(r0, rsum) {
    return Err(MeshError::Fatal(format!("zero ratio sum at node {node}")));
  }
  if (r0 / rsum - 0.5).abs() < 0.01 {
    return Ok(());
  }

  let cell0 = grid
    .edg()
    .with(&[n0, node])
    .ok_or_else(|| MeshError::Fatal(format!("no edg cell joining {n0} and {node}")))?;
  let cell0_nodes: SmallVec<[usize; 2]> = SmallVec::from_slice(grid.edg().nodes(cell0)?);
  let t0 = grid.geom.cell_tuv(cad, n0, &cell0_nodes, GeomType::Edge, id)?[0];
  let t_orig = grid
    .geom
    .cell_tuv(cad, node, &cell0_nodes, GeomType::Edge, id)?[0];
  let cell1 = grid
    .edg()
    .with(&[n1, node])
    .ok_or_else(|| MeshError::Fatal(format!("no edg cell joining {n1} and {node}")))?;
  let cell1_nodes: SmallVec<[usize; 2]> = SmallVec::from_slice(grid.edg().nodes(cell1)?);
  let t1 = grid.geom.cell_tuv(cad, n1, &cell1_nodes, GeomType::Edge, id)?[0];

  // shift the arc-length coordinate toward balance
  let sr = r0 / rsum;
  if !divisible(t_orig - t0, t1 - t0) {
    return Ok(());
  }
  let st = (t_orig - t0) / (t1 - t0) + (0.5 - sr);
  let t_target = st * t1 + (1.0 - st) * t0;

  let original_xyz = grid.nodes.xyz(node);
  let mut backoff = 1.0;
  for _ in 0..MAX_BACKOFF {
    let t = backoff * t_target + (1.0 - backoff) * t_orig;
    grid.geom.add(node, GeomType::Edge, id, [t, 0.0]);
    geom::constrain(grid, cad, node)?;
    let acceptable = tet_quality_around(grid, node)?
      .map_or(true, |q| q > config.smooth_min_quality);
    if acceptable {
      return Ok(());
    }
    backoff *= 0.5;
  }

  grid.geom.add(node, GeomType::Edge, id, [t_orig, 0.0]);
  geom::constrain(grid, cad, node)?;
  grid.nodes.set_xyz(node, original_xyz)?;
  Ok(())
}

// =============================================================================
// CAD face smoothing
// =============================================================================

/// Quality of the oriented triangle after a trial uv step.
fn tri_quality_at_uv(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  node: usize,
  id: i32,
  tri: &[usize; 3],
  uv: [f64; 2],
  dq_duv: [f64; 2],
  step: f64,
) -> Result<f64> {
  let trial = [uv[0] + step * dq_duv[0], uv[1] + step * dq_duv[1]];
  grid.geom.add(node, GeomType::Face, id, trial);
  geom::constrain(grid, cad, node)?;
  Ok(tri_quality(&grid.nodes, tri))
}

/// Conjugate-gradient walk of one triangle's ideal uv for `node`.
/// Restores the node's original uv and position before returning.
fn tri_ideal_uv(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  node: usize,
  tri_cell: usize,
) -> Result<[f64; 2]> {
  let nodes = grid.tri().nodes(tri_cell)?;
  let mut oriented: SmallVec<[usize; 3]> = SmallVec::from_slice(nodes);
  orient_node0(node, &mut oriented)?;
  let tri = [oriented[0], oriented[1], oriented[2]];

  let id = grid.tri().id(tri_cell)?;
  let uv_orig = grid.geom.tuv(node, GeomType::Face, id)?;

  let mut uv = uv_orig;
  let mut dq_duv = [0.0; 2];
  let mut dq_duv_prev = [0.0; 2];
  let mut q = tri_quality(&grid.nodes, &tri);

  for tries in 0..30 {
    if q >= 0.99 {
      break;
    }
    grid.geom.add(node, GeomType::Face, id, uv);
    geom::constrain(grid, cad, node)?;
    let (quality, dq_dxyz) = tri_dquality_dnode0(&grid.nodes, &tri);
    q = quality;
    let eval = cad.eval(GeomType::Face, id, uv)?;
    let dq_duv1 = [dq_dxyz.dot(eval.deriv[0]), dq_dxyz.dot(eval.deriv[1])];

    if tries == 0 {
      dq_duv = dq_duv1;
    } else {
      // Polak-Ribiere, clamped at zero
      let num = dq_duv1[0] * (dq_duv1[0] - dq_duv_prev[0])
        + dq_duv1[1] * (dq_duv1[1] - dq_duv_prev[1]);
      let denom = dq_duv_prev[0] * dq_duv_prev[0] + dq_duv_prev[1] * dq_duv_prev[1];
      let beta = if divisible(num, denom) {
        (num / denom).max(0.0)
      } else {
        0.0
      };
      dq_duv = [dq_duv1[0] + beta * dq_duv[0], dq_duv1[1] + beta * dq_duv[1]];
    }
    dq_duv_prev = dq_duv1;

    let slope = (dq_duv[0] * dq_duv[0] + dq_duv[1] * dq_duv[1]).sqrt();
    if !divisible(1.0 - q, slope) {
      break;
    }
    // bracketed bisection along the search direction
    let mut step1 = 0.0;
    let mut step3 = (1.0 - q) / slope;
    let mut step2 = 0.5 * (step1 + step3);
    let mut q1 = tri_quality_at_uv(grid, cad, node, id, &tri, uv, dq_duv, step1)?;
    let mut q2 = tri_quality_at_uv(grid, cad, node, id, &tri, uv, dq_duv, step2)?;
    let mut q3 = tri_quality_at_uv(grid, cad, node, id, &tri, uv, dq_duv, step3)?;
    for _ in 0..15 {
      if q1 > q3 {
        step3 = step2;
        q3 = q2;
      } else {
        step1 = step2;
        q1 = q2;
      }
      step2 = 0.5 * (step1 + step3);
      q2 = tri_quality_at_uv(grid, cad, node, id, &tri, uv, dq_duv, step2)?;
    }
    uv = [uv[0] + step2 * dq_duv[0], uv[1] + step2 * dq_duv[1]];
    q = q2;
  }

  grid.geom.add(node, GeomType::Face, id, uv_orig);
  geom::constrain(grid, cad, node)?;
  Ok(uv)
}

/// 1/q-weighted ideal uv over the triangles around a node.
fn weighted_ideal_uv(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  node: usize,
) -> Result<[f64; 2]> {
  let cells: SmallVec<[usize; 8]> = grid.tri().adj().list(node);
  let mut normalization = 0.0;
  let mut ideal = [0.0; 2];
  for cell in cells {
    let uv = tri_ideal_uv(grid, cad, node, cell)?;
    let quality = tri_quality(&grid.nodes, grid.tri().nodes(cell)?);
    let weight = 1.0 / quality.max(config.smooth_min_quality);
    normalization += weight;
    ideal[0] += weight * uv[0];
    ideal[1] += weight * uv[1];
  }
  if !divisible(1.0, normalization) {
    return Err(MeshError::Fatal(format!(
      "no triangles to weight ideal uv of node {node}"
    )));
  }
  Ok([ideal[0] / normalization, ideal[1] / normalization])
}

/// Smooth a CAD-face node in parameter space.
pub fn geom_face(
  grid: &mut Grid,
  cad: &dyn CadOracle,
  config: &AdaptConfig,
  node: usize,
) -> Result<()> {
  let Some(id) = grid.geom.unique_id(node, GeomType::Face)? else {
    return Err(MeshError::Fatal(format!("node {node} has no face record")));
  };
  if grid.geom.is_a(node, GeomType::Node) || grid.geom.is_a(node, GeomType::Edge) {
    return Err(MeshError::Fatal(format!(
      "node {node} is edge/vertex constrained, not a face interior"
    )));
  }
  if !grid.qua().node_empty(node) {
    return Ok(());
  }

  let uv_orig = grid.geom.tuv(node, GeomType::Face, id)?;
  let xyz_orig = grid.nodes.xyz(node);
  let Some(qtri_orig) = tri_quality_around(grid, node)? else {
    return Ok(());
  };

  let uv_ideal = weighted_ideal_uv(grid, cad, config, node)?;
  let [uv_min, uv_max] = geom::tri_uv_bounding_box(grid, cad, node)?;

  let mut backoff = 1.0;
  for _ in 0..MAX_BACKOFF {
    let uv = [
      backoff * uv_ideal[0] + (1.0 - backoff) * uv_orig[0],
      backoff * uv_ideal[1] + (1.0 - backoff) * uv_orig[1],
    ];
    grid.geom.add(node, GeomType::Face, id, uv);
    geom::constrain(grid, cad, node)?;
    let qtet = tet_quality_around(grid, node)?;
    let qtri = tri_quality_around(grid, node)?.unwrap_or(-2.0);
    let min_uv_area = tri_uv_area_around(grid, cad, node)?;
    let tet_ok = qtet.map_or(true, |q| q > config.smooth_min_quality);
    if qtri >= qtri_orig
      && tet_ok
      && min_uv_area > 1.0e-12
      && uv_min[0] < uv[0]
      && uv[0] < uv_max[0]
      && uv_min[1] < uv[1]
      && uv[1] < uv_max[1]
    {
      return Ok(());
    }
    backoff *= 0.5;
  }

  grid.geom.add(node, GeomType::Face, id, uv_orig);
  geom::constrain(grid, cad, node)?;
  grid.nodes.set_xyz(node, xyz_orig)?;
  Ok(())
}

// =============================================================================
// Boundary without CAD
// =============================================================================

/// All triangle normals around the node agree to within machine angle.
fn same_normal_around(grid: &Grid, node: usize) -> Result<bool> {
  let mut first: Option<DVec3> = None;
  for cell in grid.tri().adj().iter(node) {
    let normal = crate::quality::tri_normal(&grid.nodes, grid.tri().nodes(cell)?);
    let Some(unit) = try_unit(normal) else {
      return Ok(false);
    };
    match first {
      None => first = Some(unit),
      Some(reference) => {
        // acos(1 - 1e-8) is about a hundredth of a degree
        if reference.dot(unit) < 1.0 - 1.0e-8 {
          return Ok(false);
        }
      }
    }
  }
  Ok(true)
}

/// Smooth a boundary node that has no CAD support: only flat patches
/// move, and only within the surface plane's tolerance.
fn no_geom_tri_improve(grid: &mut Grid, config: &AdaptConfig, node: usize) -> Result<()> {
  if !grid.qua().node_empty(node) {
    return Ok(());
  }
  if grid.tri().id_list_around(node).len() > 1 {
    return Ok(());
  }
  if grid.geom.is_a(node, GeomType::Face) {
    return Ok(());
  }
  if !same_normal_around(grid, node)? {
    return Ok(());
  }

  let Some(tri_quality0) = tri_quality_around(grid, node)? else {
    return Ok(());
  };
  let original = grid.nodes.xyz(node);
  let ideal = weighted_ideal(grid, config, CellKind::Tri, node)?;

  let mut backoff = 1.0;
  for _ in 0..MAX_BACKOFF {
    grid
      .nodes
      .set_xyz(node, backoff * ideal + (1.0 - backoff) * original)?;
    let tet_ok = tet_quality_around(grid, node)?.map_or(true, |q| q > config.smooth_min_quality);
    if tet_ok {
      if let Some(quality) = tri_quality_around(grid, node)? {
        if quality > tri_quality0 {
          return Ok(());
        }
      }
    }
    backoff *= 0.5;
  }
  grid.nodes.set_xyz(node, original)?;
  Ok(())
}

// =============================================================================
// Nonsmooth (active-set) smoothing
// =============================================================================

struct NsoGather {
  quals: Vec<f64>,
  grads: Vec<DVec3>,
  worst: usize,
  active: Vec<usize>,
}

fn nso_gather(grid: &Grid, node: usize) -> Result<Option<NsoGather>> {
  let mut quals = Vec::new();
  let mut grads = Vec::new();
  for cell in grid.tet().adj().iter(node) {
    let mut nodes: SmallVec<[usize; 4]> = SmallVec::from_slice(grid.tet().nodes(cell)?);
    orient_node0(node, &mut nodes)?;
    let (q, dq) = tet_dquality_dnode0(&grid.nodes, &nodes);
    quals.push(q);
    grads.push(dq);
  }
  if quals.is_empty() {
    return Ok(None);
  }
  let worst = quals
    .iter()
    .enumerate()
    .min_by(|a, b| a.1.total_cmp(b.1))
    .map(|(i, _)| i)
    .unwrap_or(0);
  let mut active = vec![worst];
  for (i, &q) in quals.iter().enumerate() {
    if i != worst && (q - quals[worst]) < NSO_ACTIVE_TOL {
      active.push(i);
    }
  }
  Ok(Some(NsoGather {
    quals,
    grads,
    worst,
    active,
  }))
}

/// Projector onto the orthogonal complement of the active gradients'
/// span, per Charalambous and Conn: `P = I − Nᵀ(NNᵀ)⁻¹N` with
/// `N = [1, −∇q_i]`.
fn nso_direction(gather: &NsoGather) -> Option<DVec3> {
  let nactive = gather.active.len();
  if nactive == 1 {
    return Some(gather.grads[gather.worst]);
  }

  let mut n_mat = vec![0.0; nactive * 4];
  for (row, &i) in gather.active.iter().enumerate() {
    n_mat[row * 4] = 1.0;
    let g = gather.grads[i];
    n_mat[row * 4 + 1] = -g.x;
    n_mat[row * 4 + 2] = -g.y;
    n_mat[row * 4 + 3] = -g.z;
  }

  let mut nnt = vec![0.0; nactive * nactive];
  for i in 0..nactive {
    for j in 0..nactive {
      for k in 0..4 {
        nnt[i * nactive + j] += n_mat[i * 4 + k] * n_mat[j * 4 + k];
      }
    }
  }
  let inv = inverse_gen(nactive, &nnt)?;

  // P = I - Nt inv N, we only need column 0, rows 1..=3
  let mut p_col0 = [0.0f64; 4];
  for row in 0..4 {
    let mut nt_inv_n = 0.0;
    for a in 0..nactive {
      for b in 0..nactive {
        nt_inv_n += n_mat[a * 4 + row] * inv[a * nactive + b] * n_mat[b * 4];
      }
    }
    p_col0[row] = if row == 0 { 1.0 - nt_inv_n } else { -nt_inv_n };
  }
  Some(DVec3::new(p_col0[1], p_col0[2], p_col0[3]))
}

/// One projected-gradient step. Returns `true` when the optimum is
/// reached (four active constraints, vanishing slope, or step
/// exhaustion).
pub fn nso_step(grid: &mut Grid, node: usize) -> Result<bool> {
  let Some(gather) = nso_gather(grid, node)? else {
    return Ok(true);
  };
  if gather.active.len() >= 4 {
    return Ok(true);
  }

  let Some(dir) = nso_direction(&gather) else {
    return Ok(true);
  };
  let Some(dir) = try_unit(dir) else {
    return Ok(true);
  };
  let m0 = dir.dot(gather.grads[gather.worst]);
  if m0 <= 0.0 {
    return Ok(true);
  }

  // first inactive constraint this direction will collide with
  let mut min_alpha = f64::INFINITY;
  let mut mate = None;
  for i in 0..gather.quals.len() {
    if gather.active.contains(&i) {
      continue;
    }
    let m1 = dir.dot(gather.grads[i]);
    if !divisible(gather.quals[gather.worst] - gather.quals[i], m1 - m0) {
      continue;
    }
    let alpha = (gather.quals[gather.worst] - gather.quals[i]) / (m1 - m0);
    if alpha > 0.0 && alpha < min_alpha {
      min_alpha = alpha;
      mate = Some(i);
    }
  }
  if mate.is_none() {
    min_alpha = gather
      .quals
      .iter()
      .zip(&gather.grads)
      .map(|(&q, g)| (1.0 - q) / dir.dot(*g))
      .fold(f64::INFINITY, f64::min);
  }
  if !min_alpha.is_finite() {
    return Ok(true);
  }

  let xyz = grid.nodes.xyz(node);
  let min_qual = gather.quals[gather.worst];
  let mut alpha = min_alpha;
  let mut last_alpha = 0.0;
  let mut last_qual = 0.0;
  let mut quality = min_qual;
  let mut reductions = 0;
  while reductions < MAX_BACKOFF {
    grid.nodes.set_xyz(node, xyz + alpha * dir)?;
    quality = tet_quality_around(grid, node)?.unwrap_or(min_qual);
    let requirement = 0.9 * alpha * m0 + min_qual;
    if reductions > 0 && quality < last_qual && quality > min_qual {
      // the previous, longer step was the better one
      alpha = last_alpha;
      quality = last_qual;
      grid.nodes.set_xyz(node, xyz + alpha * dir)?;
      break;
    }
    if quality > requirement || alpha < 1.0e-12 {
      break;
    }
    last_alpha = alpha;
    last_qual = quality;
    alpha *= 0.5;
    reductions += 1;
  }

  if reductions >= MAX_BACKOFF {
    // marginal gains remain, put it back
    grid.nodes.set_xyz(node, xyz)?;
    return Ok(true);
  }
  if gather.active.len() == 3 && (quality - min_qual) < 1.0e-5 {
    return Ok(true);
  }
  Ok(false)
}

/// Drive the active-set stepper to its stopping condition.
pub fn nso(grid: &mut Grid, node: usize) -> Result<()> {
  if !local_about(grid, CellKind::Tet, node)? {
    return Ok(());
  }
  if grid.node_on_boundary(node) {
    return Ok(());
  }
  for _ in 0..100 {
    if nso_step(grid, node)? {
      break;
    }
  }
  Ok(())
}

// =============================================================================
// Passes
// =============================================================================

/// One smoothing sub-pass: CAD edge nodes, CAD face nodes, plain
/// boundary nodes, interior nodes, then a sweep over the corners of any
/// cell still under the hard quality floor.
pub fn pass(grid: &mut Grid, cad: &dyn CadOracle, config: &AdaptConfig) -> Result<()> {
  if grid.twod {
    return twod_pass(grid, config);
  }

  if cad.loaded() {
    // edges first, they constrain faces
    let edge_nodes: Vec<usize> = grid
      .geom
      .each_of_type(GeomType::Edge)
      .map(|(_, r)| r.node)
      .collect();
    for node in edge_nodes {
      if !grid.nodes.valid(node) || grid.geom.is_a(node, GeomType::Node) {
        continue;
      }
      if !local_about(grid, CellKind::Tet, node)? {
        grid.nodes.age_increment(node);
        continue;
      }
      geom_edge(grid, cad, config, node)?;
      grid.nodes.age_reset(node);
    }

    let face_nodes: Vec<usize> = grid
      .geom
      .each_of_type(GeomType::Face)
      .map(|(_, r)| r.node)
      .collect();
    for node in face_nodes {
      if !grid.nodes.valid(node) || grid.geom.is_a(node, GeomType::Edge) || grid.geom.is_a(node, GeomType::Node) {
        continue;
      }
      if !local_about(grid, CellKind::Tet, node)? {
        grid.nodes.age_increment(node);
        continue;
      }
      geom_face(grid, cad, config, node)?;
      grid.nodes.age_reset(node);
    }
  }

  // boundary triangulation without CAD support
  let boundary: Vec<usize> = grid
    .nodes
    .each_valid()
    .filter(|&n| !grid.tri().node_empty(n))
    .collect();
  for node in boundary {
    if !local_about(grid, CellKind::Tet, node)? || !local_about(grid, CellKind::Tri, node)? {
      grid.nodes.age_increment(node);
      continue;
    }
    no_geom_tri_improve(grid, config, node)?;
  }

  // interior
  let interior: Vec<usize> = grid
    .nodes
    .each_valid()
    .filter(|&n| !grid.node_on_boundary(n))
    .collect();
  for node in interior {
    if !local_about(grid, CellKind::Tet, node)? {
      grid.nodes.age_increment(node);
      continue;
    }
    tet_improve(grid, config, node)?;
    grid.nodes.age_reset(node);
  }

  // rescue sweep over the corners of still-bad cells
  let bad: Vec<usize> = {
    let mut nodes = Vec::new();
    for cell in grid.tet().each_valid() {
      let cell_nodes = grid.tet().nodes(cell)?;
      if tet_quality(&grid.nodes, cell_nodes) < BAD_CELL_QUALITY {
        nodes.extend_from_slice(cell_nodes);
      }
    }
    nodes
  };
  let mut nrescue = 0;
  for node in bad {
    if !grid.nodes.valid(node) || grid.node_on_boundary(node) {
      continue;
    }
    if !local_about(grid, CellKind::Tet, node)? {
      grid.nodes.age_increment(node);
      continue;
    }
    if tet_improve(grid, config, node)? {
      nrescue += 1;
    }
    grid.nodes.age_reset(node);
  }
  debug!(nrescue, "smooth sub-pass rescue sweep");

  Ok(())
}

/// Two-layer smoothing: improve each floor node against the floor
/// triangulation, then mirror the in-plane move onto the opposite node.
fn twod_pass(grid: &mut Grid, config: &AdaptConfig) -> Result<()> {
  let floor: Vec<usize> = grid
    .nodes
    .each_valid()
    .filter(|&n| twod::node_active(grid, n))
    .collect();
  for node in floor {
    if !grid.qua().node_empty(node) {
      continue; // boundary of the 2D domain stays
    }
    if !local_about(grid, CellKind::Pri, node)? {
      grid.nodes.age_increment(node);
      continue;
    }
    grid.nodes.age_reset(node);

    let Some(quality0) = tri_quality_around(grid, node)? else {
      continue;
    };
    let original = grid.nodes.xyz(node);
    let ideal = weighted_ideal(grid, config, CellKind::Tri, node)?;

    let mut backoff = 1.0;
    let mut accepted = false;
    for _ in 0..MAX_BACKOFF {
      let trial = backoff * ideal + (1.0 - backoff) * original;
      // stay in the layer plane
      grid
        .nodes
        .set_xyz(node, DVec3::new(trial.x, original.y, trial.z))?;
      if let Some(quality) = tri_quality_around(grid, node)? {
        if quality > quality0 {
          accepted = true;
          break;
        }
      }
      backoff *= 0.5;
    }
    if !accepted {
      grid.nodes.set_xyz(node, original)?;
      continue;
    }
    // mirror x/z onto the opposite layer
    let opposite = twod::opposite_node(grid.pri(), node)?;
    let moved = grid.nodes.xyz(node);
    let opp_xyz = grid.nodes.xyz(opposite);
    grid
      .nodes
      .set_xyz(opposite, DVec3::new(moved.x, opp_xyz.y, moved.z))?;
  }
  Ok(())
}

#[cfg(test)]
#[path = "smooth_test.rs"]
mod smooth_test;
