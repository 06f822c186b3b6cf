//! Metric edge ratio and simplex quality.
//!
//! All measures live in the node metrics: an edge has unit ratio when
//! its metric length is 1, and a simplex has quality 1 when it is the
//! regular simplex of the cell-averaged metric. Quality is
//! dimensionless in [0, 1]; a tetrahedron with non-positive Euclidean
//! volume reports that volume as its "quality" so callers can rank how
//! inverted a candidate is.
//!
//! Gradients with respect to the leading node are analytic; the
//! smoothing operators consume them directly and, through the CAD
//! surface Jacobian, in (u,v).

use glam::DVec3;

use crate::math::divisible;
use crate::matrix::SymMat3;
use crate::node::NodeStore;

/// Normalization making the regular metric triangle quality 1:
/// `4 sqrt(3) · area / sum of squared edge lengths`.
const TRI_NORM: f64 = 6.928203230275509; // 4 sqrt(3)

/// Normalization making the regular metric tetrahedron quality 1:
/// `36 / 3^(1/3) · vol^(2/3) / sum of squared edge lengths`.
const TET_NORM: f64 = 24.961508830135313; // 36 / 3^(1/3)

/// One-sided metric lengths below this are treated as collapsed and
/// short-circuit the interpolation.
const RATIO_FLOOR: f64 = 1.0e-12;

// =============================================================================
// Edge ratio
// =============================================================================

/// Metric edge ratio between two nodes.
///
/// One-sided lengths `l0 = sqrt(dᵀ M0 d)` and `l1` generally disagree;
/// the continuous-interpolation mean `l_min (r − 1)/(r ln r)` with
/// `r = l_min/l_max` weights the endpoints symmetrically (Loseille &
/// Alauzet). The arithmetic mean is used inside machine precision of
/// `r = 1`, and a collapsed endpoint reports the smaller length.
pub fn ratio(nodes: &NodeStore, node0: usize, node1: usize) -> f64 {
  let d = nodes.xyz(node1) - nodes.xyz(node0);
  let l0 = nodes.metric(node0).length(d);
  let l1 = nodes.metric(node1).length(d);

  if l0 < RATIO_FLOOR || l1 < RATIO_FLOOR {
    return l0.min(l1);
  }

  let (lo, hi) = if l0 < l1 { (l0, l1) } else { (l1, l0) };
  let r = lo / hi;
  if (r - 1.0).abs() < RATIO_FLOOR {
    return 0.5 * (l0 + l1);
  }
  lo * (r - 1.0) / (r * r.ln())
}

// =============================================================================
// Euclidean measures
// =============================================================================

/// Unnormalized triangle normal `(x1 − x0) × (x2 − x0)`.
pub fn tri_normal(nodes: &NodeStore, tri: &[usize]) -> DVec3 {
  let x0 = nodes.xyz(tri[0]);
  (nodes.xyz(tri[1]) - x0).cross(nodes.xyz(tri[2]) - x0)
}

/// Euclidean triangle area.
pub fn tri_area(nodes: &NodeStore, tri: &[usize]) -> f64 {
  0.5 * tri_normal(nodes, tri).length()
}

/// Signed tetrahedron volume; positive for the canonical orientation.
pub fn tet_vol(nodes: &NodeStore, tet: &[usize]) -> f64 {
  let a = nodes.xyz(tet[0]);
  let e1 = nodes.xyz(tet[1]) - a;
  let e2 = nodes.xyz(tet[2]) - a;
  let e3 = nodes.xyz(tet[3]) - a;
  e1.cross(e2).dot(e3) / 6.0
}

fn average_metric(nodes: &NodeStore, cell: &[usize]) -> SymMat3 {
  let metrics: smallvec::SmallVec<[SymMat3; 4]> =
    cell.iter().map(|&n| nodes.metric(n)).collect();
  SymMat3::average(&metrics)
}

// =============================================================================
// Triangle quality
// =============================================================================

/// Metric triangle area via the Gram determinant of two edges.
fn tri_metric_area(m: &SymMat3, u: DVec3, v: DVec3) -> f64 {
  let gram = m.vt_m_v(u) * m.vt_m_v(v) - m.vt_m_v_pair(u, v).powi(2);
  0.5 * gram.max(0.0).sqrt()
}

/// Triangle quality in the corner-averaged metric.
pub fn tri_quality(nodes: &NodeStore, tri: &[usize]) -> f64 {
  let m = average_metric(nodes, &tri[..3]);
  let x0 = nodes.xyz(tri[0]);
  let u = nodes.xyz(tri[1]) - x0;
  let v = nodes.xyz(tri[2]) - x0;
  let w = nodes.xyz(tri[2]) - nodes.xyz(tri[1]);

  let l2 = m.vt_m_v(u) + m.vt_m_v(v) + m.vt_m_v(w);
  if !divisible(1.0, l2) {
    return 0.0;
  }
  TRI_NORM * tri_metric_area(&m, u, v) / l2
}

/// Triangle quality and its gradient with respect to `tri[0]`.
pub fn tri_dquality_dnode0(nodes: &NodeStore, tri: &[usize]) -> (f64, DVec3) {
  let m = average_metric(nodes, &tri[..3]);
  let x0 = nodes.xyz(tri[0]);
  let u = nodes.xyz(tri[1]) - x0;
  let v = nodes.xyz(tri[2]) - x0;
  let w = nodes.xyz(tri[2]) - nodes.xyz(tri[1]);

  let uu = m.vt_m_v(u);
  let vv = m.vt_m_v(v);
  let uv = m.vt_m_v_pair(u, v);
  let l2 = uu + vv + m.vt_m_v(w);
  let gram = (uu * vv - uv * uv).max(0.0);
  let area = 0.5 * gram.sqrt();
  if !divisible(1.0, l2) || !divisible(1.0, gram.sqrt()) {
    return (0.0, DVec3::ZERO);
  }
  let q = TRI_NORM * area / l2;

  let mu = m.mul_vec(u);
  let mv = m.mul_vec(v);
  // d(gram)/dx0 with du/dx0 = dv/dx0 = -I
  let dgram = -2.0 * vv * mu - 2.0 * uu * mv + 2.0 * uv * (mu + mv);
  let darea = dgram / (4.0 * gram.sqrt());
  let dl2 = -2.0 * (mu + mv);
  let dq = TRI_NORM * (darea / l2 - area * dl2 / (l2 * l2));
  (q, dq)
}

// =============================================================================
// Tetrahedron quality
// =============================================================================

/// Tetrahedron quality in the corner-averaged metric. A non-positive
/// Euclidean volume is returned as-is (callers treat `q <= 0` as
/// inverted and can rank candidates by how negative they are).
pub fn tet_quality(nodes: &NodeStore, tet: &[usize]) -> f64 {
  let vol = tet_vol(nodes, tet);
  if vol <= 0.0 {
    return vol;
  }
  let m = average_metric(nodes, &tet[..4]);

  let l2 = tet_l2(nodes, &m, tet);
  if !divisible(1.0, l2) {
    return 0.0;
  }
  let det = m.det();
  if det <= 0.0 {
    return 0.0;
  }
  let vol_m = det.sqrt() * vol;
  TET_NORM * vol_m.powf(2.0 / 3.0) / l2
}

fn tet_l2(nodes: &NodeStore, m: &SymMat3, tet: &[usize]) -> f64 {
  let mut l2 = 0.0;
  for edge in crate::cell::CellKind::Tet.edges() {
    let e = nodes.xyz(tet[edge[1]]) - nodes.xyz(tet[edge[0]]);
    l2 += m.vt_m_v(e);
  }
  l2
}

/// Tetrahedron quality and its gradient with respect to `tet[0]`.
///
/// The gradient of an inverted cell is the (scaled) volume gradient so
/// a descent step drives the cell back through zero volume first.
pub fn tet_dquality_dnode0(nodes: &NodeStore, tet: &[usize]) -> (f64, DVec3) {
  let a = nodes.xyz(tet[0]);
  let b = nodes.xyz(tet[1]);
  let c = nodes.xyz(tet[2]);
  let d = nodes.xyz(tet[3]);
  let vol = (b - a).cross(c - a).dot(d - a) / 6.0;
  // gradient of the volume with respect to the apex: opposite face normal
  let dvol = -(c - b).cross(d - b) / 6.0;

  if vol <= 0.0 {
    return (vol, dvol);
  }

  let m = average_metric(nodes, &tet[..4]);
  let det = m.det();
  let l2 = tet_l2(nodes, &m, tet);
  if det <= 0.0 || !divisible(1.0, l2) {
    return (0.0, DVec3::ZERO);
  }

  let s = det.sqrt();
  let vol_m = s * vol;
  let q = TET_NORM * vol_m.powf(2.0 / 3.0) / l2;

  // edges leaving node 0 shrink when node 0 advances
  let dl2 = -2.0 * m.mul_vec((b - a) + (c - a) + (d - a));
  let dnum = TET_NORM * (2.0 / 3.0) * s.powf(2.0 / 3.0) * vol.powf(-1.0 / 3.0) * dvol;
  let dq = dnum / l2 - TET_NORM * vol_m.powf(2.0 / 3.0) * dl2 / (l2 * l2);
  (q, dq)
}

#[cfg(test)]
#[path = "quality_test.rs"]
mod quality_test;
