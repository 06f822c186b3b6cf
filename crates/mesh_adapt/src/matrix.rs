//! Symmetric 3×3 metric algebra.
//!
//! A Riemannian metric tensor is stored as its six unique entries in
//! upper-triangular order:
//!
//! ```text
//!       | m[0] m[1] m[2] |
//!   M = | m[1] m[3] m[4] |
//!       | m[2] m[4] m[5] |
//! ```
//!
//! Everything downstream (edge ratios, cell qualities, smoothing
//! gradients) is built on the quadratic form `vᵀ M v` and the metric
//! determinant, so those carry analytic derivatives where needed.

use glam::DVec3;

use crate::math::divisible;

/// Symmetric positive-definite 3×3 tensor, upper-triangular storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymMat3(pub [f64; 6]);

impl SymMat3 {
  /// The unit metric (Euclidean space).
  pub const IDENTITY: SymMat3 = SymMat3([1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);

  /// Diagonal metric from per-axis coefficients.
  pub fn from_diag(d0: f64, d1: f64, d2: f64) -> SymMat3 {
    SymMat3([d0, 0.0, 0.0, d1, 0.0, d2])
  }

  /// Quadratic form `vᵀ M v`.
  #[inline]
  pub fn vt_m_v(&self, v: DVec3) -> f64 {
    let m = &self.0;
    v.x * (m[0] * v.x + m[1] * v.y + m[2] * v.z)
      + v.y * (m[1] * v.x + m[3] * v.y + m[4] * v.z)
      + v.z * (m[2] * v.x + m[4] * v.y + m[5] * v.z)
  }

  /// Metric length `sqrt(vᵀ M v)` of a direction.
  #[inline]
  pub fn length(&self, v: DVec3) -> f64 {
    self.vt_m_v(v).max(0.0).sqrt()
  }

  /// Bilinear form `uᵀ M v`.
  #[inline]
  pub fn vt_m_v_pair(&self, u: DVec3, v: DVec3) -> f64 {
    u.dot(self.mul_vec(v))
  }

  /// Matrix-vector product `M v`.
  #[inline]
  pub fn mul_vec(&self, v: DVec3) -> DVec3 {
    let m = &self.0;
    DVec3::new(
      m[0] * v.x + m[1] * v.y + m[2] * v.z,
      m[1] * v.x + m[3] * v.y + m[4] * v.z,
      m[2] * v.x + m[4] * v.y + m[5] * v.z,
    )
  }

  /// Gradient of the metric length with respect to the direction:
  /// `d/dv sqrt(vᵀ M v) = M v / sqrt(vᵀ M v)`.
  ///
  /// Returns `None` for a zero metric length.
  pub fn length_deriv(&self, v: DVec3) -> Option<(f64, DVec3)> {
    let len = self.length(v);
    if !divisible(1.0, len) {
      return None;
    }
    Some((len, self.mul_vec(v) / len))
  }

  /// Determinant.
  pub fn det(&self) -> f64 {
    let m = &self.0;
    m[0] * (m[3] * m[5] - m[4] * m[4]) - m[1] * (m[1] * m[5] - m[4] * m[2])
      + m[2] * (m[1] * m[4] - m[3] * m[2])
  }

  /// Inverse, `None` when the determinant is not usable.
  pub fn inverse(&self) -> Option<SymMat3> {
    let m = &self.0;
    let det = self.det();
    if !divisible(1.0, det) {
      return None;
    }
    let inv = 1.0 / det;
    Some(SymMat3([
      inv * (m[3] * m[5] - m[4] * m[4]),
      inv * (m[2] * m[4] - m[1] * m[5]),
      inv * (m[1] * m[4] - m[2] * m[3]),
      inv * (m[0] * m[5] - m[2] * m[2]),
      inv * (m[1] * m[2] - m[0] * m[4]),
      inv * (m[0] * m[3] - m[1] * m[1]),
    ]))
  }

  /// Elementwise blend `(1 − w)·self + w·other`.
  pub fn weighted(&self, other: &SymMat3, w: f64) -> SymMat3 {
    let mut out = [0.0; 6];
    for i in 0..6 {
      out[i] = (1.0 - w) * self.0[i] + w * other.0[i];
    }
    SymMat3(out)
  }

  /// Mean of a set of metrics (cell-average metric for quality).
  pub fn average(metrics: &[SymMat3]) -> SymMat3 {
    let mut out = [0.0; 6];
    for m in metrics {
      for i in 0..6 {
        out[i] += m.0[i];
      }
    }
    let scale = 1.0 / metrics.len() as f64;
    for e in out.iter_mut() {
      *e *= scale;
    }
    SymMat3(out)
  }

  /// Positive-definiteness check via leading principal minors.
  pub fn healthy(&self) -> bool {
    let m = &self.0;
    let minor2 = m[0] * m[3] - m[1] * m[1];
    m.iter().all(|e| e.is_finite()) && m[0] > 0.0 && minor2 > 0.0 && self.det() > 0.0
  }
}

// =============================================================================
// Small dense helpers for the nonsmooth-smoothing projector
// =============================================================================

/// Invert a dense row-major n×n matrix (n ≤ 4) by Gauss-Jordan with
/// partial pivoting. Returns `None` on a vanishing pivot.
pub fn inverse_gen(n: usize, a: &[f64]) -> Option<Vec<f64>> {
  debug_assert!(n >= 1 && n <= 4);
  debug_assert_eq!(a.len(), n * n);

  let mut work = a.to_vec();
  let mut inv = vec![0.0; n * n];
  for i in 0..n {
    inv[i * n + i] = 1.0;
  }

  for col in 0..n {
    let mut pivot = col;
    for row in (col + 1)..n {
      if work[row * n + col].abs() > work[pivot * n + col].abs() {
        pivot = row;
      }
    }
    if pivot != col {
      for j in 0..n {
        work.swap(col * n + j, pivot * n + j);
        inv.swap(col * n + j, pivot * n + j);
      }
    }
    let diag = work[col * n + col];
    if !divisible(1.0, diag) {
      return None;
    }
    let scale = 1.0 / diag;
    for j in 0..n {
      work[col * n + j] *= scale;
      inv[col * n + j] *= scale;
    }
    for row in 0..n {
      if row == col {
        continue;
      }
      let factor = work[row * n + col];
      for j in 0..n {
        work[row * n + j] -= factor * work[col * n + j];
        inv[row * n + j] -= factor * inv[col * n + j];
      }
    }
  }

  Some(inv)
}

#[cfg(test)]
#[path = "matrix_test.rs"]
mod matrix_test;
