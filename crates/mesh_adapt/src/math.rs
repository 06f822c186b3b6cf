//! Scalar guards shared by the geometry kernels.
//!
//! Division and normalization show up in every quality and ratio
//! evaluation; both must reject degenerate inputs without panicking so
//! operators can decline instead of corrupting the mesh.

use glam::DVec3;

/// True when `num / denom` is representable.
///
/// The denominator must be far enough from zero that the quotient stays
/// finite; the literals bound the dynamic range rather than chasing ULPs.
#[inline]
pub fn divisible(num: f64, denom: f64) -> bool {
  denom.abs() > 1.0e-290 && num.abs() < 1.0e290 * denom.abs()
}

/// Normalize in place, reporting a zero-length input as `None`.
#[inline]
pub fn try_unit(v: DVec3) -> Option<DVec3> {
  let len = v.length();
  if divisible(1.0, len) {
    Some(v / len)
  } else {
    None
  }
}
