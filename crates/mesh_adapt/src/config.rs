//! Adaptation thresholds and named constants.
//!
//! Target edge length in the metric is 1. The split and collapse
//! triggers overshoot the half/double band by 10% so the two operators
//! cannot ping-pong on the same edge: an edge must grow past
//! `sqrt(2)·1.1` before it splits and shrink below the reciprocal before
//! it collapses.
//!
//! The `post_*` fields are not user inputs: the driver re-derives them
//! from the parameter survey at the start of every pass and uses the
//! pass-over-pass change to propose termination.

/// Ratio overshoot keeping split and collapse out of each other's band.
pub const RATIO_OVERSHOOT: f64 = 1.1;

/// A node older than this (passes without a successful local operation)
/// blocks the termination proposal: some rank is starving it.
pub const MAX_NODE_AGE: i32 = 50;

/// Relative pass-over-pass ratio change below which the driver
/// considers the ratio band converged.
pub const RATIO_CONVERGENCE: f64 = 1.0e-2;

/// Knobs for one adaptation invocation.
///
/// Quality floors are adaptive: the survey clamps them each pass to
/// `max(min(0.1, observed_min), 1e-3)` so a bad initial mesh can still
/// make progress while a good mesh is held to a real floor.
#[derive(Clone, Debug)]
pub struct AdaptConfig {
  /// Collapse sub-passes per outer pass.
  pub collapse_per_pass: usize,
  /// Split sub-passes per outer pass.
  pub split_per_pass: usize,
  /// Smooth sub-passes per outer pass.
  pub smooth_per_pass: usize,
  /// Surface-swap sub-passes (run twice per pass on surface grids).
  pub swap_per_pass: usize,

  /// Edge ratio above which an edge is a split candidate (strict).
  pub split_ratio: f64,
  /// Hard floor on the worst post-split cell quality.
  pub split_quality_absolute: f64,
  /// Post-split quality must also reach this fraction of the cavity's
  /// pre-split minimum.
  pub split_quality_relative: f64,

  /// Edge ratio below which an edge is a collapse candidate (strict).
  pub collapse_ratio: f64,
  /// Floor on every remaining cell's quality after a collapse.
  pub collapse_quality_absolute: f64,
  /// Chord-height fraction of local spacing tolerated when welding
  /// surface triangles during a collapse.
  pub collapse_chord_height: f64,
  /// Cosine floor for the welded-versus-original surface normal check.
  pub collapse_same_normal: f64,

  /// Quality floor protecting smoothing steps.
  pub smooth_min_quality: f64,

  /// Swap must beat the current configuration's minimum quality by this
  /// margin before it is accepted.
  pub swap_improvement: f64,

  /// Surveyed normal-deviation floor applied by collapse and swap.
  pub post_min_normdev: f64,
  /// Surveyed ratio band, updated by the parameter survey.
  pub post_min_ratio: f64,
  pub post_max_ratio: f64,

  /// Emit per-sub-pass fitness lines.
  pub watch_param: bool,
}

impl Default for AdaptConfig {
  fn default() -> Self {
    let overshoot = RATIO_OVERSHOOT;
    Self {
      collapse_per_pass: 1,
      split_per_pass: 1,
      smooth_per_pass: 1,
      swap_per_pass: 3,

      split_ratio: 2.0f64.sqrt() * overshoot,
      split_quality_absolute: 1.0e-3,
      split_quality_relative: 0.1,

      collapse_ratio: 1.0 / (2.0f64.sqrt() * overshoot),
      collapse_quality_absolute: 1.0e-3,
      collapse_chord_height: 0.5,
      collapse_same_normal: 0.5,

      smooth_min_quality: 1.0e-3,

      swap_improvement: 1.0e-12,

      post_min_normdev: 0.0,
      post_min_ratio: 1.0e-3,
      post_max_ratio: 3.0,

      watch_param: false,
    }
  }
}

#[cfg(test)]
mod config_test {
  use super::*;

  #[test]
  fn split_and_collapse_bands_do_not_overlap() {
    let config = AdaptConfig::default();
    assert!(config.split_ratio > 1.0);
    assert!(config.collapse_ratio < 1.0);
    // an edge split at the trigger yields halves above the collapse trigger
    assert!(config.split_ratio / 2.0 > config.collapse_ratio);
  }
}
