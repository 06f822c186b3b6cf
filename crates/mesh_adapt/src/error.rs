//! Status and error types for the adaptation core.
//!
//! Two layers, deliberately kept apart:
//!
//! - [`OpOutcome`]: the advisory result of a local operator. A declined
//!   operation is normal control flow: the driver counts it and moves
//!   on; the mesh changes next pass and the operation is retried there.
//! - [`MeshError`]: a genuine failure. `Fatal` means an invariant was
//!   violated (adjacency corruption, a cell referencing a removed node)
//!   and the caller should abort with the diagnostic; `OutOfRange` flags
//!   inputs outside documented preconditions and is typically escalated.

use thiserror::Error;

/// Why a local operator refused to act.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclineReason {
  /// Edge ratio on the wrong side of the threshold.
  Ratio,
  /// Cavity touches a cell with a node owned by another rank.
  Locality,
  /// A non-simplex cell is incident to the edge.
  MixedKind,
  /// CAD topology forbids the move (pinned node, incompatible entity).
  Geometry,
  /// A post-operation quality guard failed.
  Quality,
  /// The collapse would produce a degenerate cell.
  Manifold,
  /// Surface normal deviation guard failed.
  NormalDeviation,
  /// The search direction or line search produced no improvement.
  NoImprovement,
}

/// Advisory operator result. `Declined` is not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpOutcome {
  Applied,
  Declined(DeclineReason),
}

impl OpOutcome {
  #[inline]
  pub fn applied(&self) -> bool {
    matches!(self, OpOutcome::Applied)
  }
}

/// Non-advisory failures.
#[derive(Debug, Error)]
pub enum MeshError {
  /// Violated invariant; the diagnostic names the offending node/cell.
  #[error("fatal mesh inconsistency: {0}")]
  Fatal(String),

  /// Input outside a documented precondition.
  #[error("{what} out of range: {value} not in [{min}, {max}]")]
  OutOfRange {
    what: &'static str,
    value: i64,
    min: i64,
    max: i64,
  },

  /// Arena exhausted the signed-32-bit index budget.
  #[error("{0} arena cannot grow past 2^30 slots")]
  ArenaFull(&'static str),
}

pub type Result<T> = std::result::Result<T, MeshError>;
