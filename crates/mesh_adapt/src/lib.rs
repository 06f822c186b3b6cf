//! mesh_adapt - metric-driven simplicial mesh adaptation
//!
//! The local-operator core of an unstructured-mesh adaptation engine:
//! it drives a simplicial mesh (surface triangles, volume tetrahedra,
//! and the two-layer prism representation of 2D problems) toward unit
//! edge length in a user-supplied Riemannian metric field while
//! keeping the mesh attached to a CAD boundary representation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────┐   ┌────────┐
//! │ Collapse  ├──►│  Split  ├──►│ Swap ├──►│ Smooth │   one adapt pass
//! └─────┬─────┘   └────┬────┘   └──┬───┘   └───┬────┘
//!       └──────────────┴───────────┴───────────┘
//!                      │ barrier = ghost exchange
//!                      ▼
//!        NodeStore + CellStore per kind + GeomStore
//!              (indices, never pointers)
//! ```
//!
//! Operators are advisory: every precondition failure is a decline, not
//! an error, and the driver simply retries next pass on the changed
//! mesh. The CAD kernel is an injected read-only oracle; geometry-free
//! adaptation runs against [`geom::NoCad`]. Distribution is SPMD over a
//! [`comm::Collective`] with ghost synchronization at every sub-pass
//! barrier.
//!
//! # Example
//!
//! ```ignore
//! use mesh_adapt::{adapt, comm::SingleRank, config::AdaptConfig, geom::NoCad};
//!
//! let mut grid = load_grid();
//! let mut config = AdaptConfig::default();
//! let passes = adapt::drive(&mut grid, &NoCad, &mut config, &SingleRank, 30)?;
//! println!("converged after {passes} passes");
//! ```

pub mod adjacency;
pub mod config;
pub mod error;
pub mod math;
pub mod matrix;

pub mod cell;
pub mod node;

pub mod edge;
pub mod face;
pub mod geom;
pub mod grid;
pub mod quality;

pub mod comm;
pub mod ghost;

pub mod collapse;
pub mod smooth;
pub mod split;
pub mod swap;
pub mod twod;

pub mod adapt;

// Re-export the handles a driver needs
pub use cell::{CellKind, CellStore};
pub use comm::{Collective, LocalComm, SingleRank};
pub use config::AdaptConfig;
pub use error::{DeclineReason, MeshError, OpOutcome, Result};
pub use geom::{CadOracle, GeomType, NoCad};
pub use grid::Grid;
pub use matrix::SymMat3;
pub use node::{MetricSource, NodeStore};

// Canonical small meshes shared by the test files
#[cfg(test)]
pub mod fixture;
