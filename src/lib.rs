//! # box-sieve
//!
//! box-sieve is a distributed spatial-hashing engine for particle and mesh
//! neighborhood queries, plus a fine/coarse mesh point-location service
//! layered on top of it. It is aimed at large simulations of moving points
//! (cells, particles) and unstructured simplicial meshes.
//!
//! ## Features
//! - A distributed uniform-box grid ([`grid::BoxGrid`]): domain partitioning
//!   along the last axis, box-index arithmetic, one-box-thick halo slabs
//!   kept in sync with the two vertical neighbor ranks
//! - Full and half neighbor stencils over 1-d/2-d/3-d grids, with optional
//!   x-periodicity in 2-d, driving duplicate-free candidate-pair enumeration
//! - A one-row-at-a-time load-balancing protocol between adjacent ranks
//! - A tiered point-location service over a pair of meshes
//!   ([`mesh::MeshPair`]): box, stencil, whole-mesh, nearest-element fallback
//! - Pluggable communication backends (serial, threaded, MPI) behind one
//!   [`comm::Communicator`] trait
//!
//! ## Usage
//! Add `box-sieve` as a dependency and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! box-sieve = "0.1"
//! # Optional features:
//! # features = ["rayon", "mpi-support"]
//! ```
//!
//! A serial pair enumeration looks like:
//!
//! ```rust
//! use box_sieve::prelude::*;
//!
//! # fn main() -> Result<(), box_sieve::error::BoxSieveError> {
//! let env = Environment::serial();
//! let domain = DomainExtents::new([0.0], [3.0]);
//! let mut grid: BoxGrid<1> = BoxGrid::new(1.0, domain, false, None, &env)?;
//! grid.setup_local_boxes_half_only()?;
//!
//! let points = [(0usize, [0.1]), (1, [0.5]), (2, [1.2]), (3, [2.7])];
//! for (index, location) in &points {
//!     grid.insert_point(*index, *location)?;
//! }
//! let out = grid.calculate_node_pairs(&points)?;
//! assert_eq!(out.pairs, vec![(0, 1), (0, 2), (1, 2), (2, 3)]);
//! # Ok(())
//! # }
//! ```
//!
//! Dimension is a const generic: the same algorithms serve `BoxGrid<1>`,
//! `BoxGrid<2>` and `BoxGrid<3>` with no dimension branch on the hot path.
//! Everything a collective needs (communicator, verbosity, protocol tags)
//! travels in an explicit [`env::Environment`]; there is no global state.

pub mod comm;
pub mod env;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod mesh;

/// A convenient prelude to import the most-used traits and types.
pub mod prelude {
    pub use crate::comm::{CommTag, Communicator, GridCommTags, NoComm, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::env::Environment;
    pub use crate::error::BoxSieveError;
    pub use crate::geometry::DomainExtents;
    pub use crate::grid::{BoxGrid, GridBox, NodePairs, RowPartition};
    pub use crate::mesh::{
        LocateOutcome, LocateStatistics, MeshPair, MeshProvider, PointHit, PointLocator,
        QuadratureRule, SimplexMesh, SpatialPoint, TierOutcome,
    };
}
