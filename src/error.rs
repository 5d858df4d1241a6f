//! `BoxSieveError`: unified error type for box-sieve public APIs
//!
//! Every fallible operation in the crate reports through this enum so callers
//! can propagate with `?` instead of unwinding. The one internally recovered
//! condition, a point-location tier failing to find a containing element, is
//! not represented here: the locator tiers communicate it through
//! [`TierOutcome`](crate::mesh::locate::TierOutcome) and only count it.

use thiserror::Error;

/// Unified error type for box-sieve operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoxSieveError {
    /// A query location lies outside the (possibly swollen) grid domain.
    #[error("the point {location:?} lies outside all of the boxes")]
    OutOfDomain {
        /// The offending coordinates.
        location: Vec<f64>,
    },
    /// Box grids are only defined for one, two or three dimensions.
    #[error("unsupported grid dimension {0} (expected 1, 2 or 3)")]
    UnsupportedDimension(usize),
    /// The box width must be strictly positive.
    #[error("invalid box width {0} (must be > 0)")]
    InvalidBoxWidth(f64),
    /// Periodicity in x requires a 2-d grid on a single process.
    #[error("periodicity in x requires a two-dimensional grid on a single process")]
    InvalidPeriodicity,
    /// A second half-stencil build was requested after the stencils were set.
    #[error("local box stencils are already set")]
    StencilAlreadyBuilt,
    /// Pair enumeration or a stencil query was issued before any stencil build.
    #[error("local box stencils have not been set up")]
    StencilNotBuilt,
    /// The global index does not name a locally owned box.
    #[error("box {0} is not owned by this process")]
    BoxNotOwned(usize),
    /// The global index names neither an owned box nor a halo box here.
    #[error("box {0} is neither owned nor a halo box on this process")]
    NoSuchBox(usize),
    /// Explicitly requested local row counts do not sum to the row total.
    #[error("requested local rows sum to {got}, expected {expected}")]
    PartitionMismatch {
        /// Total number of box rows along the last axis.
        expected: usize,
        /// Sum of the per-rank requests, observed on the top-most rank.
        got: usize,
    },
    /// A load distribution was supplied with the wrong number of rows.
    #[error("load distribution has {got} rows, expected {expected}")]
    DistributionLength {
        /// The number of locally owned rows.
        expected: usize,
        /// Length of the supplied histogram.
        got: usize,
    },
    /// A mesh-pair bulk operation was issued before its grid was set up.
    #[error("call {0}() before this operation")]
    UnconfiguredGrid(&'static str),
    /// The nearest-element fallback had no candidate elements to choose from.
    /// The grid's boxes are probably too small for the mesh edge lengths.
    #[error("point location fell through with no candidate elements (box width too small?)")]
    NoCandidateElements,
    /// Mesh connectivity handed to a provider was malformed.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// A blocking send/recv with a neighbor rank failed. The collective it
    /// belonged to is not restartable; callers rebuild from a checkpoint.
    #[error("communication with rank {peer} failed: {reason}")]
    Comm {
        /// Peer rank of the failed exchange.
        peer: usize,
        /// Backend-specific description.
        reason: String,
    },
}
