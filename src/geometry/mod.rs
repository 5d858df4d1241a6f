//! Axis-aligned domain geometry for the box grid.

mod extents;

pub use extents::DomainExtents;

/// Additive fudge absorbing floating-point rounding at box boundaries.
///
/// Every comparison that decides which side of a box face a coordinate falls
/// on adds this to the left-hand side, so a point sitting numerically on a
/// face lands in the same box on every axis.
pub const BOX_FUDGE: f64 = 5e-14;
