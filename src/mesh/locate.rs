//! Tiered containing-element search over an element-indexed box grid.
//!
//! Three escalating scopes: the query point's own box, then the box's
//! stencil, then (in safe mode) the whole mesh. A point in none of them gets
//! the nearest candidate element instead, with its (extrapolating) weights —
//! that outcome is counted, never raised. Each tier returns a [`TierOutcome`]
//! and the tiers compose as a plain pipeline.
//!
//! The tiers assume the grid's box width is at least the mesh's maximum edge
//! length, so interior points resolve in tier 1 or 2.

use super::{MeshProvider, PointHit};
use crate::error::BoxSieveError;
use crate::grid::BoxGrid;
use std::collections::BTreeSet;

/// Result of one search tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    /// A containing element was identified.
    Found {
        element: usize,
        weights: Vec<f64>,
    },
    /// Not in this tier's scope; try the next one.
    TryNext,
}

/// How a query was ultimately resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateOutcome {
    /// A containing element was found (in whichever tier).
    Found,
    /// The point is outside the mesh; the hit names the nearest candidate
    /// element and its extrapolating weights.
    NearestFallback,
}

/// Counters for a batch of point locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocateStatistics {
    /// Queries resolved to a containing element.
    pub found: usize,
    /// Queries that fell back to a nearest element.
    pub not_found: usize,
}

impl LocateStatistics {
    pub fn record(&mut self, outcome: LocateOutcome) {
        match outcome {
            LocateOutcome::Found => self.found += 1,
            LocateOutcome::NearestFallback => self.not_found += 1,
        }
    }
}

/// A point-location view over one element-indexed grid and its mesh.
pub struct PointLocator<'a, const DIM: usize, M: MeshProvider<DIM>> {
    grid: &'a BoxGrid<DIM>,
    mesh: &'a M,
}

impl<'a, const DIM: usize, M: MeshProvider<DIM>> PointLocator<'a, DIM, M> {
    pub fn new(grid: &'a BoxGrid<DIM>, mesh: &'a M) -> Self {
        Self { grid, mesh }
    }

    /// Locate the element containing `point`, whose containing box the
    /// caller has already computed. `safe_mode` inserts the whole-mesh tier
    /// before the nearest-element fallback.
    pub fn locate(
        &self,
        point: [f64; DIM],
        box_for_point: usize,
        safe_mode: bool,
    ) -> Result<(PointHit, LocateOutcome), BoxSieveError> {
        let box_elements = self.grid.box_ref(box_for_point).elements().clone();

        if let TierOutcome::Found { element, weights } = self.try_candidates(point, &box_elements) {
            return Ok((PointHit { element, weights }, LocateOutcome::Found));
        }

        // Tier 2: the rest of the stencil. The containing box was already
        // tested above.
        let mut stencil_elements = BTreeSet::new();
        for &neighbour in self.grid.stencil(box_for_point)? {
            if neighbour != box_for_point {
                stencil_elements.extend(self.grid.box_ref(neighbour).elements().iter().copied());
            }
        }
        stencil_elements.retain(|e| !box_elements.contains(e));
        if let TierOutcome::Found { element, weights } =
            self.try_candidates(point, &stencil_elements)
        {
            return Ok((PointHit { element, weights }, LocateOutcome::Found));
        }

        if safe_mode {
            if let TierOutcome::Found { element, weights } = self.try_whole_mesh(point) {
                return Ok((PointHit { element, weights }, LocateOutcome::Found));
            }
        }

        // The point is in no element (or fast mode skipped the whole-mesh
        // scan): fall back to the nearest element among everything the
        // stencil offered, self box included.
        let mut fallback = box_elements;
        fallback.extend(stencil_elements);
        let element = self
            .mesh
            .nearest_element_from(point, &fallback)
            .ok_or(BoxSieveError::NoCandidateElements)?;
        let weights = self.mesh.interpolation_weights(element, point);
        Ok((PointHit { element, weights }, LocateOutcome::NearestFallback))
    }

    fn try_candidates(&self, point: [f64; DIM], candidates: &BTreeSet<usize>) -> TierOutcome {
        if candidates.is_empty() {
            return TierOutcome::TryNext;
        }
        match self.mesh.containing_element(point, Some(candidates)) {
            Some(element) => TierOutcome::Found {
                weights: self.mesh.interpolation_weights(element, point),
                element,
            },
            None => TierOutcome::TryNext,
        }
    }

    fn try_whole_mesh(&self, point: [f64; DIM]) -> TierOutcome {
        match self.mesh.containing_element(point, None) {
            Some(element) => TierOutcome::Found {
                weights: self.mesh.interpolation_weights(element, point),
                element,
            },
            None => TierOutcome::TryNext,
        }
    }
}
