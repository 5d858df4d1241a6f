//! Bulk point-location services over a fine/coarse mesh pair.
//!
//! `MeshPair` owns one element-indexed box grid per mesh (built on demand,
//! torn down explicitly) and answers the four bulk queries: fine elements and
//! weights for the coarse mesh's quadrature points or nodes, and coarse
//! elements for the fine mesh's nodes or element centroids.
//!
//! With the `rayon` feature the queries fan out per point; statistics are
//! merged afterwards, so results and counters are identical either way.

use super::locate::{LocateOutcome, LocateStatistics, PointLocator};
use super::{MeshProvider, QuadratureRule};
use crate::env::Environment;
use crate::error::BoxSieveError;
use crate::geometry::DomainExtents;
use crate::grid::BoxGrid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A located element and the query point's barycentric weights in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointHit {
    pub element: usize,
    /// `DIM + 1` interpolation weights.
    pub weights: Vec<f64>,
}

/// Fallback divisor for the default box width: one box less than the target
/// count across x, plus a sliver against numerical fluctuation.
const DEFAULT_WIDTH_DIVISOR: f64 = 19.000000001;

/// Two meshes over the same domain and the box grids indexing their elements.
pub struct MeshPair<'m, const DIM: usize, F, C>
where
    F: MeshProvider<DIM> + Sync,
    C: MeshProvider<DIM> + Sync,
{
    fine: &'m F,
    coarse: &'m C,
    fine_grid: Option<BoxGrid<DIM>>,
    coarse_grid: Option<BoxGrid<DIM>>,
    fine_hits: Vec<PointHit>,
    coarse_elements_for_fine_nodes: Vec<usize>,
    coarse_elements_for_fine_element_centroids: Vec<usize>,
    statistics: LocateStatistics,
    not_in_mesh: Vec<usize>,
    not_in_mesh_weights: Vec<Vec<f64>>,
    verbose: bool,
}

impl<'m, const DIM: usize, F, C> MeshPair<'m, DIM, F, C>
where
    F: MeshProvider<DIM> + Sync,
    C: MeshProvider<DIM> + Sync,
{
    pub fn new(fine: &'m F, coarse: &'m C, verbose: bool) -> Self {
        Self {
            fine,
            coarse,
            fine_grid: None,
            coarse_grid: None,
            fine_hits: Vec::new(),
            coarse_elements_for_fine_nodes: Vec::new(),
            coarse_elements_for_fine_element_centroids: Vec::new(),
            statistics: LocateStatistics::default(),
            not_in_mesh: Vec::new(),
            not_in_mesh_weights: Vec::new(),
            verbose,
        }
    }

    pub fn fine_mesh(&self) -> &F {
        self.fine
    }

    pub fn coarse_mesh(&self) -> &C {
        self.coarse
    }

    // --- grid setup ---

    /// Index the fine mesh's elements into a fresh box grid. `box_width` of
    /// `None` picks `max(1.1 * max_edge, x_extent / 19.000000001)`.
    pub fn set_up_boxes_on_fine_mesh(
        &mut self,
        box_width: Option<f64>,
    ) -> Result<(), BoxSieveError> {
        self.fine_grid = Some(build_element_grid(self.fine, box_width)?);
        Ok(())
    }

    /// Index the coarse mesh's elements into a fresh box grid.
    pub fn set_up_boxes_on_coarse_mesh(
        &mut self,
        box_width: Option<f64>,
    ) -> Result<(), BoxSieveError> {
        self.coarse_grid = Some(build_element_grid(self.coarse, box_width)?);
        Ok(())
    }

    /// Drop the fine grid (queries against it then need a fresh setup).
    pub fn delete_fine_box_collection(&mut self) {
        self.fine_grid = None;
    }

    /// Drop the coarse grid.
    pub fn delete_coarse_box_collection(&mut self) {
        self.coarse_grid = None;
    }

    pub fn fine_box_collection(&self) -> Option<&BoxGrid<DIM>> {
        self.fine_grid.as_ref()
    }

    pub fn coarse_box_collection(&self) -> Option<&BoxGrid<DIM>> {
        self.coarse_grid.as_ref()
    }

    // --- bulk queries against the fine grid ---

    /// For each quadrature point of the coarse mesh (element-major), find the
    /// containing fine element and weights.
    pub fn compute_fine_elements_and_weights_for_coarse_quad_points(
        &mut self,
        quad_rule: &QuadratureRule<DIM>,
        safe_mode: bool,
    ) -> Result<&[PointHit], BoxSieveError> {
        let positions = quad_rule.physical_points(self.coarse);
        self.compute_fine_hits("coarse quadrature points", positions, safe_mode)?;
        Ok(&self.fine_hits)
    }

    /// For each node of the coarse mesh, find the containing fine element and
    /// weights.
    pub fn compute_fine_elements_and_weights_for_coarse_nodes(
        &mut self,
        safe_mode: bool,
    ) -> Result<&[PointHit], BoxSieveError> {
        let positions = (0..self.coarse.num_nodes())
            .map(|i| self.coarse.node(i))
            .collect();
        self.compute_fine_hits("coarse nodes", positions, safe_mode)?;
        Ok(&self.fine_hits)
    }

    fn compute_fine_hits(
        &mut self,
        what: &'static str,
        positions: Vec<[f64; DIM]>,
        safe_mode: bool,
    ) -> Result<(), BoxSieveError> {
        let grid = self
            .fine_grid
            .as_ref()
            .ok_or(BoxSieveError::UnconfiguredGrid("set_up_boxes_on_fine_mesh"))?;
        if self.verbose {
            tracing::info!(queries = positions.len(), what, "computing fine elements and weights");
        }

        let locator = PointLocator::new(grid, self.fine);
        let located = locate_batch(grid, &locator, &positions, safe_mode)?;

        self.reset_statistics();
        self.fine_hits = Vec::with_capacity(located.len());
        for (index, (hit, outcome)) in located.into_iter().enumerate() {
            self.statistics.record(outcome);
            if outcome == LocateOutcome::NearestFallback {
                self.not_in_mesh.push(index);
                self.not_in_mesh_weights.push(hit.weights.clone());
            }
            self.fine_hits.push(hit);
        }

        if self.statistics.not_found > 0 {
            tracing::warn!(
                outside = self.statistics.not_found,
                total = self.fine_hits.len(),
                what,
                "query points were outside the fine mesh"
            );
        }
        Ok(())
    }

    // --- bulk queries against the coarse grid ---

    /// For each fine-mesh node, the containing coarse element (index only).
    pub fn compute_coarse_elements_for_fine_nodes(
        &mut self,
        safe_mode: bool,
    ) -> Result<&[usize], BoxSieveError> {
        let positions: Vec<_> = (0..self.fine.num_nodes()).map(|i| self.fine.node(i)).collect();
        let elements = self.compute_coarse_elements("fine nodes", positions, safe_mode)?;
        self.coarse_elements_for_fine_nodes = elements;
        Ok(&self.coarse_elements_for_fine_nodes)
    }

    /// For each fine-mesh element centroid, the containing coarse element.
    pub fn compute_coarse_elements_for_fine_element_centroids(
        &mut self,
        safe_mode: bool,
    ) -> Result<&[usize], BoxSieveError> {
        let positions: Vec<_> = (0..self.fine.num_elements())
            .map(|e| self.fine.element_centroid(e))
            .collect();
        let elements = self.compute_coarse_elements("fine element centroids", positions, safe_mode)?;
        self.coarse_elements_for_fine_element_centroids = elements;
        Ok(&self.coarse_elements_for_fine_element_centroids)
    }

    fn compute_coarse_elements(
        &mut self,
        what: &'static str,
        positions: Vec<[f64; DIM]>,
        safe_mode: bool,
    ) -> Result<Vec<usize>, BoxSieveError> {
        let grid = self.coarse_grid.as_ref().ok_or(BoxSieveError::UnconfiguredGrid(
            "set_up_boxes_on_coarse_mesh",
        ))?;
        if self.verbose {
            tracing::info!(queries = positions.len(), what, "computing coarse elements");
        }

        let locator = PointLocator::new(grid, self.coarse);
        let located = locate_batch(grid, &locator, &positions, safe_mode)?;

        self.reset_statistics();
        let mut elements = Vec::with_capacity(located.len());
        for (hit, outcome) in located {
            self.statistics.record(outcome);
            elements.push(hit.element);
        }

        if self.statistics.not_found > 0 {
            tracing::warn!(
                outside = self.statistics.not_found,
                total = elements.len(),
                what,
                "query points were outside the coarse mesh"
            );
        }
        Ok(elements)
    }

    // --- statistics ---

    fn reset_statistics(&mut self) {
        self.statistics = LocateStatistics::default();
        self.not_in_mesh.clear();
        self.not_in_mesh_weights.clear();
    }

    /// Counters for the last bulk operation.
    pub fn statistics(&self) -> LocateStatistics {
        self.statistics
    }

    /// Query indices (of the last fine bulk operation) that fell outside the
    /// mesh.
    pub fn not_in_mesh_indices(&self) -> &[usize] {
        &self.not_in_mesh
    }

    /// Nearest-element weights for the queries in
    /// [`not_in_mesh_indices`](Self::not_in_mesh_indices).
    pub fn not_in_mesh_weights(&self) -> &[Vec<f64>] {
        &self.not_in_mesh_weights
    }

    /// Log the statistics of the last bulk operation.
    pub fn print_statistics(&self) {
        tracing::info!(
            found = self.statistics.found,
            not_found = self.statistics.not_found,
            "mesh pair statistics for the last-called operation"
        );
        for (index, weights) in self.not_in_mesh.iter().zip(&self.not_in_mesh_weights) {
            tracing::info!(query = index, ?weights, "query outside mesh; nearest-element weights");
        }
    }
}

/// Build a single-process grid over a bounding box 5% larger than the mesh on
/// each side and bucket every element into each box containing one of its
/// vertices.
fn build_element_grid<const DIM: usize, M: MeshProvider<DIM>>(
    mesh: &M,
    box_width: Option<f64>,
) -> Result<BoxGrid<DIM>, BoxSieveError> {
    let (lower, upper) = mesh.bounding_box();
    let mut min = [0.0; DIM];
    let mut max = [0.0; DIM];
    for i in 0..DIM {
        let width = upper[i] - lower[i];
        min[i] = lower[i] - 0.05 * width;
        max[i] = upper[i] + 0.05 * width;
    }
    let extents = DomainExtents::new(min, max);

    let box_width = match box_width {
        Some(w) => w,
        None => {
            // Default: about twenty boxes across x, but never narrower than
            // the longest element edge.
            let from_extent = (max[0] - min[0]) / DEFAULT_WIDTH_DIVISOR;
            let (_, max_edge) = mesh.min_max_edge_lengths();
            if from_extent < max_edge {
                1.1 * max_edge
            } else {
                from_extent
            }
        }
    };

    let mut grid = BoxGrid::new(box_width, extents, false, None, &Environment::serial())?;
    grid.setup_all_local_boxes();

    for element in 0..mesh.num_elements() {
        let mut boxes = BTreeSet::new();
        for &vertex in mesh.element_vertices(element) {
            boxes.insert(grid.calculate_containing_box(mesh.node(vertex))?);
        }
        for box_index in boxes {
            grid.box_mut(box_index).add_element(element);
        }
    }
    Ok(grid)
}

#[cfg(feature = "rayon")]
fn locate_batch<const DIM: usize, M: MeshProvider<DIM> + Sync>(
    grid: &BoxGrid<DIM>,
    locator: &PointLocator<'_, DIM, M>,
    positions: &[[f64; DIM]],
    safe_mode: bool,
) -> Result<Vec<(PointHit, LocateOutcome)>, BoxSieveError> {
    use rayon::prelude::*;
    positions
        .par_iter()
        .map(|&position| {
            let box_for_point = grid.calculate_containing_box(position)?;
            locator.locate(position, box_for_point, safe_mode)
        })
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn locate_batch<const DIM: usize, M: MeshProvider<DIM> + Sync>(
    grid: &BoxGrid<DIM>,
    locator: &PointLocator<'_, DIM, M>,
    positions: &[[f64; DIM]],
    safe_mode: bool,
) -> Result<Vec<(PointHit, LocateOutcome)>, BoxSieveError> {
    positions
        .iter()
        .map(|&position| {
            let box_for_point = grid.calculate_containing_box(position)?;
            locator.locate(position, box_for_point, safe_mode)
        })
        .collect()
}
