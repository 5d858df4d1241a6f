//! Candidate-pair enumeration over the owned boxes.
//!
//! The grid emits every pair of point indices whose boxes are stencil
//! neighbors; the consumer applies its own cutoff to the candidate list.
//! Within one box the `other > this` tie-break keeps intra-box pairs unique;
//! across boxes, uniqueness is the half stencil's job. The interior/boundary
//! split partitions the owned boxes so consumers can overlap boundary-pair
//! computation with halo communication.

use super::BoxGrid;
use crate::error::BoxSieveError;
use crate::mesh::SpatialPoint;
use std::collections::{BTreeMap, BTreeSet};

/// Candidate pairs plus (optionally) the per-point neighbour map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePairs {
    /// Emitted `(p, q)` index pairs, in box-then-stencil order.
    pub pairs: Vec<(usize, usize)>,
    /// Symmetric neighbour sets, keyed by point index. Empty when the grid
    /// was told not to build it.
    pub neighbours: BTreeMap<usize, BTreeSet<usize>>,
}

impl NodePairs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<const DIM: usize> BoxGrid<DIM> {
    /// Enumerate candidate pairs over every owned box.
    pub fn calculate_node_pairs<P: SpatialPoint<DIM>>(
        &self,
        points: &[P],
    ) -> Result<NodePairs, BoxSieveError> {
        let mut out = NodePairs::new();
        self.seed_neighbour_sets(points, &mut out)?;
        for box_index in self.owned_box_range() {
            self.add_pairs_from_box(box_index, &mut out)?;
        }
        Ok(out)
    }

    /// Enumerate candidate pairs over the interior owned boxes only. Safe to
    /// run while halo payloads are still in flight.
    pub fn calculate_interior_node_pairs<P: SpatialPoint<DIM>>(
        &self,
        points: &[P],
    ) -> Result<NodePairs, BoxSieveError> {
        let mut out = NodePairs::new();
        self.seed_neighbour_sets(points, &mut out)?;
        for box_index in self.owned_box_range() {
            if self.is_interior_box(box_index) {
                self.add_pairs_from_box(box_index, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Append the boundary boxes' pairs to `out`. Requires the halo boxes to
    /// be up to date on both sides of each rank boundary.
    pub fn calculate_boundary_node_pairs(&self, out: &mut NodePairs) -> Result<(), BoxSieveError> {
        for box_index in self.owned_box_range() {
            if !self.is_interior_box(box_index) {
                self.add_pairs_from_box(box_index, out)?;
            }
        }
        Ok(())
    }

    fn seed_neighbour_sets<P: SpatialPoint<DIM>>(
        &self,
        points: &[P],
        out: &mut NodePairs,
    ) -> Result<(), BoxSieveError> {
        if !self.calculate_node_neighbours {
            return Ok(());
        }
        for point in points {
            let box_index = self.calculate_containing_box(point.location())?;
            if self.owns_box(box_index) {
                out.neighbours.entry(point.index()).or_default();
            }
        }
        Ok(())
    }

    /// Emit the pairs contributed by one owned box: its points against the
    /// points of every stencil neighbor (owned or halo).
    fn add_pairs_from_box(
        &self,
        box_index: usize,
        out: &mut NodePairs,
    ) -> Result<(), BoxSieveError> {
        let contained = self.box_ref(box_index).points();
        if contained.is_empty() {
            return Ok(());
        }

        for &other_box in self.stencil(box_index)? {
            let neighbour_box = if self.owns_box(other_box) {
                self.box_ref(other_box)
            } else {
                self.halo_box_ref(other_box)
                    .ok_or(BoxSieveError::NoSuchBox(other_box))?
            };

            for &other_index in neighbour_box.points() {
                for &index in contained {
                    if other_box == box_index {
                        // Same box: count each unordered pair once.
                        if other_index > index {
                            out.pairs.push((index, other_index));
                            if self.calculate_node_neighbours {
                                out.neighbours.entry(index).or_default().insert(other_index);
                                out.neighbours.entry(other_index).or_default().insert(index);
                            }
                        }
                    } else {
                        out.pairs.push((index, other_index));
                        if self.calculate_node_neighbours {
                            out.neighbours.entry(index).or_default().insert(other_index);
                            out.neighbours.entry(other_index).or_default().insert(index);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
