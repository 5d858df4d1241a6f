//! The distributed uniform-box grid.
//!
//! A `BoxGrid<DIM>` tiles an axis-aligned domain with boxes of one fixed
//! width and splits the stack of box rows along the last axis across the
//! ranks of a communicator. Each rank exclusively owns its rows; one-box-thick
//! halo slabs above and below mirror the neighbors' boundary rows. Consumers
//! insert points (by stable index), exchange halo contents each step, and ask
//! the grid to enumerate candidate interaction pairs.
//!
//! Dimension is a const generic so 1-d, 2-d and 3-d grids monomorphize; the
//! containing-box computation is a per-axis scan with no dimension branch.

mod balance;
mod bucket;
mod halo;
mod pairs;
mod partition;
mod stencil;

pub use bucket::GridBox;
pub use pairs::NodePairs;
pub use partition::{partition_rows, RowPartition};

use crate::comm::Communicator;
use crate::env::Environment;
use crate::error::BoxSieveError;
use crate::geometry::{DomainExtents, BOX_FUDGE};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

/// A distributed collection of fixed-width axis-aligned boxes.
#[derive(Debug, Clone)]
pub struct BoxGrid<const DIM: usize> {
    box_width: f64,
    domain: DomainExtents<DIM>,
    is_periodic_in_x: bool,
    num_boxes: [usize; DIM],
    boxes_per_face: usize,
    total_boxes: usize,
    partition: RowPartition,
    rank: usize,
    size: usize,
    /// Global index of the first owned box.
    min_box_index: usize,
    /// One past the global index of the last owned box.
    end_box_index: usize,
    boxes: Vec<GridBox>,
    halo_boxes: Vec<GridBox>,
    halo_map: HashMap<usize, usize>,
    /// Owned bottom-row boxes whose contents are serialized to the rank below.
    halos_left: Vec<usize>,
    /// Owned top-row boxes whose contents are serialized to the rank above.
    halos_right: Vec<usize>,
    halo_nodes_left: Vec<usize>,
    halo_nodes_right: Vec<usize>,
    stencils: Option<Vec<BTreeSet<usize>>>,
    calculate_node_neighbours: bool,
}

impl<const DIM: usize> BoxGrid<DIM> {
    /// Build the grid over `domain` with boxes of width `box_width`.
    ///
    /// The domain is swollen per axis to an integer multiple of the box
    /// width, and along the last axis until there is at least one row of
    /// boxes per rank. `requested_local_rows` overrides the even row split
    /// (all ranks must request, and the counts must sum to the row total).
    pub fn new<C: Communicator>(
        box_width: f64,
        domain: DomainExtents<DIM>,
        is_periodic_in_x: bool,
        requested_local_rows: Option<usize>,
        env: &Environment<C>,
    ) -> Result<Self, BoxSieveError> {
        if !(1..=3).contains(&DIM) {
            return Err(BoxSieveError::UnsupportedDimension(DIM));
        }
        if !(box_width > 0.0) {
            return Err(BoxSieveError::InvalidBoxWidth(box_width));
        }
        // Periodicity only works in 2d and on a single process.
        if is_periodic_in_x && (DIM != 2 || env.size() != 1) {
            return Err(BoxSieveError::InvalidPeriodicity);
        }

        let mut domain = domain;
        domain.swell_to_multiple(box_width);

        let mut num_boxes = [0usize; DIM];
        for (i, n) in num_boxes.iter_mut().enumerate() {
            *n = domain.count_strides(i, box_width);
        }

        // Make sure there are enough rows for the number of ranks.
        let size = env.size();
        if num_boxes[DIM - 1] < size {
            let missing = size - num_boxes[DIM - 1];
            domain.raise_max(DIM - 1, missing as f64 * box_width);
            num_boxes[DIM - 1] = size;
        }

        let partition = partition_rows(num_boxes[DIM - 1], requested_local_rows, env)?;

        let boxes_per_face: usize = num_boxes[..DIM - 1].iter().product();
        let total_boxes = boxes_per_face * num_boxes[DIM - 1];
        let min_box_index = partition.lo() * boxes_per_face;
        let end_box_index = partition.hi() * boxes_per_face;

        let boxes = vec![GridBox::new(); end_box_index - min_box_index];

        Ok(Self {
            box_width,
            domain,
            is_periodic_in_x,
            num_boxes,
            boxes_per_face,
            total_boxes,
            partition,
            rank: env.rank(),
            size,
            min_box_index,
            end_box_index,
            boxes,
            halo_boxes: Vec::new(),
            halo_map: HashMap::new(),
            halos_left: Vec::new(),
            halos_right: Vec::new(),
            halo_nodes_left: Vec::new(),
            halo_nodes_right: Vec::new(),
            stencils: None,
            calculate_node_neighbours: true,
        })
    }

    // --- geometry accessors ---

    #[inline]
    pub fn box_width(&self) -> f64 {
        self.box_width
    }

    /// The swollen domain the grid actually tiles.
    #[inline]
    pub fn domain(&self) -> &DomainExtents<DIM> {
        &self.domain
    }

    #[inline]
    pub fn is_periodic_in_x(&self) -> bool {
        self.is_periodic_in_x
    }

    /// Boxes along each axis.
    #[inline]
    pub fn num_boxes_each_direction(&self) -> [usize; DIM] {
        self.num_boxes
    }

    /// Total number of boxes across all ranks.
    #[inline]
    pub fn num_boxes(&self) -> usize {
        self.total_boxes
    }

    /// Number of locally owned boxes.
    #[inline]
    pub fn num_local_boxes(&self) -> usize {
        self.boxes.len()
    }

    /// Number of boxes in one plane orthogonal to the last axis.
    #[inline]
    pub fn boxes_per_face(&self) -> usize {
        self.boxes_per_face
    }

    /// Number of locally owned rows of boxes.
    #[inline]
    pub fn num_local_rows(&self) -> usize {
        self.partition.local_rows()
    }

    #[inline]
    pub fn partition(&self) -> &RowPartition {
        &self.partition
    }

    /// Global indices of the locally owned boxes.
    #[inline]
    pub fn owned_box_range(&self) -> Range<usize> {
        self.min_box_index..self.end_box_index
    }

    // --- indexing ---

    /// Global index of the box containing `location`.
    ///
    /// Fails with [`BoxSieveError::OutOfDomain`] when any coordinate lies
    /// outside `[min, max)`. The per-axis scan is deliberately sequential so
    /// the fudge semantics match across axes.
    pub fn calculate_containing_box(&self, location: [f64; DIM]) -> Result<usize, BoxSieveError> {
        for i in 0..DIM {
            if location[i] < self.domain.min(i) || !(location[i] < self.domain.max(i)) {
                return Err(BoxSieveError::OutOfDomain {
                    location: location.to_vec(),
                });
            }
        }

        let mut coords = [0usize; DIM];
        for i in 0..DIM {
            let mut box_counter = self.domain.min(i);
            while box_counter + self.box_width <= location[i] + BOX_FUDGE {
                coords[i] += 1;
                box_counter += self.box_width;
            }
        }

        let index = self.global_index_from_coords(coords);
        debug_assert!(index < self.total_boxes);
        Ok(index)
    }

    /// Mixed-radix composition `c[0] + c[1]*N[0] + c[2]*N[0]*N[1]`.
    #[inline]
    pub fn global_index_from_coords(&self, coords: [usize; DIM]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for i in 0..DIM {
            index += stride * coords[i];
            stride *= self.num_boxes[i];
        }
        index
    }

    /// Inverse of [`global_index_from_coords`](Self::global_index_from_coords).
    #[inline]
    pub fn coords_from_global_index(&self, global_index: usize) -> [usize; DIM] {
        debug_assert!(global_index < self.total_boxes);
        let mut rest = global_index;
        let mut coords = [0usize; DIM];
        for i in 0..DIM {
            coords[i] = rest % self.num_boxes[i];
            rest /= self.num_boxes[i];
        }
        coords
    }

    /// The last-axis row a global index lies in.
    #[inline]
    fn row_of(&self, global_index: usize) -> usize {
        global_index / self.boxes_per_face
    }

    // --- ownership ---

    /// True when this rank owns the box.
    #[inline]
    pub fn owns_box(&self, global_index: usize) -> bool {
        global_index >= self.min_box_index && global_index < self.end_box_index
    }

    /// True when the box lies in one of this rank's halo slabs. Halos exist
    /// only where a neighbor rank exists.
    #[inline]
    pub fn owns_halo_box(&self, global_index: usize) -> bool {
        let below = self.rank > 0
            && global_index < self.min_box_index
            && global_index >= self.min_box_index - self.boxes_per_face;
        let above = self.rank + 1 < self.size
            && global_index >= self.end_box_index
            && global_index < self.end_box_index + self.boxes_per_face;
        below || above
    }

    /// True when the box is owned and lies in neither the bottom-most nor the
    /// top-most owned row. On a single process every owned box is interior.
    #[inline]
    pub fn is_interior_box(&self, global_index: usize) -> bool {
        if !self.owns_box(global_index) {
            return false;
        }
        if self.size == 1 {
            return true;
        }
        let row = self.row_of(global_index);
        row > self.partition.lo() && row + 1 < self.partition.hi()
    }

    /// True when the point's containing box is owned here.
    pub fn owns_point(&self, location: [f64; DIM]) -> Result<bool, BoxSieveError> {
        Ok(self.owns_box(self.calculate_containing_box(location)?))
    }

    /// Rank that owns the point's containing box: this rank, or one of its
    /// two vertical neighbors (points never move further than one row of
    /// boxes per step).
    pub fn process_owning_point(&self, location: [f64; DIM]) -> Result<usize, BoxSieveError> {
        let index = self.calculate_containing_box(location)?;
        if index < self.min_box_index {
            Ok(self.rank - 1)
        } else if index >= self.end_box_index {
            Ok(self.rank + 1)
        } else {
            Ok(self.rank)
        }
    }

    // --- box access ---

    /// Shared access to an owned box. Panics unless `owns_box` holds.
    pub fn box_ref(&self, global_index: usize) -> &GridBox {
        assert!(
            self.owns_box(global_index),
            "box {global_index} is not owned by rank {}",
            self.rank
        );
        &self.boxes[global_index - self.min_box_index]
    }

    /// Mutable access to an owned box. Panics unless `owns_box` holds.
    pub fn box_mut(&mut self, global_index: usize) -> &mut GridBox {
        assert!(
            self.owns_box(global_index),
            "box {global_index} is not owned by rank {}",
            self.rank
        );
        &mut self.boxes[global_index - self.min_box_index]
    }

    /// Shared access to a halo box, if the index names one.
    pub fn halo_box_ref(&self, global_index: usize) -> Option<&GridBox> {
        self.halo_map.get(&global_index).map(|&i| &self.halo_boxes[i])
    }

    /// Mutable access to a halo box, if the index names one.
    pub fn halo_box_mut(&mut self, global_index: usize) -> Option<&mut GridBox> {
        match self.halo_map.get(&global_index) {
            Some(&i) => Some(&mut self.halo_boxes[i]),
            None => None,
        }
    }

    /// Insert a point into its containing owned box; returns the box index.
    pub fn insert_point(
        &mut self,
        index: usize,
        location: [f64; DIM],
    ) -> Result<usize, BoxSieveError> {
        let box_index = self.calculate_containing_box(location)?;
        if !self.owns_box(box_index) {
            return Err(BoxSieveError::BoxNotOwned(box_index));
        }
        self.box_mut(box_index).add_point(index);
        Ok(box_index)
    }

    /// Insert a neighbor's point into its containing halo box.
    pub fn insert_halo_point(
        &mut self,
        index: usize,
        location: [f64; DIM],
    ) -> Result<usize, BoxSieveError> {
        let box_index = self.calculate_containing_box(location)?;
        match self.halo_box_mut(box_index) {
            Some(halo) => {
                halo.add_point(index);
                Ok(box_index)
            }
            None => Err(BoxSieveError::BoxNotOwned(box_index)),
        }
    }

    /// Clear the point sets of every local and halo box.
    pub fn empty_boxes(&mut self) {
        for b in &mut self.boxes {
            b.clear_points();
        }
        for b in &mut self.halo_boxes {
            b.clear_points();
        }
    }

    /// Suppress (or re-enable) the neighbour map built during pair
    /// enumeration; pairs are emitted either way.
    pub fn set_calculate_node_neighbours(&mut self, calculate: bool) {
        self.calculate_node_neighbours = calculate;
    }

    /// The stencil of a locally owned box: the global indices of the neighbor
    /// boxes (including itself) considered during pair enumeration.
    pub fn stencil(&self, global_index: usize) -> Result<&BTreeSet<usize>, BoxSieveError> {
        assert!(
            self.owns_box(global_index),
            "box {global_index} is not owned by rank {}",
            self.rank
        );
        let stencils = self.stencils.as_ref().ok_or(BoxSieveError::StencilNotBuilt)?;
        Ok(&stencils[global_index - self.min_box_index])
    }

    pub(crate) fn stencils_built(&self) -> bool {
        self.stencils.is_some()
    }

    pub(crate) fn set_stencils(&mut self, stencils: Vec<BTreeSet<usize>>) {
        debug_assert_eq!(stencils.len(), self.boxes.len());
        self.stencils = Some(stencils);
    }
}
