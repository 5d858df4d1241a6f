//! Neighbor-stencil construction for pair enumeration.
//!
//! Two modes. The full stencil lists, for every owned box, itself and every
//! existing box within one step on each axis; iterating both endpoints' boxes
//! then yields each cross-box pair twice (and each intra-box pair once, via
//! the index tie-break). The half stencil is the canonical
//! enumerate-each-unordered-pair-exactly-once set: a box lists itself, its
//! "forward" neighbors, and — on the rows that border a neighbor rank — the
//! extra backward/forward boxes needed to pair against halo contents.
//!
//! In 2-d with x-periodicity the edge columns wrap: a right-edge box lists
//! the far-left box of its own row and, below the top row, the far-left box
//! of the row above; a left-edge box below the top row lists the far-right
//! box of the row above. The exactly-once property over periodic grids is
//! pinned by the property tests in `tests/stencils.rs`.

use super::BoxGrid;
use crate::error::BoxSieveError;
use std::collections::BTreeSet;

impl<const DIM: usize> BoxGrid<DIM> {
    /// Build full stencils: each owned box lists itself and all existing
    /// boxes within `±1` on every axis (with 2-d periodic wrap in x when
    /// configured). Rebuilding is permitted and replaces the stencils.
    pub fn setup_all_local_boxes(&mut self) {
        let stencils = match DIM {
            1 => self.all_stencils_1d(),
            2 => self.all_stencils_2d(),
            3 => self.all_stencils_3d(),
            _ => unreachable!("dimension checked at construction"),
        };
        self.set_stencils(stencils);
    }

    /// Build half stencils. Fails with [`BoxSieveError::StencilAlreadyBuilt`]
    /// if stencils are already set.
    pub fn setup_local_boxes_half_only(&mut self) -> Result<(), BoxSieveError> {
        if self.stencils_built() {
            return Err(BoxSieveError::StencilAlreadyBuilt);
        }
        let stencils = match DIM {
            1 => self.half_stencils_1d(),
            2 => self.half_stencils_2d(),
            3 => self.half_stencils_3d(),
            _ => unreachable!("dimension checked at construction"),
        };
        self.set_stencils(stencils);
        Ok(())
    }

    // --- half stencils ---

    fn half_stencils_1d(&self) -> Vec<BTreeSet<usize>> {
        let n = self.num_boxes_each_direction()[0];
        let lo_row = self.partition().lo();
        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();
                local.insert(g);

                let right = g == n - 1;
                let left = g == 0;
                let proc_left = g == lo_row;

                if !right {
                    local.insert(g + 1);
                }
                // On the bottom process boundary the box below is a halo.
                if proc_left && !left {
                    local.insert(g - 1);
                }
                local
            })
            .collect()
    }

    fn half_stencils_2d(&self) -> Vec<BTreeSet<usize>> {
        let [m, n] = {
            let nb = self.num_boxes_each_direction();
            [nb[0], nb[1]]
        };
        let periodic = self.is_periodic_in_x();
        let lo_row = self.partition().lo();

        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();

                let left = g % m == 0;
                let right = g % m == m - 1;
                let top = g >= m * n - m;
                let bottom = g < m;
                let bottom_proc = g / m == lo_row;

                local.insert(g);

                // On the bottom process boundary (but not the bottom of the
                // domain) the three boxes below are halos to pair against.
                if !bottom && bottom_proc {
                    local.insert(g - m);
                    if !left {
                        local.insert(g - m - 1);
                    }
                    if !right {
                        local.insert(g - m + 1);
                    }
                }

                if !top {
                    local.insert(g + m);
                    if !right {
                        local.insert(g + m + 1);
                    }
                    if !left {
                        local.insert(g + m - 1);
                    } else if periodic {
                        // Left edge: the upper-left neighbor wraps to the far
                        // right of the row above.
                        local.insert(g + 2 * m - 1);
                    }
                }

                if !right {
                    local.insert(g + 1);
                } else if periodic {
                    // Right edge: wrap to the far left of this row, and of
                    // the row above when there is one.
                    local.insert(g + 1 - m);
                    if !top {
                        local.insert(g + 1);
                    }
                }

                local
            })
            .collect()
    }

    fn half_stencils_3d(&self) -> Vec<BTreeSet<usize>> {
        let [m, n, p] = {
            let nb = self.num_boxes_each_direction();
            [nb[0], nb[1], nb[2]]
        };
        let mn = m * n;
        let lo_row = self.partition().lo();
        let hi_row = self.partition().hi();

        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();

                let top = g % mn >= mn - m;
                let bottom = g % mn < m;
                let left = g % m == 0;
                let right = g % m == m - 1;
                let front = g < mn;
                let back = g >= mn * p - mn;
                let proc_front = g / mn == lo_row;
                let proc_back = g / mn == hi_row - 1;

                local.insert(g);

                if !front {
                    if !top {
                        local.insert(g - mn + m);
                        if !left {
                            local.insert(g - mn + m - 1);
                        }
                        if !right {
                            local.insert(g - mn + m + 1);
                        }
                    }
                    if !right {
                        local.insert(g - mn + 1);
                    }

                    // The front slab of the process pairs against the halo
                    // face below, so it takes the backward boxes too.
                    if proc_front {
                        local.insert(g - mn);
                        if !left {
                            local.insert(g - mn - 1);
                        }
                        if !bottom {
                            local.insert(g - mn - m);
                            if !left {
                                local.insert(g - mn - m - 1);
                            }
                            if !right {
                                local.insert(g - mn - m + 1);
                            }
                        }
                    }
                }

                if !right {
                    local.insert(g + 1);
                }

                if !top {
                    local.insert(g + m);
                    if !right {
                        local.insert(g + m + 1);
                    }
                    if !left {
                        local.insert(g + m - 1);
                    }
                }

                if !back {
                    local.insert(g + mn);
                    if !right {
                        local.insert(g + mn + 1);
                    }
                    if !top {
                        local.insert(g + mn + m);
                        if !right {
                            local.insert(g + mn + m + 1);
                        }
                        if !left {
                            local.insert(g + mn + m - 1);
                        }
                    }
                    // The back slab completes the face above for the rank
                    // above's halo contents.
                    if proc_back {
                        if !left {
                            local.insert(g + mn - 1);
                        }
                        if !bottom {
                            local.insert(g + mn - m);
                            if !left {
                                local.insert(g + mn - m - 1);
                            }
                            if !right {
                                local.insert(g + mn - m + 1);
                            }
                        }
                    }
                }

                local
            })
            .collect()
    }

    // --- full stencils ---

    fn all_stencils_1d(&self) -> Vec<BTreeSet<usize>> {
        let n = self.num_boxes_each_direction()[0];
        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();
                local.insert(g);
                if g != 0 {
                    local.insert(g - 1);
                }
                if g + 1 != n {
                    local.insert(g + 1);
                }
                local
            })
            .collect()
    }

    fn all_stencils_2d(&self) -> Vec<BTreeSet<usize>> {
        let [m, n] = {
            let nb = self.num_boxes_each_direction();
            [nb[0], nb[1]]
        };
        let periodic = self.is_periodic_in_x();

        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();

                let xmin = g % m == 0;
                let xmax = (g + 1) % m == 0;
                let ymin = g < m;
                let ymax = g >= (n - 1) * m;

                local.insert(g);

                if !xmin {
                    local.insert(g - 1);
                } else if periodic {
                    local.insert(g + m - 1);
                }

                if !xmax {
                    local.insert(g + 1);
                } else if periodic {
                    local.insert(g + 1 - m);
                }

                if !ymin {
                    local.insert(g - m);
                }
                if !ymax {
                    local.insert(g + m);
                }

                if !xmin && !ymin {
                    local.insert(g - 1 - m);
                }
                if !xmin && !ymax {
                    local.insert(g - 1 + m);
                }
                if !xmax && !ymin {
                    local.insert(g + 1 - m);
                }
                if !xmax && !ymax {
                    local.insert(g + 1 + m);
                }

                // Periodic corner boxes wrap into the adjacent rows.
                if periodic {
                    if xmin && !ymin {
                        local.insert(g - 1);
                    }
                    if xmin && !ymax {
                        local.insert(g + 2 * m - 1);
                    }
                    if xmax && !ymin {
                        local.insert(g + 1 - 2 * m);
                    }
                    if xmax && !ymax {
                        local.insert(g + 1);
                    }
                }

                local
            })
            .collect()
    }

    fn all_stencils_3d(&self) -> Vec<BTreeSet<usize>> {
        let [m, n, p] = {
            let nb = self.num_boxes_each_direction();
            [nb[0], nb[1], nb[2]]
        };
        let mn = m * n;

        self.owned_box_range()
            .map(|g| {
                let mut local = BTreeSet::new();

                let xmin = g % m == 0;
                let xmax = (g + 1) % m == 0;
                let ymin = g % mn < m;
                let ymax = g % mn >= (n - 1) * m;
                let zmin = g < mn;
                let zmax = g >= mn * (p - 1);

                local.insert(g);

                macro_rules! add {
                    ($cond:expr, $value:expr) => {
                        if $cond {
                            local.insert($value);
                        }
                    };
                }

                // Offsets of the 26 neighbors, guarded per face.
                add!(!xmin, g - 1);
                add!(!xmax, g + 1);
                add!(!ymin, g - m);
                add!(!ymax, g + m);
                add!(!zmin, g - mn);
                add!(!zmax, g + mn);

                add!(!xmin && !ymin, g - 1 - m);
                add!(!xmin && !ymax, g - 1 + m);
                add!(!xmax && !ymin, g + 1 - m);
                add!(!xmax && !ymax, g + 1 + m);
                add!(!xmin && !zmin, g - 1 - mn);
                add!(!xmin && !zmax, g - 1 + mn);
                add!(!xmax && !zmin, g + 1 - mn);
                add!(!xmax && !zmax, g + 1 + mn);
                add!(!ymin && !zmin, g - m - mn);
                add!(!ymin && !zmax, g - m + mn);
                add!(!ymax && !zmin, g + m - mn);
                add!(!ymax && !zmax, g + m + mn);

                add!(!xmin && !ymin && !zmin, g - 1 - m - mn);
                add!(!xmin && !ymin && !zmax, g - 1 - m + mn);
                add!(!xmin && !ymax && !zmin, g - 1 + m - mn);
                add!(!xmin && !ymax && !zmax, g - 1 + m + mn);
                add!(!xmax && !ymin && !zmin, g + 1 - m - mn);
                add!(!xmax && !ymin && !zmax, g + 1 - m + mn);
                add!(!xmax && !ymax && !zmin, g + 1 + m - mn);
                add!(!xmax && !ymax && !zmax, g + 1 + m + mn);

                local
            })
            .collect()
    }
}
