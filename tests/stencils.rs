use box_sieve::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn serial_grid_2d(box_width: f64, max: [f64; 2], periodic: bool) -> BoxGrid<2> {
    BoxGrid::new(
        box_width,
        DomainExtents::new([0.0, 0.0], max),
        periodic,
        None,
        &Environment::serial(),
    )
    .unwrap()
}

#[test]
fn half_stencil_of_center_box() {
    let mut grid = serial_grid_2d(1.0, [3.0, 3.0], false);
    grid.setup_local_boxes_half_only().unwrap();
    // Self, right, and the three boxes above.
    let expected: BTreeSet<usize> = [4, 5, 6, 7, 8].into_iter().collect();
    assert_eq!(grid.stencil(4).unwrap(), &expected);
}

#[test]
fn half_stencil_of_corner_boxes() {
    let mut grid = serial_grid_2d(1.0, [3.0, 3.0], false);
    grid.setup_local_boxes_half_only().unwrap();
    let expected0: BTreeSet<usize> = [0, 1, 3, 4].into_iter().collect();
    assert_eq!(grid.stencil(0).unwrap(), &expected0);
    // The top-right corner only lists itself.
    let expected8: BTreeSet<usize> = [8].into_iter().collect();
    assert_eq!(grid.stencil(8).unwrap(), &expected8);
}

#[test]
fn periodic_half_stencil_wraps_the_left_edge() {
    let mut grid = serial_grid_2d(1.0, [3.0, 3.0], true);
    grid.setup_local_boxes_half_only().unwrap();
    // Self, right, the two reachable boxes above, and the periodic
    // upper-left wrapping to column 2 of row 1.
    let expected: BTreeSet<usize> = [0, 1, 3, 4, 5].into_iter().collect();
    assert_eq!(grid.stencil(0).unwrap(), &expected);
}

#[test]
fn periodic_half_stencil_wraps_the_right_edge() {
    let mut grid = serial_grid_2d(1.0, [3.0, 3.0], true);
    grid.setup_local_boxes_half_only().unwrap();
    // g=2: self, the three above, the same-row wrap to 0, and the wrap to
    // the far left of the row above (index 3).
    let expected: BTreeSet<usize> = [0, 2, 3, 4, 5].into_iter().collect();
    assert_eq!(grid.stencil(2).unwrap(), &expected);
}

#[test]
fn second_half_stencil_build_is_rejected() {
    let mut grid = serial_grid_2d(1.0, [3.0, 3.0], false);
    grid.setup_local_boxes_half_only().unwrap();
    assert_eq!(
        grid.setup_local_boxes_half_only().unwrap_err(),
        BoxSieveError::StencilAlreadyBuilt
    );
}

#[test]
fn stencil_query_before_build_is_rejected() {
    let grid = serial_grid_2d(1.0, [3.0, 3.0], false);
    assert_eq!(grid.stencil(0).unwrap_err(), BoxSieveError::StencilNotBuilt);
}

#[test]
fn full_stencil_counts_by_position() {
    let mut grid = serial_grid_2d(1.0, [4.0, 4.0], false);
    grid.setup_all_local_boxes();
    // Interior: 9 neighbors; edge: 6; corner: 4.
    assert_eq!(grid.stencil(5).unwrap().len(), 9);
    assert_eq!(grid.stencil(1).unwrap().len(), 6);
    assert_eq!(grid.stencil(0).unwrap().len(), 4);
}

/// L-infinity distance between two boxes in coordinate space, wrapping x when
/// periodic.
fn box_distance<const DIM: usize>(
    grid: &BoxGrid<DIM>,
    a: usize,
    b: usize,
    periodic_in_x: bool,
) -> usize {
    let ca = grid.coords_from_global_index(a);
    let cb = grid.coords_from_global_index(b);
    let mut dist = 0usize;
    for i in 0..DIM {
        let d = ca[i].abs_diff(cb[i]);
        let d = if i == 0 && periodic_in_x {
            d.min(grid.num_boxes_each_direction()[0] - d)
        } else {
            d
        };
        dist = dist.max(d);
    }
    dist
}

fn assert_half_stencil_covers_exactly_once<const DIM: usize>(grid: &BoxGrid<DIM>, periodic: bool) {
    for a in grid.owned_box_range() {
        assert!(grid.stencil(a).unwrap().contains(&a), "self missing from {a}");
        for b in grid.owned_box_range() {
            if a >= b {
                continue;
            }
            let a_lists_b = grid.stencil(a).unwrap().contains(&b);
            let b_lists_a = grid.stencil(b).unwrap().contains(&a);
            if box_distance(grid, a, b, periodic) <= 1 {
                assert!(
                    a_lists_b ^ b_lists_a,
                    "adjacent boxes {a},{b} listed {}",
                    if a_lists_b { "twice" } else { "never" }
                );
            } else {
                assert!(!a_lists_b && !b_lists_a, "distant boxes {a},{b} listed");
            }
        }
    }
}

fn assert_full_stencil_is_symmetric_closure<const DIM: usize>(grid: &BoxGrid<DIM>, periodic: bool) {
    for a in grid.owned_box_range() {
        for b in grid.owned_box_range() {
            let expected = box_distance(grid, a, b, periodic) <= 1;
            assert_eq!(
                grid.stencil(a).unwrap().contains(&b),
                expected,
                "full stencil of {a} wrong about {b}"
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn half_stencil_covers_every_adjacent_pair_exactly_once_1d(n in 1usize..12) {
        let mut grid: BoxGrid<1> = BoxGrid::new(
            1.0,
            DomainExtents::new([0.0], [n as f64]),
            false,
            None,
            &Environment::serial(),
        ).unwrap();
        grid.setup_local_boxes_half_only().unwrap();
        assert_half_stencil_covers_exactly_once(&grid, false);
    }

    #[test]
    fn half_stencil_covers_every_adjacent_pair_exactly_once_2d(
        m in 1usize..7,
        n in 1usize..7,
    ) {
        let mut grid = serial_grid_2d(1.0, [m as f64, n as f64], false);
        grid.setup_local_boxes_half_only().unwrap();
        assert_half_stencil_covers_exactly_once(&grid, false);
    }

    #[test]
    fn half_stencil_covers_every_adjacent_pair_exactly_once_2d_periodic(
        m in 3usize..8,
        n in 1usize..6,
    ) {
        let mut grid = serial_grid_2d(1.0, [m as f64, n as f64], true);
        grid.setup_local_boxes_half_only().unwrap();
        assert_half_stencil_covers_exactly_once(&grid, true);
    }

    #[test]
    fn half_stencil_covers_every_adjacent_pair_exactly_once_3d(
        m in 1usize..5,
        n in 1usize..5,
        p in 1usize..5,
    ) {
        let mut grid: BoxGrid<3> = BoxGrid::new(
            1.0,
            DomainExtents::new([0.0; 3], [m as f64, n as f64, p as f64]),
            false,
            None,
            &Environment::serial(),
        ).unwrap();
        grid.setup_local_boxes_half_only().unwrap();
        assert_half_stencil_covers_exactly_once(&grid, false);
    }

    #[test]
    fn full_stencil_is_the_adjacency_closure_2d(
        m in 1usize..7,
        n in 1usize..7,
    ) {
        let mut grid = serial_grid_2d(1.0, [m as f64, n as f64], false);
        grid.setup_all_local_boxes();
        assert_full_stencil_is_symmetric_closure(&grid, false);
    }

    #[test]
    fn full_stencil_is_the_adjacency_closure_2d_periodic(
        m in 3usize..8,
        n in 1usize..6,
    ) {
        let mut grid = serial_grid_2d(1.0, [m as f64, n as f64], true);
        grid.setup_all_local_boxes();
        assert_full_stencil_is_symmetric_closure(&grid, true);
    }

    #[test]
    fn full_stencil_is_the_adjacency_closure_3d(
        m in 1usize..5,
        n in 1usize..5,
        p in 1usize..5,
    ) {
        let mut grid: BoxGrid<3> = BoxGrid::new(
            1.0,
            DomainExtents::new([0.0; 3], [m as f64, n as f64, p as f64]),
            false,
            None,
            &Environment::serial(),
        ).unwrap();
        grid.setup_all_local_boxes();
        assert_full_stencil_is_symmetric_closure(&grid, false);
    }
}
