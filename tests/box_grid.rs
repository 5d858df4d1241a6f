use box_sieve::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn serial_grid<const DIM: usize>(
    box_width: f64,
    min: [f64; DIM],
    max: [f64; DIM],
) -> BoxGrid<DIM> {
    BoxGrid::new(
        box_width,
        DomainExtents::new(min, max),
        false,
        None,
        &Environment::serial(),
    )
    .unwrap()
}

#[test]
fn ten_by_ten_domain_yields_one_hundred_boxes() {
    let grid = serial_grid(1.0, [0.0, 0.0], [10.0, 10.0]);
    assert_eq!(grid.num_boxes_each_direction(), [10, 10]);
    assert_eq!(grid.num_local_boxes(), 100);
    assert_eq!(grid.num_boxes(), 100);
    assert_eq!(grid.num_local_rows(), 10);
}

#[test]
fn indivisible_domain_swells_upward() {
    let grid = serial_grid(1.0, [0.0, 0.0], [2.5, 3.0]);
    assert_eq!(grid.domain().max(0), 3.0);
    assert_eq!(grid.domain().max(1), 3.0);
    assert_eq!(grid.num_boxes_each_direction(), [3, 3]);
}

#[test]
fn containing_box_boundary_semantics() {
    let grid = serial_grid(1.0, [0.0], [3.0]);
    // Exactly on the domain minimum: coordinate 0.
    assert_eq!(grid.calculate_containing_box([0.0]).unwrap(), 0);
    // Just below the maximum: the last coordinate.
    assert_eq!(grid.calculate_containing_box([2.9999]).unwrap(), 2);
    // A box face belongs to the box above it.
    assert_eq!(grid.calculate_containing_box([1.0]).unwrap(), 1);
}

#[test]
fn out_of_domain_points_are_rejected() {
    let grid = serial_grid(1.0, [0.0], [3.0]);
    assert!(matches!(
        grid.calculate_containing_box([3.0]),
        Err(BoxSieveError::OutOfDomain { .. })
    ));
    assert!(matches!(
        grid.calculate_containing_box([-0.1]),
        Err(BoxSieveError::OutOfDomain { .. })
    ));
}

#[test]
fn coords_and_global_index_round_trip() {
    let grid = serial_grid(1.0, [0.0, 0.0, 0.0], [3.0, 4.0, 5.0]);
    assert_eq!(grid.num_boxes_each_direction(), [3, 4, 5]);
    for g in 0..grid.num_boxes() {
        let coords = grid.coords_from_global_index(g);
        assert_eq!(grid.global_index_from_coords(coords), g);
    }
    // Spot-check the mixed radix: c[0] + 3*c[1] + 12*c[2].
    assert_eq!(grid.global_index_from_coords([2, 3, 4]), 2 + 9 + 48);
}

#[test]
fn containing_box_coords_bound_the_point() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let grid = serial_grid(0.7, [-1.0, 2.0], [1.8, 4.1]);
    let w = grid.box_width();
    for _ in 0..500 {
        let p = [
            rng.gen_range(-1.0..grid.domain().max(0)),
            rng.gen_range(2.0..grid.domain().max(1)),
        ];
        let coords = grid.coords_from_global_index(grid.calculate_containing_box(p).unwrap());
        for i in 0..2 {
            let lo = grid.domain().min(i) + coords[i] as f64 * w;
            assert!(lo <= p[i] + 1e-12 && p[i] < lo + w + 1e-12, "{p:?} vs {coords:?}");
        }
    }
}

#[test]
fn unsupported_dimension_is_rejected() {
    let err = BoxGrid::<4>::new(
        1.0,
        DomainExtents::new([0.0; 4], [2.0; 4]),
        false,
        None,
        &Environment::serial(),
    )
    .unwrap_err();
    assert_eq!(err, BoxSieveError::UnsupportedDimension(4));
}

#[test]
fn invalid_box_width_is_rejected() {
    let err = BoxGrid::<1>::new(
        0.0,
        DomainExtents::new([0.0], [1.0]),
        false,
        None,
        &Environment::serial(),
    )
    .unwrap_err();
    assert_eq!(err, BoxSieveError::InvalidBoxWidth(0.0));
}

#[test]
fn periodicity_requires_two_dimensions() {
    let err = BoxGrid::<3>::new(
        1.0,
        DomainExtents::new([0.0; 3], [3.0; 3]),
        true,
        None,
        &Environment::serial(),
    )
    .unwrap_err();
    assert_eq!(err, BoxSieveError::InvalidPeriodicity);

    // 2-d serial is the one allowed configuration.
    assert!(BoxGrid::<2>::new(
        1.0,
        DomainExtents::new([0.0; 2], [3.0; 2]),
        true,
        None,
        &Environment::serial(),
    )
    .is_ok());
}

#[test]
fn serial_grids_are_all_interior() {
    let grid = serial_grid(1.0, [0.0, 0.0], [4.0, 4.0]);
    for g in grid.owned_box_range() {
        assert!(grid.is_interior_box(g));
        assert!(grid.owns_box(g));
        assert!(!grid.owns_halo_box(g));
    }
    assert!(!grid.owns_box(16));
    assert!(!grid.is_interior_box(16));
}

#[test]
fn insert_and_empty_boxes() {
    let mut grid = serial_grid(1.0, [0.0, 0.0], [3.0, 3.0]);
    let b = grid.insert_point(7, [1.5, 2.5]).unwrap();
    assert_eq!(b, grid.calculate_containing_box([1.5, 2.5]).unwrap());
    assert!(grid.box_ref(b).points().contains(&7));

    grid.empty_boxes();
    assert!(grid.box_ref(b).points().is_empty());
}

#[test]
fn owns_point_in_serial_grid() {
    let grid = serial_grid(2.0, [0.0], [6.0]);
    assert!(grid.owns_point([5.9]).unwrap());
    assert!(grid.owns_point([0.0]).unwrap());
    assert!(grid.owns_point([6.0]).is_err());
}
