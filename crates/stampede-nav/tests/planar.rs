use stampede_nav::{NavQuery, PlanarSurface, PolyRef, QueryFilter, POLY_FLAG_WALK};

#[test]
fn nearest_poly_on_open_surface_returns_the_point() {
    let surface = PlanarSurface::new(10, 10, 2.0);
    let filter = QueryFilter::default();
    let (reference, point) = surface
        .find_nearest_poly(&[7.3, 0.0, 3.1], &[1.0, 1.0, 1.0], &filter)
        .unwrap();
    assert!(reference.is_valid());
    assert!((point[0] - 7.3).abs() < 1e-5);
    assert!((point[2] - 3.1).abs() < 1e-5);
}

#[test]
fn filter_excludes_flagged_cells() {
    let mut surface = PlanarSurface::new(4, 4, 1.0);
    const DOOR: u16 = 0x02;
    surface.set_cell_flags(1, 1, DOOR);

    let permissive = QueryFilter::default();
    let no_doors = QueryFilter {
        include_flags: POLY_FLAG_WALK,
        exclude_flags: DOOR,
    };

    let (reference, _) = surface
        .find_nearest_poly(&[1.5, 0.0, 1.5], &[0.2, 1.0, 0.2], &permissive)
        .unwrap();
    assert!(reference.is_valid());

    // With doors excluded, nothing passable lies within the tiny box.
    assert!(surface
        .find_nearest_poly(&[1.5, 0.0, 1.5], &[0.2, 1.0, 0.2], &no_doors)
        .is_err());
}

#[test]
fn invalid_refs_are_rejected_everywhere() {
    let mut surface = PlanarSurface::new(4, 4, 1.0);
    let filter = QueryFilter::default();
    assert!(!surface.is_valid_ref(PolyRef::NONE));
    assert!(!surface.is_valid_ref(PolyRef::new(999)));

    let good = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
    assert!(surface.is_valid_ref(good));

    assert!(surface
        .find_path(PolyRef::new(999), good, &[0.0; 3], &[0.0; 3], &filter)
        .is_err());
    let mut visited = Vec::new();
    assert!(surface
        .move_along_surface(PolyRef::NONE, &[0.0; 3], &[1.0, 0.0, 1.0], &filter, &mut visited)
        .is_err());
}

#[test]
fn visited_chain_starts_at_the_start_poly() {
    let surface = PlanarSurface::new(8, 8, 1.0);
    let filter = QueryFilter::default();
    let start = surface.cell_ref_at(&[0.5, 0.0, 0.5]);
    let mut visited = Vec::new();
    surface
        .move_along_surface(start, &[0.5, 0.0, 0.5], &[3.5, 0.0, 0.5], &filter, &mut visited)
        .unwrap();
    assert_eq!(visited[0], start);
    assert_eq!(visited.len(), 4);
    // The last entry is the polygon the move ended in.
    assert_eq!(*visited.last().unwrap(), surface.cell_ref_at(&[3.5, 0.0, 0.5]));
}

#[cfg(feature = "serde")]
#[test]
fn filter_round_trips_through_json() {
    let filter = QueryFilter {
        include_flags: 0x0f,
        exclude_flags: 0x10,
    };
    let json = serde_json::to_string(&filter).unwrap();
    let back: QueryFilter = serde_json::from_str(&json).unwrap();
    assert_eq!(filter, back);
}
