//! The six concrete scenarios from the base spec's TESTABLE PROPERTIES
//! section, transcribed directly rather than derived from the
//! implementation, so a regression here means a real behavioral drift.

use marker_index::{Bias, MarkerIndex, Point, Range};

fn pt(row: u32, col: u32) -> Point {
    Point::new(row, col)
}

fn rng(a: (u32, u32), b: (u32, u32)) -> Range {
    Range::new(pt(a.0, a.1), pt(b.0, b.1))
}

#[test]
fn scenario_1_insert_and_basic_queries() {
    let mut idx = MarkerIndex::new();
    idx.insert(1, rng((0, 2), (0, 5))).unwrap();

    assert_eq!(idx.get_range(1), Some(rng((0, 2), (0, 5))));
    assert_eq!(
        idx.find_intersecting(pt(0, 0), pt(0, 3)).unwrap().to_hash_set(),
        [1].into_iter().collect()
    );
    assert_eq!(
        idx.find_contained_in(pt(0, 0), pt(0, 10)).unwrap().to_hash_set(),
        [1].into_iter().collect()
    );
}

#[test]
fn scenario_2_insertion_grows_a_surrounding_marker() {
    let mut idx = MarkerIndex::new();
    idx.insert(1, rng((0, 2), (0, 5))).unwrap();

    // Insert 4 characters at column 3, strictly inside marker 1.
    let result = idx.splice(pt(0, 3), Point::zero(), pt(0, 4));

    assert_eq!(idx.get_range(1), Some(rng((0, 2), (0, 9))));
    assert!(result.touch.contains(1));
    assert!(result.surround.contains(1));
}

#[test]
fn scenario_3_deletion_collapses_and_surrounds() {
    let mut idx = MarkerIndex::new();
    idx.insert(1, rng((0, 0), (0, 10))).unwrap();
    idx.insert(2, rng((0, 2), (0, 6))).unwrap();
    idx.insert(3, rng((0, 6), (0, 8))).unwrap();

    // Delete the 5 characters spanning columns 3..8.
    let result = idx.splice(pt(0, 3), pt(0, 5), Point::zero());

    // Marker 3 was entirely within the deleted window and collapses to the
    // splice point.
    assert_eq!(idx.get_range(3), Some(rng((0, 3), (0, 3))));
    assert!(result.inside.contains(3));

    // Marker 2 starts before the window (column 2) and ends inside it
    // (column 6); its end collapses to the splice point but its start is
    // untouched, so it touches and overlaps without being fully inside.
    assert_eq!(idx.get_range(2), Some(rng((0, 2), (0, 3))));
    assert!(result.touch.contains(2));
    assert!(result.overlap.contains(2));

    // Marker 1 strictly contains the deleted window on both sides.
    assert_eq!(idx.get_range(1), Some(rng((0, 0), (0, 5))));
    assert!(result.surround.contains(1));
}

#[test]
fn scenario_4_exclusive_point_marker_floats_past_insertion() {
    let mut idx = MarkerIndex::new();
    idx.set_exclusive(1, Bias::Exclusive);
    idx.insert(1, rng((0, 5), (0, 5))).unwrap();

    idx.splice(pt(0, 5), Point::zero(), pt(0, 3));

    assert_eq!(idx.get_range(1), Some(rng((0, 8), (0, 8))));
}

#[test]
fn scenario_5_adjacent_inclusive_markers_at_a_shared_boundary() {
    let mut idx = MarkerIndex::new();
    idx.insert(1, rng((0, 0), (0, 5))).unwrap();
    idx.insert(2, rng((0, 5), (0, 10))).unwrap();

    assert_eq!(
        idx.find_starting_at(pt(0, 5)).unwrap().to_hash_set(),
        [2].into_iter().collect()
    );
    assert_eq!(
        idx.find_ending_at(pt(0, 5)).unwrap().to_hash_set(),
        [1].into_iter().collect()
    );
    assert_eq!(
        idx.find_intersecting(pt(0, 5), pt(0, 5)).unwrap().to_hash_set(),
        [1, 2].into_iter().collect()
    );
}

#[test]
fn scenario_6_compare_prefers_the_outer_range_on_tied_starts() {
    let mut idx = MarkerIndex::new();
    idx.insert(1, rng((0, 0), (0, 10))).unwrap();
    idx.insert(2, rng((0, 0), (0, 5))).unwrap();

    assert_eq!(idx.compare(1, 2), Some(std::cmp::Ordering::Less));
}
