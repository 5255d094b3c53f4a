//! Selection conversion tests
//!
//! Tests for carrying a data-order selection into display order and
//! back, and for shift-click extension while a sort is active. The
//! permutations come from the real rank pipeline so the display order
//! matches what a sorted grid would show.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;

use common::ranges;
use vgrid::convert::{convert_selection, extend_selection_displayed};
use vgrid::dataframe::CellValue;
use vgrid::selection::Selection;
use vgrid::sort::{
    compute_data_indexes, compute_ranks, invert_permutation_indexes, OrderKey, SortDirection,
};
use vgrid::VgridError;

fn selection(pairs: &[(u32, u32)], anchor: Option<u32>) -> Selection {
    Selection {
        ranges: ranges(pairs),
        anchor,
    }
}

/// Permutations for a four-row table sorted by ascending age
/// 36, 29, 41, 33. Display order is 29, 33, 36, 41, so
/// `display_to_data` is `[1, 3, 0, 2]` and `data_to_display` its
/// inverse `[2, 0, 3, 1]`.
fn age_permutations() -> (Vec<u32>, Vec<u32>) {
    let ages: Vec<CellValue> = [36.0, 29.0, 41.0, 33.0]
        .iter()
        .map(|&age| CellValue::from(age))
        .collect();
    let ranks = compute_ranks(&ages).unwrap();
    let display_to_data = compute_data_indexes(
        4,
        &[OrderKey {
            direction: SortDirection::Ascending,
            ranks: &ranks,
        }],
    )
    .unwrap();
    let data_to_display = invert_permutation_indexes(&display_to_data).unwrap();
    (display_to_data, data_to_display)
}

// =============================================================================
// DATA ORDER TO DISPLAY ORDER
// =============================================================================

#[test]
fn test_selection_follows_its_rows_across_a_sort() {
    let (_, data_to_display) = age_permutations();

    // Data rows 0 and 1 land on display positions 2 and 0.
    let output = convert_selection(&selection(&[(0, 2)], Some(1)), &data_to_display).unwrap();

    assert_eq!(output.ranges, ranges(&[(0, 1), (2, 3)]));
    assert_eq!(output.anchor, Some(0));
}

#[test]
fn test_adjacent_display_positions_repack_into_one_range() {
    let (_, data_to_display) = age_permutations();

    // Data rows 1 and 3 are the two youngest: display positions 0 and 1.
    let output = convert_selection(&selection(&[(1, 2), (3, 4)], None), &data_to_display).unwrap();

    assert_eq!(output.ranges, ranges(&[(0, 2)]));
}

#[test]
fn test_empty_selection_converts_to_empty() {
    let (_, data_to_display) = age_permutations();

    let output = convert_selection(&selection(&[], Some(2)), &data_to_display).unwrap();

    assert!(output.ranges.is_empty());
    assert_eq!(output.anchor, Some(3), "anchor still crosses the sort");
}

#[test]
fn test_full_selection_is_preserved_wholesale() {
    let (_, data_to_display) = age_permutations();

    let output = convert_selection(&selection(&[(0, 4)], Some(0)), &data_to_display).unwrap();

    assert_eq!(output.ranges, ranges(&[(0, 4)]));
    assert_eq!(output.anchor, Some(2));
}

// =============================================================================
// ROUND-TRIP THROUGH THE INVERSE
// =============================================================================

#[test]
fn test_conversion_round_trips_through_the_inverse() {
    let forward = [1, 2, 3, 4, 0];
    let backward = invert_permutation_indexes(&forward).unwrap();
    let input = selection(&[(0, 2), (4, 5)], Some(4));

    let displayed = convert_selection(&input, &forward).unwrap();
    let restored = convert_selection(&displayed, &backward).unwrap();

    assert_eq!(restored, input);
}

#[test]
fn test_double_inversion_restores_the_permutation() {
    let permutation = [1, 3, 0, 2];
    let inverse = invert_permutation_indexes(&permutation).unwrap();
    let double = invert_permutation_indexes(&inverse).unwrap();
    assert_eq!(double, permutation);
}

// =============================================================================
// ANCHORED EXTENSION ACROSS A SORT
// =============================================================================

#[test]
fn test_extension_grows_contiguously_on_screen() {
    let (display_to_data, data_to_display) = age_permutations();
    // Data row 3 is selected and anchored; it displays at position 1.
    let input = selection(&[(3, 4)], Some(3));

    // Shift-click display position 3 selects display 1..4, which is
    // data rows 3, 0, 2.
    let output =
        extend_selection_displayed(&input, 3, &data_to_display, &display_to_data).unwrap();

    assert_eq!(output.ranges, ranges(&[(0, 1), (2, 4)]));
    assert_eq!(output.anchor, Some(3), "anchor is stored in data order");
}

#[test]
fn test_unselected_anchor_clears_the_display_span() {
    let (display_to_data, data_to_display) = age_permutations();
    // Data rows 0..3 selected, anchored on the unselected row 3.
    let input = selection(&[(0, 3)], Some(3));

    // The anchor displays at 1; shift-click display 2 unselects 1..3,
    // which covers the displayed copies of data rows 3 and 0.
    let output =
        extend_selection_displayed(&input, 2, &data_to_display, &display_to_data).unwrap();

    assert_eq!(output.ranges, ranges(&[(1, 3)]));
    assert_eq!(output.anchor, Some(3));
}

#[test]
fn test_extension_to_the_anchor_itself_toggles() {
    let (display_to_data, data_to_display) = age_permutations();
    let input = selection(&[(3, 4)], Some(3));

    // Display position 1 is the anchor row itself, so this is a toggle
    // and the only selected row comes back off.
    let output =
        extend_selection_displayed(&input, 1, &data_to_display, &display_to_data).unwrap();

    assert!(output.ranges.is_empty());
    assert_eq!(output.anchor, Some(3));
}

// =============================================================================
// CONSISTENCY GUARDS
// =============================================================================

#[test]
fn test_selected_row_beyond_the_permutation_is_rejected() {
    let (_, data_to_display) = age_permutations();
    let result = convert_selection(&selection(&[(0, 5)], None), &data_to_display);
    assert!(matches!(result, Err(VgridError::DataConsistency(_))));
}

#[test]
fn test_anchor_beyond_the_permutation_is_rejected() {
    let (_, data_to_display) = age_permutations();
    let result = convert_selection(&selection(&[], Some(7)), &data_to_display);
    assert!(matches!(result, Err(VgridError::DataConsistency(_))));
}

#[test]
fn test_permutation_entries_beyond_the_row_count_are_rejected() {
    let mapping = [0, 9, 1];
    let result = convert_selection(&selection(&[(1, 2)], None), &mapping);
    assert!(matches!(result, Err(VgridError::DataConsistency(_))));
}
