//! Selection remapping between data order and display order.
//!
//! Selections are stored against data-order row indices so they survive
//! re-sorting. When a sort is active, hit-testing and range extension
//! happen in display order; the helpers here carry a selection across
//! that coordinate change using the permutations produced by
//! [`SortableFrame`](crate::dataframe::SortableFrame).

use crate::error::{Result, VgridError};
use crate::selection::{extend_from_anchor, validate_ranges, Range, Selection};

/// Remaps every selected index and the anchor through `indexes`, where
/// `indexes[old]` is the new position of row `old`.
///
/// An empty selection passes through untouched, as does a selection of
/// every row, since a permutation cannot change either. Everything else
/// is remapped index by index and re-packed into canonical ranges.
///
/// # Errors
///
/// `InvalidRange` / `InvalidRanges` when the input ranges are not
/// canonical, `DataConsistency` when a selected index or a permutation
/// entry falls outside the permutation.
pub fn convert_selection(selection: &Selection, indexes: &[u32]) -> Result<Selection> {
    validate_ranges(&selection.ranges)?;
    let anchor = match selection.anchor {
        Some(anchor) => Some(map_index(indexes, anchor)?),
        None => None,
    };

    if selection.ranges.is_empty() {
        return Ok(Selection {
            ranges: Vec::new(),
            anchor,
        });
    }
    if covers_whole_permutation(&selection.ranges, indexes) {
        return Ok(Selection {
            ranges: selection.ranges.clone(),
            anchor,
        });
    }

    let mut mapped: Vec<u32> = Vec::new();
    for range in &selection.ranges {
        for index in range.start..range.end {
            mapped.push(map_index(indexes, index)?);
        }
    }
    mapped.sort_unstable();

    let mut ranges: Vec<Range> = Vec::new();
    let mut iter = mapped.into_iter();
    if let Some(first) = iter.next() {
        let mut start = first;
        let mut previous = first;
        for index in iter {
            if index == previous {
                continue;
            }
            if index == previous + 1 {
                previous = index;
                continue;
            }
            ranges.push(Range {
                start,
                end: previous + 1,
            });
            start = index;
            previous = index;
        }
        ranges.push(Range {
            start,
            end: previous + 1,
        });
    }

    Ok(Selection { ranges, anchor })
}

/// Extends a data-order selection toward a display-order row.
///
/// The selection is carried into display order, extended from its
/// anchor to `display_index` there (so the grown span is contiguous on
/// screen, not in the data), and carried back.
///
/// `data_to_display` maps data indices to display positions and
/// `display_to_data` is its inverse.
///
/// # Errors
///
/// As [`convert_selection`], plus whatever the range extension itself
/// rejects.
pub fn extend_selection_displayed(
    selection: &Selection,
    display_index: u32,
    data_to_display: &[u32],
    display_to_data: &[u32],
) -> Result<Selection> {
    let displayed = convert_selection(selection, data_to_display)?;
    let extended = Selection {
        ranges: extend_from_anchor(&displayed.ranges, displayed.anchor, display_index)?,
        anchor: displayed.anchor,
    };
    convert_selection(&extended, display_to_data)
}

fn covers_whole_permutation(ranges: &[Range], indexes: &[u32]) -> bool {
    match ranges {
        [only] => only.start == 0 && only.end as usize == indexes.len(),
        _ => false,
    }
}

fn map_index(indexes: &[u32], index: u32) -> Result<u32> {
    let mapped = indexes.get(index as usize).copied().ok_or_else(|| {
        VgridError::DataConsistency(format!(
            "selected row {index} outside the {}-row permutation",
            indexes.len()
        ))
    })?;
    if mapped as usize >= indexes.len() {
        return Err(VgridError::DataConsistency(format!(
            "permutation entry {mapped} outside 0..{}",
            indexes.len()
        )));
    }
    Ok(mapped)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use crate::selection::count_selected_rows;

    use super::*;

    fn selection(ranges: &[(u32, u32)], anchor: Option<u32>) -> Selection {
        Selection {
            ranges: ranges
                .iter()
                .map(|&(start, end)| Range { start, end })
                .collect(),
            anchor,
        }
    }

    #[test]
    fn test_identity_mapping_is_a_no_op() {
        let input = selection(&[(1, 3), (5, 6)], Some(2));
        let identity: Vec<u32> = (0..8).collect();
        assert_eq!(convert_selection(&input, &identity).unwrap(), input);
    }

    #[test]
    fn test_contiguous_input_scatters_and_repacks() {
        // Data rows 0 and 1 land on display positions 1 and 2.
        let input = selection(&[(0, 2)], None);
        let data_to_display = [1, 2, 0];
        assert_eq!(
            convert_selection(&input, &data_to_display).unwrap(),
            selection(&[(1, 3)], None)
        );
    }

    #[test]
    fn test_scattered_result_splits_into_ranges() {
        let input = selection(&[(0, 3)], Some(1));
        let mapping = [0, 4, 2, 1, 3];
        assert_eq!(
            convert_selection(&input, &mapping).unwrap(),
            selection(&[(0, 1), (2, 3), (4, 5)], Some(4))
        );
    }

    #[test]
    fn test_row_count_survives_conversion() {
        let input = selection(&[(0, 2), (3, 6)], None);
        let mapping = [5, 3, 1, 4, 0, 2];
        let output = convert_selection(&input, &mapping).unwrap();
        assert_eq!(
            count_selected_rows(&output.ranges).unwrap(),
            count_selected_rows(&input.ranges).unwrap()
        );
    }

    #[test]
    fn test_full_selection_passes_through() {
        let input = selection(&[(0, 4)], Some(3));
        let mapping = [2, 0, 3, 1];
        let output = convert_selection(&input, &mapping).unwrap();
        assert_eq!(output.ranges, input.ranges);
        assert_eq!(output.anchor, Some(1));
    }

    #[test]
    fn test_out_of_range_selection_is_inconsistent() {
        let input = selection(&[(0, 5)], None);
        let mapping = [1, 0, 2];
        assert!(matches!(
            convert_selection(&input, &mapping),
            Err(VgridError::DataConsistency(_))
        ));
    }

    #[test]
    fn test_extension_follows_display_order() {
        // Ascending ages put data row 1 first: display order is 1, 0, 2.
        let display_to_data = [1, 0, 2];
        let data_to_display = [1, 0, 2];
        let input = selection(&[(1, 2)], Some(1));

        let output =
            extend_selection_displayed(&input, 2, &data_to_display, &display_to_data).unwrap();

        assert_eq!(output.ranges, vec![Range { start: 0, end: 3 }]);
        assert_eq!(output.anchor, Some(1));
    }
}
