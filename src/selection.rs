//! Row selection as disjoint sorted half-open ranges.
//!
//! A selection over millions of rows stays compact as long as it is stored
//! as ranges instead of a per-row set. Canonical form: ranges are sorted,
//! non-empty, and *separated* (the end of one is strictly below the start
//! of the next), so adjacent runs always collapse into a single range.
//! Every operation validates its input and returns a new canonical list.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VgridError};

/// Half-open row range `[start, end)`. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    /// Build a range, rejecting empty or inverted bounds.
    pub fn new(start: u32, end: u32) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(VgridError::InvalidRange(format!(
                "end ({}) must exceed start ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }

    /// Number of rows covered. Zero only for a malformed literal that
    /// never passed validation.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `index` falls inside the range.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.start <= index && index < self.end
    }
}

/// A selection: canonical ranges plus the anchor used by shift-click
/// extension. The anchor need not itself be selected, and it is always
/// stored in data order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub ranges: Vec<Range>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub anchor: Option<u32>,
}

impl Selection {
    /// Empty selection, no anchor.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Check that `ranges` is in canonical form.
///
/// # Errors
///
/// `InvalidRange` for an empty/inverted member, `InvalidRanges` when
/// members overlap, touch, or are out of order.
pub fn validate_ranges(ranges: &[Range]) -> Result<()> {
    let mut previous: Option<&Range> = None;
    for range in ranges {
        range.validate()?;
        if let Some(prev) = previous {
            if prev.end >= range.start {
                return Err(VgridError::InvalidRanges(format!(
                    "ranges must be sorted and separated, found [{}, {}) before [{}, {})",
                    prev.start, prev.end, range.start, range.end
                )));
            }
        }
        previous = Some(range);
    }
    Ok(())
}

/// True when any range contains `index`.
pub fn is_selected(ranges: &[Range], index: u32) -> Result<bool> {
    validate_ranges(ranges)?;
    Ok(ranges.iter().any(|r| r.contains(index)))
}

/// Insert `range`, merging every member that overlaps or touches it.
///
/// Adjacency counts as merge-worthy: selecting `[3, 5)` into `[[0, 3)]`
/// yields `[[0, 5)]`, keeping the canonical separation invariant.
pub fn select_range(ranges: &[Range], range: Range) -> Result<Vec<Range>> {
    validate_ranges(ranges)?;
    range.validate()?;

    let mut result = Vec::with_capacity(ranges.len() + 1);
    let mut merged = range;
    let mut placed = false;

    for r in ranges {
        if r.end < merged.start {
            // Entirely before the new range, not even touching.
            result.push(*r);
        } else if r.start > merged.end {
            // Entirely after: emit the merged range once, then the rest.
            if !placed {
                result.push(merged);
                placed = true;
            }
            result.push(*r);
        } else {
            merged.start = merged.start.min(r.start);
            merged.end = merged.end.max(r.end);
        }
    }
    if !placed {
        result.push(merged);
    }
    Ok(result)
}

/// Remove the intersection with `range`, splitting partial overlaps.
pub fn unselect_range(ranges: &[Range], range: Range) -> Result<Vec<Range>> {
    validate_ranges(ranges)?;
    range.validate()?;

    let mut result = Vec::with_capacity(ranges.len() + 1);
    for r in ranges {
        if r.end <= range.start || r.start >= range.end {
            result.push(*r);
            continue;
        }
        if r.start < range.start {
            result.push(Range {
                start: r.start,
                end: range.start,
            });
        }
        if range.end < r.end {
            result.push(Range {
                start: range.end,
                end: r.end,
            });
        }
    }
    Ok(result)
}

/// Toggle a single row. Applying it twice restores the original list.
pub fn toggle_index(ranges: &[Range], index: u32) -> Result<Vec<Range>> {
    let single = single_index_range(index)?;
    if is_selected(ranges, index)? {
        unselect_range(ranges, single)
    } else {
        select_range(ranges, single)
    }
}

/// Shift-click semantics: extend or retract the span between `anchor` and
/// `index`.
///
/// No anchor means no-op. `anchor == index` degenerates to a single-row
/// toggle. Otherwise the inclusive span between the two is *selected* when
/// the anchor was selected and *unselected* when it was not — the gesture
/// spreads the anchor's own state across the span.
pub fn extend_from_anchor(ranges: &[Range], anchor: Option<u32>, index: u32) -> Result<Vec<Range>> {
    validate_ranges(ranges)?;
    let Some(anchor) = anchor else {
        return Ok(ranges.to_vec());
    };
    if anchor == index {
        return toggle_index(ranges, index);
    }

    let start = anchor.min(index);
    let end_inclusive = anchor.max(index);
    let end = end_inclusive.checked_add(1).ok_or_else(|| {
        VgridError::InvalidIndex(format!("index {end_inclusive} is at the numeric limit"))
    })?;
    let span = Range { start, end };

    if is_selected(ranges, anchor)? {
        select_range(ranges, span)
    } else {
        unselect_range(ranges, span)
    }
}

/// Pure toggle between "everything selected" and "nothing selected".
///
/// Returns `[]` when the list is exactly `[[0, length)]`, otherwise the
/// full range — never an additive merge. `length == 0` always yields `[]`.
pub fn toggle_all(ranges: &[Range], length: u32) -> Result<Vec<Range>> {
    validate_ranges(ranges)?;
    if length == 0 || are_all_selected(ranges, length)? {
        return Ok(Vec::new());
    }
    Ok(vec![Range {
        start: 0,
        end: length,
    }])
}

/// True when the list is exactly the full range `[0, length)`.
pub fn are_all_selected(ranges: &[Range], length: u32) -> Result<bool> {
    validate_ranges(ranges)?;
    if length == 0 {
        return Ok(ranges.is_empty());
    }
    Ok(matches!(ranges, [only] if only.start == 0 && only.end == length))
}

/// Total number of selected rows.
pub fn count_selected_rows(ranges: &[Range]) -> Result<u64> {
    validate_ranges(ranges)?;
    Ok(ranges.iter().map(|r| u64::from(r.len())).sum())
}

fn single_index_range(index: u32) -> Result<Range> {
    let end = index.checked_add(1).ok_or_else(|| {
        VgridError::InvalidIndex(format!("index {index} is at the numeric limit"))
    })?;
    Ok(Range { start: index, end })
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
    use super::*;

    fn ranges(pairs: &[(u32, u32)]) -> Vec<Range> {
        pairs
            .iter()
            .map(|&(start, end)| Range { start, end })
            .collect()
    }

    #[test]
    fn validation_rejects_touching_ranges() {
        // [0,3) and [3,5) touch; canonical form requires one range [0,5).
        let err = validate_ranges(&ranges(&[(0, 3), (3, 5)])).unwrap_err();
        assert!(matches!(err, VgridError::InvalidRanges(_)));
    }

    #[test]
    fn validation_rejects_unsorted_and_empty() {
        assert!(validate_ranges(&ranges(&[(5, 8), (0, 2)])).is_err());
        assert!(validate_ranges(&ranges(&[(2, 2)])).is_err());
        assert!(validate_ranges(&ranges(&[(0, 2), (4, 9)])).is_ok());
    }

    #[test]
    fn select_merges_adjacent_neighbors() {
        let base = ranges(&[(0, 3), (7, 9)]);
        let out = select_range(&base, Range { start: 3, end: 7 }).unwrap();
        assert_eq!(out, ranges(&[(0, 9)]));
    }

    #[test]
    fn unselect_splits_partial_overlap() {
        let base = ranges(&[(0, 10)]);
        let out = unselect_range(&base, Range { start: 3, end: 7 }).unwrap();
        assert_eq!(out, ranges(&[(0, 3), (7, 10)]));
    }
}
