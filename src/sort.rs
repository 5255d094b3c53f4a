//! Tie-aware ranks and the sort permutation built from them.
//!
//! Sorting a remote table never reorders the data itself. Each sort column
//! gets a rank array (`ranks[dataIndex] = rank`), and the displayed order
//! is a permutation of row indices computed from those ranks. Ranks are
//! always ascending with ties sharing the rank of their first sorted
//! occurrence; descending order flips the comparison of raw ranks per key
//! and never rewrites rank values, which would break tie grouping.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VgridError};

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One column of a multi-column sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByEntry {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// A full sort specification, highest priority first.
pub type OrderBy = Vec<OrderByEntry>;

/// Rank array for one sort key, paired with its direction.
#[derive(Debug, Clone, Copy)]
pub struct OrderKey<'a> {
    pub direction: SortDirection,
    pub ranks: &'a [u32],
}

/// Compute ascending, tie-grouped ranks for a column of values.
///
/// Equal values receive the rank of their first occurrence in sorted
/// order: `[2, 3, 1, 1]` ranks to `[2, 3, 0, 0]`. Rank values are only
/// meaningful under the comparator in [`compute_data_indexes`]; in
/// particular they are *not* descending-comparable after any arithmetic
/// remapping.
///
/// # Errors
///
/// `DataConsistency` when the column has more rows than an index can
/// address.
#[allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]
pub fn compute_ranks<T: Ord>(values: &[T]) -> Result<Vec<u32>> {
    let len = checked_len(values.len())?;

    // All positions below come from 0..len, so direct indexing holds.
    let mut order: Vec<u32> = (0..len).collect();
    order.sort_by(|&a, &b| values[a as usize].cmp(&values[b as usize]));

    let mut ranks = vec![0_u32; values.len()];
    let mut group_rank = 0_u32;
    for (position, &data_index) in order.iter().enumerate() {
        if position > 0 {
            let previous = order[position - 1];
            if values[previous as usize] < values[data_index as usize] {
                group_rank = position as u32;
            }
        }
        ranks[data_index as usize] = group_rank;
    }
    Ok(ranks)
}

/// Compute the display permutation for the given sort keys.
///
/// The result `p` satisfies `p[tableIndex] = dataIndex`. Keys apply in
/// priority order; `Descending` compares the same rank values with the
/// operands swapped. When every key ties, an implicit ascending index key
/// decides, so the permutation is deterministic for any number of real
/// keys. An empty key list yields the identity permutation.
///
/// # Errors
///
/// `DataConsistency` when any rank array's length differs from `num_rows`.
#[allow(clippy::indexing_slicing)]
pub fn compute_data_indexes(num_rows: u32, keys: &[OrderKey<'_>]) -> Result<Vec<u32>> {
    for key in keys {
        if key.ranks.len() != num_rows as usize {
            return Err(VgridError::DataConsistency(format!(
                "rank array has {} entries for {} rows",
                key.ranks.len(),
                num_rows
            )));
        }
    }

    // Indexes are drawn from 0..num_rows and every rank array was just
    // length-checked, so the comparator may index directly.
    let mut indexes: Vec<u32> = (0..num_rows).collect();
    indexes.sort_unstable_by(|&a, &b| {
        for key in keys {
            let rank_a = key.ranks[a as usize];
            let rank_b = key.ranks[b as usize];
            let ordering = match key.direction {
                SortDirection::Ascending => rank_a.cmp(&rank_b),
                SortDirection::Descending => rank_b.cmp(&rank_a),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.cmp(&b)
    });
    Ok(indexes)
}

/// Invert a permutation: `p[table] = data` becomes `inverse[data] = table`.
///
/// # Errors
///
/// `DataConsistency` when `p` is not a bijection over `[0, p.len())`
/// (out-of-range or duplicate entries).
#[allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]
pub fn invert_permutation_indexes(p: &[u32]) -> Result<Vec<u32>> {
    let len = checked_len(p.len())?;

    // u32::MAX can never be a valid table index here (len <= u32::MAX),
    // so it serves as the "unassigned" sentinel.
    let mut inverse = vec![u32::MAX; p.len()];
    for (table_index, &data_index) in p.iter().enumerate() {
        if data_index >= len {
            return Err(VgridError::DataConsistency(format!(
                "permutation entry {data_index} out of range for {len} rows"
            )));
        }
        if inverse[data_index as usize] != u32::MAX {
            return Err(VgridError::DataConsistency(format!(
                "permutation entry {data_index} appears more than once"
            )));
        }
        inverse[data_index as usize] = table_index as u32;
    }
    Ok(inverse)
}

fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| VgridError::DataConsistency(format!("{len} rows exceed the index limit")))
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

    #[test]
    fn ranks_of_empty_column() {
        let ranks = compute_ranks::<u32>(&[]).unwrap();
        assert!(ranks.is_empty());
    }

    #[test]
    fn descending_keeps_tie_groups_together() {
        // Two ties on the first key; the index tiebreak keeps them in
        // original order even under a descending first key.
        let ranks = compute_ranks(&[5, 1, 5, 0]).unwrap();
        let keys = [OrderKey {
            direction: SortDirection::Descending,
            ranks: &ranks,
        }];
        let p = compute_data_indexes(4, &keys).unwrap();
        assert_eq!(p, vec![0, 2, 1, 3]);
    }

    #[test]
    fn invert_is_an_involution() {
        let p = vec![3_u32, 1, 4, 0, 2];
        let inverse = invert_permutation_indexes(&p).unwrap();
        assert_eq!(invert_permutation_indexes(&inverse).unwrap(), p);
    }

    #[test]
    fn invert_rejects_duplicates() {
        let err = invert_permutation_indexes(&[0, 2, 2]).unwrap_err();
        assert!(matches!(err, VgridError::DataConsistency(_)));
    }
}
