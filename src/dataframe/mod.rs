//! Row data sources.
//!
//! The engines never hold table data themselves; they read it through the
//! [`DataFrame`] contract. A source exposes a synchronous, possibly
//! partial view (`get_cell` answers `None` for rows it has not loaded)
//! and an asynchronous, cancellable, range-based loader. Sources that
//! cannot sort natively are wrapped in [`SortableFrame`], which resolves
//! `orderBy`-qualified reads through cached rank permutations.

mod cache;
mod memory;
mod sortable;

pub use cache::KeyedCache;
pub use memory::MemoryFrame;
pub use sortable::SortableFrame;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::abort::AbortSignal;
use crate::error::{Result, VgridError};
use crate::events::EventBus;
use crate::sort::OrderByEntry;

/// One cell scalar.
///
/// Carries a total order (`Null < Bool < Number < Text`, numbers in IEEE
/// total order, text bytewise) so rank computation is deterministic for
/// every input, NaN included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    fn kind_order(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::Text(_) => 3,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.kind_order().cmp(&other.kind_order()),
        }
    }
}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellValue {}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    /// Whether the column may appear in an orderBy
    #[serde(default = "default_sortable")]
    pub sortable: bool,
}

fn default_sortable() -> bool {
    true
}

impl ColumnDescriptor {
    /// A sortable column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sortable: true,
        }
    }
}

/// Ranged load request passed to [`DataFrame::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// First row to load
    pub row_start: u32,
    /// One past the last row to load
    pub row_end: u32,
    /// Columns to load; `None` means all
    pub columns: Option<Vec<String>>,
    /// Sort under which `row_start..row_end` is meant; sources that do
    /// not sort natively treat the rows as data-order
    pub order_by: Option<Vec<OrderByEntry>>,
}

impl FetchRequest {
    /// Load every cell of one column, in data order.
    pub fn whole_column(num_rows: u32, column: impl Into<String>) -> Self {
        Self {
            row_start: 0,
            row_end: num_rows,
            columns: Some(vec![column.into()]),
            order_by: None,
        }
    }
}

/// The row-data-source contract the engines consume.
///
/// Single-threaded like the rest of the crate; implementations are free
/// to use interior mutability. A base source may ignore `order_by` in
/// `get_cell` (serving data order only) — [`SortableFrame`] adapts such a
/// source into one that honors it.
#[async_trait(?Send)]
pub trait DataFrame {
    /// Current number of data rows.
    fn num_rows(&self) -> u32;

    /// Column metadata, fixed for the source's lifetime.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Synchronous cell read. `Ok(None)` means the cell exists but has
    /// not been fetched yet.
    ///
    /// # Errors
    ///
    /// `InvalidIndex` for a row outside `[0, numRows)`, `InvalidColumn`
    /// for an unknown column.
    fn get_cell(
        &self,
        row: u32,
        column: &str,
        order_by: Option<&[OrderByEntry]>,
    ) -> Result<Option<CellValue>>;

    /// Asynchronous, cancellable, range-based loader. After it resolves,
    /// `get_cell` answers every cell of the request.
    async fn fetch(&self, request: &FetchRequest, signal: &AbortSignal) -> Result<()>;

    /// Change notifications: `resolve`, `update`, `numrowschange`.
    fn events(&self) -> &EventBus;
}

/// Shared request validation for sources with a fixed column set.
pub(crate) fn validate_fetch_request(
    request: &FetchRequest,
    num_rows: u32,
    columns: &[ColumnDescriptor],
) -> Result<()> {
    if request.row_start > request.row_end {
        return Err(VgridError::InvalidIndex(format!(
            "fetch range start {} exceeds end {}",
            request.row_start, request.row_end
        )));
    }
    if request.row_end > num_rows {
        return Err(VgridError::InvalidIndex(format!(
            "fetch range end {} exceeds row count {}",
            request.row_end, num_rows
        )));
    }
    if let Some(names) = &request.columns {
        for name in names {
            find_column(columns, name)?;
        }
    }
    Ok(())
}

/// Column lookup shared by the in-crate sources.
pub(crate) fn find_column<'a>(
    columns: &'a [ColumnDescriptor],
    name: &str,
) -> Result<&'a ColumnDescriptor> {
    columns
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| VgridError::InvalidColumn(format!("no column named {name:?}")))
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
    fn cell_values_order_across_kinds() {
        let mut values = vec![
            CellValue::from("b"),
            CellValue::Null,
            CellValue::from(1.5),
            CellValue::from(true),
            CellValue::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                CellValue::Null,
                CellValue::from(true),
                CellValue::from(1.5),
                CellValue::from("a"),
                CellValue::from("b"),
            ]
        );
    }

    #[test]
    fn nan_compares_deterministically() {
        let nan = CellValue::from(f64::NAN);
        assert_eq!(nan.cmp(&nan), Ordering::Equal);
        assert!(nan > CellValue::from(f64::INFINITY));
    }

    #[test]
    fn cell_value_json_is_untagged() {
        let row = vec![
            CellValue::Null,
            CellValue::from(false),
            CellValue::from(2.0),
            CellValue::from("x"),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[null,false,2.0,"x"]"#);
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
