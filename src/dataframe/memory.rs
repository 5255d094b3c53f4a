//! Fully materialized in-memory source.
//!
//! Backs CSV ingestion and tests. Every cell is resident, so `fetch`
//! only validates and `get_cell` never answers `None`.

use std::cell::{Ref, RefCell};

use async_trait::async_trait;

use crate::abort::AbortSignal;
use crate::error::{Result, VgridError};
use crate::events::{DataEvent, EventBus};
use crate::sort::OrderByEntry;

use super::{validate_fetch_request, CellValue, ColumnDescriptor, DataFrame, FetchRequest};

/// Row-major table held entirely in memory.
///
/// Serves data order only; wrap it in
/// [`SortableFrame`](super::SortableFrame) for sorted reads.
#[derive(Debug)]
pub struct MemoryFrame {
    columns: Vec<ColumnDescriptor>,
    rows: RefCell<Vec<Vec<CellValue>>>,
    events: EventBus,
}

impl MemoryFrame {
    /// Builds a frame from column metadata and row-major data.
    ///
    /// # Errors
    ///
    /// `Configuration` when a row's width differs from the column count
    /// or the row count exceeds `u32::MAX`.
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        validate_row_shape(&columns, &rows)?;
        Ok(Self {
            columns,
            rows: RefCell::new(rows),
            events: EventBus::default(),
        })
    }

    /// An empty frame with the given columns.
    #[must_use]
    pub fn empty(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: RefCell::new(Vec::new()),
            events: EventBus::default(),
        }
    }

    /// Replaces the entire row set.
    ///
    /// Emits `numrowschange` when the row count changes, `update`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// `Configuration` on a shape mismatch, as in [`MemoryFrame::new`].
    pub fn replace_rows(&self, rows: Vec<Vec<CellValue>>) -> Result<()> {
        validate_row_shape(&self.columns, &rows)?;
        let count_changed = {
            let mut current = self.rows.borrow_mut();
            let changed = current.len() != rows.len();
            *current = rows;
            changed
        };
        if count_changed {
            self.events.emit(DataEvent::NumRowsChange);
        } else {
            self.events.emit(DataEvent::Update);
        }
        Ok(())
    }

    /// Overwrites one cell in place and emits `update`.
    ///
    /// # Errors
    ///
    /// `InvalidIndex` / `InvalidColumn` when the coordinates do not
    /// exist.
    pub fn set_cell(&self, row: u32, column: &str, value: CellValue) -> Result<()> {
        let col_idx = self.column_index(column)?;
        {
            let mut rows = self.rows.borrow_mut();
            let cell = rows
                .get_mut(row as usize)
                .and_then(|r| r.get_mut(col_idx))
                .ok_or_else(|| {
                    VgridError::InvalidIndex(format!("no row {row} to write"))
                })?;
            *cell = value;
        }
        self.events.emit(DataEvent::Update);
        Ok(())
    }

    /// Borrow of the raw row storage, for the one-shot parse helpers.
    pub(crate) fn rows(&self) -> Ref<'_, Vec<Vec<CellValue>>> {
        self.rows.borrow()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| VgridError::InvalidColumn(format!("no column named {name:?}")))
    }
}

fn validate_row_shape(columns: &[ColumnDescriptor], rows: &[Vec<CellValue>]) -> Result<()> {
    if u32::try_from(rows.len()).is_err() {
        return Err(VgridError::Configuration(format!(
            "row count {} exceeds the addressable range",
            rows.len()
        )));
    }
    if let Some((index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != columns.len())
    {
        return Err(VgridError::Configuration(format!(
            "row {index} has {} cells, expected {}",
            row.len(),
            columns.len()
        )));
    }
    Ok(())
}

#[async_trait(?Send)]
impl DataFrame for MemoryFrame {
    fn num_rows(&self) -> u32 {
        // validate_row_shape bounds the length at construction and on
        // every replace
        #[allow(clippy::cast_possible_truncation)]
        {
            self.rows.borrow().len() as u32
        }
    }

    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn get_cell(
        &self,
        row: u32,
        column: &str,
        _order_by: Option<&[OrderByEntry]>,
    ) -> Result<Option<CellValue>> {
        if row >= self.num_rows() {
            return Err(VgridError::InvalidIndex(format!(
                "row {row} outside 0..{}",
                self.num_rows()
            )));
        }
        let col_idx = self.column_index(column)?;
        let rows = self.rows.borrow();
        Ok(rows
            .get(row as usize)
            .and_then(|r| r.get(col_idx))
            .cloned())
    }

    async fn fetch(&self, request: &FetchRequest, signal: &AbortSignal) -> Result<()> {
        signal.check()?;
        validate_fetch_request(request, self.num_rows(), &self.columns)
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
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
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::executor::block_on;

    use super::*;

    fn people() -> MemoryFrame {
        MemoryFrame::new(
            vec![ColumnDescriptor::new("name"), ColumnDescriptor::new("age")],
            vec![
                vec![CellValue::from("ada"), CellValue::from(36.0)],
                vec![CellValue::from("bob"), CellValue::from(29.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_reads_cells_in_data_order() {
        let frame = people();
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(
            frame.get_cell(1, "name", None).unwrap(),
            Some(CellValue::from("bob"))
        );
    }

    #[test]
    fn test_rejects_unknown_coordinates() {
        let frame = people();
        assert!(matches!(
            frame.get_cell(2, "name", None),
            Err(VgridError::InvalidIndex(_))
        ));
        assert!(matches!(
            frame.get_cell(0, "height", None),
            Err(VgridError::InvalidColumn(_))
        ));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = MemoryFrame::new(
            vec![ColumnDescriptor::new("a"), ColumnDescriptor::new("b")],
            vec![vec![CellValue::Null]],
        );
        assert!(matches!(result, Err(VgridError::Configuration(_))));
    }

    #[test]
    fn test_replace_rows_picks_the_event_by_count() {
        let frame = people();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        frame
            .events()
            .subscribe(move |event| sink.borrow_mut().push(event));

        frame
            .replace_rows(vec![
                vec![CellValue::from("cyd"), CellValue::from(41.0)],
                vec![CellValue::from("dee"), CellValue::from(33.0)],
            ])
            .unwrap();
        frame.replace_rows(vec![]).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![DataEvent::Update, DataEvent::NumRowsChange]
        );
    }

    #[test]
    fn test_fetch_validates_range() {
        let frame = people();
        let bad = FetchRequest {
            row_start: 0,
            row_end: 3,
            columns: None,
            order_by: None,
        };
        let result = block_on(frame.fetch(&bad, &AbortSignal::never()));
        assert!(matches!(result, Err(VgridError::InvalidIndex(_))));

        let ok = FetchRequest::whole_column(frame.num_rows(), "age");
        block_on(frame.fetch(&ok, &AbortSignal::never())).unwrap();
    }
}
