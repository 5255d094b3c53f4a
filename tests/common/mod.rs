//! Common test utilities and fixtures.
//!
//! This module provides shared builders for the integration tests:
//! typed in-memory tables, pre-built scales, and a deferrable data
//! source for exercising the async fetch paths.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic,
    clippy::cast_possible_truncation
)]

use std::cell::{Cell, RefCell};

use async_trait::async_trait;
use futures::channel::oneshot;

use vgrid::abort::AbortSignal;
use vgrid::dataframe::{
    CellValue, ColumnDescriptor, DataFrame, FetchRequest, MemoryFrame,
};
use vgrid::error::Result;
use vgrid::events::EventBus;
use vgrid::scale::{Scale, ScaleParameters};
use vgrid::selection::Range;
use vgrid::sort::OrderByEntry;

// ============================================================================
// Table Fixtures
// ============================================================================

/// Columns for the three-person sample table.
#[must_use]
pub fn people_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("name"),
        ColumnDescriptor::new("age"),
        ColumnDescriptor::new("active"),
    ]
}

/// Rows for the three-person sample table, in insertion order:
/// ada (36, true), bob (29, false), cyd (41, true).
#[must_use]
pub fn people_rows() -> Vec<Vec<CellValue>> {
    vec![
        vec!["ada".into(), 36.0.into(), true.into()],
        vec!["bob".into(), 29.0.into(), false.into()],
        vec!["cyd".into(), 41.0.into(), true.into()],
    ]
}

/// A small typed in-memory table.
#[must_use]
pub fn people_frame() -> MemoryFrame {
    MemoryFrame::new(people_columns(), people_rows()).unwrap()
}

/// A single-column table with rows 0..n.
#[must_use]
pub fn numbers_frame(n: u32) -> MemoryFrame {
    let rows = (0..n).map(|i| vec![CellValue::from(f64::from(i))]).collect();
    MemoryFrame::new(vec![ColumnDescriptor::new("id")], rows).unwrap()
}

/// Shorthand for building a canonical ranges list.
#[must_use]
pub fn ranges(pairs: &[(u32, u32)]) -> Vec<Range> {
    pairs.iter().map(|&(start, end)| Range { start, end }).collect()
}

// ============================================================================
// Scale Fixtures
// ============================================================================

/// The house test geometry: 1000px viewport, 50px header, 30px rows.
#[must_use]
pub fn geometry(num_rows: u32, max_element_height: f64) -> ScaleParameters {
    ScaleParameters {
        client_height: 1000.0,
        header_height: 50.0,
        row_height: 30.0,
        num_rows,
        max_element_height,
    }
}

/// Scale for a 20000-row table squeezed into a 10000px surface.
/// `factor` comes out at roughly 66.6.
#[must_use]
pub fn compressed_scale() -> Scale {
    Scale::new(geometry(20_000, 10_000.0)).unwrap()
}

/// Scale for a 100-row table that needs no compression.
#[must_use]
pub fn identity_scale() -> Scale {
    Scale::new(geometry(100, 10_000.0)).unwrap()
}

/// Shorthand for a single-column ascending orderBy.
#[must_use]
pub fn order_by(column: &str) -> Vec<OrderByEntry> {
    vec![OrderByEntry {
        column: column.to_string(),
        direction: vgrid::sort::SortDirection::Ascending,
    }]
}

// ============================================================================
// Deferrable Data Source
// ============================================================================

/// A data source whose first fetch blocks until an external gate opens.
///
/// `fetch_count` counts underlying fetches, which makes in-flight
/// deduplication observable: two concurrent rank requests against one
/// column must produce exactly one fetch.
pub struct DeferredFrame {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<CellValue>>,
    events: EventBus,
    fetch_count: Cell<u32>,
    fetch_ranges: RefCell<Vec<(u32, u32)>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl DeferredFrame {
    /// A frame whose fetches complete immediately.
    #[must_use]
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            events: EventBus::new(),
            fetch_count: Cell::new(0),
            fetch_ranges: RefCell::new(Vec::new()),
            gate: RefCell::new(None),
        }
    }

    /// A frame whose first fetch suspends until the returned sender
    /// fires. Later fetches complete immediately.
    #[must_use]
    pub fn gated(
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<CellValue>>,
    ) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let frame = Self {
            columns,
            rows,
            events: EventBus::new(),
            fetch_count: Cell::new(0),
            fetch_ranges: RefCell::new(Vec::new()),
            gate: RefCell::new(Some(rx)),
        };
        (frame, tx)
    }

    /// How many fetches reached the underlying source.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.get()
    }

    /// Row ranges of every fetch that reached the underlying source,
    /// in arrival order.
    #[must_use]
    pub fn fetch_ranges(&self) -> Vec<(u32, u32)> {
        self.fetch_ranges.borrow().clone()
    }

    /// Notification bus of the underlying source, for tests that push
    /// data-change events mid-flight.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.events
    }
}

#[async_trait(?Send)]
impl DataFrame for DeferredFrame {
    fn num_rows(&self) -> u32 {
        self.rows.len() as u32
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
        let col = self
            .columns
            .iter()
            .position(|c| c.name == column)
            .expect("test column exists");
        Ok(self
            .rows
            .get(row as usize)
            .map(|r| r[col].clone()))
    }

    async fn fetch(&self, request: &FetchRequest, signal: &AbortSignal) -> Result<()> {
        self.fetch_count.set(self.fetch_count.get() + 1);
        self.fetch_ranges
            .borrow_mut()
            .push((request.row_start, request.row_end));
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        signal.check()
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}
