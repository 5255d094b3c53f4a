//! vgrid - virtual-scroll table engine for the web
//!
//! Drives huge tables in the browser via WebAssembly while the host keeps
//! the DOM:
//! - Compressed scrollbar mapping for tables taller than the surface limit
//! - Windowed rendering (visible rows plus overscan) from pure scroll state
//! - Range-list row selection that survives re-sorting
//! - Multi-column sort through cached rank permutations
//! - Cancellable, deduplicated async data fetches
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { VGrid } from 'vgrid';
//! await init();
//! const grid = new VGrid();
//! grid.load_csv(bytes);
//! grid.set_viewport(600, 28, 24);
//! grid.on_scroll(container.scrollTop);
//! const view = grid.view();
//! ```

// Data-source modules
pub mod abort;
pub mod convert;
pub mod csv;
pub mod dataframe;
pub mod error;
pub mod events;
pub mod sort;

// View-state modules
pub mod scale;
pub mod scroll;
pub mod selection;

pub mod engine;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use dataframe::{CellValue, ColumnDescriptor, DataFrame};
use scale::{Scale, ScaleParameters};

// Re-export the main engine struct
pub use engine::{VGrid, ViewState};

pub use error::{Result, VgridError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTable<'a> {
    columns: &'a [ColumnDescriptor],
    num_rows: u32,
    rows: &'a [Vec<CellValue>],
}

/// Parse delimited text and return a JSON string representing the table
///
/// # Arguments
/// * `data` - The raw bytes of the CSV/TSV file
///
/// # Returns
/// A JSON string with the column descriptors and typed rows
///
/// # Errors
/// Returns an error if the input cannot be parsed into a table.
#[wasm_bindgen]
pub fn parse_csv(data: &[u8]) -> std::result::Result<String, JsValue> {
    let frame = csv::parse_auto(data).map_err(|e| JsValue::from_str(&e.to_string()))?;

    let rows = frame.rows();
    let table = ParsedTable {
        columns: frame.columns(),
        num_rows: frame.num_rows(),
        rows: &rows,
    };
    serde_json::to_string(&table)
        .map_err(|e| JsValue::from_str(&format!("JSON serialization error: {e}")))
}

/// Parse delimited text and return the table as a `JsValue`
///
/// This is more efficient than `parse_csv` when the result will be
/// used directly in JavaScript.
///
/// # Errors
/// Returns an error if the input cannot be parsed into a table.
#[wasm_bindgen]
pub fn parse_csv_to_js(data: &[u8]) -> std::result::Result<JsValue, JsValue> {
    let frame = csv::parse_auto(data).map_err(|e| JsValue::from_str(&e.to_string()))?;

    let rows = frame.rows();
    let table = ParsedTable {
        columns: frame.columns(),
        num_rows: frame.num_rows(),
        rows: &rows,
    };
    serde_wasm_bindgen::to_value(&table)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

/// Build the scrollbar mapping for the given geometry and return it as JSON
///
/// One-shot helper for hosts that want the compressed-space mapping
/// without instantiating a grid. Takes the camelCase `ScaleParameters`
/// shape and returns the derived scale, including `factor` and
/// `canvasHeight`.
///
/// # Errors
/// Returns an error if the geometry is invalid.
#[wasm_bindgen]
pub fn compute_scale_json(parameters: JsValue) -> std::result::Result<String, JsValue> {
    let parameters: ScaleParameters = serde_wasm_bindgen::from_value(parameters)
        .map_err(|e| JsValue::from_str(&format!("Invalid scale parameters: {e}")))?;
    let scale = Scale::new(parameters).map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::to_string(&scale)
        .map_err(|e| JsValue::from_str(&format!("JSON serialization error: {e}")))
}

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
