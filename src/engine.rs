//! Main VGrid struct - the primary entry point for the table engine.
//!
//! This module provides the WASM-exported `VGrid` struct that handles:
//! - Loading delimited data into an in-memory frame
//! - Managing scroll state (compressed scrollbar mapping, row windows)
//! - Row selection against data-order indices, hit-tested in display order
//! - Sorting through cached rank permutations
//!
//! The struct is a headless view-model: the JavaScript host owns the DOM,
//! forwards scroll events and clicks, and renders whatever row window the
//! engine derives. The same core runs natively for the CLI and tests.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use js_sys::Function;

use crate::abort::{AbortController, AbortSignal};
use crate::convert::extend_selection_displayed;
use crate::csv::{self, Delimiter};
use crate::dataframe::{
    CellValue, ColumnDescriptor, DataFrame, FetchRequest, MemoryFrame, SortableFrame,
};
use crate::error::{Result, VgridError};
use crate::events::{DataEvent, EventBus, Subscription};
use crate::scale::{Scale, ScaleParameters, DEFAULT_MAX_ELEMENT_HEIGHT};
use crate::scroll::{
    compute_derived_values, reduce, scroll_action_for_row, RowWindow, ScrollAction, ScrollState,
    DEFAULT_OVERSCAN_PADDING,
};
use crate::selection::{
    are_all_selected, count_selected_rows, extend_from_anchor, is_selected, toggle_all,
    toggle_index, validate_ranges, Selection,
};
use crate::sort::OrderByEntry;

/// Pixel geometry of the host viewport, fixed between resizes.
#[derive(Debug, Clone, Copy)]
struct ViewportGeometry {
    client_height: f64,
    header_height: f64,
    row_height: f64,
    max_element_height: f64,
}

impl ViewportGeometry {
    fn parameters(&self, num_rows: u32) -> ScaleParameters {
        ScaleParameters {
            client_height: self.client_height,
            header_height: self.header_height,
            row_height: self.row_height,
            num_rows,
            max_element_height: self.max_element_height,
        }
    }
}

/// Mutable view-model shared with event listeners.
struct ViewModel {
    geometry: Option<ViewportGeometry>,
    scroll: ScrollState,
    selection: Selection,
    order_by: Vec<OrderByEntry>,
    padding: u32,
    /// Set when the row count changed under the current scale; the next
    /// read rebuilds the scale before using it
    stale_scale: bool,
}

/// Everything the host needs to lay out one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub num_rows: u32,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    /// Height the scroll spacer should take, capped by the surface limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_canvas_height: Option<f64>,
    /// Scrollbar position the host should show
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_scroll_top: Option<f64>,
    /// Row window to fetch and render; absent until geometry and a
    /// scroll position exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<RowWindow>,
    pub order_by: Vec<OrderByEntry>,
    pub selected_rows: u32,
    pub all_selected: bool,
}

/// The main grid engine exported to JavaScript.
#[wasm_bindgen]
pub struct VGrid {
    base: Rc<MemoryFrame>,
    frame: Rc<SortableFrame<MemoryFrame>>,
    model: Rc<RefCell<ViewModel>>,
    /// Engine-level bus; survives frame swaps so host subscriptions do
    events: EventBus,
    frame_subscription: Subscription,
    window_fetch: RefCell<Option<AbortController>>,
    sort_fetch: RefCell<Option<AbortController>>,
    #[cfg(target_arch = "wasm32")]
    change_subscription: RefCell<Option<Subscription>>,
}

// ============================================================================
// Core (both targets)
// ============================================================================

impl VGrid {
    fn empty_grid() -> Self {
        let base = Rc::new(MemoryFrame::empty(Vec::new()));
        let frame = Rc::new(SortableFrame::new(Rc::clone(&base)));
        let model = Rc::new(RefCell::new(ViewModel {
            geometry: None,
            scroll: ScrollState::new(),
            selection: Selection::empty(),
            order_by: Vec::new(),
            padding: DEFAULT_OVERSCAN_PADDING,
            stale_scale: false,
        }));
        let events = EventBus::default();
        let frame_subscription = subscribe_forwarder(&frame, &model, &events);
        Self {
            base,
            frame,
            model,
            events,
            frame_subscription,
            window_fetch: RefCell::new(None),
            sort_fetch: RefCell::new(None),
            #[cfg(target_arch = "wasm32")]
            change_subscription: RefCell::new(None),
        }
    }

    /// Engine-level change notifications, re-broadcast from the frame.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn install_frame(&mut self, base: MemoryFrame) -> Result<()> {
        if let Some(controller) = self.window_fetch.take() {
            controller.abort();
        }
        if let Some(controller) = self.sort_fetch.take() {
            controller.abort();
        }
        self.frame.events().unsubscribe(self.frame_subscription);

        let base = Rc::new(base);
        let frame = Rc::new(SortableFrame::new(Rc::clone(&base)));
        self.frame_subscription = subscribe_forwarder(&frame, &self.model, &self.events);
        self.base = base;
        self.frame = frame;

        {
            let mut model = self.model.borrow_mut();
            model.scroll = ScrollState::new();
            model.selection = Selection::empty();
            model.order_by.clear();
            model.stale_scale = true;
        }
        sync_scale_now(&self.frame, &self.model)?;
        self.events.emit(DataEvent::NumRowsChange);
        Ok(())
    }

    fn configure_viewport(&self, geometry: ViewportGeometry) -> Result<()> {
        let scale = Scale::new(geometry.parameters(self.frame.num_rows()))?;
        let mut model = self.model.borrow_mut();
        model.geometry = Some(geometry);
        model.stale_scale = false;
        model.scroll = reduce(&model.scroll, &ScrollAction::SetScale(scale));
        Ok(())
    }

    fn viewport_with_heights(
        &self,
        client_height: f64,
        header_height: f64,
        row_height: f64,
    ) -> ViewportGeometry {
        let max_element_height = self
            .model
            .borrow()
            .geometry
            .map_or(DEFAULT_MAX_ELEMENT_HEIGHT, |g| g.max_element_height);
        ViewportGeometry {
            client_height,
            header_height,
            row_height,
            max_element_height,
        }
    }

    fn apply_scroll_event(&self, scroll_top: f64) -> Result<()> {
        sync_scale_now(&self.frame, &self.model)?;
        let mut model = self.model.borrow_mut();
        model.scroll = reduce(&model.scroll, &ScrollAction::OnScroll { scroll_top });
        Ok(())
    }

    fn apply_scroll_to(&self, scroll_top: f64) -> Result<()> {
        sync_scale_now(&self.frame, &self.model)?;
        let mut model = self.model.borrow_mut();
        model.scroll = reduce(&model.scroll, &ScrollAction::ScrollTo { scroll_top });
        Ok(())
    }

    /// Applies whatever movement brings `row_index` into view. Returns
    /// whether the scroll state changed at all.
    fn bring_row_into_view(&self, row_index: u32) -> Result<bool> {
        sync_scale_now(&self.frame, &self.model)?;
        let (scale, anchor, offset) = {
            let model = self.model.borrow();
            let Some(scale) = model.scroll.scale else {
                return Ok(false);
            };
            (
                scale,
                model.scroll.scroll_top_anchor.unwrap_or(0.0),
                model.scroll.local_offset,
            )
        };
        let Some(action) = scroll_action_for_row(row_index, &scale, anchor, offset) else {
            return Ok(false);
        };
        let mut model = self.model.borrow_mut();
        model.scroll = reduce(&model.scroll, &action);
        Ok(true)
    }

    fn current_view(&self) -> Result<ViewState> {
        sync_scale_now(&self.frame, &self.model)?;
        let model = self.model.borrow();
        let num_rows = self.frame.num_rows();
        let window = compute_derived_values(&model.scroll, model.padding)?;
        let scale = model.scroll.scale.as_ref();
        let selected = count_selected_rows(&model.selection.ranges)?;
        Ok(ViewState {
            num_rows,
            columns: self.frame.columns().to_vec(),
            scale_factor: scale.map(|s| s.factor()),
            canvas_height: scale.map(|s| s.canvas_height()),
            virtual_canvas_height: scale.map(|s| s.virtual_canvas_height()),
            scroll_top: model.scroll.scroll_top,
            virtual_scroll_top: model.scroll.virtual_scroll_top(),
            window,
            order_by: model.order_by.clone(),
            selected_rows: u32::try_from(selected).unwrap_or(u32::MAX),
            all_selected: are_all_selected(&model.selection.ranges, num_rows)?,
        })
    }

    /// Maps a display-order row to its data-order index under the
    /// active sort.
    fn display_to_data(&self, display_row: u32) -> Result<u32> {
        let num_rows = self.frame.num_rows();
        if display_row >= num_rows {
            return Err(VgridError::InvalidIndex(format!(
                "row {display_row} outside 0..{num_rows}"
            )));
        }
        let order_by = self.model.borrow().order_by.clone();
        if order_by.is_empty() {
            return Ok(display_row);
        }
        let indexes = self
            .frame
            .cached_data_indexes(&order_by)
            .ok_or_else(not_sorted_yet)?;
        indexes
            .get(display_row as usize)
            .copied()
            .ok_or_else(|| {
                VgridError::DataConsistency(format!(
                    "sort permutation holds {} entries for {num_rows} rows",
                    indexes.len()
                ))
            })
    }

    fn toggle_display_row(&self, display_row: u32) -> Result<()> {
        let data_row = self.display_to_data(display_row)?;
        let mut model = self.model.borrow_mut();
        model.selection.ranges = toggle_index(&model.selection.ranges, data_row)?;
        model.selection.anchor = Some(data_row);
        Ok(())
    }

    fn extend_to_display_row(&self, display_row: u32) -> Result<()> {
        let num_rows = self.frame.num_rows();
        if display_row >= num_rows {
            return Err(VgridError::InvalidIndex(format!(
                "row {display_row} outside 0..{num_rows}"
            )));
        }
        let order_by = self.model.borrow().order_by.clone();
        if order_by.is_empty() {
            let mut model = self.model.borrow_mut();
            model.selection.ranges = extend_from_anchor(
                &model.selection.ranges,
                model.selection.anchor,
                display_row,
            )?;
            return Ok(());
        }

        let data_to_display = self
            .frame
            .cached_inverted_indexes(&order_by)
            .ok_or_else(not_sorted_yet)?;
        let display_to_data = self
            .frame
            .cached_data_indexes(&order_by)
            .ok_or_else(not_sorted_yet)?;
        let mut model = self.model.borrow_mut();
        model.selection = extend_selection_displayed(
            &model.selection,
            display_row,
            &data_to_display,
            &display_to_data,
        )?;
        Ok(())
    }

    fn toggle_all_rows_now(&self) -> Result<()> {
        let num_rows = self.frame.num_rows();
        let mut model = self.model.borrow_mut();
        model.selection.ranges = toggle_all(&model.selection.ranges, num_rows)?;
        Ok(())
    }

    fn row_selected(&self, display_row: u32) -> Result<bool> {
        let data_row = self.display_to_data(display_row)?;
        let model = self.model.borrow();
        is_selected(&model.selection.ranges, data_row)
    }

    fn selection_as_json(&self) -> Result<String> {
        let model = self.model.borrow();
        serde_json::to_string(&model.selection)
            .map_err(|err| VgridError::DataConsistency(format!("unencodable selection: {err}")))
    }

    fn selection_from_json(&self, json: &str) -> Result<()> {
        let selection: Selection = serde_json::from_str(json)
            .map_err(|err| VgridError::InvalidRanges(format!("unparseable selection: {err}")))?;
        validate_ranges(&selection.ranges)?;
        let num_rows = self.frame.num_rows();
        if let Some(last) = selection.ranges.last() {
            if last.end > num_rows {
                return Err(VgridError::InvalidRange(format!(
                    "range end {} exceeds row count {num_rows}",
                    last.end
                )));
            }
        }
        if let Some(anchor) = selection.anchor {
            if anchor >= num_rows {
                return Err(VgridError::InvalidIndex(format!(
                    "anchor {anchor} outside 0..{num_rows}"
                )));
            }
        }
        self.model.borrow_mut().selection = selection;
        Ok(())
    }

    fn order_by_as_json(&self) -> Result<String> {
        let model = self.model.borrow();
        serde_json::to_string(&model.order_by)
            .map_err(|err| VgridError::DataConsistency(format!("unencodable orderBy: {err}")))
    }

    fn cell_value(&self, display_row: u32, column: &str) -> Result<Option<CellValue>> {
        let order_by = self.model.borrow().order_by.clone();
        let order_by = (!order_by.is_empty()).then_some(order_by);
        self.frame.get_cell(display_row, column, order_by.as_deref())
    }

    fn write_cell(&self, data_row: u32, column: &str, value_json: &str) -> Result<()> {
        let value: CellValue = serde_json::from_str(value_json)
            .map_err(|err| VgridError::Configuration(format!("unparseable cell value: {err}")))?;
        self.base.set_cell(data_row, column, value)
    }

    fn set_overscan_rows(&self, rows: u32) {
        self.model.borrow_mut().padding = rows;
    }
}

impl Default for VGrid {
    fn default() -> Self {
        Self::empty_grid()
    }
}

impl Drop for VGrid {
    fn drop(&mut self) {
        self.frame.events().unsubscribe(self.frame_subscription);
    }
}

fn not_sorted_yet() -> VgridError {
    VgridError::DataConsistency("sort permutation not loaded yet".to_string())
}

/// Forwards frame events onto the engine bus and flags the scale as
/// stale when the row count moves under it.
fn subscribe_forwarder(
    frame: &SortableFrame<MemoryFrame>,
    model: &Rc<RefCell<ViewModel>>,
    events: &EventBus,
) -> Subscription {
    let model = Rc::clone(model);
    let events = events.clone();
    frame.events().subscribe(move |event| {
        if event == DataEvent::NumRowsChange {
            model.borrow_mut().stale_scale = true;
        }
        events.emit(event);
    })
}

/// Rebuilds the scroll scale if a row-count change invalidated it.
fn sync_scale_now(frame: &SortableFrame<MemoryFrame>, model: &RefCell<ViewModel>) -> Result<()> {
    let mut model = model.borrow_mut();
    if !model.stale_scale {
        return Ok(());
    }
    model.stale_scale = false;
    let Some(geometry) = model.geometry else {
        return Ok(());
    };
    let scale = Scale::new(geometry.parameters(frame.num_rows()))?;
    model.scroll = reduce(&model.scroll, &ScrollAction::SetScale(scale));
    Ok(())
}

/// Fetches the rows of the current rendered window through the frame.
async fn fetch_window_task(
    frame: &SortableFrame<MemoryFrame>,
    model: &RefCell<ViewModel>,
    signal: &AbortSignal,
) -> Result<Option<RowWindow>> {
    sync_scale_now(frame, model)?;
    let (window, order_by) = {
        let model = model.borrow();
        (
            compute_derived_values(&model.scroll, model.padding)?,
            model.order_by.clone(),
        )
    };
    let Some(window) = window else {
        return Ok(None);
    };
    let request = FetchRequest {
        row_start: window.rendered_rows_start,
        row_end: window.rendered_rows_end,
        columns: None,
        order_by: (!order_by.is_empty()).then_some(order_by),
    };
    frame.fetch(&request, signal).await?;
    signal.check()?;
    Ok(Some(window))
}

/// Validates and activates an orderBy, fetching both permutations so
/// synchronous sorted reads and hit-testing work immediately after.
async fn apply_order_by_task(
    frame: &SortableFrame<MemoryFrame>,
    model: &RefCell<ViewModel>,
    order_by: Vec<OrderByEntry>,
    signal: &AbortSignal,
) -> Result<()> {
    if !order_by.is_empty() {
        frame.validate_order_by(&order_by)?;
        frame.fetch_data_indexes(&order_by, signal).await?;
        frame.fetch_inverted_indexes(&order_by, signal).await?;
    }
    signal.check()?;
    model.borrow_mut().order_by = order_by;
    Ok(())
}

/// Replaces the controller in `slot`, aborting whatever was running.
fn begin_fetch(slot: &RefCell<Option<AbortController>>) -> AbortSignal {
    let controller = AbortController::new();
    let signal = controller.signal();
    if let Some(previous) = slot.replace(Some(controller)) {
        previous.abort();
    }
    signal
}

// ============================================================================
// WASM32 Implementation
// ============================================================================

#[cfg(target_arch = "wasm32")]
type JsResult<T> = std::result::Result<T, JsValue>;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl VGrid {
    /// Create an empty grid. Load data and set the viewport before use.
    #[wasm_bindgen(constructor)]
    pub fn new() -> VGrid {
        console_error_panic_hook::set_once();
        Self::empty_grid()
    }

    /// Load delimited bytes, sniffing the delimiter from the header.
    /// Resets scroll, selection and sort.
    pub fn load_csv(&mut self, data: &[u8]) -> JsResult<()> {
        let frame = csv::parse_auto(data).map_err(JsValue::from)?;
        self.install_frame(frame).map_err(JsValue::from)
    }

    /// Load delimited bytes with an explicit delimiter
    /// (`comma`, `semicolon` or `tab`).
    pub fn load_delimited(&mut self, data: &[u8], delimiter: &str) -> JsResult<()> {
        let delimiter = Delimiter::from_name(delimiter).map_err(JsValue::from)?;
        let frame = csv::parse_delimited(data, delimiter).map_err(JsValue::from)?;
        self.install_frame(frame).map_err(JsValue::from)
    }

    /// Set the viewport geometry in logical pixels.
    pub fn set_viewport(
        &self,
        client_height: f64,
        header_height: f64,
        row_height: f64,
    ) -> JsResult<()> {
        let geometry = self.viewport_with_heights(client_height, header_height, row_height);
        self.configure_viewport(geometry).map_err(JsValue::from)
    }

    /// Override the tallest element the rendering surface supports.
    pub fn set_max_element_height(&self, max_element_height: f64) -> JsResult<()> {
        let Some(mut geometry) = self.model.borrow().geometry else {
            return Err(JsValue::from(VgridError::Configuration(
                "viewport is not configured yet".to_string(),
            )));
        };
        geometry.max_element_height = max_element_height;
        self.configure_viewport(geometry).map_err(JsValue::from)
    }

    /// Number of overscan rows rendered above and below the viewport.
    pub fn set_overscan(&self, rows: u32) {
        self.set_overscan_rows(rows);
    }

    /// Feed a raw scroll event from the scroll container.
    pub fn on_scroll(&self, scroll_top: f64) -> JsResult<()> {
        self.apply_scroll_event(scroll_top).map_err(JsValue::from)
    }

    /// Programmatic jump to a scrollbar position.
    pub fn scroll_to(&self, scroll_top: f64) -> JsResult<()> {
        self.apply_scroll_to(scroll_top).map_err(JsValue::from)
    }

    /// Bring a 1-based table row into view (the header is row 1, data
    /// row `r` is `r + 2`). Returns whether the scroll state moved; if
    /// it did, read `view()` and apply its `scrollTop` to the
    /// container.
    pub fn scroll_to_row(&self, row_index: u32) -> JsResult<bool> {
        self.bring_row_into_view(row_index).map_err(JsValue::from)
    }

    /// Snapshot of everything needed to lay out a frame.
    pub fn view(&self) -> JsResult<JsValue> {
        let view = self.current_view().map_err(JsValue::from)?;
        serde_wasm_bindgen::to_value(&view).map_err(JsValue::from)
    }

    /// One cell in display order; `undefined` while unresolved.
    pub fn cell(&self, display_row: u32, column: &str) -> JsResult<JsValue> {
        let value = self.cell_value(display_row, column).map_err(JsValue::from)?;
        serde_wasm_bindgen::to_value(&value).map_err(JsValue::from)
    }

    /// Overwrite one cell by data-order row, as a JSON scalar.
    pub fn set_cell(&self, data_row: u32, column: &str, value_json: &str) -> JsResult<()> {
        self.write_cell(data_row, column, value_json)
            .map_err(JsValue::from)
    }

    /// Toggle one display-order row in or out of the selection.
    pub fn toggle_row(&self, display_row: u32) -> JsResult<()> {
        self.toggle_display_row(display_row).map_err(JsValue::from)
    }

    /// Extend the selection from its anchor to a display-order row.
    pub fn extend_selection(&self, display_row: u32) -> JsResult<()> {
        self.extend_to_display_row(display_row)
            .map_err(JsValue::from)
    }

    /// Select all rows, or clear if all are already selected.
    pub fn toggle_all_rows(&self) -> JsResult<()> {
        self.toggle_all_rows_now().map_err(JsValue::from)
    }

    /// Whether a display-order row is selected.
    pub fn is_row_selected(&self, display_row: u32) -> JsResult<bool> {
        self.row_selected(display_row).map_err(JsValue::from)
    }

    /// Current selection as JSON, in data-order indices.
    pub fn selection(&self) -> JsResult<String> {
        self.selection_as_json().map_err(JsValue::from)
    }

    /// Replace the selection from JSON, in data-order indices.
    pub fn set_selection(&self, json: &str) -> JsResult<()> {
        self.selection_from_json(json).map_err(JsValue::from)
    }

    /// Active orderBy as JSON.
    pub fn order_by(&self) -> JsResult<String> {
        self.order_by_as_json().map_err(JsValue::from)
    }

    /// Activate an orderBy (JSON array of `{column, direction}`); an
    /// empty array restores data order. Resolves once the permutations
    /// are ready; a newer call aborts an older one.
    pub fn set_order_by(&self, json: &str) -> js_sys::Promise {
        let frame = Rc::clone(&self.frame);
        let model = Rc::clone(&self.model);
        let signal = begin_fetch(&self.sort_fetch);
        let json = json.to_string();
        wasm_bindgen_futures::future_to_promise(async move {
            let order_by: Vec<OrderByEntry> = serde_json::from_str(&json)
                .map_err(|err| VgridError::InvalidOrderBy(format!("unparseable orderBy: {err}")))
                .map_err(JsValue::from)?;
            apply_order_by_task(&frame, &model, order_by, &signal)
                .await
                .map_err(JsValue::from)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Fetch the rows of the current rendered window. Resolves to the
    /// window, or `undefined` before geometry and scroll exist. A newer
    /// call aborts an older one.
    pub fn fetch_window(&self) -> js_sys::Promise {
        let frame = Rc::clone(&self.frame);
        let model = Rc::clone(&self.model);
        let signal = begin_fetch(&self.window_fetch);
        wasm_bindgen_futures::future_to_promise(async move {
            let window = fetch_window_task(&frame, &model, &signal)
                .await
                .map_err(JsValue::from)?;
            serde_wasm_bindgen::to_value(&window).map_err(JsValue::from)
        })
    }

    /// Install a change callback invoked with `"resolve"`, `"update"`
    /// or `"numrowschange"`. Passing `null` removes it.
    pub fn set_on_change(&self, callback: Option<Function>) {
        let mut slot = self.change_subscription.borrow_mut();
        if let Some(previous) = slot.take() {
            self.events.unsubscribe(previous);
        }
        if let Some(callback) = callback {
            let subscription = self.events.subscribe(move |event| {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(event.name()));
            });
            *slot = Some(subscription);
        }
    }

    /// Current number of data rows.
    pub fn row_count(&self) -> u32 {
        self.frame.num_rows()
    }
}

// ============================================================================
// Non-WASM32 Implementation (for testing/CLI)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl VGrid {
    /// Create an empty grid (non-wasm version for the CLI and tests).
    #[must_use]
    pub fn new() -> Self {
        Self::empty_grid()
    }

    /// Load delimited bytes, sniffing the delimiter from the header.
    pub fn load_csv(&mut self, data: &[u8]) -> Result<()> {
        let frame = csv::parse_auto(data)?;
        self.install_frame(frame)
    }

    /// Load delimited bytes with an explicit delimiter.
    pub fn load_delimited(&mut self, data: &[u8], delimiter: Delimiter) -> Result<()> {
        let frame = csv::parse_delimited(data, delimiter)?;
        self.install_frame(frame)
    }

    /// Set the viewport geometry in logical pixels.
    pub fn set_viewport(
        &self,
        client_height: f64,
        header_height: f64,
        row_height: f64,
    ) -> Result<()> {
        let geometry = self.viewport_with_heights(client_height, header_height, row_height);
        self.configure_viewport(geometry)
    }

    /// Override the tallest element the rendering surface supports.
    pub fn set_max_element_height(&self, max_element_height: f64) -> Result<()> {
        let Some(mut geometry) = self.model.borrow().geometry else {
            return Err(VgridError::Configuration(
                "viewport is not configured yet".to_string(),
            ));
        };
        geometry.max_element_height = max_element_height;
        self.configure_viewport(geometry)
    }

    /// Number of overscan rows rendered above and below the viewport.
    pub fn set_overscan(&self, rows: u32) {
        self.set_overscan_rows(rows);
    }

    /// Feed a raw scroll event from the scroll container.
    pub fn on_scroll(&self, scroll_top: f64) -> Result<()> {
        self.apply_scroll_event(scroll_top)
    }

    /// Programmatic jump to a scrollbar position.
    pub fn scroll_to(&self, scroll_top: f64) -> Result<()> {
        self.apply_scroll_to(scroll_top)
    }

    /// Bring a 1-based table row into view. Returns whether the scroll
    /// state moved.
    pub fn scroll_to_row(&self, row_index: u32) -> Result<bool> {
        self.bring_row_into_view(row_index)
    }

    /// Snapshot of everything needed to lay out a frame.
    pub fn view(&self) -> Result<ViewState> {
        self.current_view()
    }

    /// One cell in display order; `None` while unresolved.
    pub fn cell(&self, display_row: u32, column: &str) -> Result<Option<CellValue>> {
        self.cell_value(display_row, column)
    }

    /// Overwrite one cell by data-order row, as a JSON scalar.
    pub fn set_cell(&self, data_row: u32, column: &str, value_json: &str) -> Result<()> {
        self.write_cell(data_row, column, value_json)
    }

    /// Toggle one display-order row in or out of the selection.
    pub fn toggle_row(&self, display_row: u32) -> Result<()> {
        self.toggle_display_row(display_row)
    }

    /// Extend the selection from its anchor to a display-order row.
    pub fn extend_selection(&self, display_row: u32) -> Result<()> {
        self.extend_to_display_row(display_row)
    }

    /// Select all rows, or clear if all are already selected.
    pub fn toggle_all_rows(&self) -> Result<()> {
        self.toggle_all_rows_now()
    }

    /// Whether a display-order row is selected.
    pub fn is_row_selected(&self, display_row: u32) -> Result<bool> {
        self.row_selected(display_row)
    }

    /// Current selection as JSON, in data-order indices.
    pub fn selection(&self) -> Result<String> {
        self.selection_as_json()
    }

    /// Replace the selection from JSON, in data-order indices.
    pub fn set_selection(&self, json: &str) -> Result<()> {
        self.selection_from_json(json)
    }

    /// Active orderBy as JSON.
    pub fn order_by(&self) -> Result<String> {
        self.order_by_as_json()
    }

    /// Activate an orderBy; an empty vector restores data order.
    pub async fn set_order_by(&self, order_by: Vec<OrderByEntry>) -> Result<()> {
        let signal = begin_fetch(&self.sort_fetch);
        apply_order_by_task(&self.frame, &self.model, order_by, &signal).await
    }

    /// Fetch the rows of the current rendered window.
    pub async fn fetch_window(&self) -> Result<Option<RowWindow>> {
        let signal = begin_fetch(&self.window_fetch);
        fetch_window_task(&self.frame, &self.model, &signal).await
    }

    /// Current number of data rows.
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.frame.num_rows()
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
    use futures::executor::block_on;

    use crate::sort::SortDirection;

    use super::*;

    const CSV: &[u8] = b"name,age\nada,36\nbob,29\ncyd,41";

    fn loaded_grid() -> VGrid {
        let mut grid = VGrid::new();
        grid.load_csv(CSV).unwrap();
        grid.set_viewport(100.0, 20.0, 20.0).unwrap();
        grid
    }

    fn by_age(direction: SortDirection) -> Vec<OrderByEntry> {
        vec![OrderByEntry {
            column: "age".to_string(),
            direction,
        }]
    }

    #[test]
    fn test_view_before_scroll_has_no_window() {
        let grid = loaded_grid();
        let view = grid.view().unwrap();
        assert_eq!(view.num_rows, 3);
        assert_eq!(view.scale_factor, Some(1.0));
        assert!(view.window.is_none());
        assert!(view.scroll_top.is_none());
    }

    #[test]
    fn test_scroll_produces_a_window() {
        let grid = loaded_grid();
        grid.on_scroll(0.0).unwrap();
        let view = grid.view().unwrap();
        let window = view.window.unwrap();
        assert_eq!(window.visible_rows_start, 0);
        assert_eq!(window.visible_rows_end, 3);
        assert_eq!(window.rendered_rows_start, 0);
        assert_eq!(window.rendered_rows_end, 3);
    }

    #[test]
    fn test_sorted_cells_read_in_display_order() {
        let grid = loaded_grid();
        block_on(grid.set_order_by(by_age(SortDirection::Ascending))).unwrap();
        assert_eq!(
            grid.cell(0, "name").unwrap(),
            Some(CellValue::from("bob"))
        );
        assert_eq!(
            grid.cell(2, "name").unwrap(),
            Some(CellValue::from("cyd"))
        );
    }

    #[test]
    fn test_selection_survives_resorting() {
        let grid = loaded_grid();
        grid.toggle_row(1).unwrap();
        assert_eq!(grid.selection().unwrap(), r#"{"ranges":[{"start":1,"end":2}],"anchor":1}"#);

        block_on(grid.set_order_by(by_age(SortDirection::Ascending))).unwrap();
        // bob (data row 1) now sits at display row 0 and stays selected.
        assert!(grid.is_row_selected(0).unwrap());
        assert!(!grid.is_row_selected(1).unwrap());
        assert_eq!(grid.selection().unwrap(), r#"{"ranges":[{"start":1,"end":2}],"anchor":1}"#);
    }

    #[test]
    fn test_extension_is_contiguous_on_screen() {
        let grid = loaded_grid();
        block_on(grid.set_order_by(by_age(SortDirection::Ascending))).unwrap();
        grid.toggle_row(0).unwrap();
        grid.extend_selection(1).unwrap();

        assert!(grid.is_row_selected(0).unwrap());
        assert!(grid.is_row_selected(1).unwrap());
        assert!(!grid.is_row_selected(2).unwrap());
        // Display rows 0 and 1 are data rows 1 and 0.
        let view = grid.view().unwrap();
        assert_eq!(view.selected_rows, 2);
    }

    #[test]
    fn test_toggle_all_and_back() {
        let grid = loaded_grid();
        grid.toggle_all_rows().unwrap();
        assert!(grid.view().unwrap().all_selected);
        grid.toggle_all_rows().unwrap();
        assert_eq!(grid.view().unwrap().selected_rows, 0);
    }

    #[test]
    fn test_compressed_scroll_to_row_moves_locally() {
        let mut grid = VGrid::new();
        let mut csv = String::from("id\n");
        for row in 0..1000 {
            csv.push_str(&row.to_string());
            csv.push('\n');
        }
        grid.load_csv(csv.as_bytes()).unwrap();
        grid.set_viewport(500.0, 50.0, 10.0).unwrap();
        grid.set_max_element_height(5000.0).unwrap();

        let view = grid.view().unwrap();
        assert_eq!(view.canvas_height, Some(5000.0));
        assert!(view.scale_factor.unwrap() > 1.0);

        // Land mid-canvas, then ask for a row just below the viewport.
        grid.scroll_to(2000.0).unwrap();
        let before = grid.view().unwrap();
        let row_below = before.window.unwrap().visible_rows_end + 1;
        assert!(grid.scroll_to_row(row_below + 2).unwrap());

        let after = grid.view().unwrap();
        // A local nudge leaves the scrollbar where it was.
        assert_eq!(after.scroll_top, before.scroll_top);
        assert!(after.virtual_scroll_top.unwrap() > before.virtual_scroll_top.unwrap());
    }

    #[test]
    fn test_cell_update_invalidates_sort() {
        let grid = loaded_grid();
        block_on(grid.set_order_by(by_age(SortDirection::Ascending))).unwrap();
        assert_eq!(grid.cell(0, "name").unwrap(), Some(CellValue::from("bob")));

        grid.set_cell(1, "age", "99").unwrap();
        // The permutation is gone until the next fetch.
        assert_eq!(grid.cell(0, "name").unwrap(), None);

        block_on(grid.set_order_by(by_age(SortDirection::Ascending))).unwrap();
        assert_eq!(grid.cell(0, "name").unwrap(), Some(CellValue::from("ada")));
    }

    #[test]
    fn test_load_resets_everything() {
        let mut grid = loaded_grid();
        grid.on_scroll(0.0).unwrap();
        grid.toggle_row(0).unwrap();
        block_on(grid.set_order_by(by_age(SortDirection::Descending))).unwrap();

        grid.load_csv(b"x\n1\n2").unwrap();
        let view = grid.view().unwrap();
        assert_eq!(view.num_rows, 2);
        assert_eq!(view.selected_rows, 0);
        assert!(view.order_by.is_empty());
        assert!(view.window.is_none());
    }

    #[test]
    fn test_fetch_window_returns_the_window() {
        let grid = loaded_grid();
        grid.on_scroll(0.0).unwrap();
        let window = block_on(grid.fetch_window()).unwrap().unwrap();
        assert_eq!(window.rendered_rows_start, 0);
        assert_eq!(window.rendered_rows_end, 3);
    }
}
