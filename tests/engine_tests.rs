//! Engine host-flow tests
//!
//! Tests that drive [`VGrid`] the way a host does: load delimited
//! bytes, configure the viewport, feed scroll events, read the view
//! snapshot, and work the selection and sorting surfaces through their
//! JSON forms.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;

use common::ranges;
use futures::executor::block_on;
use vgrid::dataframe::CellValue;
use vgrid::selection::Selection;
use vgrid::sort::{OrderByEntry, SortDirection};
use vgrid::{VGrid, VgridError};

/// A 100-row table with ids 0..100 and scores cycling through 0..25.
fn hundred_rows_csv() -> Vec<u8> {
    let mut text = String::from("id,name,score\n");
    for i in 0..100 {
        let line = format!("{i},row{i:03},{}\n", (i * 7) % 25);
        text.push_str(&line);
    }
    text.into_bytes()
}

fn loaded(csv: &[u8]) -> VGrid {
    let mut grid = VGrid::new();
    grid.load_csv(csv).unwrap();
    grid
}

fn by_score(direction: SortDirection) -> Vec<OrderByEntry> {
    vec![OrderByEntry {
        column: "score".to_string(),
        direction,
    }]
}

// =============================================================================
// LOADING AND VIEW GEOMETRY
// =============================================================================

#[test]
fn test_loading_csv_builds_the_table() {
    let grid = loaded(&hundred_rows_csv());
    assert_eq!(grid.row_count(), 100);

    let view = grid.view().unwrap();
    assert_eq!(view.num_rows, 100);
    let names: Vec<&str> = view.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "score"]);
}

#[test]
fn test_view_tracks_geometry_and_scroll() {
    let grid = loaded(&hundred_rows_csv());
    grid.set_viewport(400.0, 40.0, 18.0).unwrap();
    grid.on_scroll(100.0).unwrap();

    let view = grid.view().unwrap();
    // 100 rows of 18px under a 40px header fit the surface: no
    // compression, canvas equals content.
    assert_eq!(view.scale_factor, Some(1.0));
    assert_eq!(view.canvas_height, Some(1840.0));
    assert_eq!(view.virtual_canvas_height, Some(1840.0));
    assert_eq!(view.scroll_top, Some(100.0));
    assert_eq!(view.virtual_scroll_top, Some(100.0));

    let window = view.window.unwrap();
    // (100 - 40) / 18 = 3.3 through (100 + 400 - 40) / 18 = 25.6
    assert_eq!(window.visible_rows_start, 3);
    assert_eq!(window.visible_rows_end, 26);
    // Default overscan of 20, clamped at the top.
    assert_eq!(window.rendered_rows_start, 0);
    assert_eq!(window.rendered_rows_end, 46);
}

#[test]
fn test_surface_cap_compresses_the_canvas() {
    let grid = loaded(&hundred_rows_csv());
    grid.set_viewport(500.0, 50.0, 10.0).unwrap();
    // Content is 1050px but the surface tops out at 800px.
    grid.set_max_element_height(800.0).unwrap();
    grid.scroll_to(150.0).unwrap();

    let view = grid.view().unwrap();
    let factor = view.scale_factor.unwrap();
    assert!((factor - 550.0 / 300.0).abs() < 1e-9);
    assert_eq!(view.canvas_height, Some(800.0));
    assert_eq!(view.virtual_canvas_height, Some(1050.0));

    // scrollTop 150 maps to logical 275.
    let window = view.window.unwrap();
    assert_eq!(window.visible_rows_start, 22);
    assert_eq!(window.visible_rows_end, 73);
}

#[test]
fn test_view_serializes_in_camel_case() {
    let grid = loaded(&hundred_rows_csv());
    let before = serde_json::to_value(grid.view().unwrap()).unwrap();
    assert_eq!(before["numRows"], 100);
    assert_eq!(before["allSelected"], false);
    assert!(
        before.get("scaleFactor").is_none(),
        "Absent optionals should be omitted, not null"
    );

    grid.set_viewport(400.0, 40.0, 18.0).unwrap();
    grid.on_scroll(0.0).unwrap();
    let after = serde_json::to_value(grid.view().unwrap()).unwrap();
    assert_eq!(after["scaleFactor"], 1.0);
    assert_eq!(after["window"]["visibleRowsStart"], 0);
    assert_eq!(after["selectedRows"], 0);
}

#[test]
fn test_overscan_is_adjustable() {
    let grid = loaded(&hundred_rows_csv());
    grid.set_viewport(400.0, 40.0, 18.0).unwrap();
    grid.on_scroll(100.0).unwrap();
    grid.set_overscan(2);

    let window = grid.view().unwrap().window.unwrap();
    assert_eq!(window.rendered_rows_start, 1);
    assert_eq!(window.rendered_rows_end, 28);
}

// =============================================================================
// WINDOW FETCH
// =============================================================================

#[test]
fn test_fetch_window_matches_the_view() {
    let grid = loaded(&hundred_rows_csv());
    grid.set_viewport(400.0, 40.0, 18.0).unwrap();
    grid.on_scroll(100.0).unwrap();

    let fetched = block_on(grid.fetch_window()).unwrap().unwrap();
    assert_eq!(Some(fetched), grid.view().unwrap().window);

    // Every rendered row is readable after the fetch.
    for row in fetched.rendered_rows_start..fetched.rendered_rows_end {
        assert!(grid.cell(row, "name").unwrap().is_some());
    }
}

#[test]
fn test_fetch_window_without_scroll_state() {
    let grid = loaded(&hundred_rows_csv());
    assert_eq!(block_on(grid.fetch_window()).unwrap(), None);
}

// =============================================================================
// SELECTION SURFACE
// =============================================================================

#[test]
fn test_selection_surface_round_trips_json() {
    let grid = loaded(&hundred_rows_csv());
    grid.toggle_row(0).unwrap();
    grid.toggle_row(2).unwrap();

    assert_eq!(
        grid.selection().unwrap(),
        r#"{"ranges":[{"start":0,"end":1},{"start":2,"end":3}],"anchor":2}"#
    );
    assert!(grid.is_row_selected(0).unwrap());
    assert!(!grid.is_row_selected(1).unwrap());

    let view = grid.view().unwrap();
    assert_eq!(view.selected_rows, 2);
    assert!(!view.all_selected);

    // Feed the JSON back in and end up in the same place.
    let json = grid.selection().unwrap();
    grid.toggle_all_rows().unwrap();
    grid.set_selection(&json).unwrap();
    assert_eq!(grid.selection().unwrap(), json);
}

#[test]
fn test_toggle_all_selects_and_clears() {
    let grid = loaded(&hundred_rows_csv());
    grid.toggle_all_rows().unwrap();

    let view = grid.view().unwrap();
    assert_eq!(view.selected_rows, 100);
    assert!(view.all_selected);

    let selection: Selection = serde_json::from_str(&grid.selection().unwrap()).unwrap();
    assert_eq!(selection.ranges, ranges(&[(0, 100)]));

    grid.toggle_all_rows().unwrap();
    assert_eq!(grid.view().unwrap().selected_rows, 0);
}

#[test]
fn test_extension_follows_the_displayed_order() {
    let grid = loaded(&hundred_rows_csv());
    block_on(grid.set_order_by(by_score(SortDirection::Ascending))).unwrap();

    grid.toggle_row(0).unwrap();
    grid.extend_selection(3).unwrap();

    // Four contiguous display rows, whatever data rows they map to.
    for display_row in 0..4 {
        assert!(grid.is_row_selected(display_row).unwrap());
    }
    assert!(!grid.is_row_selected(4).unwrap());
    assert_eq!(grid.view().unwrap().selected_rows, 4);
}

#[test]
fn test_selection_json_is_validated() {
    let grid = loaded(&hundred_rows_csv());

    assert!(matches!(
        grid.set_selection("not json"),
        Err(VgridError::InvalidRanges(_))
    ));
    assert!(matches!(
        grid.set_selection(r#"{"ranges":[{"start":0,"end":5},{"start":3,"end":8}]}"#),
        Err(VgridError::InvalidRanges(_))
    ));
    assert!(matches!(
        grid.set_selection(r#"{"ranges":[{"start":90,"end":101}]}"#),
        Err(VgridError::InvalidRange(_))
    ));
    assert!(matches!(
        grid.set_selection(r#"{"ranges":[],"anchor":100}"#),
        Err(VgridError::InvalidIndex(_))
    ));
}

// =============================================================================
// SORTING SURFACE
// =============================================================================

#[test]
fn test_sorting_reorders_reads_and_reports_json() {
    let grid = loaded(&hundred_rows_csv());
    block_on(grid.set_order_by(by_score(SortDirection::Descending))).unwrap();

    assert_eq!(
        grid.order_by().unwrap(),
        r#"[{"column":"score","direction":"descending"}]"#
    );

    // Top score is 24, first reached at id 7; ties keep data order.
    assert_eq!(grid.cell(0, "score").unwrap(), Some(CellValue::from(24.0)));
    assert_eq!(grid.cell(0, "id").unwrap(), Some(CellValue::from(7.0)));

    // Clearing the orderBy restores data order.
    block_on(grid.set_order_by(Vec::new())).unwrap();
    assert_eq!(grid.order_by().unwrap(), "[]");
    assert_eq!(grid.cell(0, "id").unwrap(), Some(CellValue::from(0.0)));
}

#[test]
fn test_order_by_validation_happens_up_front() {
    let grid = loaded(&hundred_rows_csv());
    let result = block_on(grid.set_order_by(vec![OrderByEntry {
        column: "nope".to_string(),
        direction: SortDirection::Ascending,
    }]));
    assert!(matches!(result, Err(VgridError::InvalidColumn(_))));
    assert_eq!(grid.order_by().unwrap(), "[]", "Failed sort must not stick");
}

// =============================================================================
// ERROR PATHS
// =============================================================================

#[test]
fn test_surface_cap_requires_a_viewport() {
    let grid = loaded(&hundred_rows_csv());
    assert!(matches!(
        grid.set_max_element_height(5000.0),
        Err(VgridError::Configuration(_))
    ));
}

#[test]
fn test_viewport_geometry_is_validated() {
    let grid = loaded(&hundred_rows_csv());
    assert!(matches!(
        grid.set_viewport(400.0, 0.0, 18.0),
        Err(VgridError::Configuration(_))
    ));
    assert!(matches!(
        grid.set_viewport(400.0, 40.0, -1.0),
        Err(VgridError::Configuration(_))
    ));
}

#[test]
fn test_cell_reads_are_validated() {
    let grid = loaded(&hundred_rows_csv());
    assert!(matches!(
        grid.cell(0, "nope"),
        Err(VgridError::InvalidColumn(_))
    ));
    assert!(matches!(
        grid.cell(100, "id"),
        Err(VgridError::InvalidIndex(_))
    ));
}

#[test]
fn test_scroll_to_row_without_geometry_is_a_no_op() {
    let grid = loaded(&hundred_rows_csv());
    assert!(!grid.scroll_to_row(5).unwrap());
}
