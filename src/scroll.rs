//! Scroll state machine and the derived row window.
//!
//! Scroll handling is a pure reducer: the host feeds raw scrollbar events
//! and programmatic targets in, and reads back an immutable state from
//! which the visible/rendered row window is derived. Two update paths
//! exist. A *global* update re-anchors the logical position from the raw
//! scrollbar value (a multiplication through the scale factor, which
//! amplifies sub-pixel noise). A *local* update treats a small scrollbar
//! delta as an exact logical-pixel delta and accumulates it on top of the
//! last anchor, which is what keeps wheel and keyboard scrolling smooth
//! while the scale is compressing.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VgridError};
use crate::scale::Scale;

/// Rows worth of pixels a scrollbar delta may span and still be applied
/// as a local update.
pub const LARGE_SCROLL_ROWS: f64 = 500.0;

/// Hard cap on the rendered window. A wider window means the geometry and
/// the scroll state disagree.
pub const MAX_RENDERED_ROWS: u32 = 1000;

/// Overscan rows rendered on each side of the visible window when the
/// host does not pick its own padding.
pub const DEFAULT_OVERSCAN_PADDING: u32 = 20;

/// Scroll state of one table. All fields in canvas space except
/// `local_offset`, which is virtual-space pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    /// Active scrollbar-to-logical mapping, absent until geometry arrives
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scale: Option<Scale>,
    /// Last raw scrollbar position reported by the host
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scroll_top: Option<f64>,
    /// Scrollbar position last used as the basis of the logical position
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scroll_top_anchor: Option<f64>,
    /// Accumulated logical-pixel delta applied on top of the anchor
    pub local_offset: f64,
}

impl ScrollState {
    /// Fresh state with no geometry and no scroll history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state for a known geometry.
    #[must_use]
    pub fn with_scale(scale: Scale) -> Self {
        Self {
            scale: Some(scale),
            ..Self::default()
        }
    }

    /// Effective logical scroll position:
    /// `toVirtual(scrollTopAnchor) + localOffset`. `None` until both the
    /// scale and an anchor exist.
    #[must_use]
    pub fn virtual_scroll_top(&self) -> Option<f64> {
        let scale = self.scale.as_ref()?;
        let anchor = self.scroll_top_anchor?;
        Some(scale.to_virtual(anchor) + self.local_offset)
    }
}

/// Actions consumed by [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollAction {
    /// Replace the geometry mapping; scroll position is left alone.
    SetScale(Scale),
    /// Programmatic jump to a canvas-space position. Always authoritative.
    ScrollTo { scroll_top: f64 },
    /// Raw scrollbar event from the host.
    OnScroll { scroll_top: f64 },
    /// Accumulate a logical-pixel delta without moving the scrollbar.
    LocalScroll { delta: f64 },
    /// Re-anchor at a canvas-space position and drop accumulated offset.
    GlobalScroll { scroll_top: f64 },
}

/// Pure state transition. Never mutates `state`.
#[must_use]
pub fn reduce(state: &ScrollState, action: &ScrollAction) -> ScrollState {
    match *action {
        ScrollAction::SetScale(scale) => ScrollState {
            scale: Some(scale),
            ..state.clone()
        },
        // A programmatic target is an authoritative reposition, never a
        // local nudge: the caller already knows exactly where to land.
        ScrollAction::ScrollTo { scroll_top } | ScrollAction::GlobalScroll { scroll_top } => {
            apply_global(state, scroll_top)
        }
        ScrollAction::OnScroll { scroll_top } => match (state.scroll_top, state.scale.as_ref()) {
            (Some(previous), Some(scale)) => {
                let delta = scroll_top - previous;
                if can_be_local_scroll(scale, state.local_offset, delta, scroll_top) {
                    apply_local(state, delta, Some(scroll_top))
                } else {
                    apply_global(state, scroll_top)
                }
            }
            // No previous position (or no geometry yet): only a full
            // resync is meaningful.
            _ => apply_global(state, scroll_top),
        },
        ScrollAction::LocalScroll { delta } => apply_local(state, delta, None),
    }
}

/// Threshold below which a scrollbar delta may be tracked locally.
#[must_use]
pub fn large_scroll_px(scale: &Scale) -> f64 {
    LARGE_SCROLL_ROWS * scale.parameters().row_height
}

/// Decide whether a delta can be applied as a local update.
///
/// Local tracking requires: active compression (an identity scale has
/// nothing to gain), a finite delta within [`large_scroll_px`], an
/// accumulated offset that stays within the same bound, and a scrollbar
/// position strictly inside the physical range — at either end the
/// compressed position is the only trustworthy source and a resync is
/// forced. Both the scroll-event path and the scroll-to-row path go
/// through this one predicate.
#[must_use]
pub fn can_be_local_scroll(scale: &Scale, local_offset: f64, delta: f64, scroll_top: f64) -> bool {
    let limit = large_scroll_px(scale);
    !scale.is_identity()
        && delta.is_finite()
        && delta.abs() <= limit
        && (local_offset + delta).abs() <= limit
        && scroll_top > 0.0
        && scroll_top < scale.max_scroll_top()
}

fn apply_global(state: &ScrollState, scroll_top: f64) -> ScrollState {
    let anchor = state
        .scale
        .as_ref()
        .map(|scale| scroll_top.clamp(0.0, scale.max_scroll_top()));
    ScrollState {
        scale: state.scale,
        scroll_top: Some(scroll_top),
        scroll_top_anchor: anchor,
        local_offset: 0.0,
    }
}

fn apply_local(state: &ScrollState, delta: f64, event_scroll_top: Option<f64>) -> ScrollState {
    ScrollState {
        scale: state.scale,
        scroll_top: event_scroll_top.or(state.scroll_top),
        scroll_top_anchor: state.scroll_top_anchor,
        local_offset: state.local_offset + delta,
    }
}

/// The row window the host should fetch and render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWindow {
    /// Canvas-space offset of the first rendered row below the header;
    /// absent when no raw scrollbar position has been reported yet
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub slice_top: Option<f64>,
    /// First data row at least partially inside the viewport
    pub visible_rows_start: u32,
    /// One past the last visible data row
    pub visible_rows_end: u32,
    /// First rendered row (visible start minus overscan)
    pub rendered_rows_start: u32,
    /// One past the last rendered row (visible end plus overscan)
    pub rendered_rows_end: u32,
}

/// Derive the visible and rendered row window from scroll state.
///
/// Returns `Ok(None)` until both a scale and an anchor exist. The header
/// region is special: while `virtualScrollTop` is still inside the header
/// (or the table has no rows) the first visible row is pinned to 0 and
/// the hidden content above the viewport is the header itself.
///
/// # Errors
///
/// `DataConsistency` when the rendered window would exceed
/// [`MAX_RENDERED_ROWS`] — geometry and state have diverged and rendering
/// the window would freeze the host.
pub fn compute_derived_values(state: &ScrollState, padding: u32) -> Result<Option<RowWindow>> {
    let (Some(scale), Some(_)) = (state.scale.as_ref(), state.scroll_top_anchor) else {
        return Ok(None);
    };
    let Some(virtual_scroll_top) = state.virtual_scroll_top() else {
        return Ok(None);
    };
    let geometry = scale.parameters();
    let num_rows = geometry.num_rows;

    let (visible_rows_start, visible_rows_end) = if num_rows == 0 {
        (0, 0)
    } else {
        let max_index = num_rows - 1;
        let start = if virtual_scroll_top < geometry.header_height {
            0
        } else {
            clamp_row(
                ((virtual_scroll_top - geometry.header_height) / geometry.row_height).floor(),
                max_index,
            )
        };
        let last = clamp_row(
            ((virtual_scroll_top + geometry.client_height - geometry.header_height)
                / geometry.row_height)
                .floor(),
            max_index,
        )
        .max(start);
        (start, last + 1)
    };

    let rendered_rows_start = visible_rows_start.saturating_sub(padding);
    let rendered_rows_end = visible_rows_end.saturating_add(padding).min(num_rows);

    let window = rendered_rows_end.saturating_sub(rendered_rows_start);
    if window > MAX_RENDERED_ROWS {
        return Err(VgridError::DataConsistency(format!(
            "rendered window of {window} rows exceeds the {MAX_RENDERED_ROWS}-row cap"
        )));
    }

    let slice_top = state.scroll_top.map(|scroll_top| {
        scroll_top + f64::from(rendered_rows_start) * geometry.row_height - virtual_scroll_top
    });

    Ok(Some(RowWindow {
        slice_top,
        visible_rows_start,
        visible_rows_end,
        rendered_rows_start,
        rendered_rows_end,
    }))
}

/// Decide how to bring a row into view, if it is not already.
///
/// `row_index` is 1-based with the header occupying index 1, so data row
/// `r` arrives as `r + 2`. The header and out-of-range indexes need no
/// action. A partially or fully hidden row produces the delta toward its
/// nearer hidden edge; [`can_be_local_scroll`] (evaluated at the anchor,
/// since a local nudge leaves the scrollbar alone) picks between a
/// `LocalScroll` and a `ScrollTo` through the inverse mapping.
#[must_use]
pub fn scroll_action_for_row(
    row_index: u32,
    scale: &Scale,
    scroll_top_anchor: f64,
    local_offset: f64,
) -> Option<ScrollAction> {
    let geometry = scale.parameters();
    if row_index < 2 {
        return None;
    }
    let data_row = row_index - 2;
    if data_row >= geometry.num_rows {
        return None;
    }

    let virtual_scroll_top = scale.to_virtual(scroll_top_anchor) + local_offset;
    let row_top = geometry.header_height + f64::from(data_row) * geometry.row_height;
    let row_bottom = row_top + geometry.row_height;

    let hidden_before = virtual_scroll_top - row_top;
    let hidden_after = row_bottom - (virtual_scroll_top + geometry.client_height);

    let delta = if hidden_before > 0.0 && (hidden_after <= 0.0 || hidden_before <= hidden_after) {
        -hidden_before
    } else if hidden_after > 0.0 {
        hidden_after
    } else {
        // Fully visible.
        return None;
    };

    if can_be_local_scroll(scale, local_offset, delta, scroll_top_anchor) {
        Some(ScrollAction::LocalScroll { delta })
    } else {
        let scroll_top = scale
            .from_virtual(virtual_scroll_top + delta)
            .clamp(0.0, scale.max_scroll_top());
        Some(ScrollAction::ScrollTo { scroll_top })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_row(raw: f64, max_index: u32) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= f64::from(max_index) {
        max_index
    } else {
        raw as u32
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
    use super::*;
    use crate::scale::ScaleParameters;

    fn compressed_scale() -> Scale {
        Scale::new(ScaleParameters {
            client_height: 1000.0,
            header_height: 50.0,
            row_height: 30.0,
            num_rows: 20_000,
            max_element_height: 10_000.0,
        })
        .unwrap()
    }

    #[test]
    fn set_scale_keeps_scroll_position() {
        let state = ScrollState {
            scale: Some(compressed_scale()),
            scroll_top: Some(400.0),
            scroll_top_anchor: Some(400.0),
            local_offset: 12.0,
        };
        let next = reduce(&state, &ScrollAction::SetScale(compressed_scale()));
        assert_eq!(next.scroll_top, Some(400.0));
        assert_eq!(next.scroll_top_anchor, Some(400.0));
        assert_eq!(next.local_offset, 12.0);
    }

    #[test]
    fn first_scroll_event_is_global() {
        let state = ScrollState::with_scale(compressed_scale());
        let next = reduce(&state, &ScrollAction::OnScroll { scroll_top: 500.0 });
        assert_eq!(next.scroll_top_anchor, Some(500.0));
        assert_eq!(next.local_offset, 0.0);
    }

    #[test]
    fn global_scroll_clamps_anchor_to_physical_range() {
        let state = ScrollState::with_scale(compressed_scale());
        let next = reduce(
            &state,
            &ScrollAction::GlobalScroll {
                scroll_top: 99_999.0,
            },
        );
        // canvasHeight 10000 − clientHeight 1000
        assert_eq!(next.scroll_top_anchor, Some(9000.0));
        assert_eq!(next.scroll_top, Some(99_999.0));
    }

    #[test]
    fn local_scroll_without_event_keeps_scroll_top() {
        let state = ScrollState {
            scale: Some(compressed_scale()),
            scroll_top: Some(300.0),
            scroll_top_anchor: Some(300.0),
            local_offset: 0.0,
        };
        let next = reduce(&state, &ScrollAction::LocalScroll { delta: -25.0 });
        assert_eq!(next.scroll_top, Some(300.0));
        assert_eq!(next.local_offset, -25.0);
    }
}
