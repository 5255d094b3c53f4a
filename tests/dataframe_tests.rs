//! Sorting data-source tests
//!
//! Tests for the async side of [`SortableFrame`]: in-flight rank
//! deduplication, cancellation and retry, wholesale invalidation while
//! a computation is running, and the covering fetch planned for a
//! sorted row window.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::block_on;
use futures::join;

use common::{order_by, people_columns, people_rows, DeferredFrame};
use vgrid::abort::{AbortController, AbortSignal};
use vgrid::dataframe::{CellValue, ColumnDescriptor, DataFrame, FetchRequest, SortableFrame};
use vgrid::events::DataEvent;
use vgrid::VgridError;

fn deferred_people() -> Rc<SortableFrame<DeferredFrame>> {
    Rc::new(SortableFrame::new(Rc::new(DeferredFrame::new(
        people_columns(),
        people_rows(),
    ))))
}

// =============================================================================
// IN-FLIGHT DEDUPLICATION
// =============================================================================

#[test]
fn test_concurrent_rank_requests_share_one_fetch() {
    let (base, open_gate) = DeferredFrame::gated(people_columns(), people_rows());
    let frame = SortableFrame::new(Rc::new(base));
    let signal = AbortSignal::never();

    let (first, second, ()) = block_on(async {
        join!(
            frame.fetch_ranks("age", &signal),
            frame.fetch_ranks("age", &signal),
            async {
                // Both requests are suspended on the gate by now.
                let _ = open_gate.send(());
            },
        )
    });

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(*first, vec![1, 0, 2]);
    assert!(
        Rc::ptr_eq(&first, &second),
        "Both callers should receive the same computation"
    );
    assert_eq!(frame.base().fetch_count(), 1);
}

#[test]
fn test_sequential_rank_requests_hit_the_cache() {
    let frame = deferred_people();
    let signal = AbortSignal::never();

    let first = block_on(frame.fetch_ranks("age", &signal)).unwrap();
    let second = block_on(frame.fetch_ranks("age", &signal)).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(frame.base().fetch_count(), 1);
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[test]
fn test_waiter_retries_after_the_initiator_aborts() {
    let (base, open_gate) = DeferredFrame::gated(people_columns(), people_rows());
    let frame = SortableFrame::new(Rc::new(base));

    let initiator = AbortController::new();
    let initiator_signal = initiator.signal();
    let waiter = AbortSignal::never();

    let (first, second, ()) = block_on(async {
        join!(
            frame.fetch_ranks("age", &initiator_signal),
            frame.fetch_ranks("age", &waiter),
            async {
                // Cancel the initiator while its fetch is suspended,
                // then let the fetch finish.
                initiator.abort();
                let _ = open_gate.send(());
            },
        )
    });

    assert!(matches!(first, Err(VgridError::Aborted)));
    let ranks = second.unwrap();
    assert_eq!(*ranks, vec![1, 0, 2], "The waiter should get a fresh result");
    assert_eq!(
        frame.base().fetch_count(),
        2,
        "The waiter restarts the computation under its own signal"
    );
    assert!(frame.cached_ranks("age").is_some());
}

#[test]
fn test_aborted_computation_leaves_no_cache_entry() {
    let (base, open_gate) = DeferredFrame::gated(people_columns(), people_rows());
    let frame = SortableFrame::new(Rc::new(base));
    let controller = AbortController::new();
    let controller_signal = controller.signal();

    let (result, ()) = block_on(async {
        join!(frame.fetch_ranks("age", &controller_signal), async {
            controller.abort();
            let _ = open_gate.send(());
        },)
    });

    assert!(matches!(result, Err(VgridError::Aborted)));
    assert!(frame.cached_ranks("age").is_none());
}

// =============================================================================
// MID-FLIGHT INVALIDATION
// =============================================================================

#[test]
fn test_data_change_orphans_a_running_computation() {
    let (base, open_gate) = DeferredFrame::gated(people_columns(), people_rows());
    let frame = SortableFrame::new(Rc::new(base));
    let signal = AbortSignal::never();

    let (result, ()) = block_on(async {
        join!(frame.fetch_ranks("age", &signal), async {
            // The table changes under the running computation.
            frame.base().bus().emit(DataEvent::Update);
            let _ = open_gate.send(());
        },)
    });

    // The caller still gets its answer, but the stale result must not
    // survive into the fresh caches.
    assert_eq!(*result.unwrap(), vec![1, 0, 2]);
    assert!(frame.cached_ranks("age").is_none());

    let again = block_on(frame.fetch_ranks("age", &signal)).unwrap();
    assert_eq!(*again, vec![1, 0, 2]);
    assert_eq!(frame.base().fetch_count(), 2, "A later request recomputes");
    assert!(frame.cached_ranks("age").is_some());
}

#[test]
fn test_commits_are_announced_as_resolve() {
    let frame = deferred_people();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    frame
        .events()
        .subscribe(move |event| sink.borrow_mut().push(event));

    block_on(frame.fetch_data_indexes(&order_by("age"), &AbortSignal::never())).unwrap();

    let seen = seen.borrow();
    assert!(!seen.is_empty(), "Committing sort artifacts should notify");
    assert!(seen.iter().all(|event| *event == DataEvent::Resolve));
}

// =============================================================================
// SORTED FETCH PLANNING
// =============================================================================

#[test]
fn test_sorted_fetch_loads_the_covering_data_range() {
    // Ages 36, 29, 41, 33 sort to data order [1, 3, 0, 2].
    let base = Rc::new(DeferredFrame::new(
        vec![ColumnDescriptor::new("name"), ColumnDescriptor::new("age")],
        vec![
            vec![CellValue::from("ada"), CellValue::from(36.0)],
            vec![CellValue::from("bob"), CellValue::from(29.0)],
            vec![CellValue::from("cyd"), CellValue::from(41.0)],
            vec![CellValue::from("dee"), CellValue::from(33.0)],
        ],
    ));
    let frame = SortableFrame::new(Rc::clone(&base));
    let signal = AbortSignal::never();

    let request = FetchRequest {
        row_start: 0,
        row_end: 2,
        columns: None,
        order_by: Some(order_by("age")),
    };
    block_on(frame.fetch(&request, &signal)).unwrap();

    // First the whole key column for ranking, then the narrowest data
    // range covering display rows 0..2 (data rows 1 and 3).
    assert_eq!(base.fetch_ranges(), vec![(0, 4), (1, 4)]);

    // The same window again reuses the cached permutation.
    block_on(frame.fetch(&request, &signal)).unwrap();
    assert_eq!(base.fetch_ranges(), vec![(0, 4), (1, 4), (1, 4)]);
}

#[test]
fn test_empty_sorted_window_fetches_nothing_extra() {
    let frame = deferred_people();
    let signal = AbortSignal::never();

    let request = FetchRequest {
        row_start: 2,
        row_end: 2,
        columns: None,
        order_by: Some(order_by("age")),
    };
    block_on(frame.fetch(&request, &signal)).unwrap();

    // Only the rank column was loaded; no row window followed.
    assert_eq!(frame.base().fetch_ranges(), vec![(0, 3)]);
}

#[test]
fn test_unsorted_fetch_passes_straight_through() {
    let frame = deferred_people();
    let signal = AbortSignal::never();

    let request = FetchRequest {
        row_start: 1,
        row_end: 3,
        columns: None,
        order_by: None,
    };
    block_on(frame.fetch(&request, &signal)).unwrap();

    assert_eq!(frame.base().fetch_ranges(), vec![(1, 3)]);
}

// =============================================================================
// CACHELESS MODE
// =============================================================================

#[test]
fn test_disabled_caches_recompute_every_time() {
    let base = Rc::new(DeferredFrame::new(people_columns(), people_rows()));
    let frame = SortableFrame::with_caches(Rc::clone(&base), false);
    let signal = AbortSignal::never();

    block_on(frame.fetch_data_indexes(&order_by("age"), &signal)).unwrap();
    block_on(frame.fetch_data_indexes(&order_by("age"), &signal)).unwrap();
    assert_eq!(base.fetch_count(), 2);

    // Synchronous sorted reads never resolve without a resident cache.
    let cell = frame.get_cell(0, "name", Some(&order_by("age"))).unwrap();
    assert_eq!(cell, None);
}
