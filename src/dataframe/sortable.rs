//! Sorting adapter over an unsorted source.
//!
//! `SortableFrame` turns any [`DataFrame`] that serves data order into
//! one that honors `orderBy`: it loads whole key columns through the
//! base source, ranks them, composes rank arrays into a data-index
//! permutation, and resolves sorted reads through that permutation.
//!
//! Ranks and permutations are memoized per column / per orderBy. A
//! concurrent request for a column whose ranks are already being
//! computed awaits the in-flight computation instead of starting a
//! second one. An `update` or `numrowschange` notification from the
//! base invalidates everything wholesale; results that were still in
//! flight when that happened are handed to their callers but never
//! committed to the fresh caches.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{try_join_all, FutureExt, LocalBoxFuture, Shared};

use crate::abort::AbortSignal;
use crate::error::{Result, VgridError};
use crate::events::{DataEvent, EventBus, Subscription};
use crate::sort::{
    compute_data_indexes, compute_ranks, invert_permutation_indexes, OrderByEntry, OrderKey,
};

use super::{
    find_column, validate_fetch_request, CellValue, ColumnDescriptor, DataFrame, FetchRequest,
    KeyedCache,
};

type SharedRanks = Shared<LocalBoxFuture<'static, Result<Rc<Vec<u32>>>>>;

/// Memoized sort artifacts, all invalidated together.
struct SortState {
    /// Per-column ranks, direction-independent
    ranks: KeyedCache<String, Rc<Vec<u32>>>,
    /// Display-to-data permutations keyed by encoded orderBy
    indexes: KeyedCache<String, Rc<Vec<u32>>>,
    /// Data-to-display permutations keyed by encoded orderBy
    inverted: KeyedCache<String, Rc<Vec<u32>>>,
    /// Rank computations currently running, deduplicated per column
    inflight: HashMap<String, SharedRanks>,
}

impl SortState {
    fn new(caches_enabled: bool) -> Self {
        let make = || {
            if caches_enabled {
                KeyedCache::new()
            } else {
                KeyedCache::disabled()
            }
        };
        Self {
            ranks: make(),
            indexes: make(),
            inverted: make(),
            inflight: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.ranks.clear();
        self.indexes.clear();
        self.inverted.clear();
        self.inflight.clear();
    }
}

/// Sorting wrapper around a base [`DataFrame`].
///
/// The wrapper subscribes to the base source: `resolve` is re-broadcast
/// as-is, `update` and `numrowschange` first drop every cached rank and
/// permutation. Synchronous sorted reads answer `Ok(None)` until the
/// permutation for that orderBy has been fetched once.
pub struct SortableFrame<F: DataFrame + 'static> {
    base: Rc<F>,
    state: Rc<RefCell<SortState>>,
    /// Bumped on every wholesale invalidation; in-flight computations
    /// that started under an older value must not commit
    generation: Rc<Cell<u64>>,
    events: EventBus,
    subscription: Subscription,
}

impl<F: DataFrame + 'static> SortableFrame<F> {
    /// Wraps a base source with memoizing caches.
    pub fn new(base: Rc<F>) -> Self {
        Self::with_caches(base, true)
    }

    /// Wraps a base source, optionally with caching disabled.
    ///
    /// Without caches every fetch recomputes its ranks and permutation,
    /// and sorted synchronous reads always answer `Ok(None)`; useful
    /// only for exercising the recomputation paths.
    pub fn with_caches(base: Rc<F>, caches_enabled: bool) -> Self {
        let state = Rc::new(RefCell::new(SortState::new(caches_enabled)));
        let generation = Rc::new(Cell::new(0_u64));
        let events = EventBus::default();

        let subscription = {
            let state = Rc::clone(&state);
            let generation = Rc::clone(&generation);
            let events = events.clone();
            base.events().subscribe(move |event| {
                match event {
                    DataEvent::Resolve => {}
                    DataEvent::Update | DataEvent::NumRowsChange => {
                        generation.set(generation.get().wrapping_add(1));
                        state.borrow_mut().clear();
                    }
                }
                events.emit(event);
            })
        };

        Self {
            base,
            state,
            generation,
            events,
            subscription,
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn base(&self) -> &Rc<F> {
        &self.base
    }

    /// Drops every cached rank and permutation and orphans in-flight
    /// computations, exactly as a data-change notification would.
    pub fn reset_caches(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
        self.state.borrow_mut().clear();
    }

    /// Checks an orderBy against the column set: every named column
    /// must exist, be sortable, and appear at most once.
    ///
    /// # Errors
    ///
    /// `InvalidColumn` for an unknown name, `InvalidOrderBy` for an
    /// unsortable or repeated column.
    pub fn validate_order_by(&self, order_by: &[OrderByEntry]) -> Result<()> {
        let mut seen: Vec<&str> = Vec::with_capacity(order_by.len());
        for entry in order_by {
            let descriptor = find_column(self.base.columns(), &entry.column)?;
            if !descriptor.sortable {
                return Err(VgridError::InvalidOrderBy(format!(
                    "column {:?} is not sortable",
                    descriptor.name
                )));
            }
            if seen.contains(&entry.column.as_str()) {
                return Err(VgridError::InvalidOrderBy(format!(
                    "column {:?} appears more than once",
                    entry.column
                )));
            }
            seen.push(&entry.column);
        }
        Ok(())
    }

    /// Ranks for one column, computing and caching them on first use.
    ///
    /// When a computation for the column is already in flight the call
    /// awaits it. An in-flight computation runs under its initiator's
    /// signal; if the initiator aborts, waiters retry under their own.
    ///
    /// # Errors
    ///
    /// Validation errors as in [`SortableFrame::validate_order_by`],
    /// `Aborted` when `signal` fires, or whatever the base fetch fails
    /// with.
    pub async fn fetch_ranks(&self, column: &str, signal: &AbortSignal) -> Result<Rc<Vec<u32>>> {
        let descriptor = find_column(self.base.columns(), column)?;
        if !descriptor.sortable {
            return Err(VgridError::InvalidOrderBy(format!(
                "column {:?} is not sortable",
                descriptor.name
            )));
        }
        loop {
            signal.check()?;
            if let Some(ranks) = self.state.borrow().ranks.get(column).cloned() {
                return Ok(ranks);
            }
            let pending = self.state.borrow().inflight.get(column).cloned();
            let shared = match pending {
                Some(shared) => shared,
                None => self.spawn_rank_computation(column, signal.clone()),
            };
            match shared.await {
                Ok(ranks) => {
                    signal.check()?;
                    return Ok(ranks);
                }
                // The initiator bailed out, not us; start over.
                Err(err) if err.is_abort() && !signal.is_aborted() => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Display-to-data permutation for an orderBy, computed from the
    /// per-column ranks and cached. An empty orderBy is the identity.
    ///
    /// # Errors
    ///
    /// As [`SortableFrame::fetch_ranks`], plus `DataConsistency` when
    /// the row count changed while the ranks were loading.
    pub async fn fetch_data_indexes(
        &self,
        order_by: &[OrderByEntry],
        signal: &AbortSignal,
    ) -> Result<Rc<Vec<u32>>> {
        signal.check()?;
        if order_by.is_empty() {
            return Ok(Rc::new((0..self.base.num_rows()).collect()));
        }
        self.validate_order_by(order_by)?;
        let key = order_by_key(order_by)?;
        if let Some(indexes) = self.state.borrow().indexes.get(&key).cloned() {
            return Ok(indexes);
        }

        let started_at = self.generation.get();
        let ranks = try_join_all(
            order_by
                .iter()
                .map(|entry| self.fetch_ranks(&entry.column, signal)),
        )
        .await?;
        signal.check()?;

        let sort_keys: Vec<OrderKey<'_>> = order_by
            .iter()
            .zip(&ranks)
            .map(|(entry, column_ranks)| OrderKey {
                direction: entry.direction,
                ranks: column_ranks.as_slice(),
            })
            .collect();
        let indexes = Rc::new(compute_data_indexes(self.base.num_rows(), &sort_keys)?);

        if self.generation.get() == started_at {
            let committed = self
                .state
                .borrow_mut()
                .indexes
                .insert(key, Rc::clone(&indexes));
            if committed {
                self.events.emit(DataEvent::Resolve);
            }
        }
        Ok(indexes)
    }

    /// Data-to-display permutation for an orderBy, the inverse of
    /// [`SortableFrame::fetch_data_indexes`].
    ///
    /// # Errors
    ///
    /// As [`SortableFrame::fetch_data_indexes`].
    pub async fn fetch_inverted_indexes(
        &self,
        order_by: &[OrderByEntry],
        signal: &AbortSignal,
    ) -> Result<Rc<Vec<u32>>> {
        signal.check()?;
        if order_by.is_empty() {
            return Ok(Rc::new((0..self.base.num_rows()).collect()));
        }
        self.validate_order_by(order_by)?;
        let key = order_by_key(order_by)?;
        if let Some(inverted) = self.state.borrow().inverted.get(&key).cloned() {
            return Ok(inverted);
        }

        let started_at = self.generation.get();
        let indexes = self.fetch_data_indexes(order_by, signal).await?;
        signal.check()?;
        let inverted = Rc::new(invert_permutation_indexes(&indexes)?);

        if self.generation.get() == started_at {
            self.state
                .borrow_mut()
                .inverted
                .insert(key, Rc::clone(&inverted));
        }
        Ok(inverted)
    }

    /// Cached display-to-data permutation, if one is resident.
    #[must_use]
    pub fn cached_data_indexes(&self, order_by: &[OrderByEntry]) -> Option<Rc<Vec<u32>>> {
        let key = order_by_key(order_by).ok()?;
        self.state.borrow().indexes.get(&key).cloned()
    }

    /// Cached data-to-display permutation, if one is resident.
    #[must_use]
    pub fn cached_inverted_indexes(&self, order_by: &[OrderByEntry]) -> Option<Rc<Vec<u32>>> {
        let key = order_by_key(order_by).ok()?;
        self.state.borrow().inverted.get(&key).cloned()
    }

    /// Cached ranks for one column, if resident.
    #[must_use]
    pub fn cached_ranks(&self, column: &str) -> Option<Rc<Vec<u32>>> {
        self.state.borrow().ranks.get(column).cloned()
    }

    /// Starts a rank computation and registers its shared handle.
    ///
    /// The computation owns clones of the frame internals so it stays
    /// valid for as long as any waiter holds the handle. On completion
    /// it commits the result and unregisters itself, unless a wholesale
    /// invalidation happened in between.
    fn spawn_rank_computation(&self, column: &str, signal: AbortSignal) -> SharedRanks {
        let base = Rc::clone(&self.base);
        let state = Rc::clone(&self.state);
        let generation = Rc::clone(&self.generation);
        let events = self.events.clone();
        let started_at = generation.get();
        let column = column.to_string();
        let key = column.clone();

        let shared = async move {
            let outcome = compute_column_ranks(&*base, &column, &signal).await;
            if generation.get() == started_at {
                let committed = {
                    let mut guard = state.borrow_mut();
                    guard.inflight.remove(&column);
                    match &outcome {
                        Ok(ranks) => guard.ranks.insert(column.clone(), Rc::clone(ranks)),
                        Err(_) => false,
                    }
                };
                if committed {
                    events.emit(DataEvent::Resolve);
                }
            }
            outcome
        }
        .boxed_local()
        .shared();

        self.state
            .borrow_mut()
            .inflight
            .insert(key, shared.clone());
        shared
    }
}

impl<F: DataFrame + 'static> Drop for SortableFrame<F> {
    fn drop(&mut self) {
        self.base.events().unsubscribe(self.subscription);
    }
}

impl<F: DataFrame + 'static> std::fmt::Debug for SortableFrame<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SortableFrame")
            .field("num_rows", &self.base.num_rows())
            .field("cached_ranks", &state.ranks.len())
            .field("cached_indexes", &state.indexes.len())
            .field("inflight", &state.inflight.len())
            .finish_non_exhaustive()
    }
}

/// Loads one column through the base source and ranks it.
async fn compute_column_ranks<F: DataFrame>(
    base: &F,
    column: &str,
    signal: &AbortSignal,
) -> Result<Rc<Vec<u32>>> {
    signal.check()?;
    let num_rows = base.num_rows();
    base.fetch(&FetchRequest::whole_column(num_rows, column), signal)
        .await?;
    signal.check()?;

    let mut values: Vec<CellValue> = Vec::with_capacity(num_rows as usize);
    for row in 0..num_rows {
        match base.get_cell(row, column, None)? {
            Some(value) => values.push(value),
            None => {
                return Err(VgridError::DataConsistency(format!(
                    "column {column:?} row {row} still unresolved after fetch"
                )))
            }
        }
    }
    Ok(Rc::new(compute_ranks(&values)?))
}

/// Canonical cache key for an orderBy.
fn order_by_key(order_by: &[OrderByEntry]) -> Result<String> {
    serde_json::to_string(order_by)
        .map_err(|err| VgridError::DataConsistency(format!("unencodable orderBy: {err}")))
}

#[async_trait(?Send)]
impl<F: DataFrame + 'static> DataFrame for SortableFrame<F> {
    fn num_rows(&self) -> u32 {
        self.base.num_rows()
    }

    fn columns(&self) -> &[ColumnDescriptor] {
        self.base.columns()
    }

    fn get_cell(
        &self,
        row: u32,
        column: &str,
        order_by: Option<&[OrderByEntry]>,
    ) -> Result<Option<CellValue>> {
        let Some(order_by) = order_by.filter(|entries| !entries.is_empty()) else {
            return self.base.get_cell(row, column, None);
        };
        self.validate_order_by(order_by)?;
        if row >= self.base.num_rows() {
            return Err(VgridError::InvalidIndex(format!(
                "row {row} outside 0..{}",
                self.base.num_rows()
            )));
        }
        let Some(indexes) = self.cached_data_indexes(order_by) else {
            return Ok(None);
        };
        let data_row = indexes.get(row as usize).copied().ok_or_else(|| {
            VgridError::DataConsistency(format!(
                "sort permutation holds {} entries for {} rows",
                indexes.len(),
                self.base.num_rows()
            ))
        })?;
        self.base.get_cell(data_row, column, None)
    }

    async fn fetch(&self, request: &FetchRequest, signal: &AbortSignal) -> Result<()> {
        signal.check()?;
        let Some(order_by) = request
            .order_by
            .as_deref()
            .filter(|entries| !entries.is_empty())
        else {
            return self.base.fetch(request, signal).await;
        };
        validate_fetch_request(request, self.num_rows(), self.columns())?;
        let indexes = self.fetch_data_indexes(order_by, signal).await?;
        signal.check()?;
        if request.row_start == request.row_end {
            return Ok(());
        }

        // The requested display rows map to scattered data rows; load
        // the smallest data range that covers them all.
        let window = indexes
            .get(request.row_start as usize..request.row_end as usize)
            .ok_or_else(|| {
                VgridError::DataConsistency(format!(
                    "sort permutation holds {} entries for {} rows",
                    indexes.len(),
                    self.num_rows()
                ))
            })?;
        let mut low = u32::MAX;
        let mut high = 0_u32;
        for &data_row in window {
            low = low.min(data_row);
            high = high.max(data_row);
        }
        let covering = FetchRequest {
            row_start: low,
            row_end: high + 1,
            columns: request.columns.clone(),
            order_by: None,
        };
        self.base.fetch(&covering, signal).await
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
    use futures::executor::block_on;

    use crate::abort::AbortController;
    use crate::dataframe::MemoryFrame;
    use crate::sort::SortDirection;

    use super::*;

    fn people() -> Rc<MemoryFrame> {
        Rc::new(
            MemoryFrame::new(
                vec![ColumnDescriptor::new("name"), ColumnDescriptor::new("age")],
                vec![
                    vec![CellValue::from("ada"), CellValue::from(36.0)],
                    vec![CellValue::from("bob"), CellValue::from(29.0)],
                    vec![CellValue::from("cyd"), CellValue::from(41.0)],
                ],
            )
            .unwrap(),
        )
    }

    fn by_age(direction: SortDirection) -> Vec<OrderByEntry> {
        vec![OrderByEntry {
            column: "age".to_string(),
            direction,
        }]
    }

    #[test]
    fn test_sorted_reads_follow_the_permutation() {
        let frame = SortableFrame::new(people());
        let order_by = by_age(SortDirection::Ascending);

        let indexes =
            block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();
        assert_eq!(*indexes, vec![1, 0, 2]);

        let first = frame.get_cell(0, "name", Some(&order_by)).unwrap();
        assert_eq!(first, Some(CellValue::from("bob")));
    }

    #[test]
    fn test_descending_reverses_distinct_keys() {
        let frame = SortableFrame::new(people());
        let order_by = by_age(SortDirection::Descending);

        let indexes =
            block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();
        assert_eq!(*indexes, vec![2, 0, 1]);
    }

    #[test]
    fn test_sorted_read_is_none_until_fetched() {
        let frame = SortableFrame::new(people());
        let order_by = by_age(SortDirection::Ascending);

        assert_eq!(frame.get_cell(0, "name", Some(&order_by)).unwrap(), None);
        assert_eq!(
            frame.get_cell(0, "name", None).unwrap(),
            Some(CellValue::from("ada"))
        );
    }

    #[test]
    fn test_order_by_validation() {
        let base = Rc::new(
            MemoryFrame::new(
                vec![
                    ColumnDescriptor::new("id"),
                    ColumnDescriptor {
                        name: "blob".to_string(),
                        sortable: false,
                    },
                ],
                vec![vec![CellValue::from(1.0), CellValue::Null]],
            )
            .unwrap(),
        );
        let frame = SortableFrame::new(base);

        let unknown = vec![OrderByEntry {
            column: "nope".to_string(),
            direction: SortDirection::Ascending,
        }];
        assert!(matches!(
            frame.validate_order_by(&unknown),
            Err(VgridError::InvalidColumn(_))
        ));

        let unsortable = vec![OrderByEntry {
            column: "blob".to_string(),
            direction: SortDirection::Ascending,
        }];
        assert!(matches!(
            frame.validate_order_by(&unsortable),
            Err(VgridError::InvalidOrderBy(_))
        ));

        let duplicated = vec![
            OrderByEntry {
                column: "id".to_string(),
                direction: SortDirection::Ascending,
            },
            OrderByEntry {
                column: "id".to_string(),
                direction: SortDirection::Descending,
            },
        ];
        assert!(matches!(
            frame.validate_order_by(&duplicated),
            Err(VgridError::InvalidOrderBy(_))
        ));
    }

    #[test]
    fn test_empty_order_by_is_identity() {
        let frame = SortableFrame::new(people());
        let indexes = block_on(frame.fetch_data_indexes(&[], &AbortSignal::never())).unwrap();
        assert_eq!(*indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_update_invalidates_cached_permutations() {
        let base = people();
        let frame = SortableFrame::new(Rc::clone(&base));
        let order_by = by_age(SortDirection::Ascending);

        block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();
        assert!(frame.cached_data_indexes(&order_by).is_some());

        base.set_cell(0, "age", CellValue::from(99.0)).unwrap();
        assert!(frame.cached_data_indexes(&order_by).is_none());

        let indexes =
            block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();
        assert_eq!(*indexes, vec![1, 2, 0]);
    }

    #[test]
    fn test_aborted_signal_short_circuits() {
        let frame = SortableFrame::new(people());
        let controller = AbortController::new();
        controller.abort();

        let result = block_on(
            frame.fetch_data_indexes(&by_age(SortDirection::Ascending), &controller.signal()),
        );
        assert!(matches!(result, Err(VgridError::Aborted)));
        assert!(frame
            .cached_data_indexes(&by_age(SortDirection::Ascending))
            .is_none());
    }

    #[test]
    fn test_inverted_indexes_round_trip() {
        let frame = SortableFrame::new(people());
        let order_by = by_age(SortDirection::Ascending);

        let indexes =
            block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();
        let inverted =
            block_on(frame.fetch_inverted_indexes(&order_by, &AbortSignal::never())).unwrap();
        for (display_row, &data_row) in indexes.iter().enumerate() {
            assert_eq!(inverted[data_row as usize] as usize, display_row);
        }
    }

    #[test]
    fn test_events_pass_through_with_invalidation_first() {
        let base = people();
        let frame = SortableFrame::new(Rc::clone(&base));
        let order_by = by_age(SortDirection::Ascending);
        block_on(frame.fetch_data_indexes(&order_by, &AbortSignal::never())).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        frame
            .events()
            .subscribe(move |event| sink.borrow_mut().push(event));

        base.replace_rows(vec![vec![CellValue::from("eve"), CellValue::from(7.0)]])
            .unwrap();

        assert_eq!(*seen.borrow(), vec![DataEvent::NumRowsChange]);
        assert!(frame.cached_data_indexes(&order_by).is_none());
    }
}
