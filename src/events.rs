//! Typed change notifications for row data sources.
//!
//! Replaces the DOM event target a browser host would use with a minimal
//! publish/subscribe hub. Single-threaded by contract: listeners run
//! synchronously on the emitting call stack.

use std::cell::RefCell;
use std::rc::Rc;

/// Events a row data source publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEvent {
    /// New data is available; pending reads can be retried.
    Resolve,
    /// Cell contents changed in place; derived caches are stale.
    Update,
    /// The row count changed; derived caches and windows are stale.
    NumRowsChange,
}

impl DataEvent {
    /// Wire name of the event, as the host sees it.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Update => "update",
            Self::NumRowsChange => "numrowschange",
        }
    }
}

type Listener = Rc<dyn Fn(DataEvent)>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// Minimal typed publish/subscribe hub.
///
/// Clones share the same listener list, so a data source and the wrappers
/// holding it can hand the bus around freely.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event; returns its handle.
    pub fn subscribe(&self, listener: impl Fn(DataEvent) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(listener)));
        Subscription(id)
    }

    /// Remove a listener. Returns false when the handle was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != subscription.0);
        inner.listeners.len() != before
    }

    /// Synchronously deliver `event` to every listener.
    ///
    /// Listeners may subscribe/unsubscribe from inside the callback; the
    /// delivery list is snapshotted first, so mutation never re-enters
    /// the registry borrow.
    pub fn emit(&self, event: DataEvent) {
        let snapshot: Vec<Listener> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
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
    use std::cell::Cell;

    #[test]
    fn emit_reaches_all_listeners() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));

        let first = Rc::clone(&hits);
        bus.subscribe(move |_| first.set(first.get() + 1));
        let second = Rc::clone(&hits);
        bus.subscribe(move |_| second.set(second.get() + 1));

        bus.emit(DataEvent::Resolve);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));

        let counter = Rc::clone(&hits);
        let handle = bus.subscribe(move |_| counter.set(counter.get() + 1));

        bus.emit(DataEvent::Update);
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        bus.emit(DataEvent::Update);

        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_emit() {
        let bus = EventBus::new();
        let slot: Rc<Cell<Option<Subscription>>> = Rc::new(Cell::new(None));

        let bus_clone = bus.clone();
        let slot_clone = Rc::clone(&slot);
        let handle = bus.subscribe(move |_| {
            if let Some(own) = slot_clone.take() {
                bus_clone.unsubscribe(own);
            }
        });
        slot.set(Some(handle));

        bus.emit(DataEvent::NumRowsChange);
        assert_eq!(bus.listener_count(), 0);
    }
}
