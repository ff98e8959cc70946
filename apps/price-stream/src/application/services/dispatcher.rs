//! Event Dispatcher
//!
//! Delivers lifecycle events to consumer handlers and records price
//! samples into the history store.
//!
//! # Ordering
//!
//! Dispatch is serialized by a gate lock: one event is fully delivered
//! (history write, every handler, channel tap) before the next starts.
//! Handlers of one kind run in registration order. Nothing is buffered or
//! reordered. A handler that panics is logged and skipped; the remaining
//! handlers and the channel tap still see the event.
//!
//! # Shutdown
//!
//! `close()` takes the same gate, so it waits for an in-flight dispatch to
//! finish and every dispatch after it is dropped. The gate is reentrant,
//! which lets a handler close the dispatcher without deadlocking.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use tokio::sync::broadcast;

use crate::domain::history::PriceHistoryStore;
use crate::domain::streaming::{EventKind, StreamEvent};

/// Capacity of the broadcast tap.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Consumer callback for stream events.
pub type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Ordered, synchronous event fan-out.
pub struct EventDispatcher {
    history: Arc<PriceHistoryStore>,
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
    channel: broadcast::Sender<StreamEvent>,
    gate: ReentrantMutex<()>,
    open: AtomicBool,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventDispatcher")
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .field("channel_receivers", &self.channel.receiver_count())
            .field("open", &self.open.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher that records samples into `history`.
    #[must_use]
    pub fn new(history: Arc<PriceHistoryStore>) -> Self {
        Self {
            history,
            handlers: RwLock::new(HashMap::new()),
            channel: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            gate: ReentrantMutex::new(()),
            open: AtomicBool::new(true),
        }
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of handlers registered for a kind.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Get a channel receiver that sees every delivered event in order.
    ///
    /// A receiver that falls more than `EVENT_CHANNEL_CAPACITY` events
    /// behind observes `RecvError::Lagged`.
    #[must_use]
    pub fn subscribe_channel(&self) -> broadcast::Receiver<StreamEvent> {
        self.channel.subscribe()
    }

    /// Deliver an event.
    ///
    /// Data events are written to the history store before any handler
    /// runs. Returns `false` if the dispatcher is closed and the event was
    /// dropped.
    pub fn dispatch(&self, event: StreamEvent) -> bool {
        let _gate = self.gate.lock();

        if !self.open.load(Ordering::Acquire) {
            tracing::trace!(kind = ?event.kind(), "Dispatcher closed, dropping event");
            return false;
        }

        if let StreamEvent::Data(sample) = &event {
            self.history.record(sample.clone());
        }

        // Clone the list so handlers may register more handlers
        let handlers = self
            .handlers
            .read()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                tracing::error!(
                    kind = ?event.kind(),
                    handler = index,
                    panic = panic_message(payload.as_ref()),
                    "Event handler panicked"
                );
            }
        }

        let _ = self.channel.send(event);
        true
    }

    /// Stop delivering events.
    ///
    /// Blocks until an in-flight dispatch on another thread completes.
    pub fn close(&self) {
        let _gate = self.gate.lock();
        self.open.store(false, Ordering::Release);
    }

    /// Resume delivering events.
    pub fn reopen(&self) {
        let _gate = self.gate.lock();
        self.open.store(true, Ordering::Release);
    }

    /// Whether events are being delivered.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
