//! Connection Manager
//!
//! Owns the transport session and drives the connection lifecycle:
//!
//! ```text
//! Disconnected --connect()--> Connecting
//! Connecting   --ready------> Connected      (replays every subscription)
//! Connecting   --error------> Reconnecting | Failed (failure budget spent)
//! Connected    --closed-----> Reconnecting | Disconnected (auto-reconnect off)
//! Reconnecting --backoff----> Connecting
//! Failed       --reset()----> Disconnected
//! ```
//!
//! A background driver task performs every transition except `connect()`,
//! `reset()` and `close()`. The subscription registry outlives sessions;
//! changes made while not `Connected` reach the feed on the next replay.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatcher::EventDispatcher;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{ControlMessage, Transport, TransportEvent, TransportSession};
use crate::domain::history::{
    DEFAULT_HISTORY_CAPACITY, PriceHistoryStore, PriceStats, StatsAggregator,
};
use crate::domain::streaming::{ConnectionState, EventKind, FeedError, PriceSample, StreamEvent};
use crate::domain::subscription::{SubscriptionRegistry, Symbol, SymbolError, parse_symbols};

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned synchronously by the consumer API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// A symbol failed validation.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(#[from] SymbolError),

    /// The symbol list was empty.
    #[error("no symbols given")]
    NoSymbols,

    /// The operation is not valid in the current state.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: ConnectionState,
        /// State the manager was in.
        actual: ConnectionState,
    },

    /// `connect()` was polled outside a Tokio runtime.
    #[error("no Tokio runtime available")]
    NoRuntime,
}

// =============================================================================
// Configuration
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backoff delay for the first reconnect attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Consecutive connect failures before `Failed` (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Reconnect after a live session drops.
    pub auto_reconnect: bool,
    /// History window size per symbol.
    pub history_capacity: NonZeroUsize,
    /// Optional ± jitter fraction applied to backoff delays.
    pub jitter_factor: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            auto_reconnect: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            jitter_factor: 0.0,
        }
    }
}

impl ClientConfig {
    /// Backoff settings for the reconnect policy.
    #[must_use]
    pub const fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig::new(
            self.base_delay,
            self.max_delay,
            self.jitter_factor,
            self.max_reconnect_attempts,
        )
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// State shared between the manager handle and its driver task.
struct Inner<T> {
    transport: T,
    config: ClientConfig,
    registry: SubscriptionRegistry,
    history: Arc<PriceHistoryStore>,
    stats: StatsAggregator,
    dispatcher: EventDispatcher,
    state: watch::Sender<ConnectionState>,
    /// Control channel into the live session. `Some` only while connected.
    link: Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>,
}

struct DriverSlot {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Resilient price feed client.
///
/// # Example
///
/// ```rust,no_run
/// use price_stream::application::ports::Transport;
/// use price_stream::application::services::{ClientConfig, ConnectionManager};
/// use price_stream::domain::streaming::{EventKind, StreamEvent};
///
/// async fn run<T: Transport>(transport: T) -> Result<(), Box<dyn std::error::Error>> {
///     let client = ConnectionManager::new(transport, ClientConfig::default());
///
///     client.on(EventKind::Data, |event| {
///         if let StreamEvent::Data(sample) = event {
///             println!("{} = {}", sample.symbol, sample.price);
///         }
///     });
///
///     client.subscribe(["SOL/USD"])?;
///     client.connect().await?;
///     // ...
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct ConnectionManager<T: Transport> {
    inner: Arc<Inner<T>>,
    driver: tokio::sync::Mutex<DriverSlot>,
}

impl<T: Transport> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("subscriptions", &self.inner.registry.len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let history = Arc::new(PriceHistoryStore::new(config.history_capacity));

        Self {
            inner: Arc::new(Inner {
                transport,
                registry: SubscriptionRegistry::new(),
                stats: StatsAggregator::new(Arc::clone(&history)),
                dispatcher: EventDispatcher::new(Arc::clone(&history)),
                history,
                state: watch::channel(ConnectionState::Disconnected).0,
                link: Mutex::new(None),
                config,
            }),
            driver: tokio::sync::Mutex::new(DriverSlot {
                cancel: CancellationToken::new(),
                handle: None,
            }),
        }
    }

    /// Get the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start connecting.
    ///
    /// Valid only from `Disconnected`. The first attempt and every retry run
    /// on a background task; observe progress through events or
    /// [`Self::watch_state`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if not `Disconnected`, or `NoRuntime` when
    /// called outside a Tokio runtime.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let mut slot = self.driver.lock().await;

        let current = self.state();
        if current != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState {
                expected: ConnectionState::Disconnected,
                actual: current,
            });
        }

        // A driver that stopped on its own may still be delivering its last
        // event
        if let Some(previous) = slot.handle.take() {
            if let Err(e) = previous.await {
                tracing::warn!(error = %e, "Previous connection task ended abnormally");
            }
        }

        let mut actual = ConnectionState::Disconnected;
        let started = self.inner.state.send_if_modified(|state| {
            actual = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ClientError::InvalidState {
                expected: ConnectionState::Disconnected,
                actual,
            });
        }

        let cancel = CancellationToken::new();
        slot.cancel = cancel.clone();
        self.inner.dispatcher.reopen();

        let driver = Driver {
            policy: ReconnectPolicy::new(self.inner.config.reconnect()),
            inner: Arc::clone(&self.inner),
            cancel,
        };
        slot.handle = Some(runtime.spawn(driver.run()));

        Ok(())
    }

    /// Leave the `Failed` state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if not `Failed`.
    pub fn reset(&self) -> Result<(), ClientError> {
        let mut actual = ConnectionState::Failed;
        let reset = self.inner.state.send_if_modified(|state| {
            actual = *state;
            if *state == ConnectionState::Failed {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });

        if reset {
            tracing::info!("Connection reset after failure");
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                expected: ConnectionState::Failed,
                actual,
            })
        }
    }

    /// Stop everything and move to `Disconnected`.
    ///
    /// Cancels a pending backoff or connect attempt, closes the live session
    /// and waits for the background task to finish. No event is delivered
    /// after this returns. Safe from any state.
    pub async fn close(&self) {
        let mut slot = self.driver.lock().await;

        slot.cancel.cancel();
        self.inner.dispatcher.close();
        *self.inner.link.lock() = None;

        let previous = self.inner.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!(from = %previous, "Price stream closed");
        }

        if let Some(handle) = slot.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Connection task ended abnormally");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Add symbols to the subscription set.
    ///
    /// Sends a subscribe request for the newly added symbols when connected.
    /// Returns the symbols that were not already subscribed.
    ///
    /// # Errors
    ///
    /// Rejects an empty list or any invalid symbol without changing anything.
    pub fn subscribe<I, S>(&self, symbols: I) -> Result<BTreeSet<Symbol>, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols = validate(symbols)?;

        let mut link = self.inner.link.lock();
        let added = self.inner.registry.add(symbols);

        if !added.is_empty() {
            forward(&mut link, ControlMessage::Subscribe(added.clone()));
        }

        Ok(added)
    }

    /// Remove symbols from the subscription set.
    ///
    /// Sends an unsubscribe request for the removed symbols when connected.
    /// Returns the symbols that were actually subscribed.
    ///
    /// # Errors
    ///
    /// Rejects an empty list or any invalid symbol without changing anything.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> Result<BTreeSet<Symbol>, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols = validate(symbols)?;

        let mut link = self.inner.link.lock();
        let removed = self.inner.registry.remove(symbols);

        if !removed.is_empty() {
            forward(&mut link, ControlMessage::Unsubscribe(removed.clone()));
        }

        Ok(removed)
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> BTreeSet<Symbol> {
        self.inner.registry.snapshot()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler);
    }

    /// Receive every delivered event through a channel.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.dispatcher.subscribe_channel()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe connection state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Most recent sample for a symbol.
    #[must_use]
    pub fn latest(&self, symbol: &Symbol) -> Option<PriceSample> {
        self.inner.history.latest(symbol)
    }

    /// Min, max and average over a symbol's current window.
    #[must_use]
    pub fn stats(&self, symbol: &Symbol) -> Option<PriceStats> {
        self.inner.stats.stats(symbol)
    }

    /// A symbol's current window, oldest first.
    #[must_use]
    pub fn window(&self, symbol: &Symbol) -> Vec<PriceSample> {
        self.inner.history.window(symbol)
    }

    /// Every symbol that has received at least one sample.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.inner.history.symbols()
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.driver.get_mut().cancel.cancel();
    }
}

/// Hand a registry change to the live session, if any.
///
/// A session that is gone leaves the change to the next full replay.
fn forward(link: &mut Option<mpsc::UnboundedSender<ControlMessage>>, message: ControlMessage) {
    let Some(tx) = link.as_ref() else {
        tracing::debug!(
            action = message.action(),
            symbols = ?message.symbols(),
            "Subscription change deferred until connected"
        );
        return;
    };

    if let Err(mpsc::error::SendError(message)) = tx.send(message) {
        tracing::warn!(
            action = message.action(),
            symbols = ?message.symbols(),
            "Session link closed, subscription change deferred to next connect"
        );
        *link = None;
    }
}

fn validate<I, S>(symbols: I) -> Result<BTreeSet<Symbol>, ClientError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let symbols = parse_symbols(symbols)?;
    if symbols.is_empty() {
        return Err(ClientError::NoSymbols);
    }
    Ok(symbols)
}

// =============================================================================
// Driver
// =============================================================================

/// Background task for one `connect()` .. `close()` cycle.
struct Driver<T> {
    inner: Arc<Inner<T>>,
    cancel: CancellationToken,
    policy: ReconnectPolicy,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            tracing::info!(attempt = self.policy.attempt() + 1, "Connecting to price feed");

            let connected = tokio::select! {
                () = self.cancel.cancelled() => return,
                result = self.inner.transport.connect() => result,
            };

            match connected {
                Ok(session) => {
                    self.policy.reset();
                    self.stream(session).await;

                    if self.cancel.is_cancelled() {
                        return;
                    }

                    if !self.inner.config.auto_reconnect {
                        tracing::info!("Price feed closed, auto-reconnect disabled");
                        self.set_state(ConnectionState::Disconnected);
                        self.emit(StreamEvent::Disconnected);
                        return;
                    }

                    let delay = self.policy.record_session_lost();
                    tracing::info!(delay_ms = delay.as_millis(), "Price feed closed, reconnecting");
                    self.set_state(ConnectionState::Reconnecting);
                    self.emit(StreamEvent::Disconnected);

                    if !self.backoff(delay).await {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Price feed connect failed");
                    self.emit(StreamEvent::Error(FeedError::Transport(e.to_string())));

                    if let Some(delay) = self.policy.record_failure() {
                        tracing::info!(
                            attempt = self.policy.attempt(),
                            failures = self.policy.failures(),
                            delay_ms = delay.as_millis(),
                            "Reconnecting to price feed"
                        );
                        self.set_state(ConnectionState::Reconnecting);

                        if !self.backoff(delay).await {
                            return;
                        }
                    } else {
                        let attempts = self.policy.failures();
                        tracing::error!(attempts, "Reconnect attempts exhausted");
                        self.set_state(ConnectionState::Failed);
                        self.emit(StreamEvent::Error(FeedError::RetriesExhausted { attempts }));
                        return;
                    }
                }
            }
        }
    }

    /// Run one live session until it closes or the driver is cancelled.
    async fn stream(&self, mut session: Box<dyn TransportSession>) {
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();

        // Snapshot and link install are atomic with respect to subscribe()
        let snapshot = {
            let mut link = self.inner.link.lock();
            if self.cancel.is_cancelled() {
                None
            } else {
                *link = Some(link_tx);
                self.set_state(ConnectionState::Connected);
                Some(self.inner.registry.snapshot())
            }
        };

        if let Some(snapshot) = snapshot {
            tracing::info!(subscriptions = snapshot.len(), "Connected to price feed");
            self.emit(StreamEvent::Connected);

            if !snapshot.is_empty() {
                self.send(session.as_mut(), ControlMessage::Subscribe(snapshot))
                    .await;
            }

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break,
                    Some(message) = link_rx.recv() => {
                        self.send(session.as_mut(), message).await;
                    }
                    event = session.next_event() => {
                        if !self.handle_event(event) {
                            break;
                        }
                    }
                }
            }

            *self.inner.link.lock() = None;
        }

        session.close().await;
    }

    /// Returns `false` once the session is closed.
    fn handle_event(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Price(sample) => {
                tracing::trace!(symbol = %sample.symbol, price = sample.price, "Price update");
                self.emit(StreamEvent::Data(sample));
                true
            }
            TransportEvent::Malformed(reason) => {
                tracing::warn!(%reason, "Dropping undecodable message");
                self.emit(StreamEvent::Error(FeedError::Decode(reason)));
                true
            }
            TransportEvent::Error(e) => {
                tracing::warn!(error = %e, "Price feed session error");
                self.emit(StreamEvent::Error(FeedError::Transport(e.to_string())));
                true
            }
            TransportEvent::Closed => false,
        }
    }

    async fn send(&self, session: &mut dyn TransportSession, message: ControlMessage) {
        tracing::debug!(
            action = message.action(),
            symbols = ?message.symbols(),
            "Sending subscription update"
        );

        let result = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = session.send(&message) => result,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, action = message.action(), "Subscription update failed");
            self.emit(StreamEvent::Error(FeedError::SubscriptionSend(e.to_string())));
        }
    }

    /// Cancellable backoff wait. Returns `false` if cancelled.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn emit(&self, event: StreamEvent) {
        self.inner.dispatcher.dispatch(event);
    }

    /// Writes are dropped once cancelled so `close()` has the last word.
    fn set_state(&self, next: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if self.cancel.is_cancelled() || *state == next {
                return false;
            }
            tracing::debug!(from = %state, to = %next, "Connection state changed");
            *state = next;
            true
        });
    }
}
