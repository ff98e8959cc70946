//! Scripted in-memory price feed shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, timeout};

use price_stream::{
    ConnectionState, ControlMessage, PriceSample, StreamEvent, Symbol, Transport, TransportError,
    TransportEvent, TransportSession,
};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct FeedState {
    /// Connect attempts that should fail, consumed front to back.
    failures: Mutex<VecDeque<String>>,
    /// Time of every connect attempt.
    attempts: Mutex<Vec<Instant>>,
    /// Event pushers for each accepted session, oldest first.
    sessions: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

/// Fake feed: the test keeps one clone, the client owns another.
#[derive(Clone)]
pub struct FakeFeed {
    state: Arc<FeedState>,
    sent: Arc<watch::Sender<Vec<ControlMessage>>>,
    opened: Arc<watch::Sender<usize>>,
    closed: Arc<watch::Sender<usize>>,
}

impl Default for FakeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFeed {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FeedState::default()),
            sent: Arc::new(watch::channel(Vec::new()).0),
            opened: Arc::new(watch::channel(0).0),
            closed: Arc::new(watch::channel(0).0),
        }
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next(&self, count: usize) {
        let mut failures = self.state.failures.lock();
        for i in 0..count {
            failures.push_back(format!("connection refused ({i})"));
        }
    }

    /// Number of connect attempts so far.
    pub fn attempts(&self) -> usize {
        self.state.attempts.lock().len()
    }

    /// Gaps between consecutive connect attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        let attempts = self.state.attempts.lock();
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Every control message sent, across all sessions.
    pub fn sent(&self) -> Vec<ControlMessage> {
        self.sent.borrow().clone()
    }

    /// Deliver an event on the most recent session.
    pub fn push(&self, event: TransportEvent) {
        if let Some(session) = self.state.sessions.lock().last() {
            let _ = session.send(event);
        }
    }

    /// Deliver a price update on the most recent session.
    pub fn push_price(&self, symbol: &str, price: f64, timestamp_ms: i64) {
        self.push(TransportEvent::Price(PriceSample::new(
            Symbol::new(symbol).unwrap(),
            price,
            timestamp_ms,
        )));
    }

    /// Drop the most recent session from the server side.
    pub fn drop_session(&self) {
        self.push(TransportEvent::Closed);
    }

    /// Number of sessions closed by the client.
    pub fn closed_sessions(&self) -> usize {
        *self.closed.borrow()
    }

    /// Wait until at least `count` sessions have been opened.
    pub async fn wait_for_sessions(&self, count: usize) {
        let mut rx = self.opened.subscribe();
        timeout(WAIT, rx.wait_for(|n| *n >= count))
            .await
            .expect("timed out waiting for sessions")
            .unwrap();
    }

    /// Wait until at least `count` control messages have been sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<ControlMessage> {
        let mut rx = self.sent.subscribe();
        let sent = timeout(WAIT, rx.wait_for(|sent| sent.len() >= count))
            .await
            .expect("timed out waiting for control messages")
            .unwrap()
            .clone();
        sent
    }
}

#[async_trait]
impl Transport for FakeFeed {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError> {
        self.state.attempts.lock().push(Instant::now());

        if let Some(reason) = self.state.failures.lock().pop_front() {
            return Err(TransportError::ConnectFailed(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.sessions.lock().push(tx);
        self.opened.send_modify(|n| *n += 1);

        Ok(Box::new(FakeSession {
            events: rx,
            feed: self.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    feed: FakeFeed,
    closed: bool,
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn send(&mut self, message: &ControlMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::SendFailed("session closed".to_string()));
        }
        self.feed.sent.send_modify(|sent| sent.push(message.clone()));
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Closed;
        }

        match self.events.recv().await {
            Some(TransportEvent::Closed) | None => {
                self.closed = true;
                TransportEvent::Closed
            }
            Some(event) => event,
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.events.close();
        self.feed.closed.send_modify(|n| *n += 1);
    }
}

/// Build a symbol set.
pub fn symbols(names: &[&str]) -> BTreeSet<Symbol> {
    names.iter().map(|n| Symbol::new(*n).unwrap()).collect()
}

/// Receive the next event, failing the test on timeout.
pub async fn next_event(rx: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Wait for a specific connection state.
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .unwrap();
}
