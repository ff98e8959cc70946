//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: opens a session with the upstream price feed
//! - `TransportSession`: one live duplex session (send, receive, close)
//!
//! The core never sees wire bytes. Adapters encode `ControlMessage`s and
//! decode inbound frames into `TransportEvent`s themselves.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::streaming::PriceSample;
use crate::domain::subscription::Symbol;

/// Transport-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish a session.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to write to the session.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Protocol or I/O error on a live session.
    #[error("session error: {0}")]
    Session(String),
}

/// Outbound subscription control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Start streaming these symbols.
    Subscribe(BTreeSet<Symbol>),
    /// Stop streaming these symbols.
    Unsubscribe(BTreeSet<Symbol>),
}

impl ControlMessage {
    /// Symbols carried by this message.
    #[must_use]
    pub const fn symbols(&self) -> &BTreeSet<Symbol> {
        match self {
            Self::Subscribe(symbols) | Self::Unsubscribe(symbols) => symbols,
        }
    }

    /// Operation name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

/// Something that happened on a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded price update.
    Price(PriceSample),
    /// An inbound frame that could not be decoded. Carries the reason.
    Malformed(String),
    /// A non-fatal session error. The session stays open.
    Error(TransportError),
    /// The session is gone. No further events follow.
    Closed,
}

/// Factory for transport sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new session.
    ///
    /// Credentials and handshakes are the adapter's concern; a returned
    /// session is ready for subscriptions.
    async fn connect(&self) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// A single live duplex session.
#[async_trait]
pub trait TransportSession: Send {
    /// Send a control message.
    async fn send(&mut self, message: &ControlMessage) -> Result<(), TransportError>;

    /// Wait for the next inbound event.
    ///
    /// Must be cancel-safe: dropping the future before completion must not
    /// lose an event. Once `Closed` is returned, every later call returns
    /// `Closed` as well.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the session. Idempotent.
    async fn close(&mut self);
}
