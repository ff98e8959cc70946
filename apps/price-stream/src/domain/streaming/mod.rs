//! Market Data Streaming Types
//!
//! Core domain types for the price stream: samples, connection state and
//! the lifecycle events delivered to consumers. These types are
//! codec-agnostic and represent the canonical internal representation.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::subscription::Symbol;

// =============================================================================
// Price Sample
// =============================================================================

/// A single price observation for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Symbol the price belongs to.
    pub symbol: Symbol,
    /// Observed price.
    pub price: f64,
    /// Observation time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Publisher confidence interval, if the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PriceSample {
    /// Create a sample without a confidence value.
    #[must_use]
    pub const fn new(symbol: Symbol, price: f64, timestamp_ms: i64) -> Self {
        Self {
            symbol,
            price,
            timestamp_ms,
            confidence: None,
        }
    }

    /// Attach a confidence value.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Observation time as a UTC datetime.
    ///
    /// Returns `None` if the timestamp is out of chrono's range.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session and no pending reconnect.
    #[default]
    Disconnected,
    /// Transport connect in progress.
    Connecting,
    /// Session established and streaming.
    Connected,
    /// Waiting out a backoff delay before the next connect.
    Reconnecting,
    /// Retries exhausted; requires a manual reset.
    Failed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// Numeric code used for the state gauge.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Failed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Feed Errors
// =============================================================================

/// Normalized error delivered to consumers through `error` events.
///
/// Consumers never see raw transport errors; every failure is mapped onto
/// one of these variants first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Transient transport failure (reset, refused, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound message could not be decoded and was dropped.
    #[error("failed to decode inbound message: {0}")]
    Decode(String),

    /// A subscribe or unsubscribe message could not be sent.
    #[error("failed to send subscription update: {0}")]
    SubscriptionSend(String),

    /// Reconnect attempts exhausted; the manager is now `Failed`.
    #[error("reconnect attempts exhausted after {attempts} consecutive failures")]
    RetriesExhausted {
        /// Consecutive failures observed.
        attempts: u32,
    },
}

impl FeedError {
    /// Whether this error ends the connection lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::SubscriptionSend(_) => "subscription_send",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

// =============================================================================
// Stream Events
// =============================================================================

/// Event kinds consumers can register handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Session established.
    Connected,
    /// Price sample received.
    Data,
    /// Normalized error.
    Error,
    /// Session ended.
    Disconnected,
}

impl EventKind {
    /// Get all event kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Connected, Self::Data, Self::Error, Self::Disconnected]
    }
}

/// Lifecycle event emitted by a connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Session established and subscriptions replayed.
    Connected,
    /// Price sample received.
    Data(PriceSample),
    /// Something went wrong.
    Error(FeedError),
    /// Session ended.
    Disconnected,
}

impl StreamEvent {
    /// Get the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Data(_) => EventKind::Data,
            Self::Error(_) => EventKind::Error,
            Self::Disconnected => EventKind::Disconnected,
        }
    }
}
