#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream - Resilient Market Data Client
//!
//! Keeps a long-lived subscription to a set of price feeds over an
//! unreliable transport, survives disconnects without losing subscription
//! intent, and keeps bounded per-symbol price history with rolling
//! min/max/average statistics.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `subscription`: Symbol validation and the subscription registry
//!   - `streaming`: Price samples, connection state, lifecycle events
//!   - `history`: Bounded rolling windows and stats
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport and session interfaces
//!   - `services`: Connection manager, reconnect policy, event dispatcher
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: WebSocket transport and JSON codec
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing and OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                  ┌───────────────────┐  data   ┌─────────────────┐
//! Price feed ────► │ ConnectionManager │ ──────► │ EventDispatcher │ ──► handlers
//!     ▲            └───────────────────┘         └─────────────────┘ ──► channel tap
//!     │ subscribe         │ snapshot                     │ record
//!     │ on (re)connect    ▼                              ▼
//!     └────────── SubscriptionRegistry          PriceHistoryStore ◄── stats/latest
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::{PriceHistoryStore, PriceStats, StatsAggregator};
pub use domain::streaming::{ConnectionState, EventKind, FeedError, PriceSample, StreamEvent};
pub use domain::subscription::{SubscriptionRegistry, Symbol, SymbolError};

// Ports
pub use application::ports::{
    ControlMessage, Transport, TransportError, TransportEvent, TransportSession,
};

// Services
pub use application::services::{
    ClientConfig, ClientError, ConnectionManager, EventDispatcher, ReconnectConfig,
    ReconnectPolicy,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamConfig};

// WebSocket adapter
pub use infrastructure::websocket::{CodecError, JsonCodec, WsTransport};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
