//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for price streaming: symbols
//! and subscription intent, samples and events, and the bounded price
//! history with its statistics. Nothing here performs I/O.

/// Price samples, connection state and lifecycle events.
pub mod streaming;

/// Symbol validation and the subscription registry.
pub mod subscription;

/// Bounded per-symbol price history and rolling stats.
pub mod history;
