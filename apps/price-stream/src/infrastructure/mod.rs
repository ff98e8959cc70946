//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus process-level concerns.

/// WebSocket transport adapter and JSON codec.
pub mod websocket;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
