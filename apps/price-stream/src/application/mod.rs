//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (price feed transport).
pub mod ports;

/// Application services: connection lifecycle, reconnect policy, dispatch.
pub mod services;
