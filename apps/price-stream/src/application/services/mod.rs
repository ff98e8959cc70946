//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ConnectionManager`: connection lifecycle, retries and resubscription
//! - `EventDispatcher`: ordered delivery of stream events to consumers
//! - `ReconnectPolicy`: capped exponential backoff

/// Connection lifecycle state machine.
pub mod connection;

/// Ordered event fan-out.
pub mod dispatcher;

/// Reconnect backoff policy.
pub mod reconnect;

pub use connection::{ClientConfig, ClientError, ConnectionManager};
pub use dispatcher::{EVENT_CHANNEL_CAPACITY, EventDispatcher, EventHandler};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
