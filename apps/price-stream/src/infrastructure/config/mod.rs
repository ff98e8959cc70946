//! Configuration Module
//!
//! Environment-driven configuration for the price stream binary.

mod settings;

pub use settings::{
    ConfigError, ENV_AUTO_RECONNECT, ENV_BASE_DELAY_MS, ENV_HEALTH_PORT, ENV_HISTORY_CAPACITY,
    ENV_MAX_DELAY_MS, ENV_MAX_RECONNECT_ATTEMPTS, ENV_RECONNECT_JITTER, ENV_SYMBOLS, ENV_URL,
    ReconnectSettings, ServerSettings, StreamConfig,
};
