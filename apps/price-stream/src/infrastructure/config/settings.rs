//! Price Stream Configuration Settings
//!
//! Configuration for the price stream binary, loaded from environment variables.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::ClientConfig;
use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use crate::domain::subscription::{Symbol, SymbolError, parse_symbols};

/// Feed endpoint.
pub const ENV_URL: &str = "PRICE_STREAM_URL";
/// Initial comma-separated symbols.
pub const ENV_SYMBOLS: &str = "PRICE_STREAM_SYMBOLS";
/// Backoff base delay in milliseconds.
pub const ENV_BASE_DELAY_MS: &str = "PRICE_STREAM_BASE_DELAY_MS";
/// Backoff cap in milliseconds.
pub const ENV_MAX_DELAY_MS: &str = "PRICE_STREAM_MAX_DELAY_MS";
/// Consecutive connect failures before giving up.
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "PRICE_STREAM_MAX_RECONNECT_ATTEMPTS";
/// Reconnect after a dropped session.
pub const ENV_AUTO_RECONNECT: &str = "PRICE_STREAM_AUTO_RECONNECT";
/// Backoff jitter fraction.
pub const ENV_RECONNECT_JITTER: &str = "PRICE_STREAM_RECONNECT_JITTER";
/// Window size per symbol.
pub const ENV_HISTORY_CAPACITY: &str = "PRICE_STREAM_HISTORY_CAPACITY";
/// Health and metrics HTTP port.
pub const ENV_HEALTH_PORT: &str = "PRICE_STREAM_HEALTH_PORT";

/// Reconnect settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Consecutive connect failures before giving up (0 = unlimited).
    pub max_attempts: u32,
    /// Reconnect after a live session drops.
    pub auto_reconnect: bool,
    /// ± jitter fraction in `[0, 1)`.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
            auto_reconnect: true,
            jitter_factor: 0.0,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete price stream configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// WebSocket endpoint of the price feed.
    pub url: String,
    /// Symbols subscribed at startup.
    pub symbols: BTreeSet<Symbol>,
    /// Reconnect settings.
    pub reconnect: ReconnectSettings,
    /// History window size per symbol.
    pub history_capacity: NonZeroUsize,
    /// Server port settings.
    pub server: ServerSettings,
}

impl StreamConfig {
    /// Create a configuration with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            symbols: BTreeSet::new(),
            reconnect: ReconnectSettings::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            server: ServerSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is missing or invalid, a symbol is
    /// malformed, or the settings are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(ENV_URL).ok_or_else(|| ConfigError::MissingEnvVar(ENV_URL.to_string()))?;
        let url = url.trim().to_string();

        if url.is_empty() {
            return Err(ConfigError::EmptyValue(ENV_URL.to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(url));
        }

        let symbols = lookup(ENV_SYMBOLS)
            .map(|raw| {
                parse_symbols(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                )
            })
            .transpose()?
            .unwrap_or_default();

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            base_delay: parse_env_duration_millis(&lookup, ENV_BASE_DELAY_MS, defaults.base_delay),
            max_delay: parse_env_duration_millis(&lookup, ENV_MAX_DELAY_MS, defaults.max_delay),
            max_attempts: parse_env(&lookup, ENV_MAX_RECONNECT_ATTEMPTS, defaults.max_attempts),
            auto_reconnect: parse_env_bool(&lookup, ENV_AUTO_RECONNECT, defaults.auto_reconnect),
            jitter_factor: parse_env(&lookup, ENV_RECONNECT_JITTER, defaults.jitter_factor),
        };

        let capacity = parse_env(&lookup, ENV_HISTORY_CAPACITY, DEFAULT_HISTORY_CAPACITY.get());
        let history_capacity =
            NonZeroUsize::new(capacity).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_HISTORY_CAPACITY.to_string(),
                reason: "must be at least 1".to_string(),
            })?;

        let server = ServerSettings {
            health_port: parse_env(&lookup, ENV_HEALTH_PORT, ServerSettings::default().health_port),
        };

        let config = Self {
            url,
            symbols,
            reconnect,
            history_capacity,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect.base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: ENV_BASE_DELAY_MS.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.reconnect.max_delay < self.reconnect.base_delay {
            return Err(ConfigError::InvalidValue {
                key: ENV_MAX_DELAY_MS.to_string(),
                reason: format!(
                    "{}ms is below the base delay of {}ms",
                    self.reconnect.max_delay.as_millis(),
                    self.reconnect.base_delay.as_millis()
                ),
            });
        }

        if !(0.0..1.0).contains(&self.reconnect.jitter_factor) {
            return Err(ConfigError::InvalidValue {
                key: ENV_RECONNECT_JITTER.to_string(),
                reason: format!("{} is outside [0, 1)", self.reconnect.jitter_factor),
            });
        }

        Ok(())
    }

    /// Whether the health server should run.
    #[must_use]
    pub const fn health_enabled(&self) -> bool {
        self.server.health_port != 0
    }
}

impl From<&StreamConfig> for ClientConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            base_delay: config.reconnect.base_delay,
            max_delay: config.reconnect.max_delay,
            max_reconnect_attempts: config.reconnect.max_attempts,
            auto_reconnect: config.reconnect.auto_reconnect,
            history_capacity: config.history_capacity,
            jitter_factor: config.reconnect.jitter_factor,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Endpoint is not a WebSocket URL.
    #[error("expected a ws:// or wss:// URL, got {0}")]
    InvalidUrl(String),

    /// An initial symbol is malformed.
    #[error("invalid symbol in PRICE_STREAM_SYMBOLS: {0}")]
    InvalidSymbol(#[from] SymbolError),

    /// A value parsed but is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn parse_env_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    const URL: &str = "wss://prices.example.com/stream";

    fn load(pairs: &[(&str, &str)]) -> Result<StreamConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StreamConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_url() {
        let config = load(&[(ENV_URL, URL)]).unwrap();

        assert_eq!(config, StreamConfig::new(URL));
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.reconnect.auto_reconnect);
        assert_eq!(config.history_capacity.get(), 100);
        assert_eq!(config.server.health_port, 8082);
        assert!(config.health_enabled());
    }

    #[test]
    fn missing_url_is_an_error() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    fn empty_url_is_an_error(url: &str) {
        assert!(matches!(
            load(&[(ENV_URL, url)]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn non_websocket_url_is_an_error() {
        assert!(matches!(
            load(&[(ENV_URL, "https://prices.example.com")]),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn symbols_are_split_and_trimmed() {
        let config = load(&[(ENV_URL, URL), (ENV_SYMBOLS, " SOL/USD, BTC/USD,,SOL/USD ")]).unwrap();

        let names: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["BTC/USD", "SOL/USD"]);
    }

    #[test]
    fn malformed_symbol_is_an_error() {
        assert!(matches!(
            load(&[(ENV_URL, URL), (ENV_SYMBOLS, "SOL USD")]),
            Err(ConfigError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = load(&[
            (ENV_URL, URL),
            (ENV_BASE_DELAY_MS, "soon"),
            (ENV_MAX_RECONNECT_ATTEMPTS, "-1"),
            (ENV_AUTO_RECONNECT, "maybe"),
            (ENV_HEALTH_PORT, "99999"),
        ])
        .unwrap();

        assert_eq!(config.reconnect, ReconnectSettings::default());
        assert_eq!(config.server.health_port, 8082);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            (ENV_URL, URL),
            (ENV_BASE_DELAY_MS, "250"),
            (ENV_MAX_DELAY_MS, "4000"),
            (ENV_MAX_RECONNECT_ATTEMPTS, "0"),
            (ENV_AUTO_RECONNECT, "false"),
            (ENV_RECONNECT_JITTER, "0.2"),
            (ENV_HISTORY_CAPACITY, "10"),
            (ENV_HEALTH_PORT, "0"),
        ])
        .unwrap();

        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(4000));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert!(!config.reconnect.auto_reconnect);
        assert!((config.reconnect.jitter_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.history_capacity.get(), 10);
        assert!(!config.health_enabled());
    }

    #[test_case(ENV_HISTORY_CAPACITY, "0" ; "zero capacity")]
    #[test_case(ENV_BASE_DELAY_MS, "0" ; "zero base delay")]
    #[test_case(ENV_MAX_DELAY_MS, "10" ; "max below base")]
    #[test_case(ENV_RECONNECT_JITTER, "1.5" ; "jitter too large")]
    #[test_case(ENV_RECONNECT_JITTER, "-0.1" ; "negative jitter")]
    fn semantic_violations_are_errors(key: &str, value: &str) {
        match load(&[(ENV_URL, URL), (key, value)]) {
            Err(ConfigError::InvalidValue { key: reported, .. }) => assert_eq!(reported, key),
            other => panic!("expected InvalidValue for {key}, got {other:?}"),
        }
    }

    #[test]
    fn converts_to_client_config() {
        let mut config = StreamConfig::new(URL);
        config.reconnect.max_attempts = 3;
        config.reconnect.auto_reconnect = false;

        let client = ClientConfig::from(&config);

        assert_eq!(client.max_reconnect_attempts, 3);
        assert!(!client.auto_reconnect);
        assert_eq!(client.base_delay, config.reconnect.base_delay);
        assert_eq!(client.history_capacity, config.history_capacity);
    }
}
