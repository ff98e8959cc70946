//! Subscription Registry
//!
//! Domain types for tracking which symbols the consumer wants streamed.
//!
//! # Design
//!
//! The registry is the single source of truth for subscription intent. It
//! is mutated only by explicit consumer calls and outlives any individual
//! transport session, so a reconnect can replay it verbatim.
//!
//! Both mutators report the *effective* delta (symbols actually added or
//! removed) so callers can send only what changed upstream.

use std::collections::BTreeSet;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// Maximum accepted symbol length in bytes.
pub const MAX_SYMBOL_LEN: usize = 64;

/// A tradable pair identifier such as `SOL/USD`.
///
/// Symbols are opaque and case-sensitive. Construction rejects empty
/// strings, whitespace, control characters and oversized identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a validated symbol.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError` if the value is empty or malformed.
    pub fn new(value: impl Into<String>) -> Result<Self, SymbolError> {
        let value = value.into();

        if value.is_empty() {
            return Err(SymbolError::Empty);
        }
        if value.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong {
                len: value.len(),
                max: MAX_SYMBOL_LEN,
            });
        }
        if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(SymbolError::InvalidCharacter { symbol: value, c });
        }

        Ok(Self(value))
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = SymbolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Symbol validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol is an empty string.
    #[error("symbol cannot be empty")]
    Empty,

    /// Symbol exceeds the maximum length.
    #[error("symbol is {len} bytes, maximum is {max}")]
    TooLong {
        /// Actual length.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Symbol contains whitespace or a control character.
    #[error("symbol {symbol:?} contains invalid character {c:?}")]
    InvalidCharacter {
        /// The rejected symbol.
        symbol: String,
        /// The offending character.
        c: char,
    },
}

/// Validate a batch of raw symbols.
///
/// All symbols are checked before any is returned, so a single malformed
/// entry rejects the whole batch.
///
/// # Errors
///
/// Returns the first `SymbolError` encountered.
pub fn parse_symbols<I, S>(raw: I) -> Result<BTreeSet<Symbol>, SymbolError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    raw.into_iter().map(Symbol::new).collect()
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe set of symbols the consumer wants streamed.
///
/// # Example
///
/// ```rust
/// use price_stream::domain::subscription::{SubscriptionRegistry, parse_symbols};
///
/// let registry = SubscriptionRegistry::new();
///
/// let added = registry.add(parse_symbols(["SOL/USD", "BTC/USD"]).unwrap());
/// assert_eq!(added.len(), 2);
///
/// // Adding again is a no-op
/// let added = registry.add(parse_symbols(["SOL/USD"]).unwrap());
/// assert!(added.is_empty());
///
/// let removed = registry.remove(parse_symbols(["BTC/USD", "ETH/USD"]).unwrap());
/// assert_eq!(removed.len(), 1);
/// assert_eq!(registry.snapshot().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    symbols: RwLock<BTreeSet<Symbol>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge symbols into the registry.
    ///
    /// Returns the symbols that were not already present.
    pub fn add(&self, symbols: impl IntoIterator<Item = Symbol>) -> BTreeSet<Symbol> {
        let mut current = self.symbols.write();
        symbols
            .into_iter()
            .filter(|symbol| current.insert(symbol.clone()))
            .collect()
    }

    /// Remove symbols from the registry.
    ///
    /// Returns the symbols that were actually members.
    pub fn remove(&self, symbols: impl IntoIterator<Item = Symbol>) -> BTreeSet<Symbol> {
        let mut current = self.symbols.write();
        symbols
            .into_iter()
            .filter(|symbol| current.remove(symbol))
            .collect()
    }

    /// Get the full current set.
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<Symbol> {
        self.symbols.read().clone()
    }

    /// Check whether a symbol is registered.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.read().contains(symbol)
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
