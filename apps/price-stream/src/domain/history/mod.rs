//! Price History
//!
//! Bounded rolling windows of price samples, one per symbol.
//!
//! # Design
//!
//! Every symbol gets a FIFO window with the same fixed capacity. A window is
//! created lazily on its first sample and is never dropped; samples leave
//! only through eviction. Each `record` runs under a single write lock, so
//! readers always observe a window either fully before or fully after an
//! append/evict pair.

pub mod stats;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::num::NonZeroUsize;

use parking_lot::RwLock;

use super::streaming::PriceSample;
use super::subscription::Symbol;

pub use stats::{PriceStats, StatsAggregator};

/// Default number of samples kept per symbol.
pub const DEFAULT_HISTORY_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// Per-symbol bounded price history.
///
/// # Example
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use price_stream::domain::history::PriceHistoryStore;
/// use price_stream::domain::streaming::PriceSample;
/// use price_stream::domain::subscription::Symbol;
///
/// let store = PriceHistoryStore::new(NonZeroUsize::new(2).unwrap());
/// let x = Symbol::new("X").unwrap();
///
/// for (i, price) in [1.0, 2.0, 3.0].into_iter().enumerate() {
///     store.record(PriceSample::new(x.clone(), price, i as i64));
/// }
///
/// let prices: Vec<f64> = store.window(&x).iter().map(|s| s.price).collect();
/// assert_eq!(prices, vec![2.0, 3.0]);
/// ```
#[derive(Debug)]
pub struct PriceHistoryStore {
    capacity: NonZeroUsize,
    windows: RwLock<HashMap<Symbol, VecDeque<PriceSample>>>,
}

impl Default for PriceHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl PriceHistoryStore {
    /// Create a store with the given per-symbol capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Per-symbol capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Append a sample, evicting the oldest one if the window is full.
    ///
    /// Returns the evicted sample, if any.
    pub fn record(&self, sample: PriceSample) -> Option<PriceSample> {
        let capacity = self.capacity.get();
        let mut windows = self.windows.write();

        let window = windows
            .entry(sample.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        let evicted = if window.len() == capacity {
            window.pop_front()
        } else {
            None
        };
        window.push_back(sample);

        evicted
    }

    /// Most recent sample for a symbol.
    #[must_use]
    pub fn latest(&self, symbol: &Symbol) -> Option<PriceSample> {
        self.windows
            .read()
            .get(symbol)
            .and_then(|window| window.back().cloned())
    }

    /// Current window contents, oldest first.
    ///
    /// Unknown symbols yield an empty vector.
    #[must_use]
    pub fn window(&self, symbol: &Symbol) -> Vec<PriceSample> {
        self.windows
            .read()
            .get(symbol)
            .map(|window| window.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Run a closure against a symbol's window without cloning it.
    ///
    /// The closure runs under the read lock and must not call back into
    /// the store's mutating methods.
    pub fn with_window<R>(
        &self,
        symbol: &Symbol,
        f: impl FnOnce(&VecDeque<PriceSample>) -> R,
    ) -> Option<R> {
        self.windows.read().get(symbol).map(f)
    }

    /// All symbols that have received at least one sample.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.windows.read().keys().cloned().collect()
    }

    /// Number of samples currently held for a symbol.
    #[must_use]
    pub fn len(&self, symbol: &Symbol) -> usize {
        self.windows.read().get(symbol).map_or(0, VecDeque::len)
    }
}

// =============================================================================
// Tests
// =============================================================================
