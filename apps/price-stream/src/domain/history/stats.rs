//! Rolling window statistics.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use super::PriceHistoryStore;
use crate::domain::streaming::PriceSample;
use crate::domain::subscription::Symbol;

/// Summary statistics over a symbol's current window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceStats {
    /// Number of samples in the window.
    pub count: usize,
    /// Lowest price.
    pub min: f64,
    /// Highest price.
    pub max: f64,
    /// Arithmetic mean of prices.
    pub avg: f64,
}

impl PriceStats {
    /// Compute stats over a sequence of samples.
    ///
    /// Returns `None` for an empty sequence.
    #[must_use]
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a PriceSample>) -> Option<Self> {
        let mut count = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for sample in samples {
            count += 1;
            min = min.min(sample.price);
            max = max.max(sample.price);
            sum += sample.price;
        }

        if count == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let avg = sum / count as f64;

        Some(Self {
            count,
            min,
            max,
            avg,
        })
    }
}

/// Computes stats on demand from a shared history store.
///
/// Holds no state of its own; every call reads the current window.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    store: Arc<PriceHistoryStore>,
}

impl StatsAggregator {
    /// Create an aggregator over a store.
    #[must_use]
    pub const fn new(store: Arc<PriceHistoryStore>) -> Self {
        Self { store }
    }

    /// Stats for a symbol's current window, or `None` if it has no samples.
    #[must_use]
    pub fn stats(&self, symbol: &Symbol) -> Option<PriceStats> {
        self.store
            .with_window(symbol, |window: &VecDeque<PriceSample>| {
                PriceStats::from_samples(window)
            })
            .flatten()
    }
}
