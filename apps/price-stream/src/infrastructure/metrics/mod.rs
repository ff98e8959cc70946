//! Prometheus Metrics Module
//!
//! Exposes client metrics via Prometheus format for monitoring.
//!
//! # Metrics
//!
//! - `price_stream_messages_received_total`: price samples delivered
//! - `price_stream_errors_total`: normalized feed errors by kind
//! - `price_stream_reconnects_total`: transitions into `Reconnecting`
//! - `price_stream_connection_state`: current state code (0-4)
//! - `price_stream_subscriptions`: size of the subscription set
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{ConnectionState, StreamEvent};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_stream_messages_received_total",
        "Total price samples delivered to consumers"
    );
    describe_counter!(
        "price_stream_errors_total",
        "Total feed errors by kind"
    );
    describe_counter!(
        "price_stream_reconnects_total",
        "Total reconnect cycles entered"
    );
    describe_gauge!(
        "price_stream_connection_state",
        "Connection state (0=disconnected 1=connecting 2=connected 3=reconnecting 4=failed)"
    );
    describe_gauge!(
        "price_stream_subscriptions",
        "Number of subscribed symbols"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a delivered stream event.
pub fn record_event(event: &StreamEvent) {
    match event {
        StreamEvent::Data(_) => {
            counter!("price_stream_messages_received_total").increment(1);
        }
        StreamEvent::Error(error) => {
            counter!("price_stream_errors_total", "kind" => error.label()).increment(1);
        }
        StreamEvent::Connected | StreamEvent::Disconnected => {}
    }
}

/// Record a connection state transition.
pub fn record_state(state: ConnectionState) {
    gauge!("price_stream_connection_state").set(f64::from(state.code()));

    if state == ConnectionState::Reconnecting {
        counter!("price_stream_reconnects_total").increment(1);
    }
}

/// Update the subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("price_stream_subscriptions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
