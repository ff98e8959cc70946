//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Transport;
use crate::application::services::ConnectionManager;
use crate::domain::streaming::ConnectionState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Status Source
// =============================================================================

/// Read-only view of a stream client for health reporting.
pub trait StreamStatus: Send + Sync {
    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;
    /// Number of subscribed symbols.
    fn subscription_count(&self) -> usize;
    /// Number of symbols with recorded history.
    fn tracked_symbol_count(&self) -> usize;
}

impl<T: Transport> StreamStatus for ConnectionManager<T> {
    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    fn subscription_count(&self) -> usize {
        self.subscriptions().len()
    }

    fn tracked_symbol_count(&self) -> usize {
        self.symbols().len()
    }
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connection state of the price feed.
    pub connection: ConnectionState,
    /// Subscribed symbol count.
    pub subscriptions: usize,
    /// Symbols with recorded history.
    pub tracked_symbols: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming.
    Healthy,
    /// Connecting or recovering from a dropped session.
    Degraded,
    /// Stopped or out of retries.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::Failed => Self::Unhealthy,
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    source: Arc<dyn StreamStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, source: Arc<dyn StreamStatus>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            source,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.source.connection_state() == ConnectionState::Connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.source.connection_state();

    HealthResponse {
        status: HealthStatus::from(connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection,
        subscriptions: state.source.subscription_count(),
        tracked_symbols: state.source.tracked_symbol_count(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    struct FixedStatus(ConnectionState);

    impl StreamStatus for FixedStatus {
        fn connection_state(&self) -> ConnectionState {
            self.0
        }

        fn subscription_count(&self) -> usize {
            2
        }

        fn tracked_symbol_count(&self) -> usize {
            1
        }
    }

    fn state(connection: ConnectionState) -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::new(FixedStatus(connection)),
        ))
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test_case(ConnectionState::Connected, HealthStatus::Healthy ; "connected")]
    #[test_case(ConnectionState::Connecting, HealthStatus::Degraded ; "connecting")]
    #[test_case(ConnectionState::Reconnecting, HealthStatus::Degraded ; "reconnecting")]
    #[test_case(ConnectionState::Disconnected, HealthStatus::Unhealthy ; "disconnected")]
    #[test_case(ConnectionState::Failed, HealthStatus::Unhealthy ; "failed")]
    fn status_from_connection_state(connection: ConnectionState, expected: HealthStatus) {
        assert_eq!(HealthStatus::from(connection), expected);
    }

    #[test]
    fn health_response_reports_counts() {
        let response = build_health_response(&state(ConnectionState::Connected));

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.subscriptions, 2);
        assert_eq!(response.tracked_symbols, 1);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["connection"], "connected");
    }

    #[tokio::test]
    async fn readiness_follows_connection() {
        let ready = readiness_handler(State(state(ConnectionState::Connected)))
            .await
            .into_response();
        assert_eq!(ready.status(), StatusCode::OK);

        let not_ready = readiness_handler(State(state(ConnectionState::Reconnecting)))
            .await
            .into_response();
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_is_unavailable_when_failed() {
        let response = health_handler(State(state(ConnectionState::Failed)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
