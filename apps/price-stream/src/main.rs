//! Price Stream Binary
//!
//! Streams prices for the configured symbols and logs each update with the
//! rolling window statistics.
//!
//! # Usage
//!
//! ```bash
//! PRICE_STREAM_URL=wss://prices.example.com/stream \
//! PRICE_STREAM_SYMBOLS=BTC/USD,SOL/USD \
//!     cargo run --bin price-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_STREAM_URL`: WebSocket endpoint of the price feed
//!
//! ## Optional
//! - `PRICE_STREAM_SYMBOLS`: Comma-separated symbols to subscribe at startup
//! - `PRICE_STREAM_BASE_DELAY_MS`: Reconnect base delay (default: 1000)
//! - `PRICE_STREAM_MAX_DELAY_MS`: Reconnect delay cap (default: 30000)
//! - `PRICE_STREAM_MAX_RECONNECT_ATTEMPTS`: Failures before giving up, 0 = never (default: 5)
//! - `PRICE_STREAM_AUTO_RECONNECT`: Reconnect after a dropped session (default: true)
//! - `PRICE_STREAM_RECONNECT_JITTER`: Backoff jitter fraction (default: 0.0)
//! - `PRICE_STREAM_HISTORY_CAPACITY`: Samples kept per symbol (default: 100)
//! - `PRICE_STREAM_HEALTH_PORT`: Health and metrics port, 0 disables (default: 8082)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_stream::infrastructure::health::{HealthServer, HealthServerState, StreamStatus};
use price_stream::infrastructure::metrics;
use price_stream::infrastructure::telemetry;
use price_stream::{
    ClientConfig, ConnectionManager, EventKind, FeedError, StreamConfig, StreamEvent, WsTransport,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type Client = ConnectionManager<WsTransport>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price stream");

    let _metrics_handle = init_metrics();

    let config = StreamConfig::from_env().context("failed to load configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let client: Arc<Client> = Arc::new(ConnectionManager::new(
        WsTransport::new(config.url.clone()),
        ClientConfig::from(&config),
    ));

    register_handlers(&client);

    // Mirror state transitions into metrics
    let mut state_rx = client.watch_state();
    let state_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        loop {
            let state = *state_rx.borrow_and_update();
            metrics::record_state(state);

            tokio::select! {
                () = state_shutdown.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    });

    if config.health_enabled() {
        let source: Arc<dyn StreamStatus> = client.clone();
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            source,
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    if config.symbols.is_empty() {
        tracing::warn!("No symbols configured, connecting without subscriptions");
    } else {
        client
            .subscribe(config.symbols.iter().cloned())
            .context("failed to subscribe configured symbols")?;
    }
    metrics::set_subscriptions(client.subscriptions().len());

    client
        .connect()
        .await
        .context("failed to start price stream")?;

    tracing::info!("Price stream ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, client.close())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Price stream did not close in time"
        );
    }

    tracing::info!("Price stream stopped");
    Ok(())
}

/// Wire logging and metrics into the client's event stream.
fn register_handlers(client: &Arc<Client>) {
    for kind in EventKind::all() {
        client.on(*kind, metrics::record_event);
    }

    let weak = Arc::downgrade(client);
    client.on(EventKind::Data, move |event| {
        let StreamEvent::Data(sample) = event else {
            return;
        };
        let Some(client) = weak.upgrade() else {
            return;
        };

        if let Some(stats) = client.stats(&sample.symbol) {
            tracing::info!(
                symbol = %sample.symbol,
                price = sample.price,
                count = stats.count,
                min = stats.min,
                max = stats.max,
                avg = stats.avg,
                "Price update"
            );
        }
    });

    client.on(EventKind::Connected, |_| {
        tracing::info!("Price feed connected");
    });

    client.on(EventKind::Disconnected, |_| {
        tracing::warn!("Price feed disconnected");
    });

    client.on(EventKind::Error, |event| match event {
        StreamEvent::Error(error @ FeedError::RetriesExhausted { .. }) => {
            tracing::error!(%error, "Price feed gave up, restart required");
        }
        StreamEvent::Error(error) => {
            tracing::warn!(%error, kind = error.label(), "Price feed error");
        }
        _ => {}
    });
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        url = %config.url,
        symbols = config.symbols.len(),
        history_capacity = config.history_capacity.get(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_delay_ms = config.reconnect.base_delay.as_millis(),
        max_delay_ms = config.reconnect.max_delay.as_millis(),
        max_attempts = config.reconnect.max_attempts,
        auto_reconnect = config.reconnect.auto_reconnect,
        jitter = config.reconnect.jitter_factor,
        "Reconnect policy"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
