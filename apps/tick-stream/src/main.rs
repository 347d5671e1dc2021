//! Tick Stream Binary
//!
//! Connects to the feed, subscribes to the configured instruments and logs
//! every decoded tick until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TICK_STREAM_AUTH_TOKEN`: session JWT from the broker login flow
//! - `TICK_STREAM_API_KEY`: application API key
//! - `TICK_STREAM_CLIENT_CODE`: broker client code
//! - `TICK_STREAM_FEED_TOKEN`: market-data feed token
//!
//! ## Optional
//! - `TICK_STREAM_TOKENS`: instruments as `segment:token,token;segment:token`
//!   (e.g. `nse_cm:3045,1594;nse_fo:35003`)
//! - `TICK_STREAM_MODE`: ltp | quote | snap_quote (default: ltp)
//! - `TICK_STREAM_URL`: feed endpoint
//! - `TICK_STREAM_HANDSHAKE_TIMEOUT_SECS`: initial connect bound (default: 60)
//! - `TICK_STREAM_RECONNECT_BASE_DELAY_MS`: first backoff delay (default: 2000)
//! - `TICK_STREAM_RECONNECT_MAX_DELAY_SECS`: backoff cap (default: 60)
//! - `TICK_STREAM_MAX_RECONNECT_ATTEMPTS`: retries before closing (default: 10)
//! - `TICK_STREAM_EVENT_CAPACITY`: lifecycle event buffer (default: 256)
//! - `TICK_STREAM_METRICS_PORT`: Prometheus port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (default: `tick_stream=info`)

use anyhow::Context;
use tick_stream::infrastructure::{metrics, telemetry};
use tick_stream::{
    Credentials, ExchangeSegment, StreamClient, StreamEvent, StreamSettings, SubscriptionMode,
    Tick, TokenList,
};
use tokio::signal;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tick stream");

    let settings = StreamSettings::from_env();
    log_settings(&settings);

    if settings.metrics_port != 0 {
        let addr = metrics::install_exporter(settings.metrics_port)
            .context("failed to install Prometheus exporter")?;
        tracing::info!(addr = %addr, "Metrics exporter listening");
    }

    let credentials = Credentials::from_env()?;

    let mode: SubscriptionMode = std::env::var("TICK_STREAM_MODE")
        .unwrap_or_else(|_| "ltp".to_string())
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let token_lists = std::env::var("TICK_STREAM_TOKENS")
        .map(|raw| parse_token_lists(&raw))
        .unwrap_or_else(|_| Ok(Vec::new()))?;

    let client = StreamClient::new(settings);
    client.on_tick(log_tick);

    let events = client.events();
    tokio::spawn(log_events(events));

    if !token_lists.is_empty() {
        client.subscribe(mode, &token_lists)?;
    }

    client.connect(credentials).await?;
    tracing::info!("Tick stream ready");

    await_shutdown(&client).await;

    client.disconnect().await;
    tracing::info!("Tick stream stopped");
    Ok(())
}

#[allow(clippy::unnecessary_wraps)]
fn log_tick(tick: &Tick) -> anyhow::Result<()> {
    tracing::info!(
        segment = %tick.exchange_segment,
        token = %tick.token,
        seq = tick.sequence_number,
        ltp = %tick.last_traded_price,
        mode = %tick.mode,
        "Tick"
    );
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<StreamEvent>) {
    loop {
        match events.recv().await {
            Ok(StreamEvent::ServerError { code, message }) => {
                tracing::warn!(code = %code, message = %message, "Feed error");
            }
            Ok(StreamEvent::RetriesExhausted { attempts }) => {
                tracing::error!(attempts, "Feed unreachable, giving up");
            }
            Ok(StreamEvent::Closed) => break,
            Ok(event) => tracing::debug!(?event, "Stream event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Stream event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Parse `segment:token,token;segment:token`.
fn parse_token_lists(raw: &str) -> anyhow::Result<Vec<TokenList>> {
    raw.split(';')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| {
            let (segment, tokens) = group
                .split_once(':')
                .with_context(|| format!("expected segment:tokens, got '{group}'"))?;
            let segment: ExchangeSegment = segment.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty());
            Ok(TokenList::new(segment, tokens))
        })
        .collect()
}

/// Log the parsed configuration.
fn log_settings(settings: &StreamSettings) {
    tracing::info!(
        url = %settings.url,
        handshake_timeout_secs = settings.handshake_timeout.as_secs(),
        max_reconnect_attempts = settings.max_reconnect_attempts,
        metrics_port = settings.metrics_port,
        "Configuration loaded"
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

/// Wait for SIGINT, SIGTERM or the client closing on its own.
async fn await_shutdown(client: &StreamClient) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let mut state = client.state_changes();
    let closed = async {
        let _ = state
            .wait_for(|s| *s == tick_stream::ConnectionState::Closed)
            .await;
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        () = closed => tracing::warn!("Stream closed, shutting down"),
    }
}
