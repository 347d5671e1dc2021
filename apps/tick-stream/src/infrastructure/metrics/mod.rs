//! Prometheus Metrics Module
//!
//! Feed-level counters and gauges recorded through the `metrics` facade.
//! Without an installed recorder every call is a no-op, so the library can
//! be embedded without exporting anything.
//!
//! # Metrics
//!
//! - `tick_stream_frames_received_total{kind}`: inbound frames by kind
//! - `tick_stream_decode_errors_total`: binary frames dropped as malformed
//! - `tick_stream_ticks_dispatched_total`: ticks handed to the dispatcher
//! - `tick_stream_consumer_failures_total`: consumer errors and panics
//! - `tick_stream_reconnects_total`: reconnection attempts
//! - `tick_stream_server_errors_total`: protocol errors reported by the feed
//! - `tick_stream_heartbeats_sent_total`: ping frames written
//! - `tick_stream_connection_state`: current state as a number
//! - `tick_stream_subscribed_tokens`: tokens held by the registry

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Exporter
// =============================================================================

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot bind.
pub fn install_exporter(port: u16) -> Result<SocketAddr, BuildError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(addr)
}

fn register_metrics() {
    describe_counter!(
        "tick_stream_frames_received_total",
        "Inbound WebSocket frames by kind"
    );
    describe_counter!(
        "tick_stream_decode_errors_total",
        "Binary frames dropped because they failed to decode"
    );
    describe_counter!(
        "tick_stream_ticks_dispatched_total",
        "Decoded ticks delivered to the dispatcher"
    );
    describe_counter!(
        "tick_stream_consumer_failures_total",
        "Tick consumer errors and panics"
    );
    describe_counter!(
        "tick_stream_reconnects_total",
        "Feed reconnection attempts"
    );
    describe_counter!(
        "tick_stream_server_errors_total",
        "Protocol errors reported by the feed"
    );
    describe_counter!(
        "tick_stream_heartbeats_sent_total",
        "Heartbeat ping frames written"
    );
    describe_gauge!(
        "tick_stream_connection_state",
        "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=closed)"
    );
    describe_gauge!(
        "tick_stream_subscribed_tokens",
        "Instrument tokens in the subscription registry"
    );
}

// =============================================================================
// Recording
// =============================================================================

/// Inbound frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Binary tick frame.
    Binary,
    /// Text control frame.
    Text,
    /// Transport-level ping/pong.
    Control,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Text => "text",
            Self::Control => "control",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame(kind: FrameKind) {
    counter!("tick_stream_frames_received_total", "kind" => kind.as_str()).increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error() {
    counter!("tick_stream_decode_errors_total").increment(1);
}

/// Record a dispatched tick and the consumers that failed on it.
pub fn record_dispatch(failed: usize) {
    counter!("tick_stream_ticks_dispatched_total").increment(1);
    if failed > 0 {
        counter!("tick_stream_consumer_failures_total").increment(u64::try_from(failed).unwrap_or(u64::MAX));
    }
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("tick_stream_reconnects_total").increment(1);
}

/// Record a protocol error from the feed.
pub fn record_server_error(code: &str) {
    counter!("tick_stream_server_errors_total", "code" => code.to_string()).increment(1);
}

/// Record a heartbeat ping.
pub fn record_heartbeat() {
    counter!("tick_stream_heartbeats_sent_total").increment(1);
}

/// Publish the current connection state.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("tick_stream_connection_state").set(state.as_gauge());
}

/// Publish the registry size.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_tokens(count: usize) {
    gauge!("tick_stream_subscribed_tokens").set(count as f64);
}
