//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete transport, configuration and observability for the stream
//! client. Tick consumers plug in through the application layer ports.

/// Market data feed WebSocket client.
pub mod feed;

/// Environment-driven configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;
