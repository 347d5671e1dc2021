#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Tick Stream - Real-Time Market Data Client
//!
//! Maintains a persistent WebSocket connection to a market-data feed,
//! manages instrument subscriptions, decodes the binary tick protocol and
//! fans ticks out to registered consumers. Disconnects are recovered with
//! exponential backoff and the subscription is replayed on every new
//! connection.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no transport dependencies
//!   - `tick`: Decoded ticks, subscription modes, exchange segments
//!   - `subscription`: Thread-safe subscription registry
//!   - `connection`: Connection lifecycle states
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `TickConsumer` interface
//!   - `dispatch`: Ordered, failure-isolated tick fan-out
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Binary codec, control messages, heartbeat, backoff, client
//!   - `config`: Environment-driven settings and credentials
//!   - `metrics`: Prometheus counters and gauges
//!   - `telemetry`: Tracing and OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                 subscribe/unsubscribe
//! caller ───────────────────────────────► SubscriptionRegistry
//!                                              │ snapshot on (re)connect
//!                                              ▼
//! Feed WS ──► session loop ──► codec::decode ──► TickDispatcher ──► consumers
//!               ▲      ▲
//!   heartbeat ──┘      └── supervisor (backoff, reconnect)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::subscription::{Subscription, SubscriptionRegistry, TokenList};
pub use domain::tick::{ExchangeSegment, SubscriptionMode, Tick};

// Application
pub use application::dispatch::{ConsumerId, DispatchOutcome, TickDispatcher};
pub use application::ports::TickConsumer;

// Feed client
pub use infrastructure::feed::{
    ConnectError, DecodeError, EncodeError, StreamClient, StreamEvent, SubscribeError, decode,
    encode,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, StreamSettings};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
