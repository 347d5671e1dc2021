//! Connection Lifecycle State
//!
//! State machine vocabulary for a stream connection. Transitions are
//! driven by the stream client; this module only names the states and
//! the rules that are independent of transport.

use std::fmt;

/// Lifecycle state of a stream connection.
///
/// `Closed` is terminal for a session: it is entered on explicit
/// disconnect or once reconnect attempts are exhausted, and only a new
/// `connect()` leaves it. Transient failures move to `Reconnecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open, heartbeat running.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Stopped by the owner or by exhausted retries.
    Closed,
}

impl ConnectionState {
    /// Check if a supervisor is active for this state.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    /// Check if the socket is open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Numeric encoding used for the connection state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Closed => 4.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
