//! Stream Client Settings
//!
//! Settings are read from environment variables with defaults. The heartbeat
//! interval is fixed by the feed protocol and is deliberately absent here.

use std::time::Duration;

/// Default feed endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://smartapisocket.angelone.in/smart-stream";

const MIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Credentials
// =============================================================================

/// Session credentials issued by the broker login flow.
///
/// All four values are sent as handshake headers and never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    auth_token: String,
    api_key: String,
    client_code: String,
    feed_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(
        auth_token: String,
        api_key: String,
        client_code: String,
        feed_token: String,
    ) -> Self {
        Self {
            auth_token,
            api_key,
            client_code,
            feed_token,
        }
    }

    /// Load credentials from `TICK_STREAM_AUTH_TOKEN`, `TICK_STREAM_API_KEY`,
    /// `TICK_STREAM_CLIENT_CODE` and `TICK_STREAM_FEED_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if any key is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
            if value.is_empty() {
                return Err(ConfigError::EmptyValue(key.to_string()));
            }
            Ok(value)
        };

        Ok(Self {
            auth_token: required("TICK_STREAM_AUTH_TOKEN")?,
            api_key: required("TICK_STREAM_API_KEY")?,
            client_code: required("TICK_STREAM_CLIENT_CODE")?,
            feed_token: required("TICK_STREAM_FEED_TOKEN")?,
        })
    }

    /// Bearer token from the login flow.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Application API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Broker client code.
    #[must_use]
    pub fn client_code(&self) -> &str {
        &self.client_code
    }

    /// Feed token for the market-data socket.
    #[must_use]
    pub fn feed_token(&self) -> &str {
        &self.feed_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("client_code", &"[REDACTED]")
            .field("feed_token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Stream Settings
// =============================================================================

/// Connection and reconnection settings for the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Feed WebSocket endpoint.
    pub url: String,
    /// Bound on the initial `connect()` wait (at least 1 s).
    pub handshake_timeout: Duration,
    /// Delay before the first reconnection attempt.
    pub reconnect_base_delay: Duration,
    /// Cap on any single reconnection delay.
    pub reconnect_max_delay: Duration,
    /// Reconnection attempts before the client closes (at least 1).
    pub max_reconnect_attempts: u32,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
    /// Prometheus exporter port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            handshake_timeout: Duration::from_secs(60),
            reconnect_base_delay: Duration::from_secs(2),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 10,
            event_capacity: 256,
            metrics_port: 9090,
        }
    }
}

impl StreamSettings {
    /// Create settings from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            url: lookup("TICK_STREAM_URL")
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.url),
            handshake_timeout: parse_duration_secs(
                &lookup,
                "TICK_STREAM_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout,
            )
            .max(MIN_HANDSHAKE_TIMEOUT),
            reconnect_base_delay: parse_duration_millis(
                &lookup,
                "TICK_STREAM_RECONNECT_BASE_DELAY_MS",
                defaults.reconnect_base_delay,
            ),
            reconnect_max_delay: parse_duration_secs(
                &lookup,
                "TICK_STREAM_RECONNECT_MAX_DELAY_SECS",
                defaults.reconnect_max_delay,
            ),
            max_reconnect_attempts: parse(
                &lookup,
                "TICK_STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )
            .max(1),
            event_capacity: parse(&lookup, "TICK_STREAM_EVENT_CAPACITY", defaults.event_capacity)
                .max(1),
            metrics_port: parse(&lookup, "TICK_STREAM_METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Point the client at a different endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
