//! Feed Control Messages
//!
//! JSON text frames exchanged with the feed alongside binary ticks.
//!
//! # Outbound
//!
//! ```json
//! {
//!   "correlationID": "a1b2c3d4e5",
//!   "action": 1,
//!   "params": {"mode": 1, "tokenList": [{"exchangeType": 1, "tokens": ["3045"]}]}
//! }
//! ```
//!
//! `action` is 1 to subscribe and 0 to unsubscribe. The keep-alive is the
//! bare text `"ping"`.
//!
//! # Inbound
//!
//! - `"pong"`: heartbeat acknowledgement
//! - `{"errorCode": "...", "errorMessage": "..."}`: protocol error
//! - binary frames: ticks, handled by the codec

use serde::{Deserialize, Serialize};

use crate::domain::subscription::TokenList;
use crate::domain::tick::SubscriptionMode;

use super::heartbeat::PONG_FRAME;

/// Length of the correlation id attached to control messages.
pub const CORRELATION_ID_LEN: usize = 10;

// =============================================================================
// Outbound
// =============================================================================

/// Subscribe or unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    /// Stop streaming the listed tokens.
    Unsubscribe,
    /// Start streaming the listed tokens.
    Subscribe,
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        match action {
            Action::Unsubscribe => 0,
            Action::Subscribe => 1,
        }
    }
}

impl TryFrom<u8> for Action {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unsubscribe),
            1 => Ok(Self::Subscribe),
            other => Err(format!("unknown action {other}")),
        }
    }
}

/// Parameters of a control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlParams {
    /// Subscription mode.
    pub mode: SubscriptionMode,
    /// Tokens grouped by exchange segment.
    #[serde(rename = "tokenList")]
    pub token_list: Vec<TokenList>,
}

/// Subscribe/unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Client-chosen id echoed in server responses.
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
    /// Subscribe or unsubscribe.
    pub action: Action,
    /// Mode and tokens.
    pub params: ControlParams,
}

impl ControlMessage {
    /// Build a subscribe request with a fresh correlation id.
    #[must_use]
    pub fn subscribe(mode: SubscriptionMode, token_list: Vec<TokenList>) -> Self {
        Self::new(Action::Subscribe, mode, token_list)
    }

    /// Build an unsubscribe request with a fresh correlation id.
    #[must_use]
    pub fn unsubscribe(mode: SubscriptionMode, token_list: Vec<TokenList>) -> Self {
        Self::new(Action::Unsubscribe, mode, token_list)
    }

    fn new(action: Action, mode: SubscriptionMode, token_list: Vec<TokenList>) -> Self {
        Self {
            correlation_id: correlation_id(),
            action,
            params: ControlParams { mode, token_list },
        }
    }

    /// Number of tokens carried.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.params.token_list.iter().map(|l| l.tokens.len()).sum()
    }

    /// Serialize to the JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Generate a 10-character alphanumeric correlation id.
#[must_use]
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CORRELATION_ID_LEN)
        .collect()
}

// =============================================================================
// Inbound
// =============================================================================

/// Protocol error reported by the server.
///
/// # Wire Format (JSON)
/// ```json
/// {"correlationID": "a1b2c3d4e5", "errorCode": "E1002", "errorMessage": "Invalid Request"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerErrorMessage {
    /// Correlation id of the offending request, if echoed.
    #[serde(rename = "correlationID", default)]
    pub correlation_id: Option<String>,
    /// Provider error code.
    #[serde(rename = "errorCode", deserialize_with = "string_or_number")]
    pub code: String,
    /// Human-readable description.
    #[serde(rename = "errorMessage", default)]
    pub message: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Classified inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundText {
    /// Heartbeat acknowledgement.
    Pong,
    /// Protocol-level error.
    ServerError(ServerErrorMessage),
    /// Anything else; logged and ignored.
    Other(String),
}

impl InboundText {
    /// Classify a text frame.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case(PONG_FRAME) {
            return Self::Pong;
        }

        if trimmed.starts_with('{')
            && let Ok(error) = serde_json::from_str::<ServerErrorMessage>(trimmed)
        {
            return Self::ServerError(error);
        }

        Self::Other(text.to_string())
    }
}
