//! Market Data Feed Adapter
//!
//! WebSocket client for the binary tick feed:
//!
//! - **codec**: binary tick frames (LTP, QUOTE, SNAP_QUOTE)
//! - **messages**: JSON control messages and inbound text frames
//! - **heartbeat**: `"ping"` keep-alive scheduler
//! - **reconnect**: exponential backoff policy
//! - **client**: connection lifecycle and subscription replay

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;

pub use client::{ConnectError, StreamClient, StreamEvent, SubscribeError};
pub use codec::{DecodeError, EncodeError, decode, encode};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatScheduler};
pub use messages::{Action, ControlMessage, InboundText, ServerErrorMessage};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
