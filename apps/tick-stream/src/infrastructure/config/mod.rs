//! Configuration Module
//!
//! Environment-driven settings for the feed client and the credentials it
//! presents during the WebSocket handshake.

mod settings;

pub use settings::{ConfigError, Credentials, StreamSettings};
