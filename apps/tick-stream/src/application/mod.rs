//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the tick fan-out service and the port interface
//! that consumers implement to receive decoded ticks.

/// Port interfaces for tick consumers.
pub mod ports;

/// Tick fan-out to registered consumers.
pub mod dispatch;
