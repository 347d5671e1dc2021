//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the market data and subscription types with no
//! transport dependencies. All types here are pure Rust with
//! serialization support.

/// Connection lifecycle states.
pub mod connection;

/// Subscription registry and snapshots.
pub mod subscription;

/// Decoded market data ticks.
pub mod tick;
