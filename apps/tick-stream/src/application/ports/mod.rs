//! Port Interfaces
//!
//! Defines the interfaces (ports) through which the streaming core talks
//! to the rest of the application, following the Hexagonal Architecture
//! pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TickConsumer`: receives every decoded tick, synchronously, on the
//!   connection's I/O task

use crate::domain::tick::Tick;

/// A receiver of decoded ticks.
///
/// Consumers run inline on the I/O task, so they should hand heavy work
/// off to their own tasks. Returning an error (or panicking) is isolated
/// to this consumer: it is logged and delivery continues.
///
/// Any `Fn(&Tick) -> anyhow::Result<()>` closure is a consumer.
#[cfg_attr(test, mockall::automock)]
pub trait TickConsumer: Send + Sync {
    /// Handle one tick.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatcher and otherwise ignored.
    fn on_tick(&self, tick: &Tick) -> anyhow::Result<()>;
}

impl<F> TickConsumer for F
where
    F: Fn(&Tick) -> anyhow::Result<()> + Send + Sync,
{
    fn on_tick(&self, tick: &Tick) -> anyhow::Result<()> {
        self(tick)
    }
}
