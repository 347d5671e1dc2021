//! Tick Dispatcher
//!
//! Synchronous fan-out of decoded ticks to registered consumers.
//!
//! # Guarantees
//!
//! - Consumers are invoked in registration order with the same tick
//! - Delivery happens on the caller's task with no internal queue, so
//!   frame arrival order is preserved end to end
//! - A consumer that errors or panics is isolated: the failure is logged
//!   and the remaining consumers still receive the tick

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::application::ports::TickConsumer;
use crate::domain::tick::Tick;

/// Handle returned when registering a consumer.
pub type ConsumerId = u64;

/// Outcome of dispatching one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Consumers that handled the tick.
    pub delivered: usize,
    /// Consumers that returned an error or panicked.
    pub failed: usize,
}

/// Ordered registry of tick consumers.
///
/// # Example
///
/// ```rust
/// use tick_stream::application::dispatch::TickDispatcher;
///
/// let dispatcher = TickDispatcher::new();
/// let id = dispatcher.register(|tick: &tick_stream::Tick| {
///     println!("{} @ {}", tick.token, tick.last_traded_price);
///     Ok(())
/// });
/// assert_eq!(dispatcher.consumer_count(), 1);
///
/// assert!(dispatcher.unregister(id));
/// assert_eq!(dispatcher.consumer_count(), 0);
/// ```
#[derive(Default)]
pub struct TickDispatcher {
    consumers: RwLock<Vec<(ConsumerId, Arc<dyn TickConsumer>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher")
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

impl TickDispatcher {
    /// Create a dispatcher with no consumers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure; it receives ticks after all earlier consumers.
    pub fn register<F>(&self, consumer: F) -> ConsumerId
    where
        F: Fn(&Tick) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_shared(Arc::new(consumer))
    }

    /// Register a [`TickConsumer`] implementation.
    pub fn register_consumer<C>(&self, consumer: C) -> ConsumerId
    where
        C: TickConsumer + 'static,
    {
        self.register_shared(Arc::new(consumer))
    }

    /// Register a consumer that is shared with other owners.
    pub fn register_shared(&self, consumer: Arc<dyn TickConsumer>) -> ConsumerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.consumers.write().push((id, consumer));
        tracing::debug!(consumer_id = id, "Tick consumer registered");
        id
    }

    /// Unregister a consumer. Returns `false` if the id was unknown.
    pub fn unregister(&self, id: ConsumerId) -> bool {
        let mut consumers = self.consumers.write();
        let before = consumers.len();
        consumers.retain(|(consumer_id, _)| *consumer_id != id);
        let removed = consumers.len() != before;
        drop(consumers);

        if removed {
            tracing::debug!(consumer_id = id, "Tick consumer unregistered");
        }
        removed
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.read().len()
    }

    /// Deliver a tick to every consumer in registration order.
    ///
    /// The consumer list is snapshotted first, so consumers may register
    /// or unregister from inside their callback.
    pub fn dispatch(&self, tick: &Tick) -> DispatchOutcome {
        let consumers: Vec<_> = self
            .consumers
            .read()
            .iter()
            .map(|(id, consumer)| (*id, Arc::clone(consumer)))
            .collect();

        let mut outcome = DispatchOutcome::default();

        for (id, consumer) in consumers {
            match catch_unwind(AssertUnwindSafe(|| consumer.on_tick(tick))) {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    tracing::error!(
                        consumer_id = id,
                        token = %tick.token,
                        error = %e,
                        "Tick consumer failed"
                    );
                }
                Err(panic) => {
                    outcome.failed += 1;
                    tracing::error!(
                        consumer_id = id,
                        token = %tick.token,
                        panic = panic_message(panic.as_ref()),
                        "Tick consumer panicked"
                    );
                }
            }
        }

        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
