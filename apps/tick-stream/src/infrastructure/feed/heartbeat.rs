//! Heartbeat Scheduler
//!
//! Keeps the feed connection alive by requesting a `"ping"` text frame at a
//! fixed interval. The scheduler never touches the socket: it emits
//! [`HeartbeatEvent::SendPing`] into the session's channel and the session
//! performs the write, so all socket writes share one path.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Interval mandated by the feed protocol.
pub const PROTOCOL_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Text frame sent as a keep-alive.
pub const PING_FRAME: &str = "ping";

/// Text frame the server answers with.
pub const PONG_FRAME: &str = "pong";

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: PROTOCOL_HEARTBEAT_INTERVAL,
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with a custom interval (tests only in practice).
    #[must_use]
    pub const fn new(ping_interval: Duration) -> Self {
        Self { ping_interval }
    }
}

/// Events emitted by the heartbeat scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Request to send a ping frame.
    SendPing,
}

/// Periodic ping requester bound to one connection.
///
/// `start` spawns the timer task; `stop` cancels and aborts it. Both are
/// idempotent, and once `stop` returns no further events are emitted.
///
/// # Example
///
/// ```rust,no_run
/// use tick_stream::infrastructure::feed::heartbeat::{HeartbeatConfig, HeartbeatScheduler};
/// use tokio::sync::mpsc;
///
/// async fn example() {
///     let (tx, mut rx) = mpsc::channel(4);
///     let mut heartbeat = HeartbeatScheduler::new(HeartbeatConfig::default());
///     heartbeat.start(tx);
///
///     if let Some(event) = rx.recv().await {
///         // write "ping" to the socket
///         let _ = event;
///     }
///
///     heartbeat.stop();
/// }
/// ```
#[derive(Debug)]
pub struct HeartbeatScheduler {
    config: HeartbeatConfig,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl HeartbeatScheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub const fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Start emitting ping requests into `event_tx`.
    ///
    /// The first ping is due one full interval after start. Restarting a
    /// running scheduler stops the previous timer first.
    pub fn start(&mut self, event_tx: mpsc::Sender<HeartbeatEvent>) {
        self.stop();

        let cancel = CancellationToken::new();
        let period = self.config.ping_interval;
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => {
                        tracing::debug!("Heartbeat scheduler cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
                            tracing::debug!("Session channel closed, stopping heartbeat");
                            break;
                        }
                    }
                }
            }
        });

        tracing::debug!(interval_secs = period.as_secs(), "Heartbeat scheduler started");
        self.running = Some((cancel, handle));
    }

    /// Stop the timer. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some((cancel, handle)) = self.running.take() {
            cancel.cancel();
            handle.abort();
            tracing::debug!("Heartbeat scheduler stopped");
        }
    }

    /// Whether a timer task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
