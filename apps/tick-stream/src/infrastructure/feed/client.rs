//! Feed Stream Client
//!
//! Owns the WebSocket lifecycle: handshake, subscription replay, heartbeat,
//! frame decoding and reconnection with exponential backoff.
//!
//! # Tasks
//!
//! - `connect()` spawns one supervisor task that loops over sessions and
//!   backoff waits until cancelled or out of retries.
//! - Each session owns the socket. All writes (control messages, pings,
//!   close) go through its `select!` loop.
//! - The heartbeat scheduler runs beside the session and requests pings
//!   over a channel.
//!
//! Callers never touch the socket. `subscribe`/`unsubscribe` update the
//! registry and, while a session is live, queue a control message for it.
//!
//! # States
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...
//!                     |                           |
//!                     +------ retries spent ------+--> Closed
//! any state -- disconnect() --> Closed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;

use super::codec;
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatScheduler, PING_FRAME};
use super::messages::{ControlMessage, InboundText};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::dispatch::{ConsumerId, TickDispatcher};
use crate::application::ports::TickConsumer;
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::{SubscriptionRegistry, TokenList};
use crate::domain::tick::{SubscriptionMode, Tick};
use crate::infrastructure::config::{Credentials, StreamSettings};
use crate::infrastructure::metrics::{self, FrameKind};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by [`StreamClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// A supervisor is already running for this client.
    #[error("client is already connected or connecting")]
    AlreadyRunning,

    /// URL or credentials cannot form a valid handshake request.
    #[error("invalid handshake request: {0}")]
    InvalidRequest(String),

    /// No connection was established within the handshake timeout.
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    /// Every reconnection attempt failed.
    #[error("connection failed after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Reconnection attempts made.
        attempts: u32,
    },

    /// `disconnect()` was called before the connection came up.
    #[error("client was closed while connecting")]
    Closed,
}

/// Errors returned by subscription calls.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// No tokens, or an empty token string.
    #[error("invalid subscription arguments: {0}")]
    InvalidArguments(String),

    /// Control message could not be serialized.
    #[error("failed to serialize control message: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// Events
// =============================================================================

/// Lifecycle events broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Handshake succeeded and the subscription was replayed.
    Connected,
    /// An established or pending connection was lost.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// Waiting before the next connection attempt.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The feed reported a protocol error. The connection stays open.
    ServerError {
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },
    /// Reconnection gave up; the client is closed.
    RetriesExhausted {
        /// Reconnection attempts made.
        attempts: u32,
    },
    /// The client reached the terminal state.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Requested,
    RetriesExhausted { attempts: u32 },
}

enum SessionEnd {
    Cancelled,
    Failed(String),
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Client
// =============================================================================

/// Streaming client for the binary tick feed.
///
/// Cheap to clone; clones share one connection.
///
/// # Example
///
/// ```rust,no_run
/// use tick_stream::{Credentials, StreamClient, StreamSettings, SubscriptionMode, TokenList};
/// use tick_stream::domain::tick::ExchangeSegment;
///
/// async fn example(credentials: Credentials) -> anyhow::Result<()> {
///     let client = StreamClient::new(StreamSettings::from_env());
///     client.on_tick(|tick: &tick_stream::Tick| {
///         println!("{} {}", tick.token, tick.last_traded_price);
///         Ok(())
///     });
///
///     client.connect(credentials).await?;
///     client.subscribe(
///         SubscriptionMode::Ltp,
///         &[TokenList::new(ExchangeSegment::NSE_CM, ["3045", "1594"])],
///     )?;
///
///     tokio::signal::ctrl_c().await?;
///     client.disconnect().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

struct Inner {
    settings: StreamSettings,
    heartbeat: HeartbeatConfig,
    reconnect: ReconnectConfig,
    registry: SubscriptionRegistry,
    dispatcher: TickDispatcher,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<StreamEvent>,
    /// Command sender of the live session; `Some` only while connected.
    link: Mutex<Option<mpsc::UnboundedSender<String>>>,
    supervisor: Mutex<Option<Supervisor>>,
    close_reason: Mutex<Option<CloseReason>>,
    auto_reconnect: AtomicBool,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.inner.settings.url)
            .field("state", &self.state())
            .field("tokens", &self.inner.registry.token_count())
            .field("consumers", &self.inner.dispatcher.consumer_count())
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Create a client with the protocol heartbeat and backoff from `settings`.
    #[must_use]
    pub fn new(settings: StreamSettings) -> Self {
        let reconnect = ReconnectConfig::from_settings(&settings);
        Self::with_config(settings, HeartbeatConfig::default(), reconnect)
    }

    /// Create a client with explicit heartbeat and reconnect configuration.
    #[must_use]
    pub fn with_config(
        settings: StreamSettings,
        heartbeat: HeartbeatConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                settings,
                heartbeat,
                reconnect,
                registry: SubscriptionRegistry::new(),
                dispatcher: TickDispatcher::new(),
                state_tx,
                events,
                link: Mutex::new(None),
                supervisor: Mutex::new(None),
                close_reason: Mutex::new(None),
                auto_reconnect: AtomicBool::new(false),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch receiver that observes every state change.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Subscription registry shared with the reconnect path.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Dispatcher that receives every decoded tick.
    #[must_use]
    pub fn dispatcher(&self) -> &TickDispatcher {
        &self.inner.dispatcher
    }

    // -------------------------------------------------------------------------
    // Consumers
    // -------------------------------------------------------------------------

    /// Register a tick callback.
    pub fn on_tick<F>(&self, consumer: F) -> ConsumerId
    where
        F: Fn(&Tick) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.register(consumer)
    }

    /// Register a [`TickConsumer`] implementation.
    pub fn add_consumer<C>(&self, consumer: C) -> ConsumerId
    where
        C: TickConsumer + 'static,
    {
        self.inner.dispatcher.register_consumer(consumer)
    }

    /// Unregister a tick callback. Returns `false` if the id was unknown.
    pub fn remove_tick(&self, id: ConsumerId) -> bool {
        self.inner.dispatcher.unregister(id)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect and wait until the feed is streaming.
    ///
    /// Handshake failures are retried with backoff in the background; this
    /// call returns once connected, once retries run out, or after the
    /// handshake timeout, in which case the client is closed.
    ///
    /// # Errors
    ///
    /// See [`ConnectError`].
    pub async fn connect(&self, credentials: Credentials) -> Result<(), ConnectError> {
        handshake_request(&self.inner.settings.url, &credentials)?;

        let mut state_rx = self.inner.state_tx.subscribe();
        {
            let mut slot = self.inner.supervisor.lock();
            if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
                return Err(ConnectError::AlreadyRunning);
            }

            let cancel = CancellationToken::new();
            *self.inner.close_reason.lock() = None;
            self.inner.auto_reconnect.store(true, Ordering::SeqCst);
            self.inner.set_state(ConnectionState::Connecting);

            let handle = tokio::spawn(Arc::clone(&self.inner).supervise(credentials, cancel.clone()));
            *slot = Some(Supervisor { cancel, handle });
        }

        let timeout = self.inner.settings.handshake_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed)),
        )
        .await
        .map(|waited| waited.map(|state| *state));

        match outcome {
            Ok(Ok(ConnectionState::Connected)) => Ok(()),
            Ok(_) => match *self.inner.close_reason.lock() {
                Some(CloseReason::RetriesExhausted { attempts }) => {
                    Err(ConnectError::RetriesExhausted { attempts })
                }
                _ => Err(ConnectError::Closed),
            },
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Handshake timed out, closing");
                self.shutdown().await;
                Err(ConnectError::HandshakeTimeout(timeout))
            }
        }
    }

    /// Close the connection for good.
    ///
    /// Stops auto-reconnect, cancels any backoff wait, stops the heartbeat,
    /// closes the socket and clears the subscription registry. Once this
    /// returns no further pings, frames or reconnects happen.
    pub async fn disconnect(&self) {
        self.shutdown().await;

        let cleared = self.inner.registry.clear();
        metrics::set_subscribed_tokens(0);
        tracing::info!(tokens = cleared.token_count(), "Stream client disconnected");
    }

    async fn shutdown(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);

        let supervisor = self.inner.supervisor.lock().take();
        if let Some(Supervisor { cancel, handle }) = supervisor {
            cancel.cancel();
            if let Err(e) = handle.await
                && e.is_panic()
            {
                tracing::error!(error = %e, "Stream supervisor panicked");
            }
        }

        *self.inner.link.lock() = None;
        self.inner.record_close(CloseReason::Requested);
        if self.inner.set_state(ConnectionState::Closed) {
            self.inner.emit(StreamEvent::Closed);
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Add tokens to the subscription.
    ///
    /// The registry is always updated. While connected, a subscribe message
    /// carrying only the new tokens is queued. If `mode` differs from the
    /// active mode, the held tokens are first unsubscribed under the old mode
    /// and the whole registry is then resubscribed under `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::InvalidArguments`] when no tokens are given
    /// or a token is empty.
    pub fn subscribe(
        &self,
        mode: SubscriptionMode,
        token_lists: &[TokenList],
    ) -> Result<(), SubscribeError> {
        validate(token_lists)?;

        let link = self.inner.link.lock();
        let before = self.inner.registry.snapshot();

        let mut changed = Vec::new();
        let mut replaced_mode = None;
        for list in token_lists {
            let change = self
                .inner
                .registry
                .add(mode, list.exchange_segment, &list.tokens);
            replaced_mode = replaced_mode.or(change.replaced_mode);
            changed.extend(change.changed);
        }
        metrics::set_subscribed_tokens(self.inner.registry.token_count());

        let Some(tx) = link.as_ref() else {
            tracing::debug!(%mode, "Not connected, subscription held for next connection");
            return Ok(());
        };

        if let Some(old_mode) = replaced_mode {
            if !before.is_empty() {
                queue(tx, &ControlMessage::unsubscribe(old_mode, before.token_lists()))?;
            }
            return queue(
                tx,
                &ControlMessage::subscribe(mode, self.inner.registry.snapshot().token_lists()),
            );
        }

        if changed.is_empty() {
            return Ok(());
        }
        queue(tx, &ControlMessage::subscribe(mode, changed))
    }

    /// Remove tokens from the subscription.
    ///
    /// The wire message carries the registry's active mode, which may differ
    /// from `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::InvalidArguments`] when no tokens are given
    /// or a token is empty.
    pub fn unsubscribe(
        &self,
        mode: SubscriptionMode,
        token_lists: &[TokenList],
    ) -> Result<(), SubscribeError> {
        validate(token_lists)?;

        let link = self.inner.link.lock();
        let wire_mode = self.inner.registry.snapshot().mode.unwrap_or(mode);

        let removed: Vec<TokenList> = token_lists
            .iter()
            .flat_map(|list| {
                self.inner
                    .registry
                    .remove(mode, list.exchange_segment, &list.tokens)
                    .changed
            })
            .collect();
        metrics::set_subscribed_tokens(self.inner.registry.token_count());

        match link.as_ref() {
            Some(tx) if !removed.is_empty() => {
                queue(tx, &ControlMessage::unsubscribe(wire_mode, removed))
            }
            _ => Ok(()),
        }
    }

    /// Drop every subscription, unsubscribing on the wire when connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the unsubscribe message cannot be serialized.
    pub fn unsubscribe_all(&self) -> Result<(), SubscribeError> {
        let link = self.inner.link.lock();
        let held = self.inner.registry.clear();
        metrics::set_subscribed_tokens(0);

        match (link.as_ref(), held.mode) {
            (Some(tx), Some(mode)) if !held.is_empty() => {
                queue(tx, &ControlMessage::unsubscribe(mode, held.token_lists()))
            }
            _ => Ok(()),
        }
    }
}

fn validate(token_lists: &[TokenList]) -> Result<(), SubscribeError> {
    if token_lists.iter().all(|list| list.tokens.is_empty()) {
        return Err(SubscribeError::InvalidArguments(
            "token list is empty".to_string(),
        ));
    }
    if token_lists
        .iter()
        .flat_map(|list| &list.tokens)
        .any(|token| token.trim().is_empty())
    {
        return Err(SubscribeError::InvalidArguments(
            "token must not be blank".to_string(),
        ));
    }
    Ok(())
}

fn queue(tx: &mpsc::UnboundedSender<String>, message: &ControlMessage) -> Result<(), SubscribeError> {
    let json = message.to_json()?;
    tracing::debug!(
        action = ?message.action,
        mode = %message.params.mode,
        tokens = message.token_count(),
        correlation_id = %message.correlation_id,
        "Queueing control message"
    );
    // A closed channel means the session is ending; the registry replay
    // on the next connection covers this change.
    let _ = tx.send(json);
    Ok(())
}

/// Build the handshake request with credential headers.
fn handshake_request(url: &str, credentials: &Credentials) -> Result<Request, ConnectError> {
    let invalid = |e: &dyn std::fmt::Display| ConnectError::InvalidRequest(e.to_string());

    let mut request = url.into_client_request().map_err(|e| invalid(&e))?;
    let headers = request.headers_mut();

    let bearer = format!("Bearer {}", credentials.auth_token());
    for (name, value) in [
        ("authorization", bearer.as_str()),
        ("x-api-key", credentials.api_key()),
        ("x-client-code", credentials.client_code()),
        ("x-feed-token", credentials.feed_token()),
    ] {
        let value = HeaderValue::from_str(value).map_err(|e| invalid(&e))?;
        headers.insert(name, value);
    }

    Ok(request)
}

// =============================================================================
// Supervisor and Session
// =============================================================================

impl Inner {
    /// Returns `true` if the state changed.
    fn set_state(&self, next: ConnectionState) -> bool {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            metrics::set_connection_state(next);
            tracing::debug!(from = %previous, to = %next, "Connection state changed");
        }
        previous != next
    }

    /// First recorded reason wins until the next `connect()`.
    fn record_close(&self, reason: CloseReason) {
        let mut slot = self.close_reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    fn emit(&self, event: StreamEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn supervise(self: Arc<Self>, credentials: Credentials, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        let reason = loop {
            if cancel.is_cancelled() || !self.auto_reconnect.load(Ordering::SeqCst) {
                break CloseReason::Requested;
            }

            self.set_state(ConnectionState::Connecting);

            let reason = match self.run_session(&credentials, &cancel, &mut policy).await {
                SessionEnd::Cancelled => break CloseReason::Requested,
                SessionEnd::Failed(reason) => reason,
            };

            tracing::warn!(reason = %reason, "Feed connection lost");
            self.emit(StreamEvent::Disconnected {
                reason: reason.clone(),
            });

            if cancel.is_cancelled() || !self.auto_reconnect.load(Ordering::SeqCst) {
                break CloseReason::Requested;
            }

            let attempt = policy.record_failure();
            if !policy.should_retry(attempt) {
                let attempts = attempt.saturating_sub(1);
                tracing::error!(attempts, "Reconnection attempts exhausted, closing");
                self.emit(StreamEvent::RetriesExhausted { attempts });
                break CloseReason::RetriesExhausted { attempts };
            }

            let delay = policy.delay_with_jitter(attempt);
            self.set_state(ConnectionState::Reconnecting);
            metrics::record_reconnect();
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to feed"
            );
            self.emit(StreamEvent::Reconnecting { attempt, delay });

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Reconnect wait cancelled");
                    break CloseReason::Requested;
                }
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.auto_reconnect.store(false, Ordering::SeqCst);
        *self.link.lock() = None;
        self.record_close(reason);
        if self.set_state(ConnectionState::Closed) {
            self.emit(StreamEvent::Closed);
        }
    }

    async fn run_session(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> SessionEnd {
        let request = match handshake_request(&self.settings.url, credentials) {
            Ok(request) => request,
            Err(e) => return SessionEnd::Failed(e.to_string()),
        };

        tracing::info!(url = %self.settings.url, "Connecting to feed");

        let handshake =
            tokio::time::timeout(self.settings.handshake_timeout, tokio_tungstenite::connect_async(request));

        let ws_stream = tokio::select! {
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            result = handshake => match result {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => return SessionEnd::Failed(format!("handshake failed: {e}")),
                Err(_) => return SessionEnd::Failed("handshake timed out".to_string()),
            },
        };

        let (mut write, mut read) = ws_stream.split();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(4);
        let mut heartbeat = HeartbeatScheduler::new(self.heartbeat.clone());

        // A concurrent subscribe lands in exactly one of the replay snapshot
        // or the command queue.
        let replay = {
            let mut link = self.link.lock();
            *link = Some(command_tx);
            self.registry.snapshot()
        };

        policy.reset();
        self.set_state(ConnectionState::Connected);
        heartbeat.start(heartbeat_tx);
        tracing::info!(tokens = replay.token_count(), "Feed connected");
        self.emit(StreamEvent::Connected);

        let end = 'session: {
            if let Some(mode) = replay.mode.filter(|_| !replay.is_empty()) {
                let message = ControlMessage::subscribe(mode, replay.token_lists());
                match message.to_json() {
                    Ok(json) => {
                        if let Err(e) = write.send(Message::text(json)).await {
                            break 'session SessionEnd::Failed(format!("replay failed: {e}"));
                        }
                        tracing::info!(
                            %mode,
                            tokens = message.token_count(),
                            "Subscription replayed"
                        );
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to serialize replay"),
                }
            }

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        heartbeat.stop();
                        if let Err(e) = write.send(Message::Close(None)).await {
                            tracing::debug!(error = %e, "Close frame not sent");
                        }
                        break 'session SessionEnd::Cancelled;
                    }
                    Some(HeartbeatEvent::SendPing) = heartbeat_rx.recv() => {
                        if let Err(e) = write.send(Message::text(PING_FRAME)).await {
                            break 'session SessionEnd::Failed(format!("heartbeat write failed: {e}"));
                        }
                        metrics::record_heartbeat();
                        tracing::trace!("Heartbeat ping sent");
                    }
                    Some(json) = command_rx.recv() => {
                        if let Err(e) = write.send(Message::text(json)).await {
                            break 'session SessionEnd::Failed(format!("control write failed: {e}"));
                        }
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Binary(bytes))) => {
                            metrics::record_frame(FrameKind::Binary);
                            self.handle_binary(&bytes);
                        }
                        Some(Ok(Message::Text(text))) => {
                            metrics::record_frame(FrameKind::Text);
                            self.handle_text(text.as_str());
                        }
                        // tungstenite answers pings on the next write.
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            metrics::record_frame(FrameKind::Control);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map_or_else(
                                || "server closed the connection".to_string(),
                                |f| format!("server closed the connection: {} {}", f.code, f.reason),
                            );
                            break 'session SessionEnd::Failed(reason);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => break 'session SessionEnd::Failed(format!("read failed: {e}")),
                        None => break 'session SessionEnd::Failed("stream ended".to_string()),
                    },
                }
            }
        };

        heartbeat.stop();
        *self.link.lock() = None;
        end
    }

    fn handle_binary(&self, bytes: &[u8]) {
        match codec::decode(bytes) {
            Ok(tick) => {
                let outcome = self.dispatcher.dispatch(&tick);
                metrics::record_dispatch(outcome.failed);
            }
            Err(e) => {
                metrics::record_decode_error();
                tracing::warn!(error = %e, len = bytes.len(), "Dropping undecodable frame");
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundText::parse(text) {
            InboundText::Pong => tracing::trace!("Heartbeat pong received"),
            InboundText::ServerError(error) => {
                metrics::record_server_error(&error.code);
                tracing::warn!(
                    code = %error.code,
                    message = %error.message,
                    correlation_id = ?error.correlation_id,
                    "Feed reported an error"
                );
                self.emit(StreamEvent::ServerError {
                    code: error.code,
                    message: error.message,
                });
            }
            InboundText::Other(text) => tracing::debug!(text = %text, "Ignoring text frame"),
        }
    }
}
