//! Stream Client Integration Tests
//!
//! Runs the client against a loopback WebSocket feed to cover the
//! handshake, subscription replay, heartbeat, reconnect and shutdown paths.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use common::{FakeFeed, Inbound, WAIT, credentials, ltp_frame, unused_url};
use tick_stream::infrastructure::feed::{Action, HeartbeatConfig, ReconnectConfig};
use tick_stream::{
    ConnectError, ConnectionState, ExchangeSegment, StreamClient, StreamEvent, StreamSettings,
    SubscriptionMode, Tick, TokenList,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const NO_HEARTBEAT: Duration = Duration::from_secs(3600);

fn client(url: &str, ping_interval: Duration, base_delay: Duration, max_attempts: u32) -> StreamClient {
    let settings = StreamSettings {
        handshake_timeout: WAIT,
        metrics_port: 0,
        ..StreamSettings::default().with_url(url)
    };
    StreamClient::with_config(
        settings,
        HeartbeatConfig::new(ping_interval),
        ReconnectConfig::new(base_delay, Duration::from_secs(1), 2.0, 0.0, max_attempts),
    )
}

fn nse(tokens: &[&str]) -> Vec<TokenList> {
    vec![TokenList::new(ExchangeSegment::NSE_CM, tokens.iter().copied())]
}

async fn next_event(events: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("no stream event")
        .expect("event channel closed")
}

// =============================================================================
// Connect and Replay
// =============================================================================

#[tokio::test]
async fn test_connect_sends_credentials_and_replays_subscription() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    client
        .subscribe(SubscriptionMode::Ltp, &nse(&["3045", "1594"]))
        .unwrap();
    client.connect(credentials()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let session = feed.next_session().await;
    assert_eq!(session.headers["authorization"], "Bearer jwt-token");
    assert_eq!(session.headers["x-api-key"], "api-key");
    assert_eq!(session.headers["x-client-code"], "A123456");
    assert_eq!(session.headers["x-feed-token"], "feed-token");

    let (from, replay) = feed.next_control().await;
    assert_eq!(from, session.id);
    assert_eq!(replay.action, Action::Subscribe);
    assert_eq!(replay.params.mode, SubscriptionMode::Ltp);
    assert_eq!(replay.params.token_list, nse(&["1594", "3045"]));
    assert_eq!(replay.correlation_id.len(), 10);

    feed.assert_quiet(Duration::from_millis(200)).await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_connect_with_empty_registry_sends_nothing() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    client.connect(credentials()).await.unwrap();
    let _session = feed.next_session().await;

    feed.assert_quiet(Duration::from_millis(200)).await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    client.connect(credentials()).await.unwrap();
    let _session = feed.next_session().await;

    assert_eq!(
        client.connect(credentials()).await,
        Err(ConnectError::AlreadyRunning)
    );
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().await;
}

// =============================================================================
// Subscriptions While Connected
// =============================================================================

#[tokio::test]
async fn test_live_subscription_changes_send_deltas() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    client.subscribe(SubscriptionMode::Ltp, &nse(&["3045"])).unwrap();
    client.connect(credentials()).await.unwrap();
    let _session = feed.next_session().await;
    let (_, replay) = feed.next_control().await;
    assert_eq!(replay.params.token_list, nse(&["3045"]));

    // Only the new token goes out
    client
        .subscribe(SubscriptionMode::Ltp, &nse(&["3045", "1594"]))
        .unwrap();
    let (_, delta) = feed.next_control().await;
    assert_eq!(delta.action, Action::Subscribe);
    assert_eq!(delta.params.token_list, nse(&["1594"]));

    // Already subscribed: nothing on the wire
    client.subscribe(SubscriptionMode::Ltp, &nse(&["1594"])).unwrap();
    feed.assert_quiet(Duration::from_millis(100)).await;

    client.unsubscribe(SubscriptionMode::Ltp, &nse(&["3045"])).unwrap();
    let (_, removed) = feed.next_control().await;
    assert_eq!(removed.action, Action::Unsubscribe);
    assert_eq!(removed.params.token_list, nse(&["3045"]));

    // Mode switch withdraws the old mode, then resubscribes everything
    client
        .subscribe(
            SubscriptionMode::Quote,
            &[TokenList::new(ExchangeSegment::NSE_FO, ["35003"])],
        )
        .unwrap();
    let (_, withdrawn) = feed.next_control().await;
    assert_eq!(withdrawn.action, Action::Unsubscribe);
    assert_eq!(withdrawn.params.mode, SubscriptionMode::Ltp);
    assert_eq!(withdrawn.params.token_list, nse(&["1594"]));

    let (_, switched) = feed.next_control().await;
    assert_eq!(switched.action, Action::Subscribe);
    assert_eq!(switched.params.mode, SubscriptionMode::Quote);
    assert_eq!(
        switched.params.token_list,
        vec![
            TokenList::new(ExchangeSegment::NSE_CM, ["1594"]),
            TokenList::new(ExchangeSegment::NSE_FO, ["35003"]),
        ]
    );

    client.unsubscribe_all().unwrap();
    let (_, cleared) = feed.next_control().await;
    assert_eq!(cleared.action, Action::Unsubscribe);
    assert_eq!(cleared.params.mode, SubscriptionMode::Quote);
    assert_eq!(client.registry().token_count(), 0);

    client.disconnect().await;
}

#[tokio::test]
async fn test_unsubscribe_uses_active_mode() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    client.subscribe(SubscriptionMode::Ltp, &nse(&["3045", "1594"])).unwrap();
    client.connect(credentials()).await.unwrap();
    let _session = feed.next_session().await;
    let _replay = feed.next_control().await;

    client.unsubscribe(SubscriptionMode::Quote, &nse(&["3045"])).unwrap();
    let (_, removed) = feed.next_control().await;
    assert_eq!(removed.action, Action::Unsubscribe);
    assert_eq!(removed.params.mode, SubscriptionMode::Ltp);
    assert_eq!(removed.params.token_list, nse(&["3045"]));
    assert_eq!(client.registry().snapshot().mode, Some(SubscriptionMode::Ltp));

    client.disconnect().await;
}

// =============================================================================
// Tick Delivery
// =============================================================================

#[tokio::test]
async fn test_ticks_reach_consumers_in_order() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<Tick>();
    client.on_tick(|_: &Tick| -> anyhow::Result<()> { anyhow::bail!("consumer rejected tick") });
    client.on_tick(|_: &Tick| -> anyhow::Result<()> { panic!("consumer blew up") });
    client.on_tick(move |tick: &Tick| {
        tick_tx.send(tick.clone())?;
        Ok(())
    });

    client.connect(credentials()).await.unwrap();
    let session = feed.next_session().await;

    session.send_binary(ltp_frame("3045", 1, 250_025));
    session.send_binary(vec![1, 1, 0, 0]);
    session.send_binary(vec![9; 51]);
    session.send_binary(ltp_frame("1594", 2, 145_010));

    let first = timeout(WAIT, tick_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.token, "3045");
    assert_eq!(first.last_traded_price.to_string(), "2500.25");
    assert_eq!(first.mode, SubscriptionMode::Ltp);

    let second = timeout(WAIT, tick_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.token, "1594");
    assert_eq!(second.sequence_number, 2);

    // Malformed frames and failing consumers leave the connection up
    assert_eq!(client.state(), ConnectionState::Connected);
    feed.assert_quiet(Duration::from_millis(100)).await;

    client.disconnect().await;
}

#[tokio::test]
async fn test_server_error_is_surfaced_without_disconnect() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 3);
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<Tick>();
    client.on_tick(move |tick: &Tick| {
        tick_tx.send(tick.clone())?;
        Ok(())
    });

    client.connect(credentials()).await.unwrap();
    let mut events = client.events();
    let session = feed.next_session().await;

    session.send_text("pong");
    session.send_text(
        r#"{"correlationID":"abcde12345","errorCode":"E1002","errorMessage":"Invalid Request. Subscription Limit Exceeded"}"#,
    );
    session.send_binary(ltp_frame("3045", 7, 100));

    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::ServerError {
            code: "E1002".to_string(),
            message: "Invalid Request. Subscription Limit Exceeded".to_string(),
        }
    );
    let tick = timeout(WAIT, tick_rx.recv()).await.unwrap().unwrap();
    assert_eq!(tick.sequence_number, 7);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().await;
}

// =============================================================================
// Heartbeat
// =============================================================================

#[tokio::test]
async fn test_heartbeat_pings_stop_at_disconnect() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), Duration::from_millis(50), Duration::from_millis(20), 3);

    client.connect(credentials()).await.unwrap();
    let session = feed.next_session().await;

    for _ in 0..2 {
        assert_eq!(
            feed.next_inbound().await,
            Inbound::Text {
                session: session.id,
                text: "ping".to_string()
            }
        );
    }

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    // Pings already on the wire arrive before the close frame; nothing after.
    loop {
        match feed.next_inbound().await {
            Inbound::Text { text, .. } => assert_eq!(text, "ping"),
            Inbound::Closed { session: id } => {
                assert_eq!(id, session.id);
                break;
            }
        }
    }
    feed.assert_quiet(Duration::from_millis(250)).await;
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test]
async fn test_reconnect_replays_snapshot_exactly_once() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(20), 5);

    client
        .subscribe(SubscriptionMode::Ltp, &nse(&["3045", "1594"]))
        .unwrap();
    client.connect(credentials()).await.unwrap();
    let mut events = client.events();

    let first = feed.next_session().await;
    let (_, initial) = feed.next_control().await;
    first.drop_connection();

    assert!(matches!(
        next_event(&mut events).await,
        StreamEvent::Disconnected { .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        StreamEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(20)
        }
    );
    assert_eq!(next_event(&mut events).await, StreamEvent::Connected);
    assert_eq!(client.state(), ConnectionState::Connected);

    let second = feed.next_session().await;
    assert_ne!(second.id, first.id);
    let (from, replay) = feed.next_control().await;
    assert_eq!(from, second.id);
    assert_eq!(replay.action, Action::Subscribe);
    assert_eq!(replay.params, initial.params);

    feed.assert_quiet(Duration::from_millis(200)).await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_subscription_added_while_reconnecting_is_replayed() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_millis(300), 5);

    client.subscribe(SubscriptionMode::Ltp, &nse(&["3045"])).unwrap();
    client.connect(credentials()).await.unwrap();
    let mut events = client.events();

    let first = feed.next_session().await;
    let _ = feed.next_control().await;
    first.drop_connection();

    loop {
        if let StreamEvent::Reconnecting { .. } = next_event(&mut events).await {
            break;
        }
    }
    client.subscribe(SubscriptionMode::Ltp, &nse(&["1594"])).unwrap();

    let _second = feed.next_session().await;
    let (_, replay) = feed.next_control().await;
    assert_eq!(replay.params.token_list, nse(&["1594", "3045"]));

    feed.assert_quiet(Duration::from_millis(200)).await;
    client.disconnect().await;
}

#[tokio::test]
async fn test_retries_exhausted_closes_client() {
    let url = unused_url();
    let client = client(&url, NO_HEARTBEAT, Duration::from_millis(10), 2);
    let mut events = client.events();

    assert_eq!(
        client.connect(credentials()).await,
        Err(ConnectError::RetriesExhausted { attempts: 2 })
    );
    assert_eq!(client.state(), ConnectionState::Closed);

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let done = event == StreamEvent::Closed;
        seen.push(event);
        if done {
            break;
        }
    }

    let reconnects: Vec<_> = seen
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Reconnecting { attempt, delay } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        reconnects,
        vec![
            (1, Duration::from_millis(10)),
            (2, Duration::from_millis(20))
        ]
    );
    assert_eq!(
        seen.iter()
            .filter(|event| matches!(event, StreamEvent::Disconnected { .. }))
            .count(),
        3
    );
    assert_eq!(
        &seen[seen.len() - 2..],
        &[StreamEvent::RetriesExhausted { attempts: 2 }, StreamEvent::Closed]
    );
}

#[tokio::test]
async fn test_zero_retry_budget_closes_on_first_failure() {
    let url = unused_url();
    let client = client(&url, NO_HEARTBEAT, Duration::from_millis(10), 0);
    let mut events = client.events();

    assert_eq!(
        client.connect(credentials()).await,
        Err(ConnectError::RetriesExhausted { attempts: 0 })
    );
    assert_eq!(client.state(), ConnectionState::Closed);

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let done = event == StreamEvent::Closed;
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, StreamEvent::Reconnecting { .. }))
    );
    assert_eq!(
        &seen[seen.len() - 2..],
        &[StreamEvent::RetriesExhausted { attempts: 0 }, StreamEvent::Closed]
    );
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let mut feed = FakeFeed::start().await;
    let client = client(feed.url(), NO_HEARTBEAT, Duration::from_secs(1), 5);

    client.subscribe(SubscriptionMode::Ltp, &nse(&["3045"])).unwrap();
    client.connect(credentials()).await.unwrap();
    let mut events = client.events();

    let first = feed.next_session().await;
    let _ = feed.next_control().await;
    first.drop_connection();

    loop {
        if let StreamEvent::Reconnecting { .. } = next_event(&mut events).await {
            break;
        }
    }
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    timeout(Duration::from_millis(500), client.disconnect())
        .await
        .expect("disconnect should not wait out the backoff");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.registry().token_count(), 0);
    assert_eq!(next_event(&mut events).await, StreamEvent::Closed);

    feed.assert_quiet(Duration::from_millis(1500)).await;
}

// =============================================================================
// Handshake Timeout
// =============================================================================

#[tokio::test]
async fn test_connect_times_out_against_silent_server() {
    // Accepts TCP but never answers the upgrade.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/smart-stream", listener.local_addr().unwrap());

    let settings = StreamSettings {
        handshake_timeout: Duration::from_millis(200),
        metrics_port: 0,
        ..StreamSettings::default().with_url(url)
    };
    let client = StreamClient::new(settings);

    assert_eq!(
        client.connect(credentials()).await,
        Err(ConnectError::HandshakeTimeout(Duration::from_millis(200)))
    );
    assert_eq!(client.state(), ConnectionState::Closed);
    drop(listener);
}
