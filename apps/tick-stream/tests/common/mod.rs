//! Loopback feed server for integration tests.
//!
//! Accepts WebSocket connections on 127.0.0.1, records the handshake
//! headers and every text frame the client writes, and lets the test push
//! frames or drop the connection.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tick_stream::infrastructure::feed::ControlMessage;
use tick_stream::{Credentials, ExchangeSegment, SubscriptionMode, Tick};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;

/// Upper bound on any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// What the server saw from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Text { session: usize, text: String },
    /// The client sent a close frame or the socket ended.
    Closed { session: usize },
}

enum Outbound {
    Frame(Message),
    Drop,
}

/// One accepted client connection.
pub struct Session {
    pub id: usize,
    pub headers: HeaderMap,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    pub fn send_binary(&self, bytes: Vec<u8>) {
        self.outbound.send(Outbound::Frame(Message::binary(bytes))).unwrap();
    }

    pub fn send_text(&self, text: &str) {
        self.outbound
            .send(Outbound::Frame(Message::text(text.to_string())))
            .unwrap();
    }

    /// Drop the TCP connection without a close handshake.
    pub fn drop_connection(&self) {
        let _ = self.outbound.send(Outbound::Drop);
    }
}

pub struct FakeFeed {
    url: String,
    sessions: mpsc::UnboundedReceiver<Session>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    accept_task: JoinHandle<()>,
}

impl Drop for FakeFeed {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl FakeFeed {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/smart-stream", listener.local_addr().unwrap());

        let (session_tx, sessions) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            let mut next_id = 0;
            while let Ok((stream, _)) = listener.accept().await {
                next_id += 1;
                let id = next_id;

                let mut headers = HeaderMap::new();
                let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    headers = request.headers().clone();
                    Ok(response)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                if session_tx.send(Session { id, headers, outbound }).is_err() {
                    return;
                }
                tokio::spawn(serve(id, ws, outbound_rx, inbound_tx.clone()));
            }
        });

        Self {
            url,
            sessions,
            inbound,
            accept_task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn next_session(&mut self) -> Session {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("no client connected")
            .expect("accept loop ended")
    }

    pub async fn next_inbound(&mut self) -> Inbound {
        timeout(WAIT, self.inbound.recv())
            .await
            .expect("nothing received from client")
            .expect("inbound channel closed")
    }

    /// Next control message, skipping heartbeats and closes.
    pub async fn next_control(&mut self) -> (usize, ControlMessage) {
        loop {
            if let Inbound::Text { session, text } = self.next_inbound().await
                && text != "ping"
            {
                let message = serde_json::from_str(&text)
                    .unwrap_or_else(|e| panic!("not a control message: {text} ({e})"));
                return (session, message);
            }
        }
    }

    /// Assert nothing arrives and nobody connects for `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        tokio::select! {
            inbound = self.inbound.recv() => panic!("unexpected frame from client: {inbound:?}"),
            session = self.sessions.recv() => {
                panic!("unexpected connection: {:?}", session.map(|s| s.id));
            }
            () = tokio::time::sleep(window) => {}
        }
    }
}

async fn serve(
    id: usize,
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(message)) => {
                    if write.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Drop) | None => break,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(Inbound::Text { session: id, text: text.as_str().to_owned() });
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    let _ = inbound.send(Inbound::Closed { session: id });
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn credentials() -> Credentials {
    Credentials::new(
        "jwt-token".to_string(),
        "api-key".to_string(),
        "A123456".to_string(),
        "feed-token".to_string(),
    )
}

/// A free local port with nothing listening on it.
pub fn unused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/smart-stream")
}

pub fn ltp_tick(token: &str, sequence_number: i64, paise: i64) -> Tick {
    Tick {
        mode: SubscriptionMode::Ltp,
        exchange_segment: ExchangeSegment::NSE_CM,
        token: token.to_string(),
        sequence_number,
        exchange_timestamp_ms: 1_700_000_000_000,
        last_traded_price: rust_decimal::Decimal::new(paise, 2),
        quote: None,
        snap_quote: None,
    }
}

pub fn ltp_frame(token: &str, sequence_number: i64, paise: i64) -> Vec<u8> {
    tick_stream::encode(&ltp_tick(token, sequence_number, paise)).unwrap()
}
