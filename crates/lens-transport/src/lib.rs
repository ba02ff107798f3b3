//! # lens-transport — cloud channel and UI poll client
//!
//! Two ways off the phone:
//!
//! - [`WsChannel`] — the persistent duplex WebSocket to the cloud backend.
//!   A spawned pump task owns the socket and forwards [`TransportEvent`]s
//!   into the orchestrator's work queue in arrival order. Sends are
//!   fire-and-forget: while disconnected they are silently dropped, which
//!   is the accepted loss mode for telemetry.
//! - [`HttpPollClient`] — the secondary request/response channel polled on
//!   the orchestrator's adaptive interval, returning server-ranked
//!   notification summaries.
//!
//! Reconnection policy lives in the orchestrator, not here: the channel
//! reports `Closed`/`Failed` and waits to be told to `connect` again.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use lens_protocol::{ConnectionState, PollError, PollUpdate, RankedNotification, UiPollPort};

/// Errors raised by the transport layer itself.
///
/// Runtime socket failures are not errors here; they surface as
/// [`TransportEvent::Failed`] so the session stays alive.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host or port was never configured. Fatal: there is nothing to
    /// retry against.
    #[error("cloud endpoint is not configured (missing host or port)")]
    MissingEndpoint,
}

/// Where the cloud backend lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secure: bool,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            secure,
        }
    }

    /// Derive the glasses WebSocket URL.
    pub fn url(&self) -> Result<String, TransportError> {
        let (Some(host), Some(port)) = (self.host.as_deref(), self.port) else {
            return Err(TransportError::MissingEndpoint);
        };
        let scheme = if self.secure { "wss" } else { "ws" };
        Ok(format!("{scheme}://{host}:{port}/glasses-ws"))
    }
}

/// What the channel pump reports back to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket is open; the consumer owes the server its handshake frame.
    Opened,
    /// One text frame, verbatim.
    Message(String),
    /// One binary frame, verbatim.
    Binary(Vec<u8>),
    /// Connect or I/O failure; the channel is down.
    Failed(String),
    /// Orderly close from either side; the channel is down.
    Closed,
}

/// Orchestrator-facing seam over the cloud channel.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Open the channel. No-op when already connecting or connected.
    async fn connect(&self) -> Result<(), TransportError>;
    /// Close the channel. No-op when already disconnected.
    async fn disconnect(&self);
    /// Queue a text frame. Dropped silently while disconnected.
    fn send_text(&self, text: String);
    /// Queue a binary frame. Dropped silently while disconnected.
    fn send_binary(&self, bytes: Vec<u8>);
    fn state(&self) -> ConnectionState;
}

enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// The production WebSocket channel.
pub struct WsChannel {
    config: EndpointConfig,
    events: mpsc::Sender<TransportEvent>,
    state: Arc<Mutex<ConnectionState>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    /// `events` is the consumer's work queue; the pump task forwards every
    /// [`TransportEvent`] into it in arrival order.
    pub fn new(config: EndpointConfig, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            events,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            outgoing: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }
}

#[async_trait]
impl OutboundChannel for WsChannel {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.config.url()?;
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Disconnected {
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_channel(
            url,
            Arc::clone(&self.state),
            self.events.clone(),
            frame_rx,
        ));
        *self.outgoing.lock() = Some(frame_tx);
        *self.pump.lock() = Some(handle);
        Ok(())
    }

    async fn disconnect(&self) {
        let outgoing = self.outgoing.lock().take();
        let pump = self.pump.lock().take();
        match outgoing {
            Some(tx) => {
                // Graceful: the pump sends a close frame and exits on its own.
                let _ = tx.send(Frame::Close);
            }
            None => {
                if let Some(handle) = pump {
                    handle.abort();
                }
                *self.state.lock() = ConnectionState::Disconnected;
            }
        }
    }

    fn send_text(&self, text: String) {
        if *self.state.lock() != ConnectionState::Connected {
            return;
        }
        if let Some(tx) = self.outgoing.lock().as_ref() {
            let _ = tx.send(Frame::Text(text));
        }
    }

    fn send_binary(&self, bytes: Vec<u8>) {
        if *self.state.lock() != ConnectionState::Connected {
            return;
        }
        if let Some(tx) = self.outgoing.lock().as_ref() {
            let _ = tx.send(Frame::Binary(bytes));
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

/// Owns the socket from dial to teardown.
async fn run_channel(
    url: String,
    state: Arc<Mutex<ConnectionState>>,
    events: mpsc::Sender<TransportEvent>,
    mut frames: mpsc::UnboundedReceiver<Frame>,
) {
    debug!(%url, "dialing cloud channel");
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(error) => {
            warn!(%url, %error, "cloud channel connect failed");
            *state.lock() = ConnectionState::Disconnected;
            let _ = events.send(TransportEvent::Failed(error.to_string())).await;
            return;
        }
    };
    *state.lock() = ConnectionState::Connected;
    let _ = events.send(TransportEvent::Opened).await;

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let outcome = match frame {
                    None | Some(Frame::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Frame::Text(text)) => sink.send(Message::Text(text.into())).await,
                    Some(Frame::Binary(bytes)) => sink.send(Message::Binary(bytes.into())).await,
                };
                if let Err(error) = outcome {
                    warn!(%error, "cloud channel send failed");
                    *state.lock() = ConnectionState::Disconnected;
                    let _ = events.send(TransportEvent::Failed(error.to_string())).await;
                    return;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Message(text.to_string())).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let _ = events.send(TransportEvent::Binary(bytes.to_vec())).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by the library
                    Some(Err(error)) => {
                        warn!(%error, "cloud channel read failed");
                        *state.lock() = ConnectionState::Disconnected;
                        let _ = events.send(TransportEvent::Failed(error.to_string())).await;
                        return;
                    }
                }
            }
        }
    }

    *state.lock() = ConnectionState::Disconnected;
    let _ = events.send(TransportEvent::Closed).await;
}

/// Secondary UI poll channel over HTTP.
pub struct HttpPollClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPollClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UiPollPort for HttpPollClient {
    async fn poll(&self, device_id: &str) -> Result<PollUpdate, PollError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "deviceId": device_id }))
            .send()
            .await
            .map_err(|e| PollError::Failed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PollError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(PollError::Failed(format!(
                "poll endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PollError::Failed(e.to_string()))?;
        Ok(parse_poll_body(&body))
    }
}

/// Extract ranked notification summaries from a poll response body.
///
/// Entries without a `summary` string are skipped; a missing or
/// non-integer `rank` is carried as `None`.
pub fn parse_poll_body(body: &Value) -> PollUpdate {
    let notifications = body
        .get("notification_data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let summary = entry.get("summary")?.as_str()?;
                    Some(RankedNotification {
                        summary: summary.to_owned(),
                        rank: entry.get("rank").and_then(Value::as_i64),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    PollUpdate { notifications }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::{EndpointConfig, TransportError, WsChannel, parse_poll_body};
    use crate::OutboundChannel;
    use lens_protocol::ConnectionState;

    #[test]
    fn derives_plain_and_secure_urls() {
        let plain = EndpointConfig::new("cloud.example.com", 8002, false);
        assert_eq!(plain.url().unwrap(), "ws://cloud.example.com:8002/glasses-ws");

        let secure = EndpointConfig::new("cloud.example.com", 443, true);
        assert_eq!(secure.url().unwrap(), "wss://cloud.example.com:443/glasses-ws");
    }

    #[test]
    fn missing_endpoint_is_fatal() {
        let config = EndpointConfig {
            host: Some("cloud.example.com".to_owned()),
            port: None,
            secure: false,
        };
        assert!(matches!(config.url(), Err(TransportError::MissingEndpoint)));
    }

    #[tokio::test]
    async fn connect_without_endpoint_fails_before_spawning() {
        let (events, _rx) = mpsc::channel(8);
        let channel = WsChannel::new(EndpointConfig::default(), events);
        assert!(matches!(
            channel.connect().await,
            Err(TransportError::MissingEndpoint)
        ));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn sends_while_disconnected_are_dropped() {
        let (events, _rx) = mpsc::channel(8);
        let channel = WsChannel::new(EndpointConfig::new("localhost", 9, false), events);
        channel.send_text("lost".to_owned());
        channel.send_binary(vec![0u8; 4]);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn parses_ranked_summaries_and_skips_malformed_entries() {
        let body = json!({
            "notification_data": [
                {"summary": "Meeting at 3", "rank": 1},
                {"rank": 2},
                {"summary": "Unranked"},
                {"summary": "Bad rank", "rank": "high"},
            ],
        });
        let update = parse_poll_body(&body);
        assert_eq!(update.notifications.len(), 3);
        assert_eq!(update.notifications[0].rank, Some(1));
        assert_eq!(update.notifications[1].rank, None);
        assert_eq!(update.notifications[2].rank, None);
    }
}
