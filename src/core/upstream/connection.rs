//! WebSocket connection task shared by the upstream clients.
//!
//! Each client builds the upgrade request and handshake frames for its
//! provider and supplies a [`ServerDecoder`]; this module owns the socket:
//!
//! ```text
//!  client.send_audio ──mpsc──┐
//!                            ▼
//!                 ┌───────────────────┐   frames   ┌──────────┐
//!                 │  connection task  │ ◄────────► │ provider │
//!                 └───────────────────┘            └──────────┘
//!                            │ UpstreamEvent
//!                            ▼
//!                      session actor
//! ```
//!
//! The task is the single place that emits [`UpstreamEvent::Closed`], so every
//! exit path (refused connect, socket error, close, kill) reports exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{ConnectionState, UpstreamError, UpstreamEvent};

/// Channel capacity for outbound WebSocket frames.
pub(super) const WS_CHANNEL_CAPACITY: usize = 256;

/// How long the socket may take to open.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a closing session waits for an in-flight response and the
/// provider's close acknowledgement.
const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// Decodes provider frames into upstream events.
pub(super) trait ServerDecoder: Send + 'static {
    fn decode(&mut self, payload: &str, out: &mut Vec<UpstreamEvent>);
}

/// State shared between a client and its connection task.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedState {
    pub state: Arc<RwLock<ConnectionState>>,
    /// Connected flag for fast checks on the audio path
    pub connected: Arc<AtomicBool>,
    /// Set by `commit`, cleared when the provider finishes its response
    pub awaiting_response: Arc<AtomicBool>,
}

impl SharedState {
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set(&self, state: ConnectionState) {
        self.connected
            .store(state == ConnectionState::Connected, Ordering::SeqCst);
        *self.state.write() = state;
    }
}

/// Everything the connection task needs to talk to one provider.
pub(super) struct ConnectionSpec<D> {
    pub provider: &'static str,
    pub request: Request,
    pub handshake: Vec<Message>,
    pub decoder: D,
}

/// Spawn the connection task.
pub(super) fn spawn_connection<D: ServerDecoder>(
    spec: ConnectionSpec<D>,
    shared: SharedState,
    outbound: mpsc::Receiver<Message>,
    events: mpsc::Sender<UpstreamEvent>,
    cancel: CancellationToken,
) {
    shared.set(ConnectionState::Connecting);

    tokio::spawn(async move {
        let provider = spec.provider;

        let connect = tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(
                CONNECT_TIMEOUT,
                tokio_tungstenite::connect_async(spec.request),
            ) => Some(result),
        };

        let error = match connect {
            None => {
                debug!(provider, "Upstream killed while connecting");
                None
            }
            Some(Err(_)) => Some(UpstreamError::ConnectionFailed(format!(
                "timed out after {}s",
                CONNECT_TIMEOUT.as_secs()
            ))),
            Some(Ok(Err(e))) => Some(classify_connect_error(e)),
            Some(Ok(Ok((ws, _response)))) => {
                info!(provider, "Connected to upstream");
                let mut driver = Driver {
                    provider,
                    decoder: spec.decoder,
                    shared: shared.clone(),
                    events: events.clone(),
                    ready_sent: false,
                    outbound_open: true,
                    close_sent: false,
                    decoded: Vec::new(),
                };
                driver.run(ws, spec.handshake, outbound, &cancel).await
            }
        };

        match error {
            Some(ref e) => {
                error!(provider, "Upstream connection ended: {}", e);
                shared.set(ConnectionState::Failed);
            }
            None => {
                info!(provider, "Upstream connection closed");
                shared.set(ConnectionState::Disconnected);
            }
        }

        let _ = events.send(UpstreamEvent::Closed { error }).await;
    });
}

fn classify_connect_error(error: tungstenite::Error) -> UpstreamError {
    match error {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            UpstreamError::AuthenticationFailed(format!("HTTP {}", response.status()))
        }
        other => UpstreamError::ConnectionFailed(other.to_string()),
    }
}

enum Dispatch {
    Continue,
    ResponseFinished,
    OwnerGone,
}

struct Driver<D> {
    provider: &'static str,
    decoder: D,
    shared: SharedState,
    events: mpsc::Sender<UpstreamEvent>,
    ready_sent: bool,
    outbound_open: bool,
    close_sent: bool,
    decoded: Vec<UpstreamEvent>,
}

impl<D: ServerDecoder> Driver<D> {
    async fn run(
        &mut self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        handshake: Vec<Message>,
        mut outbound: mpsc::Receiver<Message>,
        cancel: &CancellationToken,
    ) -> Option<UpstreamError> {
        let (mut sink, mut stream) = ws.split();

        for frame in handshake {
            if let Err(e) = sink.send(frame).await {
                return Some(UpstreamError::WebSocketError(e.to_string()));
            }
        }

        let mut closing_deadline: Option<Instant> = None;

        loop {
            let deadline = closing_deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(provider = self.provider, "Upstream connection killed");
                    return None;
                }

                frame = outbound.recv(), if self.outbound_open => match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            return Some(UpstreamError::WebSocketError(e.to_string()));
                        }
                    }
                    // Owner called close(): let an in-flight response finish first
                    None => {
                        self.outbound_open = false;
                        self.shared.set(ConnectionState::Closing);
                        if !self.shared.awaiting_response.load(Ordering::SeqCst) {
                            self.close_sent = true;
                            let _ = sink.send(Message::Close(None)).await;
                        }
                        closing_deadline = Some(Instant::now() + CLOSE_GRACE);
                    }
                },

                _ = tokio::time::sleep_until(deadline), if closing_deadline.is_some() => {
                    if !self.close_sent {
                        let _ = sink.send(Message::Close(None)).await;
                    }
                    debug!(provider = self.provider, "Upstream close grace period elapsed");
                    return None;
                }

                incoming = stream.next() => {
                    let dispatch = match incoming {
                        Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.dispatch(text).await,
                            Err(_) => {
                                warn!(provider = self.provider, bytes = data.len(), "Ignoring non-UTF-8 binary frame");
                                Dispatch::Continue
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                warn!(provider = self.provider, "Failed to send pong: {}", e);
                            }
                            Dispatch::Continue
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if self.outbound_open {
                                let reason = frame
                                    .map(|f| format!("{} {}", f.code, f.reason.as_str()))
                                    .unwrap_or_default();
                                return Some(UpstreamError::ConnectionFailed(format!(
                                    "closed by provider {reason}"
                                ).trim_end().to_string()));
                            }
                            return None;
                        }
                        Some(Ok(_)) => Dispatch::Continue,
                        Some(Err(e)) => {
                            if self.outbound_open {
                                return Some(UpstreamError::WebSocketError(e.to_string()));
                            }
                            debug!(provider = self.provider, "Socket error while closing: {}", e);
                            return None;
                        }
                        None => {
                            if self.outbound_open {
                                return Some(UpstreamError::ConnectionFailed(
                                    "connection dropped".to_string(),
                                ));
                            }
                            return None;
                        }
                    };

                    match dispatch {
                        Dispatch::Continue => {}
                        Dispatch::OwnerGone => return None,
                        Dispatch::ResponseFinished => {
                            if !self.outbound_open && !self.close_sent {
                                self.close_sent = true;
                                let _ = sink.send(Message::Close(None)).await;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, payload: &str) -> Dispatch {
        self.decoder.decode(payload, &mut self.decoded);

        let mut outcome = Dispatch::Continue;
        for event in std::mem::take(&mut self.decoded) {
            match &event {
                UpstreamEvent::Ready { session_id } => {
                    if self.ready_sent {
                        continue;
                    }
                    self.ready_sent = true;
                    if self.outbound_open {
                        self.shared.set(ConnectionState::Connected);
                    }
                    info!(provider = self.provider, session_id = ?session_id, "Upstream session ready");
                }
                UpstreamEvent::ResponseDone => {
                    self.shared.awaiting_response.store(false, Ordering::SeqCst);
                    outcome = Dispatch::ResponseFinished;
                }
                UpstreamEvent::Closed { .. } => continue,
                _ => {}
            }

            if self.events.send(event).await.is_err() {
                return Dispatch::OwnerGone;
            }
        }
        outcome
    }
}
