use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::session::MEDIA_OUTBOUND_CAPACITY;
use crate::core::{AudioFormat, AudioFrame, MediaOutput, SessionHandle, StopReason};
use crate::middleware::ClientIp;
use crate::state::AppState;
use crate::telephony::{IncomingMediaMessage, OutgoingMediaMessage, StreamTag};

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (2 MB)
const MAX_WS_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

type MediaSink = SplitSink<WebSocket, Message>;

/// `GET /media-stream`
///
/// Upgrades to the carrier media socket. The connection slot reserved by the
/// connection limit middleware is released when the socket ends, or right
/// away if the upgrade fails.
pub async fn media_stream_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let slot = ConnectionSlot {
        state: state.clone(),
        ip: client_ip.map(|Extension(ClientIp(ip))| ip),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    debug!(ip = ?slot.ip, "Media stream upgrade requested");
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            MediaConnection::new(state).run(socket).await;
            drop(slot);
        })
}

/// Releases a connection slot on drop.
struct ConnectionSlot {
    state: Arc<AppState>,
    ip: Option<IpAddr>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(ip) = self.ip {
            self.state.release_connection(ip);
        }
    }
}

/// What the read loop does after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Carrier sent `stop`
    Stopped,
    /// The socket cannot be served; close it
    Reject,
}

/// One media socket.
struct MediaConnection {
    state: Arc<AppState>,
    session: Option<SessionHandle>,
    outbound_tx: mpsc::Sender<MediaOutput>,
    outbound_rx: Option<mpsc::Receiver<MediaOutput>>,
    sink: Option<MediaSink>,
    sequence: u64,
}

impl MediaConnection {
    fn new(state: Arc<AppState>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(MEDIA_OUTBOUND_CAPACITY);
        Self {
            state,
            session: None,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            sink: None,
            sequence: 0,
        }
    }

    async fn run(mut self, socket: WebSocket) {
        let (sink, mut receiver) = socket.split();
        self.sink = Some(sink);
        info!("Media stream connected");

        let mut reason = StopReason::SocketClosed;
        loop {
            let session = self.session.clone();
            select! {
                message = receiver.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!(error = %e, "Media socket error");
                            break;
                        }
                    };

                    match self.on_text(text.as_str()).await {
                        Flow::Continue => {}
                        Flow::Stopped => {
                            reason = StopReason::StreamStopped;
                            break;
                        }
                        Flow::Reject => {
                            self.close_unbound().await;
                            return;
                        }
                    }
                }
                _ = wait_closed(session.as_ref()) => {
                    debug!("Session closed; ending media stream");
                    break;
                }
            }
        }

        match self.session.take() {
            Some(session) => {
                session.stop(reason).await;
                info!(call_id = %session.call_id(), reason = %reason, "Media stream ended");
            }
            None => {
                self.close_unbound().await;
                info!(reason = %reason, "Media stream ended before start");
            }
        }
    }

    async fn on_text(&mut self, text: &str) -> Flow {
        let message = match serde_json::from_str::<IncomingMediaMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed media message");
                return Flow::Continue;
            }
        };

        let tag = message.stream_tag();
        match message {
            IncomingMediaMessage::Connected { protocol, .. } => {
                debug!(protocol = ?protocol, "Media stream handshake");
                Flow::Continue
            }
            IncomingMediaMessage::Start { start, .. } => {
                let tag = StreamTag {
                    stream_sid: tag.stream_sid.or(start.stream_sid),
                    stream_id: tag.stream_id,
                };
                if let Some(format) = start.media_format.as_ref()
                    && format.audio_format() != Some(AudioFormat::TELEPHONY)
                {
                    warn!(
                        encoding = %format.encoding,
                        sample_rate = format.sample_rate,
                        "Unexpected media format; treating audio as µ-law 8 kHz"
                    );
                }
                match start.call_id.as_deref() {
                    Some(call_id) => self.on_start(call_id, tag).await,
                    None => {
                        warn!(stream_id = ?tag.id(), "Media start without call id");
                        Flow::Continue
                    }
                }
            }
            IncomingMediaMessage::Media { media, .. } => {
                let Some(session) = &self.session else {
                    debug!("Media before start dropped");
                    return Flow::Continue;
                };
                if !media.is_inbound() {
                    return Flow::Continue;
                }
                match media.decode() {
                    Ok(audio) if !audio.is_empty() => {
                        let frame = AudioFrame::new(audio, AudioFormat::TELEPHONY, self.sequence);
                        self.sequence += 1;
                        session.push_media(frame).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Ignoring undecodable media payload"),
                }
                Flow::Continue
            }
            IncomingMediaMessage::Stop { .. } => Flow::Stopped,
            IncomingMediaMessage::Mark { mark, .. } => {
                debug!(name = ?mark.and_then(|m| m.name), "Playback mark");
                Flow::Continue
            }
            IncomingMediaMessage::Dtmf { dtmf, .. } => {
                info!(digit = ?dtmf.and_then(|d| d.digit), "DTMF received");
                Flow::Continue
            }
            IncomingMediaMessage::Unknown => {
                debug!("Ignoring unknown media event");
                Flow::Continue
            }
        }
    }

    async fn on_start(&mut self, call_id: &str, tag: StreamTag) -> Flow {
        if let Some(session) = &self.session {
            warn!(call_id = %session.call_id(), "Duplicate media start ignored");
            return Flow::Continue;
        }

        let attached = self
            .state
            .relay
            .attach_media(
                call_id,
                tag.id().map(str::to_string),
                self.outbound_tx.clone(),
            )
            .await;

        match attached {
            Ok(session) => {
                info!(call_id = %session.call_id(), stream_id = ?tag.id(), "Media stream started");
                if let (Some(sink), Some(outbound_rx)) = (self.sink.take(), self.outbound_rx.take())
                {
                    tokio::spawn(forward_output(sink, outbound_rx, tag));
                }
                self.session = Some(session);
                Flow::Continue
            }
            Err(e) => {
                warn!(call_id, error = %e, "Media stream rejected");
                Flow::Reject
            }
        }
    }

    /// Close a socket that never got bound to a session.
    async fn close_unbound(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
    }
}

/// Write session output to the socket until the session closes it.
async fn forward_output(
    mut sink: MediaSink,
    mut outbound: mpsc::Receiver<MediaOutput>,
    tag: StreamTag,
) {
    while let Some(output) = outbound.recv().await {
        let message = match output {
            MediaOutput::Audio(audio) => OutgoingMediaMessage::media(&tag, &audio),
            MediaOutput::Clear => OutgoingMediaMessage::clear(&tag),
            MediaOutput::Close => break,
        };

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize media message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            debug!(error = %e, "Media socket write failed");
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

async fn wait_closed(session: Option<&SessionHandle>) {
    match session {
        Some(session) => session.closed().await,
        None => std::future::pending().await,
    }
}
