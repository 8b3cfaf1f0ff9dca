//! WebSocket mock of the OpenAI Realtime API.
//!
//! Speaks just enough of the protocol for the relay: acknowledges
//! `session.update` with `session.updated`, collects appended audio and
//! answers `response.create` with a transcript, one audio delta and
//! `response.done`.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Transcript the mock speaks for every response.
pub const MOCK_REPLY_TRANSCRIPT: &str = "Hello from the mock";

/// Audio the mock returns for every response.
pub const MOCK_REPLY_AUDIO: &[u8] = &[0x10, 0x20, 0x30, 0x40];

/// What the mock saw from its clients.
#[derive(Debug, Default)]
pub struct RealtimeMockState {
    /// Request URI of each accepted connection
    pub uris: Mutex<Vec<String>>,
    /// Authorization header of each connection attempt
    pub authorizations: Mutex<Vec<String>>,
    /// Every client event type, in order
    pub event_types: Mutex<Vec<String>>,
    /// `session` objects from `session.update`
    pub session_updates: Mutex<Vec<Value>>,
    /// Decoded appended audio
    pub audio: Mutex<Vec<u8>>,
    /// Client sent a close frame
    pub client_closed: Mutex<bool>,
}

impl RealtimeMockState {
    pub fn event_types(&self) -> Vec<String> {
        self.event_types.lock().clone()
    }

    pub fn audio(&self) -> Vec<u8> {
        self.audio.lock().clone()
    }

    pub fn client_closed(&self) -> bool {
        *self.client_closed.lock()
    }
}

/// Running mock server.
pub struct RealtimeMock {
    pub addr: SocketAddr,
    pub state: Arc<RealtimeMockState>,
}

impl RealtimeMock {
    /// Start a mock that accepts every connection.
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a mock that rejects the upgrade with HTTP 401.
    pub async fn start_rejecting() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(reject: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(RealtimeMockState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_state.clone(), reject));
            }
        });

        Self { addr, state }
    }

    /// Endpoint to configure as the upstream base URL.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<RealtimeMockState>, reject: bool) {
    let callback_state = state.clone();
    let callback = move |request: &Request, response: Response| {
        let auth = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        callback_state.authorizations.lock().push(auth);
        callback_state.uris.lock().push(request.uri().to_string());

        if reject {
            let mut error = ErrorResponse::new(Some("invalid api key".to_string()));
            *error.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(error);
        }
        Ok(response)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    while let Some(Ok(message)) = read.next().await {
        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Close(_) => {
                *state.client_closed.lock() = true;
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            _ => continue,
        };

        let Ok(event) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let event_type = event["type"].as_str().unwrap_or_default().to_string();
        state.event_types.lock().push(event_type.clone());

        let replies = match event_type.as_str() {
            "session.update" => {
                state.session_updates.lock().push(event["session"].clone());
                vec![json!({
                    "type": "session.updated",
                    "session": {"id": "sess_mock", "model": "gpt-4o-realtime-preview"}
                })]
            }
            "input_audio_buffer.append" => {
                if let Some(audio) = event["audio"].as_str()
                    && let Ok(bytes) = BASE64_STANDARD.decode(audio)
                {
                    state.audio.lock().extend_from_slice(&bytes);
                }
                Vec::new()
            }
            "response.create" => vec![
                json!({"type": "response.audio_transcript.delta", "delta": "Hello"}),
                json!({"type": "response.audio.delta", "delta": BASE64_STANDARD.encode(MOCK_REPLY_AUDIO)}),
                json!({"type": "response.audio_transcript.done", "transcript": MOCK_REPLY_TRANSCRIPT}),
                json!({"type": "response.done"}),
            ],
            _ => Vec::new(),
        };

        for reply in replies {
            if write
                .send(Message::Text(reply.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}
