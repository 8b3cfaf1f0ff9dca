//! Base trait and types for upstream AI sessions.
//!
//! An upstream session is one persistent streaming connection to a
//! speech/LLM backend. Like the transcoder it is push-in / event-out: audio
//! goes in through [`BaseUpstream::send_audio`] and everything the backend
//! produces comes back, in arrival order, on the event channel handed to
//! [`BaseUpstream::open`].
//!
//! # Event guarantees
//!
//! - `Ready` at most once, after the backend acknowledged the handshake
//! - `Closed` exactly once per successful `open`, clean or not
//! - nothing after `Closed`

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::codec::AudioFormat;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur in an upstream session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider-specific error reported in-band
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// `open` was called twice
    #[error("Session already opened")]
    AlreadyOpen,

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for an upstream session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API key for authentication
    pub api_key: String,

    /// Provider name (`openai` or `gemini`)
    #[serde(default)]
    pub provider: String,

    /// Model to use; empty selects the provider default
    #[serde(default)]
    pub model: String,

    /// Voice for synthesized replies
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// WebSocket endpoint override (tests, proxies, regional endpoints)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Wire audio format override, e.g. `g711_ulaw` or `pcm16`
    #[serde(default)]
    pub audio_format: Option<String>,

    /// Response modality: `audio` (default) or `text`
    #[serde(default)]
    pub response_modality: Option<String>,
}

impl UpstreamConfig {
    /// True when the backend was asked for text replies only.
    pub fn text_only(&self) -> bool {
        self.response_modality
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("text"))
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of an upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Socket opening or handshake in flight
    Connecting,
    /// Handshake acknowledged, audio accepted
    Connected,
    /// End of input signalled, waiting for the connection to wind down
    Closing,
    /// Connection failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Caller speech
    User,
    /// Assistant speech
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Transcript produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Transcribed text; partials carry the text accumulated so far
    pub text: String,
    /// Role of the speaker
    pub role: TranscriptRole,
    /// Whether this is a final transcript
    pub is_final: bool,
}

impl TranscriptResult {
    pub fn new(role: TranscriptRole, text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            role,
            is_final,
        }
    }
}

/// Synthesized audio produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAudio {
    /// Raw audio bytes
    pub data: Bytes,
    /// Format of `data`
    pub format: AudioFormat,
}

/// Events delivered by an upstream session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Handshake acknowledged
    Ready { session_id: Option<String> },
    /// Recognized or generated text
    Transcript(TranscriptResult),
    /// Synthesized speech
    AudioReply(UpstreamAudio),
    /// Caller started speaking (barge-in)
    SpeechStarted,
    /// The backend finished a response
    ResponseDone,
    /// Non-terminal error reported by the provider
    Error(UpstreamError),
    /// Terminal event; `error` is set when the connection failed or dropped
    Closed { error: Option<UpstreamError> },
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for upstream AI sessions.
///
/// # Example
///
/// ```rust,ignore
/// use call_relay::core::upstream::{create_upstream_session, UpstreamConfig, UpstreamEvent};
///
/// let config = UpstreamConfig {
///     api_key: "sk-...".to_string(),
///     provider: "openai".to_string(),
///     ..Default::default()
/// };
///
/// let mut upstream = create_upstream_session(config)?;
/// let (tx, mut rx) = tokio::sync::mpsc::channel(64);
/// upstream.open(tx).await?;
///
/// while let Some(event) = rx.recv().await {
///     if let UpstreamEvent::Ready { .. } = event {
///         upstream.send_audio(audio_bytes.clone());
///     }
/// }
/// ```
#[async_trait]
pub trait BaseUpstream: Send + Sync {
    /// Provider name for logs.
    fn provider_name(&self) -> &'static str;

    /// Format expected by [`BaseUpstream::send_audio`].
    fn input_format(&self) -> AudioFormat;

    /// Format of [`UpstreamEvent::AudioReply`] payloads.
    fn output_format(&self) -> AudioFormat;

    /// Start connecting in the background and send the handshake.
    ///
    /// Returns once the connection task is spawned; readiness and failures
    /// arrive as events.
    async fn open(&mut self, events: mpsc::Sender<UpstreamEvent>) -> UpstreamResult<()>;

    /// Forward one chunk of audio in [`BaseUpstream::input_format`].
    ///
    /// Never blocks. Returns `false` and logs a warning when the session is not
    /// connected or its outbound queue is full.
    fn send_audio(&self, audio: Bytes) -> bool;

    /// Force end-of-utterance so the backend answers what it has.
    fn commit(&self) -> bool;

    /// Close the connection, letting an in-flight response finish first.
    /// Repeated calls are no-ops.
    async fn close(&mut self);

    /// Drop the connection immediately. `Closed` still follows.
    async fn kill(&mut self);

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// True while audio is accepted.
    fn is_ready(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }
}

/// Boxed trait object for upstream sessions.
pub type BoxedUpstream = Box<dyn BaseUpstream>;
