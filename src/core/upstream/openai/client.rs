//! OpenAI Realtime API client implementation.
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: `pcm16` (24 kHz) or `g711_ulaw` (8 kHz), base64 encoded
//!
//! The session is ready once the provider acknowledges our `session.update`
//! with `session.updated`.

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::{
    OPENAI_REALTIME_DEFAULT_MODEL, OPENAI_REALTIME_URL, OPENAI_TRANSCRIPTION_MODEL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice,
};
use super::messages::{
    ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection,
};
use crate::core::codec::AudioFormat;
use crate::core::upstream::base::{
    BaseUpstream, ConnectionState, TranscriptResult, TranscriptRole, UpstreamAudio, UpstreamConfig,
    UpstreamError, UpstreamEvent, UpstreamResult,
};
use crate::core::upstream::connection::{
    ConnectionSpec, ServerDecoder, SharedState, WS_CHANNEL_CAPACITY, spawn_connection,
};

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API session.
pub struct OpenAIRealtime {
    config: UpstreamConfig,
    model: String,
    voice: OpenAIRealtimeVoice,
    audio_format: OpenAIRealtimeAudioFormat,
    shared: SharedState,
    /// Outbound frame channel, `None` before open and after close
    ws_sender: Option<mpsc::Sender<Message>>,
    cancel: CancellationToken,
    opened: bool,
}

impl OpenAIRealtime {
    pub fn new(config: UpstreamConfig) -> UpstreamResult<Self> {
        if config.api_key.is_empty() {
            return Err(UpstreamError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = if config.model.trim().is_empty() {
            OPENAI_REALTIME_DEFAULT_MODEL.to_string()
        } else {
            config.model.trim().to_string()
        };

        let voice = config
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();

        let audio_format = config
            .audio_format
            .as_deref()
            .map(OpenAIRealtimeAudioFormat::from_str_or_default)
            .unwrap_or_default();

        Ok(Self {
            config,
            model,
            voice,
            audio_format,
            shared: SharedState::default(),
            ws_sender: None,
            cancel: CancellationToken::new(),
            opened: false,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    pub fn audio_format(&self) -> OpenAIRealtimeAudioFormat {
        self.audio_format
    }

    /// Build the WebSocket URL with model parameter.
    fn build_ws_url(&self) -> String {
        let base = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(OPENAI_REALTIME_URL);
        format!("{}?model={}", base, self.model)
    }

    fn build_request(&self) -> UpstreamResult<Request> {
        let mut request = self
            .build_ws_url()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidConfiguration(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| UpstreamError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        Ok(request)
    }

    /// Build the initial session configuration.
    fn build_session_config(&self) -> SessionConfig {
        let modalities = if self.config.text_only() {
            vec!["text".to_string()]
        } else {
            vec!["text".to_string(), "audio".to_string()]
        };

        SessionConfig {
            modalities: Some(modalities),
            voice: Some(self.voice.as_str().to_string()),
            instructions: self.config.instructions.clone(),
            input_audio_format: Some(self.audio_format.as_str().to_string()),
            output_audio_format: Some(self.audio_format.as_str().to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: OPENAI_TRANSCRIPTION_MODEL.to_string(),
            }),
            turn_detection: Some(TurnDetection::default()),
        }
    }

    fn encode(event: &ClientEvent) -> UpstreamResult<Message> {
        serde_json::to_string(event)
            .map(|json| Message::Text(json.into()))
            .map_err(|e| UpstreamError::SerializationError(e.to_string()))
    }

    fn try_send(&self, event: &ClientEvent, what: &str) -> bool {
        if !self.shared.is_connected() {
            warn!(
                state = %self.shared.connection_state(),
                "Dropping {} for OpenAI session that is not connected", what
            );
            return false;
        }

        let Some(sender) = self.ws_sender.as_ref() else {
            warn!("Dropping {} for closed OpenAI session", what);
            return false;
        };

        let frame = match Self::encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {}: {}", what, e);
                return false;
            }
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("OpenAI outbound queue full, dropping {}", what);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("OpenAI connection gone, dropping {}", what);
                false
            }
        }
    }
}

#[async_trait]
impl BaseUpstream for OpenAIRealtime {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn input_format(&self) -> AudioFormat {
        self.audio_format.audio_format()
    }

    fn output_format(&self) -> AudioFormat {
        self.audio_format.audio_format()
    }

    async fn open(&mut self, events: mpsc::Sender<UpstreamEvent>) -> UpstreamResult<()> {
        if self.opened {
            return Err(UpstreamError::AlreadyOpen);
        }

        let request = self.build_request()?;
        let handshake = vec![Self::encode(&ClientEvent::SessionUpdate {
            session: self.build_session_config(),
        })?];

        let (tx, rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        self.ws_sender = Some(tx);
        self.opened = true;

        debug!(model = %self.model, format = %self.audio_format, "Opening OpenAI Realtime session");

        spawn_connection(
            ConnectionSpec {
                provider: "openai",
                request,
                handshake,
                decoder: OpenAIDecoder::new(self.audio_format.audio_format()),
            },
            self.shared.clone(),
            rx,
            events,
            self.cancel.clone(),
        );

        Ok(())
    }

    fn send_audio(&self, audio: Bytes) -> bool {
        self.try_send(&ClientEvent::audio_append(&audio), "audio")
    }

    fn commit(&self) -> bool {
        self.shared
            .awaiting_response
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let committed = self.try_send(&ClientEvent::InputAudioBufferCommit, "commit")
            && self.try_send(&ClientEvent::ResponseCreate, "response request");
        if !committed {
            self.shared
                .awaiting_response
                .store(false, std::sync::atomic::Ordering::SeqCst);
        }
        committed
    }

    async fn close(&mut self) {
        // Dropping the sender tells the connection task to wind down
        if self.ws_sender.take().is_some() {
            debug!("Closing OpenAI Realtime session");
        }
    }

    async fn kill(&mut self) {
        self.ws_sender = None;
        self.cancel.cancel();
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Server Event Decoding
// =============================================================================

/// Maps OpenAI server events onto upstream events.
struct OpenAIDecoder {
    output_format: AudioFormat,
    /// Accumulated transcript for the assistant response in progress
    assistant_transcript: String,
}

impl OpenAIDecoder {
    fn new(output_format: AudioFormat) -> Self {
        Self {
            output_format,
            assistant_transcript: String::new(),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent, out: &mut Vec<UpstreamEvent>) {
        match event {
            ServerEvent::SessionCreated { session } => {
                debug!("OpenAI Realtime session created: {}", session.id);
            }

            ServerEvent::SessionUpdated { session } => {
                let session_id = (!session.id.is_empty()).then_some(session.id);
                out.push(UpstreamEvent::Ready { session_id });
            }

            ServerEvent::Error { error } => {
                warn!(
                    "OpenAI Realtime error: {} - {}",
                    error.error_type, error.message
                );
                out.push(UpstreamEvent::Error(UpstreamError::ProviderError(format!(
                    "{}: {}",
                    error.error_type, error.message
                ))));
            }

            ServerEvent::SpeechStarted { audio_start_ms } => {
                debug!("Speech started at {}ms", audio_start_ms);
                out.push(UpstreamEvent::SpeechStarted);
            }

            ServerEvent::TranscriptionCompleted { transcript } => {
                out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                    TranscriptRole::User,
                    transcript.trim(),
                    true,
                )));
            }

            ServerEvent::AudioTranscriptDelta { delta } | ServerEvent::TextDelta { delta } => {
                self.assistant_transcript.push_str(&delta);
                out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                    TranscriptRole::Assistant,
                    self.assistant_transcript.clone(),
                    false,
                )));
            }

            ServerEvent::AudioTranscriptDone { transcript }
            | ServerEvent::TextDone { text: transcript } => {
                self.assistant_transcript.clear();
                out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                    TranscriptRole::Assistant,
                    transcript,
                    true,
                )));
            }

            ServerEvent::AudioDelta { delta } => match BASE64_STANDARD.decode(&delta) {
                Ok(audio) => out.push(UpstreamEvent::AudioReply(UpstreamAudio {
                    data: Bytes::from(audio),
                    format: self.output_format,
                })),
                Err(e) => warn!("Failed to decode audio delta: {}", e),
            },

            ServerEvent::ResponseDone => {
                self.assistant_transcript.clear();
                out.push(UpstreamEvent::ResponseDone);
            }

            ServerEvent::Other => trace!("Unhandled OpenAI server event"),
        }
    }
}

impl ServerDecoder for OpenAIDecoder {
    fn decode(&mut self, payload: &str, out: &mut Vec<UpstreamEvent>) {
        match serde_json::from_str::<ServerEvent>(payload) {
            Ok(event) => self.handle_server_event(event, out),
            Err(e) => warn!("Failed to parse OpenAI server event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(decoder: &mut OpenAIDecoder, json: &str) -> Vec<UpstreamEvent> {
        let mut out = Vec::new();
        decoder.decode(json, &mut out);
        out
    }

    fn config() -> UpstreamConfig {
        UpstreamConfig {
            api_key: "sk-test".to_string(),
            provider: "openai".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            OpenAIRealtime::new(UpstreamConfig::default()),
            Err(UpstreamError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let client = OpenAIRealtime::new(config()).unwrap();
        assert_eq!(client.model(), OPENAI_REALTIME_DEFAULT_MODEL);
        assert_eq!(client.voice(), OpenAIRealtimeVoice::Alloy);
        assert_eq!(client.input_format(), AudioFormat::pcm16(24000));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(!client.send_audio(Bytes::from_static(&[0; 4])));
    }

    #[test]
    fn test_g711_passthrough_format() {
        let client = OpenAIRealtime::new(UpstreamConfig {
            audio_format: Some("g711_ulaw".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(client.input_format(), AudioFormat::TELEPHONY);
        let session = client.build_session_config();
        assert_eq!(session.input_audio_format.as_deref(), Some("g711_ulaw"));
    }

    #[test]
    fn test_text_only_modalities() {
        let client = OpenAIRealtime::new(UpstreamConfig {
            response_modality: Some("text".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(
            client.build_session_config().modalities,
            Some(vec!["text".to_string()])
        );
    }

    #[test]
    fn test_url_uses_endpoint_override() {
        let client = OpenAIRealtime::new(UpstreamConfig {
            endpoint: Some("ws://127.0.0.1:9000/v1/realtime".to_string()),
            model: "gpt-4o-mini-realtime-preview".to_string(),
            ..config()
        })
        .unwrap();
        assert_eq!(
            client.build_ws_url(),
            "ws://127.0.0.1:9000/v1/realtime?model=gpt-4o-mini-realtime-preview"
        );
        let request = client.build_request().unwrap();
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
    }

    #[test]
    fn test_decoder_ready_on_session_updated() {
        let mut decoder = OpenAIDecoder::new(AudioFormat::pcm16(24000));
        let created = r#"{"type":"session.created","session":{"id":"s1"}}"#;
        assert!(decode(&mut decoder, created).is_empty());
        assert_eq!(
            decode(&mut decoder, r#"{"type":"session.updated","session":{"id":"s1"}}"#),
            vec![UpstreamEvent::Ready {
                session_id: Some("s1".to_string())
            }]
        );
    }

    #[test]
    fn test_decoder_accumulates_assistant_transcript() {
        let mut decoder = OpenAIDecoder::new(AudioFormat::pcm16(24000));
        decode(&mut decoder, r#"{"type":"response.audio_transcript.delta","delta":"Hel"}"#);
        let events = decode(
            &mut decoder,
            r#"{"type":"response.audio_transcript.delta","delta":"lo"}"#,
        );
        assert_eq!(
            events,
            vec![UpstreamEvent::Transcript(TranscriptResult::new(
                TranscriptRole::Assistant,
                "Hello",
                false
            ))]
        );

        let events = decode(
            &mut decoder,
            r#"{"type":"response.audio_transcript.done","transcript":"Hello"}"#,
        );
        assert_eq!(
            events,
            vec![UpstreamEvent::Transcript(TranscriptResult::new(
                TranscriptRole::Assistant,
                "Hello",
                true
            ))]
        );
    }

    #[test]
    fn test_decoder_audio_and_barge_in() {
        let mut decoder = OpenAIDecoder::new(AudioFormat::TELEPHONY);
        let events = decode(&mut decoder, r#"{"type":"response.audio.delta","delta":"/38="}"#);
        assert_eq!(
            events,
            vec![UpstreamEvent::AudioReply(UpstreamAudio {
                data: Bytes::from_static(&[0xFF, 0x7F]),
                format: AudioFormat::TELEPHONY,
            })]
        );

        let events = decode(
            &mut decoder,
            r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120,"item_id":"x"}"#,
        );
        assert_eq!(events, vec![UpstreamEvent::SpeechStarted]);
    }

    #[test]
    fn test_decoder_errors_and_garbage() {
        let mut decoder = OpenAIDecoder::new(AudioFormat::pcm16(24000));
        let events = decode(
            &mut decoder,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"buffer empty"}}"#,
        );
        assert!(matches!(
            &events[..],
            [UpstreamEvent::Error(UpstreamError::ProviderError(msg))] if msg.contains("buffer empty")
        ));

        assert!(decode(&mut decoder, "not json").is_empty());
        assert!(decode(&mut decoder, r#"{"type":"response.created","response":{}}"#).is_empty());
    }
}
