//! Gemini Live API client implementation.
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Input: PCM 16-bit at 16 kHz, base64 in `realtimeInput.audio`
//! - Output: PCM 16-bit at 24 kHz in `serverContent.modelTurn` inline data
//!
//! The session is ready once the provider answers `setup` with `setupComplete`.

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::config::{
    GEMINI_INPUT_FORMAT, GEMINI_LIVE_URL, GEMINI_OUTPUT_FORMAT, model_resource_name,
    pcm_mime_type, rate_from_mime_type, voice_name,
};
use super::messages::{
    ClientMessage, Content, GenerationConfig, Part, PrebuiltVoiceConfig, ServerContent,
    ServerMessage, Setup, SpeechConfig, VoiceConfig,
};
use crate::core::codec::AudioFormat;
use crate::core::upstream::base::{
    BaseUpstream, ConnectionState, TranscriptResult, TranscriptRole, UpstreamAudio, UpstreamConfig,
    UpstreamError, UpstreamEvent, UpstreamResult,
};
use crate::core::upstream::connection::{
    ConnectionSpec, ServerDecoder, SharedState, WS_CHANNEL_CAPACITY, spawn_connection,
};

/// Gemini Live session.
pub struct GeminiLive {
    config: UpstreamConfig,
    model: String,
    shared: SharedState,
    ws_sender: Option<mpsc::Sender<Message>>,
    cancel: CancellationToken,
    opened: bool,
    input_mime_type: String,
}

impl GeminiLive {
    pub fn new(config: UpstreamConfig) -> UpstreamResult<Self> {
        if config.api_key.is_empty() {
            return Err(UpstreamError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = model_resource_name(&config.model);

        Ok(Self {
            config,
            model,
            shared: SharedState::default(),
            ws_sender: None,
            cancel: CancellationToken::new(),
            opened: false,
            input_mime_type: pcm_mime_type(GEMINI_INPUT_FORMAT.sample_rate),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self) -> UpstreamResult<Request> {
        let base = self.config.endpoint.as_deref().unwrap_or(GEMINI_LIVE_URL);
        let mut url =
            Url::parse(base).map_err(|e| UpstreamError::InvalidConfiguration(e.to_string()))?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        url.as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidConfiguration(e.to_string()))
    }

    fn build_setup(&self) -> Setup {
        let text_only = self.config.text_only();

        let speech_config = if text_only {
            None
        } else {
            self.config
                .voice
                .as_deref()
                .and_then(voice_name)
                .map(|voice| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                })
        };

        let system_instruction = self
            .config
            .instructions
            .as_ref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| Content {
                parts: vec![Part {
                    text: Some(text.clone()),
                    inline_data: None,
                }],
            });

        Setup {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![if text_only { "TEXT" } else { "AUDIO" }.to_string()],
                speech_config,
            },
            system_instruction,
            input_audio_transcription: Some(Default::default()),
            output_audio_transcription: (!text_only).then(Default::default),
        }
    }

    fn encode(message: &ClientMessage) -> UpstreamResult<Message> {
        serde_json::to_string(message)
            .map(|json| Message::Text(json.into()))
            .map_err(|e| UpstreamError::SerializationError(e.to_string()))
    }

    fn try_send(&self, message: &ClientMessage, what: &str) -> bool {
        if !self.shared.is_connected() {
            warn!(
                state = %self.shared.connection_state(),
                "Dropping {} for Gemini session that is not connected", what
            );
            return false;
        }

        let Some(sender) = self.ws_sender.as_ref() else {
            warn!("Dropping {} for closed Gemini session", what);
            return false;
        };

        let frame = match Self::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {}: {}", what, e);
                return false;
            }
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Gemini outbound queue full, dropping {}", what);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Gemini connection gone, dropping {}", what);
                false
            }
        }
    }
}

#[async_trait]
impl BaseUpstream for GeminiLive {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn input_format(&self) -> AudioFormat {
        GEMINI_INPUT_FORMAT
    }

    fn output_format(&self) -> AudioFormat {
        GEMINI_OUTPUT_FORMAT
    }

    async fn open(&mut self, events: mpsc::Sender<UpstreamEvent>) -> UpstreamResult<()> {
        if self.opened {
            return Err(UpstreamError::AlreadyOpen);
        }

        let request = self.build_request()?;
        let handshake = vec![Self::encode(&ClientMessage::Setup(self.build_setup()))?];

        let (tx, rx) = mpsc::channel::<Message>(WS_CHANNEL_CAPACITY);
        self.ws_sender = Some(tx);
        self.opened = true;

        debug!(model = %self.model, "Opening Gemini Live session");

        spawn_connection(
            ConnectionSpec {
                provider: "gemini",
                request,
                handshake,
                decoder: GeminiDecoder::default(),
            },
            self.shared.clone(),
            rx,
            events,
            self.cancel.clone(),
        );

        Ok(())
    }

    fn send_audio(&self, audio: Bytes) -> bool {
        self.try_send(
            &ClientMessage::audio(&audio, self.input_mime_type.clone()),
            "audio",
        )
    }

    fn commit(&self) -> bool {
        self.shared
            .awaiting_response
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let committed = self.try_send(&ClientMessage::audio_stream_end(), "audio stream end");
        if !committed {
            self.shared
                .awaiting_response
                .store(false, std::sync::atomic::Ordering::SeqCst);
        }
        committed
    }

    async fn close(&mut self) {
        if self.ws_sender.take().is_some() {
            debug!("Closing Gemini Live session");
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

impl Drop for GeminiLive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Server Message Decoding
// =============================================================================

/// Maps Gemini server messages onto upstream events.
///
/// Gemini streams transcription fragments without a "done" marker, so both
/// sides accumulate until `turnComplete` and are then emitted as finals.
#[derive(Default)]
struct GeminiDecoder {
    user_transcript: String,
    assistant_transcript: String,
}

impl GeminiDecoder {
    fn handle_server_content(&mut self, content: ServerContent, out: &mut Vec<UpstreamEvent>) {
        if content.interrupted {
            debug!("Gemini generation interrupted by caller speech");
            out.push(UpstreamEvent::SpeechStarted);
        }

        if let Some(transcription) = content.input_transcription
            && !transcription.text.is_empty()
        {
            self.user_transcript.push_str(&transcription.text);
            out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                TranscriptRole::User,
                self.user_transcript.trim(),
                false,
            )));
        }

        for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
            if let Some(blob) = part.inline_data {
                match BASE64_STANDARD.decode(&blob.data) {
                    Ok(audio) => {
                        let rate = rate_from_mime_type(&blob.mime_type)
                            .unwrap_or(GEMINI_OUTPUT_FORMAT.sample_rate);
                        out.push(UpstreamEvent::AudioReply(UpstreamAudio {
                            data: Bytes::from(audio),
                            format: AudioFormat::pcm16(rate),
                        }));
                    }
                    Err(e) => warn!("Failed to decode Gemini inline audio: {}", e),
                }
            }
            if let Some(text) = part.text {
                self.push_assistant(&text, out);
            }
        }

        if let Some(transcription) = content.output_transcription
            && !transcription.text.is_empty()
        {
            self.push_assistant(&transcription.text, out);
        }

        if content.turn_complete {
            let user = std::mem::take(&mut self.user_transcript);
            if !user.trim().is_empty() {
                out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                    TranscriptRole::User,
                    user.trim(),
                    true,
                )));
            }
            let assistant = std::mem::take(&mut self.assistant_transcript);
            if !assistant.trim().is_empty() {
                out.push(UpstreamEvent::Transcript(TranscriptResult::new(
                    TranscriptRole::Assistant,
                    assistant.trim(),
                    true,
                )));
            }
            out.push(UpstreamEvent::ResponseDone);
        }
    }

    fn push_assistant(&mut self, text: &str, out: &mut Vec<UpstreamEvent>) {
        self.assistant_transcript.push_str(text);
        out.push(UpstreamEvent::Transcript(TranscriptResult::new(
            TranscriptRole::Assistant,
            self.assistant_transcript.trim(),
            false,
        )));
    }
}

impl ServerDecoder for GeminiDecoder {
    fn decode(&mut self, payload: &str, out: &mut Vec<UpstreamEvent>) {
        let message = match serde_json::from_str::<ServerMessage>(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse Gemini server message: {}", e);
                return;
            }
        };

        if message.setup_complete.is_some() {
            out.push(UpstreamEvent::Ready { session_id: None });
        }
        if let Some(content) = message.server_content {
            self.handle_server_content(content, out);
        }
        if let Some(go_away) = message.go_away {
            warn!(time_left = ?go_away.time_left, "Gemini announced connection shutdown");
        }
    }
}
