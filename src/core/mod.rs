pub mod call_id;
pub mod codec;
pub mod registry;
pub mod relay;
pub mod session;
pub mod transcoder;
pub mod tts;
pub mod upstream;

// Re-export commonly used types for convenience
pub use call_id::{CallId, CallIdError};

pub use codec::{AudioEncoding, AudioFormat, AudioFrame, FormatConverter};

pub use registry::{Registration, SessionRegistry};

pub use relay::{CallRelay, Initiation, RelaySettings};

pub use session::{
    CallState, ConfiguredFactory, MediaLink, MediaOutput, SessionError, SessionFactory,
    SessionHandle, SessionResult, SessionSettings, StopReason,
};

pub use transcoder::{
    BoxedTranscoder, PipelineState, Transcoder, TranscoderBackend, TranscoderError,
    TranscoderEvent, TranscoderResult, create_transcoder, get_supported_transcoder_backends,
};

pub use tts::{
    SharedSynthesizer, SpeechSynthesizer, SynthesizedSpeech, TTSConfig, TTSError,
    create_tts_provider,
};

pub use upstream::{
    BaseUpstream, BoxedUpstream, ConnectionState, TranscriptResult, TranscriptRole,
    UpstreamAudio, UpstreamConfig, UpstreamError, UpstreamEvent, UpstreamProvider,
    UpstreamResult, create_upstream_session, get_supported_upstream_providers,
};
