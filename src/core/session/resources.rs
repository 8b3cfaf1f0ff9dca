//! Per-call resource construction.

use crate::core::CallId;
use crate::core::codec::AudioFormat;
use crate::core::transcoder::{
    BoxedTranscoder, TranscoderBackend, TranscoderResult, create_transcoder,
};
use crate::core::tts::SharedSynthesizer;
use crate::core::upstream::{
    BoxedUpstream, UpstreamConfig, UpstreamResult, create_upstream_session,
};

/// Builds the transcoder and upstream session for each call.
///
/// Sessions never construct resources themselves, so tests can swap in
/// scripted doubles.
pub trait SessionFactory: Send + Sync {
    /// New, unopened upstream session for `call_id`.
    fn create_upstream(&self, call_id: &CallId) -> UpstreamResult<BoxedUpstream>;

    /// New, unstarted transcoder from `input` to `output`.
    ///
    /// `backlog` is the most audio the session may push in one burst when it
    /// flushes queued frames; the transcoder must accept that many chunks.
    fn create_transcoder(
        &self,
        input: AudioFormat,
        output: AudioFormat,
        backlog: usize,
    ) -> TranscoderResult<BoxedTranscoder>;

    /// Synthesizer for speaking text-only replies, if configured.
    fn synthesizer(&self) -> Option<SharedSynthesizer> {
        None
    }
}

/// Factory driven by server configuration.
#[derive(Clone)]
pub struct ConfiguredFactory {
    upstream: UpstreamConfig,
    transcoder_backend: TranscoderBackend,
    ffmpeg_path: String,
    synthesizer: Option<SharedSynthesizer>,
}

impl ConfiguredFactory {
    pub fn new(
        upstream: UpstreamConfig,
        transcoder_backend: TranscoderBackend,
        ffmpeg_path: impl Into<String>,
    ) -> Self {
        Self {
            upstream,
            transcoder_backend,
            ffmpeg_path: ffmpeg_path.into(),
            synthesizer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: SharedSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn upstream_config(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn transcoder_backend(&self) -> TranscoderBackend {
        self.transcoder_backend
    }
}

impl std::fmt::Debug for ConfiguredFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredFactory")
            .field("provider", &self.upstream.provider)
            .field("model", &self.upstream.model)
            .field("transcoder_backend", &self.transcoder_backend)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("synthesizer", &self.synthesizer.is_some())
            .finish()
    }
}

impl SessionFactory for ConfiguredFactory {
    fn create_upstream(&self, _call_id: &CallId) -> UpstreamResult<BoxedUpstream> {
        create_upstream_session(self.upstream.clone())
    }

    fn create_transcoder(
        &self,
        input: AudioFormat,
        output: AudioFormat,
        backlog: usize,
    ) -> TranscoderResult<BoxedTranscoder> {
        create_transcoder(
            self.transcoder_backend,
            input,
            output,
            &self.ffmpeg_path,
            backlog,
        )
    }

    fn synthesizer(&self) -> Option<SharedSynthesizer> {
        self.synthesizer.clone()
    }
}
