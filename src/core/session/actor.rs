//! Call session actor.
//!
//! One task per call. The actor owns the call's media link, transcoder and
//! upstream session, and is the only code that changes the call's state. It
//! never blocks on its resources: audio goes in with non-blocking pushes and
//! everything comes back as events on bounded channels.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::resources::SessionFactory;
use super::{
    CallState, MediaLink, MediaOutput, PendingAudio, SESSION_COMMAND_CAPACITY, SessionCommand,
    SessionError, SessionHandle,
};
use crate::core::CallId;
use crate::core::codec::{AudioFormat, FormatConverter, TELEPHONY_FRAME_MS};
use crate::core::registry::SessionRegistry;
use crate::core::transcoder::{BoxedTranscoder, TranscoderEvent};
use crate::core::tts::{SharedSynthesizer, SynthesizedSpeech};
use crate::core::upstream::{BoxedUpstream, TranscriptResult, TranscriptRole, UpstreamEvent};
use crate::telephony::SharedCallControl;

/// Default bound of the pre-readiness audio queue (5 s of 20 ms frames).
pub const DEFAULT_PENDING_AUDIO_CAPACITY: usize = 250;

/// Default time resources get to acknowledge closure before being killed.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(5000);

/// Capacity of each resource event channel.
const RESOURCE_EVENT_CAPACITY: usize = 256;

/// Capacity of the per-call speech synthesis queue.
const SPEECH_QUEUE_CAPACITY: usize = 16;

/// Per-session behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Bound of the pre-readiness audio queue
    pub pending_audio_capacity: usize,
    /// Inject silence after this long without caller audio
    pub keepalive_interval: Option<Duration>,
    /// Time resources get to close before being killed
    pub drain_timeout: Duration,
    /// Speak final assistant transcripts through the synthesizer
    pub synthesize_transcripts: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pending_audio_capacity: DEFAULT_PENDING_AUDIO_CAPACITY,
            keepalive_interval: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            synthesize_transcripts: false,
        }
    }
}

/// Actor owning one call.
pub struct CallActor {
    call_id: CallId,
    instance_id: Uuid,
    settings: SessionSettings,
    factory: Arc<dyn SessionFactory>,
    control: SharedCallControl,
    registry: Arc<SessionRegistry>,

    commands: mpsc::Receiver<SessionCommand>,
    commands_open: bool,
    state: CallState,
    state_tx: watch::Sender<CallState>,

    pending: PendingAudio,
    media: Option<MediaLink>,
    last_audio: Instant,

    transcoder: Option<BoxedTranscoder>,
    transcoder_rx: Option<mpsc::Receiver<TranscoderEvent>>,
    transcoder_ready: bool,
    /// No `Closed` outstanding from the transcoder
    transcoder_closed: bool,

    upstream: Option<BoxedUpstream>,
    upstream_rx: Option<mpsc::Receiver<UpstreamEvent>>,
    upstream_ready: bool,
    /// No `Closed` outstanding from the upstream
    upstream_closed: bool,
    upstream_close_requested: bool,

    reply_converter: Option<FormatConverter>,
    speech_converter: Option<FormatConverter>,
    user_partial: Option<String>,
    assistant_partial: Option<String>,
    speech_tx: Option<mpsc::Sender<String>>,
    speech_rx: Option<mpsc::Receiver<SynthesizedSpeech>>,

    drain_deadline: Option<Instant>,
    killed: bool,
}

impl CallActor {
    /// Spawn the actor for a freshly registered call and return its handle.
    ///
    /// The actor answers the call through `control` first, then waits for a
    /// media socket. On terminal close it removes itself from `registry`.
    pub fn spawn(
        call_id: CallId,
        settings: SessionSettings,
        factory: Arc<dyn SessionFactory>,
        control: SharedCallControl,
        registry: Arc<SessionRegistry>,
    ) -> SessionHandle {
        let instance_id = Uuid::new_v4();
        let (command_tx, commands) = mpsc::channel(SESSION_COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(CallState::Initiated);

        let actor = CallActor {
            call_id: call_id.clone(),
            instance_id,
            pending: PendingAudio::new(settings.pending_audio_capacity),
            settings,
            factory,
            control,
            registry: registry.clone(),
            commands,
            commands_open: true,
            state: CallState::Initiated,
            state_tx,
            media: None,
            last_audio: Instant::now(),
            transcoder: None,
            transcoder_rx: None,
            transcoder_ready: false,
            transcoder_closed: true,
            upstream: None,
            upstream_rx: None,
            upstream_ready: false,
            upstream_closed: true,
            upstream_close_requested: false,
            reply_converter: None,
            speech_converter: None,
            user_partial: None,
            assistant_partial: None,
            speech_tx: None,
            speech_rx: None,
            drain_deadline: None,
            killed: false,
        };

        let task = tokio::spawn(actor.run());

        // A panicking actor must not leave a stale registry entry behind
        let supervised_id = call_id.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await
                && e.is_panic()
            {
                error!(call_id = %supervised_id, "Call session panicked");
                registry.remove(&supervised_id, instance_id);
            }
        });

        SessionHandle::new(call_id, instance_id, command_tx, state_rx)
    }

    async fn run(mut self) {
        info!(call_id = %self.call_id, instance_id = %self.instance_id, "Call session started");

        self.answer().await;
        self.maybe_finish().await;

        let mut keepalive = self.settings.keepalive_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        while self.state != CallState::Closed {
            tokio::select! {
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.commands_open = false;
                        self.begin_drain("all handles dropped").await;
                    }
                },

                event = recv_opt(&mut self.transcoder_rx) => match event {
                    Some(event) => self.handle_transcoder_event(event).await,
                    None => {
                        self.transcoder_rx = None;
                        self.handle_transcoder_event(TranscoderEvent::Closed { error: None }).await;
                    }
                },

                event = recv_opt(&mut self.upstream_rx) => match event {
                    Some(event) => self.handle_upstream_event(event).await,
                    None => {
                        self.upstream_rx = None;
                        self.handle_upstream_event(UpstreamEvent::Closed { error: None }).await;
                    }
                },

                speech = recv_opt(&mut self.speech_rx) => match speech {
                    Some(speech) => self.forward_speech(speech).await,
                    None => self.speech_rx = None,
                },

                _ = tick_opt(&mut keepalive), if self.state == CallState::Streaming => {
                    self.send_keepalive();
                }

                _ = sleep_until_opt(self.drain_deadline) => self.on_drain_timeout().await,
            }

            self.maybe_finish().await;
        }

        info!(call_id = %self.call_id, instance_id = %self.instance_id, "Call session closed");
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn answer(&mut self) {
        let carrier = self.control.name();

        if let Err(e) = self.control.answer(&self.call_id).await {
            error!(call_id = %self.call_id, carrier, error = %e, "Failed to answer call");
            self.begin_drain("answer failed").await;
            return;
        }

        if let Err(e) = self.control.start_stream(&self.call_id).await {
            error!(call_id = %self.call_id, carrier, error = %e, "Failed to start media stream");
            self.begin_drain("stream start failed").await;
            return;
        }

        self.transition(CallState::Answered);
    }

    fn transition(&mut self, next: CallState) {
        if !self.state.can_transition_to(next) {
            warn!(
                call_id = %self.call_id,
                from = %self.state,
                to = %next,
                "Ignoring invalid state transition"
            );
            return;
        }

        debug!(call_id = %self.call_id, from = %self.state, to = %next, "Call state changed");
        self.state = next;
        self.state_tx.send_replace(next);
    }

    async fn begin_drain(&mut self, reason: &str) {
        if self.state.is_terminating() {
            debug!(call_id = %self.call_id, reason, "Session already draining");
            return;
        }

        info!(call_id = %self.call_id, from = %self.state, reason, "Draining call session");
        self.transition(CallState::Draining);

        self.flush_partial_transcripts();

        let discarded = self.pending.discard();
        if discarded > 0 {
            warn!(call_id = %self.call_id, frames = discarded, "Discarded audio that never reached the transcoder");
        }

        // Closing the queue lets the worker finish what it already accepted
        self.speech_tx = None;
        self.drain_deadline = Some(Instant::now() + self.settings.drain_timeout);

        if !self.transcoder_closed
            && let Some(transcoder) = self.transcoder.as_mut()
        {
            transcoder.stop().await;
        } else {
            self.close_upstream().await;
        }
    }

    /// Signal end of input and close the upstream, once.
    async fn close_upstream(&mut self) {
        if self.upstream_close_requested || self.upstream_closed {
            return;
        }
        self.upstream_close_requested = true;

        if let Some(upstream) = self.upstream.as_mut() {
            if upstream.is_ready() {
                upstream.commit();
            }
            upstream.close().await;
        }
    }

    async fn on_drain_timeout(&mut self) {
        self.drain_deadline = None;

        if !self.killed {
            self.killed = true;
            warn!(
                call_id = %self.call_id,
                transcoder_closed = self.transcoder_closed,
                upstream_closed = self.upstream_closed,
                "Drain timed out, killing resources"
            );

            if !self.transcoder_closed
                && let Some(transcoder) = self.transcoder.as_mut()
            {
                transcoder.kill().await;
            }
            if !self.upstream_closed
                && let Some(upstream) = self.upstream.as_mut()
            {
                upstream.kill().await;
            }
            self.drain_deadline = Some(Instant::now() + self.settings.drain_timeout);
        } else {
            error!(call_id = %self.call_id, "Resources never acknowledged closure, abandoning them");
            self.transcoder_closed = true;
            self.upstream_closed = true;
        }
    }

    async fn maybe_finish(&mut self) {
        if self.state != CallState::Draining || !self.transcoder_closed || !self.upstream_closed {
            return;
        }

        self.transition(CallState::Closed);
        self.drain_deadline = None;
        self.send_media(MediaOutput::Close).await;
        self.media = None;

        if !self.registry.remove(&self.call_id, self.instance_id) {
            debug!(call_id = %self.call_id, "Session was no longer registered");
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Attach { link, reply } => {
                let result = self.attach(link).await;
                if reply.send(result).is_err() {
                    debug!(call_id = %self.call_id, "Attach requester went away");
                }
            }
            SessionCommand::Media(frame) => {
                if self.state == CallState::Streaming {
                    self.last_audio = Instant::now();
                    if let Some(transcoder) = self.transcoder.as_ref() {
                        transcoder.push(frame.data);
                    }
                } else if self.state.buffers_audio() {
                    self.pending.push(frame);
                } else {
                    trace!(call_id = %self.call_id, sequence = frame.sequence, "Discarding audio after drain");
                }
            }
            SessionCommand::Stop(reason) => {
                let reason = reason.to_string();
                self.begin_drain(&reason).await;
            }
        }
    }

    async fn attach(&mut self, link: MediaLink) -> Result<(), SessionError> {
        if self.state.is_terminating() {
            return Err(SessionError::Closed(self.call_id.to_string()));
        }
        if self.media.is_some() {
            warn!(call_id = %self.call_id, "Rejecting second media stream for call");
            return Err(SessionError::AlreadyAttached(self.call_id.to_string()));
        }

        info!(call_id = %self.call_id, stream_id = ?link.stream_id, "Media stream attached");
        self.media = Some(link);
        self.open_resources().await;
        Ok(())
    }

    /// Create and start the transcoder and upstream concurrently.
    async fn open_resources(&mut self) {
        let mut upstream = match self.factory.create_upstream(&self.call_id) {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(call_id = %self.call_id, error = %e, "Failed to create upstream session");
                self.begin_drain("upstream setup failed").await;
                return;
            }
        };

        let mut transcoder = match self.factory.create_transcoder(
            AudioFormat::TELEPHONY,
            upstream.input_format(),
            self.pending.capacity(),
        ) {
            Ok(transcoder) => transcoder,
            Err(e) => {
                error!(call_id = %self.call_id, error = %e, "Failed to create transcoder");
                self.begin_drain("transcoder setup failed").await;
                return;
            }
        };

        info!(
            call_id = %self.call_id,
            provider = upstream.provider_name(),
            transcoder = transcoder.name(),
            upstream_input = %upstream.input_format(),
            upstream_output = %upstream.output_format(),
            "Opening call resources"
        );

        let (upstream_tx, upstream_rx) = mpsc::channel(RESOURCE_EVENT_CAPACITY);
        let (transcoder_tx, transcoder_rx) = mpsc::channel(RESOURCE_EVENT_CAPACITY);
        let (upstream_result, transcoder_result) =
            tokio::join!(upstream.open(upstream_tx), transcoder.start(transcoder_tx));

        self.reply_converter = Some(FormatConverter::new(
            upstream.output_format(),
            AudioFormat::TELEPHONY,
        ));

        let mut failure = None;
        match upstream_result {
            Ok(()) => {
                self.upstream_closed = false;
                self.upstream_rx = Some(upstream_rx);
            }
            Err(e) => {
                error!(call_id = %self.call_id, error = %e, "Failed to open upstream session");
                failure = Some("upstream open failed");
            }
        }
        match transcoder_result {
            Ok(()) => {
                self.transcoder_closed = false;
                self.transcoder_rx = Some(transcoder_rx);
            }
            Err(e) => {
                error!(call_id = %self.call_id, error = %e, "Failed to start transcoder");
                failure = Some("transcoder start failed");
            }
        }

        self.upstream = Some(upstream);
        self.transcoder = Some(transcoder);

        if self.settings.synthesize_transcripts
            && let Some(synthesizer) = self.factory.synthesizer()
        {
            let (speech_tx, speech_rx) = spawn_speech_worker(synthesizer, self.call_id.clone());
            self.speech_tx = Some(speech_tx);
            self.speech_rx = Some(speech_rx);
        }

        if let Some(reason) = failure {
            self.begin_drain(reason).await;
        }
    }

    /// Enter `Streaming` once both resources are ready, flushing queued audio.
    fn check_ready(&mut self) {
        if self.state != CallState::Answered || !self.transcoder_ready || !self.upstream_ready {
            return;
        }

        self.transition(CallState::Streaming);
        self.last_audio = Instant::now();

        let frames = self.pending.take_all();
        let dropped = self.pending.dropped();
        if let Some(transcoder) = self.transcoder.as_ref() {
            for frame in &frames {
                transcoder.push(frame.data.clone());
            }
        }

        info!(
            call_id = %self.call_id,
            flushed = frames.len(),
            dropped,
            first_sequence = ?frames.first().map(|f| f.sequence),
            "Call streaming"
        );
    }

    // =========================================================================
    // Resource events
    // =========================================================================

    async fn handle_transcoder_event(&mut self, event: TranscoderEvent) {
        match event {
            TranscoderEvent::Ready => {
                debug!(call_id = %self.call_id, "Transcoder ready");
                self.transcoder_ready = true;
                self.check_ready();
            }
            TranscoderEvent::Chunk(chunk) => {
                if let Some(upstream) = self.upstream.as_ref() {
                    upstream.send_audio(chunk);
                }
            }
            TranscoderEvent::Closed { error } => {
                if self.transcoder_closed {
                    return;
                }
                self.transcoder_closed = true;
                self.transcoder_rx = None;

                match &error {
                    Some(e) => error!(call_id = %self.call_id, error = %e, "Transcoder failed"),
                    None => debug!(call_id = %self.call_id, "Transcoder closed"),
                }

                if self.state.is_terminating() {
                    self.close_upstream().await;
                } else {
                    self.begin_drain("transcoder closed").await;
                }
            }
        }
    }

    async fn handle_upstream_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Ready { session_id } => {
                info!(call_id = %self.call_id, session_id = ?session_id, "Upstream session ready");
                self.upstream_ready = true;
                self.check_ready();
            }
            UpstreamEvent::Transcript(transcript) => self.handle_transcript(transcript),
            UpstreamEvent::AudioReply(audio) => {
                let out = convert_for_caller(&mut self.reply_converter, &audio.data, audio.format);
                if !out.is_empty() {
                    self.send_media(MediaOutput::Audio(out)).await;
                }
            }
            UpstreamEvent::SpeechStarted => {
                debug!(call_id = %self.call_id, "Caller barged in, clearing playback");
                self.send_media(MediaOutput::Clear).await;
            }
            UpstreamEvent::ResponseDone => {
                debug!(call_id = %self.call_id, "Upstream response done");
            }
            UpstreamEvent::Error(e) => {
                warn!(call_id = %self.call_id, error = %e, "Upstream reported an error");
            }
            UpstreamEvent::Closed { error } => {
                if self.upstream_closed {
                    return;
                }
                self.upstream_closed = true;
                self.upstream_rx = None;

                match &error {
                    Some(e) => error!(call_id = %self.call_id, error = %e, "Upstream session failed"),
                    None => debug!(call_id = %self.call_id, "Upstream session closed"),
                }

                if !self.state.is_terminating() {
                    self.begin_drain("upstream closed").await;
                }
            }
        }
    }

    fn handle_transcript(&mut self, transcript: TranscriptResult) {
        let partial = match transcript.role {
            TranscriptRole::User => &mut self.user_partial,
            TranscriptRole::Assistant => &mut self.assistant_partial,
        };

        if !transcript.is_final {
            trace!(call_id = %self.call_id, role = %transcript.role, text = %transcript.text, "Partial transcript");
            *partial = Some(transcript.text);
            return;
        }
        *partial = None;

        info!(
            call_id = %self.call_id,
            role = %transcript.role,
            is_final = true,
            text = %transcript.text,
            "Transcript"
        );

        if transcript.role == TranscriptRole::Assistant
            && let Some(speech_tx) = self.speech_tx.as_ref()
            && !transcript.text.trim().is_empty()
            && speech_tx.try_send(transcript.text).is_err()
        {
            warn!(call_id = %self.call_id, "Speech synthesis queue full, skipping reply");
        }
    }

    fn flush_partial_transcripts(&mut self) {
        for (role, partial) in [
            (TranscriptRole::User, self.user_partial.take()),
            (TranscriptRole::Assistant, self.assistant_partial.take()),
        ] {
            if let Some(text) = partial.filter(|t| !t.trim().is_empty()) {
                info!(
                    call_id = %self.call_id,
                    role = %role,
                    is_final = false,
                    text = %text,
                    "Transcript (flushed partial)"
                );
            }
        }
    }

    async fn forward_speech(&mut self, speech: SynthesizedSpeech) {
        let out = convert_for_caller(&mut self.speech_converter, &speech.data, speech.format);
        if !out.is_empty() {
            self.send_media(MediaOutput::Audio(out)).await;
        }
    }

    fn send_keepalive(&mut self) {
        let Some(period) = self.settings.keepalive_interval else {
            return;
        };
        if self.last_audio.elapsed() < period {
            return;
        }

        if let Some(transcoder) = self.transcoder.as_ref() {
            trace!(call_id = %self.call_id, "Injecting keepalive silence");
            transcoder.push(AudioFormat::TELEPHONY.silence(TELEPHONY_FRAME_MS));
        }
    }

    async fn send_media(&mut self, output: MediaOutput) {
        let Some(link) = self.media.as_ref() else {
            trace!(call_id = %self.call_id, "No media socket, dropping output");
            return;
        };

        if link.outbound.send(output).await.is_err() {
            debug!(call_id = %self.call_id, "Media socket gone");
            self.media = None;
        }
    }
}

/// Convert reply audio to the telephony format, rebuilding the converter when
/// the source format changes.
fn convert_for_caller(
    converter: &mut Option<FormatConverter>,
    data: &[u8],
    format: AudioFormat,
) -> Bytes {
    if converter
        .as_ref()
        .is_none_or(|c| c.from_format() != format)
    {
        *converter = Some(FormatConverter::new(format, AudioFormat::TELEPHONY));
    }

    match converter.as_mut() {
        Some(converter) => converter.convert(data),
        None => Bytes::new(),
    }
}

/// Serialize synthesis for one call: texts in, audio out, in order.
fn spawn_speech_worker(
    synthesizer: SharedSynthesizer,
    call_id: CallId,
) -> (mpsc::Sender<String>, mpsc::Receiver<SynthesizedSpeech>) {
    let (text_tx, mut text_rx) = mpsc::channel::<String>(SPEECH_QUEUE_CAPACITY);
    let (speech_tx, speech_rx) = mpsc::channel(SPEECH_QUEUE_CAPACITY);

    tokio::spawn(async move {
        while let Some(text) = text_rx.recv().await {
            match synthesizer.synthesize(&text).await {
                Ok(speech) => {
                    if speech_tx.send(speech).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(call_id = %call_id, provider = synthesizer.provider_name(), error = %e, "Speech synthesis failed");
                }
            }
        }
    });

    (text_tx, speech_rx)
}

async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
