//! Scripted doubles for the carrier API, the upstream AI session and the
//! speech synthesizer.
//!
//! Sessions are driven through a [`MockFactory`] so tests decide when the
//! upstream becomes ready, what it answers and whether it honours close.
//! Every double records what the session did to it for later assertions.

// Not every test binary uses every double
#![allow(dead_code)]

pub mod websocket_mock;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use call_relay::core::{
    AudioFormat, BaseUpstream, BoxedTranscoder, BoxedUpstream, CallId, ConnectionState,
    MediaOutput, PipelineState, SessionFactory, SharedSynthesizer, SpeechSynthesizer,
    SynthesizedSpeech, TTSError, Transcoder, TranscoderBackend, TranscoderError,
    TranscoderEvent, TranscoderResult, UpstreamAudio, UpstreamError, UpstreamEvent,
    UpstreamResult, create_transcoder,
};
use call_relay::telephony::{CallControl, TelephonyError, TelephonyResult};

/// Default wait for asynchronous conditions in tests.
pub const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Call control
// =============================================================================

/// Call control that counts the actions it receives.
#[derive(Debug, Default)]
pub struct CountingControl {
    pub answers: AtomicUsize,
    pub stream_starts: AtomicUsize,
    pub fail_answer: AtomicBool,
}

impl CountingControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let control = Self::default();
        control.fail_answer.store(true, Ordering::SeqCst);
        Arc::new(control)
    }

    pub fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn stream_starts(&self) -> usize {
        self.stream_starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallControl for CountingControl {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn answer(&self, _call_id: &CallId) -> TelephonyResult<()> {
        self.answers.fetch_add(1, Ordering::SeqCst);
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(TelephonyError::Api {
                status: 422,
                body: "call already ended".to_string(),
            });
        }
        Ok(())
    }

    async fn start_stream(&self, _call_id: &CallId) -> TelephonyResult<()> {
        self.stream_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Upstream
// =============================================================================

/// Shared view of a [`ScriptedUpstream`]: lets the test emit events and
/// inspect what the session sent.
#[derive(Debug, Default)]
pub struct UpstreamRemote {
    events: Mutex<Option<mpsc::Sender<UpstreamEvent>>>,
    audio: Mutex<Vec<Bytes>>,
    connected: AtomicBool,
    pub opens: AtomicUsize,
    pub commits: AtomicUsize,
    pub closes: AtomicUsize,
    pub kills: AtomicUsize,
    /// Close requests are acknowledged with `Closed`
    honour_close: AtomicBool,
    /// `Ready` is sent as soon as the session opens
    auto_ready: AtomicBool,
}

impl UpstreamRemote {
    /// Remote whose upstream waits for [`UpstreamRemote::ready`].
    pub fn manual() -> Arc<Self> {
        let remote = Self::default();
        remote.honour_close.store(true, Ordering::SeqCst);
        Arc::new(remote)
    }

    /// Remote whose upstream reports ready as soon as it opens.
    pub fn auto_ready() -> Arc<Self> {
        let remote = Self::manual();
        remote.auto_ready.store(true, Ordering::SeqCst);
        remote
    }

    /// Upstream that never acknowledges a graceful close.
    pub fn stubborn(self: Arc<Self>) -> Arc<Self> {
        self.honour_close.store(false, Ordering::SeqCst);
        self
    }

    pub fn is_open(&self) -> bool {
        self.events.lock().is_some()
    }

    /// Emit an event to the session. Returns `false` before open or after close.
    pub async fn emit(&self, event: UpstreamEvent) -> bool {
        let sender = self.events.lock().clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Complete the handshake.
    pub async fn ready(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        self.emit(UpstreamEvent::Ready {
            session_id: Some("sess-test".to_string()),
        })
        .await
    }

    /// Audio received so far, one entry per `send_audio`.
    pub fn audio(&self) -> Vec<Bytes> {
        self.audio.lock().clone()
    }

    /// All received audio concatenated.
    pub fn audio_bytes(&self) -> Vec<u8> {
        self.audio.lock().iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    async fn finish(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let sender = self.events.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(UpstreamEvent::Closed { error: None }).await;
        }
    }
}

/// Upstream session driven entirely by its remote.
pub struct ScriptedUpstream {
    remote: Arc<UpstreamRemote>,
    format: AudioFormat,
}

impl ScriptedUpstream {
    pub fn new(remote: Arc<UpstreamRemote>, format: AudioFormat) -> Self {
        Self { remote, format }
    }
}

#[async_trait]
impl BaseUpstream for ScriptedUpstream {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn input_format(&self) -> AudioFormat {
        self.format
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    async fn open(&mut self, events: mpsc::Sender<UpstreamEvent>) -> UpstreamResult<()> {
        self.remote.opens.fetch_add(1, Ordering::SeqCst);
        *self.remote.events.lock() = Some(events);
        if self.remote.auto_ready.load(Ordering::SeqCst) {
            self.remote.ready().await;
        }
        Ok(())
    }

    fn send_audio(&self, audio: Bytes) -> bool {
        if !self.remote.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.remote.audio.lock().push(audio);
        true
    }

    fn commit(&self) -> bool {
        self.remote.commits.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn close(&mut self) {
        self.remote.closes.fetch_add(1, Ordering::SeqCst);
        if self.remote.honour_close.load(Ordering::SeqCst) {
            self.remote.finish().await;
        }
    }

    async fn kill(&mut self) {
        self.remote.kills.fetch_add(1, Ordering::SeqCst);
        self.remote.finish().await;
    }

    fn connection_state(&self) -> ConnectionState {
        if self.remote.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else if self.remote.is_open() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }
}

// =============================================================================
// Transcoder
// =============================================================================

/// Shared view of a [`WatchedTranscoder`]: counts what reached the session
/// and can make the pipeline die mid-call.
#[derive(Debug, Default)]
pub struct TranscoderWatch {
    started: AtomicBool,
    closed_events: AtomicUsize,
    crashed: AtomicBool,
    crash: Mutex<Option<oneshot::Sender<TranscoderError>>>,
    pub backlog: AtomicUsize,
}

impl TranscoderWatch {
    /// `Closed` events delivered to the session.
    pub fn closed_events(&self) -> usize {
        self.closed_events.load(Ordering::SeqCst)
    }

    /// Kill the pipeline as if the process exited on its own. Returns `false`
    /// before start or if it already crashed.
    pub fn crash(&self, error: TranscoderError) -> bool {
        match self.crash.lock().take() {
            Some(tx) => tx.send(error).is_ok(),
            None => false,
        }
    }
}

/// Native transcoder with its event stream observed by a [`TranscoderWatch`].
pub struct WatchedTranscoder {
    inner: BoxedTranscoder,
    watch: Arc<TranscoderWatch>,
}

#[async_trait]
impl Transcoder for WatchedTranscoder {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn input_format(&self) -> AudioFormat {
        self.inner.input_format()
    }

    fn output_format(&self) -> AudioFormat {
        self.inner.output_format()
    }

    async fn start(&mut self, events: mpsc::Sender<TranscoderEvent>) -> TranscoderResult<()> {
        let (inner_tx, mut inner_rx) = mpsc::channel(64);
        let (crash_tx, mut crash_rx) = oneshot::channel();
        *self.watch.crash.lock() = Some(crash_tx);
        self.inner.start(inner_tx).await?;
        self.watch.started.store(true, Ordering::SeqCst);

        let watch = self.watch.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = inner_rx.recv() => {
                        let Some(event) = event else { break };
                        let closed = matches!(event, TranscoderEvent::Closed { .. });
                        if closed {
                            watch.closed_events.fetch_add(1, Ordering::SeqCst);
                        }
                        if events.send(event).await.is_err() || closed {
                            break;
                        }
                    }
                    Ok(error) = &mut crash_rx => {
                        watch.crashed.store(true, Ordering::SeqCst);
                        watch.closed_events.fetch_add(1, Ordering::SeqCst);
                        let _ = events.send(TranscoderEvent::Closed { error: Some(error) }).await;
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    fn push(&self, audio: Bytes) -> bool {
        if self.watch.crashed.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.push(audio)
    }

    async fn stop(&mut self) {
        self.inner.stop().await;
    }

    async fn kill(&mut self) {
        self.inner.kill().await;
    }

    fn state(&self) -> PipelineState {
        if self.watch.crashed.load(Ordering::SeqCst) {
            PipelineState::Exited
        } else {
            self.inner.state()
        }
    }
}

// =============================================================================
// Synthesizer
// =============================================================================

/// Synthesizer that "speaks" each text as its UTF-8 bytes in µ-law.
#[derive(Debug, Default)]
pub struct EchoSynthesizer {
    pub texts: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    fn provider_name(&self) -> &'static str {
        "echo"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, TTSError> {
        self.texts.lock().push(text.to_string());
        Ok(SynthesizedSpeech {
            data: Bytes::copy_from_slice(text.as_bytes()),
            format: AudioFormat::TELEPHONY,
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Session factory handing out scripted upstreams and watched native
/// transcoders.
pub struct MockFactory {
    remotes: Mutex<Vec<Arc<UpstreamRemote>>>,
    transcoders: Mutex<Vec<Arc<TranscoderWatch>>>,
    template: fn() -> Arc<UpstreamRemote>,
    format: AudioFormat,
    fail_upstream: bool,
    synthesizer: Option<SharedSynthesizer>,
}

impl MockFactory {
    /// Upstreams speak the telephony format, so the transcoder passes through.
    pub fn new(template: fn() -> Arc<UpstreamRemote>) -> Self {
        Self {
            remotes: Mutex::new(Vec::new()),
            transcoders: Mutex::new(Vec::new()),
            template,
            format: AudioFormat::TELEPHONY,
            fail_upstream: false,
            synthesizer: None,
        }
    }

    /// Upstream input and output in `format`.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Every upstream creation fails.
    pub fn failing_upstream(mut self) -> Self {
        self.fail_upstream = true;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: SharedSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Remotes in creation order.
    pub fn remotes(&self) -> Vec<Arc<UpstreamRemote>> {
        self.remotes.lock().clone()
    }

    pub fn upstreams_created(&self) -> usize {
        self.remotes.lock().len()
    }

    /// Wait for the `n`th upstream (zero-based) to be opened.
    pub async fn remote(&self, n: usize) -> Arc<UpstreamRemote> {
        let remote = wait_for(|| {
            self.remotes
                .lock()
                .get(n)
                .filter(|p| p.is_open())
                .cloned()
        })
        .await;
        remote.unwrap_or_else(|| panic!("upstream #{n} was never opened"))
    }

    /// Wait for the `n`th transcoder (zero-based) to be started.
    pub async fn transcoder(&self, n: usize) -> Arc<TranscoderWatch> {
        let watch = wait_for(|| {
            self.transcoders
                .lock()
                .get(n)
                .filter(|p| p.started.load(Ordering::SeqCst))
                .cloned()
        })
        .await;
        watch.unwrap_or_else(|| panic!("transcoder #{n} was never started"))
    }
}

impl SessionFactory for MockFactory {
    fn create_upstream(&self, _call_id: &CallId) -> UpstreamResult<BoxedUpstream> {
        if self.fail_upstream {
            return Err(UpstreamError::AuthenticationFailed(
                "invalid api key".to_string(),
            ));
        }
        let remote = (self.template)();
        self.remotes.lock().push(remote.clone());
        Ok(Box::new(ScriptedUpstream::new(remote, self.format)))
    }

    fn create_transcoder(
        &self,
        input: AudioFormat,
        output: AudioFormat,
        backlog: usize,
    ) -> TranscoderResult<BoxedTranscoder> {
        let inner = create_transcoder(TranscoderBackend::Native, input, output, "ffmpeg", backlog)?;
        let watch = Arc::new(TranscoderWatch::default());
        watch.backlog.store(backlog, Ordering::SeqCst);
        self.transcoders.lock().push(watch.clone());
        Ok(Box::new(WatchedTranscoder { inner, watch }))
    }

    fn synthesizer(&self) -> Option<SharedSynthesizer> {
        self.synthesizer.clone()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Poll `check` until it yields a value or [`WAIT`] elapses.
pub async fn wait_for<T>(mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Collect media output until the socket is told to close.
pub async fn collect_until_close(rx: &mut mpsc::Receiver<MediaOutput>) -> Vec<MediaOutput> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(MediaOutput::Close)) => {
                out.push(MediaOutput::Close);
                return out;
            }
            Ok(Some(other)) => out.push(other),
            Ok(None) | Err(_) => return out,
        }
    }
}

/// One 20 ms telephony frame filled with `byte`.
pub fn frame_of(byte: u8) -> Bytes {
    Bytes::from(vec![byte; 160])
}

/// Audio reply in the telephony format.
pub fn reply(data: &'static [u8]) -> UpstreamEvent {
    UpstreamEvent::AudioReply(UpstreamAudio {
        data: Bytes::from_static(data),
        format: AudioFormat::TELEPHONY,
    })
}
