//! Transcoder backed by an external `ffmpeg` process.
//!
//! Raw audio is written to the child's stdin and converted audio is read
//! from its stdout:
//!
//! ```text
//! ffmpeg -f mulaw -ar 8000 -ac 1 -i pipe:0 -f s16le -ar 16000 -ac 1 pipe:1
//! ```
//!
//! The child is owned by a supervisor task. Every exit path (stop, kill,
//! crash, owner dropped) ends with the child reaped and exactly one
//! `Closed` event.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{PipelineState, Transcoder, TranscoderError, TranscoderEvent, TranscoderResult};
use crate::core::codec::AudioFormat;

/// Default ffmpeg executable, resolved through `PATH`.
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// Bytes read from ffmpeg's stdout per chunk.
const READ_CHUNK_SIZE: usize = 4096;

/// Configuration for an ffmpeg pipeline.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Path to the ffmpeg binary
    pub binary: String,
    /// Format written to stdin
    pub input: AudioFormat,
    /// Format read from stdout
    pub output: AudioFormat,
    /// Capacity of the input queue in chunks
    pub queue_capacity: usize,
}

impl FfmpegConfig {
    /// Command line arguments for this conversion.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input.encoding.ffmpeg_format().to_string(),
            "-ar".to_string(),
            self.input.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-f".to_string(),
            self.output.encoding.ffmpeg_format().to_string(),
            "-ar".to_string(),
            self.output.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-flush_packets".to_string(),
            "1".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

/// ffmpeg subprocess transcoder.
pub struct FfmpegTranscoder {
    config: FfmpegConfig,
    state: Arc<RwLock<PipelineState>>,
    input_tx: Option<mpsc::Sender<Bytes>>,
    cancel: CancellationToken,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig) -> TranscoderResult<Self> {
        if config.binary.trim().is_empty() {
            return Err(TranscoderError::InvalidConfiguration(
                "ffmpeg binary path is empty".to_string(),
            ));
        }

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(PipelineState::Idle)),
            input_tx: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            warn!(target: "call_relay::ffmpeg", "{}", line);
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn input_format(&self) -> AudioFormat {
        self.config.input
    }

    fn output_format(&self) -> AudioFormat {
        self.config.output
    }

    async fn start(&mut self, events: mpsc::Sender<TranscoderEvent>) -> TranscoderResult<()> {
        if *self.state.read() != PipelineState::Idle {
            return Err(TranscoderError::AlreadyStarted);
        }

        let mut child = Command::new(&self.config.binary)
            .args(self.config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TranscoderError::SpawnFailed(format!("{}: {e}", self.config.binary))
            })?;

        let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(TranscoderError::SpawnFailed(
                "failed to capture ffmpeg stdio".to_string(),
            ));
        };

        info!(
            pid = ?child.id(),
            input = %self.config.input,
            output = %self.config.output,
            "ffmpeg transcoder started"
        );

        let (input_tx, mut input_rx) = mpsc::channel::<Bytes>(self.config.queue_capacity.max(1));
        self.input_tx = Some(input_tx);
        *self.state.write() = PipelineState::Running;

        if events.send(TranscoderEvent::Ready).await.is_err() {
            debug!("Transcoder event receiver dropped before ready");
        }

        let state = self.state.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let stderr_task = tokio::spawn(log_stderr(stderr));

            // Closing stdin (dropping it) is how ffmpeg learns the input ended
            let writer_task = tokio::spawn(async move {
                while let Some(chunk) = input_rx.recv().await {
                    if let Err(e) = stdin.write_all(&chunk).await {
                        debug!("ffmpeg stdin closed: {}", e);
                        break;
                    }
                }
                let _ = stdin.shutdown().await;
            });

            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let mut killed = false;

            let read_error = loop {
                tokio::select! {
                    _ = cancel.cancelled(), if !killed => {
                        killed = true;
                        if let Err(e) = child.start_kill() {
                            debug!("ffmpeg already gone: {}", e);
                        }
                    }

                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => break None,
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            if events.send(TranscoderEvent::Chunk(chunk)).await.is_err() && !killed {
                                killed = true;
                                let _ = child.start_kill();
                            }
                        }
                        Err(e) => break Some(TranscoderError::Io(e.to_string())),
                    },
                }
            };

            writer_task.abort();
            let requested = killed || *state.read() == PipelineState::Stopping;

            let exit_error = match child.wait().await {
                Ok(status) if status.success() && requested => None,
                Ok(_) if requested => None,
                Ok(status) => Some(TranscoderError::UnexpectedExit(status.to_string())),
                Err(e) => Some(TranscoderError::Io(e.to_string())),
            };
            stderr_task.abort();

            let error = read_error.or(exit_error);
            if let Some(ref e) = error {
                error!("ffmpeg transcoder failed: {}", e);
            } else {
                debug!("ffmpeg transcoder exited");
            }

            *state.write() = PipelineState::Exited;
            let _ = events.send(TranscoderEvent::Closed { error }).await;
        });

        Ok(())
    }

    fn push(&self, audio: Bytes) -> bool {
        let state = *self.state.read();
        if state != PipelineState::Running {
            warn!(state = %state, bytes = audio.len(), "Dropping audio pushed to transcoder that is not running");
            return false;
        }

        match self.input_tx.as_ref().map(|tx| tx.try_send(audio)) {
            Some(Ok(())) => true,
            Some(Err(mpsc::error::TrySendError::Full(chunk))) => {
                warn!(bytes = chunk.len(), "ffmpeg input queue full, dropping audio");
                false
            }
            _ => {
                warn!("ffmpeg input closed, dropping audio");
                false
            }
        }
    }

    async fn stop(&mut self) {
        let mut state = self.state.write();
        match *state {
            PipelineState::Running => {
                *state = PipelineState::Stopping;
                self.input_tx = None;
            }
            PipelineState::Idle => {
                *state = PipelineState::Exited;
            }
            PipelineState::Stopping | PipelineState::Exited => {}
        }
    }

    async fn kill(&mut self) {
        self.input_tx = None;
        self.cancel.cancel();
    }

    fn state(&self) -> PipelineState {
        *self.state.read()
    }
}

impl Drop for FfmpegTranscoder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
