//! In-process transcoder built on the G.711 codec and linear resampler.
//!
//! Used by default: it needs no external binary and converts on a dedicated
//! task so the owning call never blocks on DSP work. When input and output
//! formats match it degenerates into a passthrough.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{PipelineState, Transcoder, TranscoderError, TranscoderEvent, TranscoderResult};
use crate::core::codec::{AudioFormat, FormatConverter};

/// In-process audio converter.
pub struct NativeTranscoder {
    input: AudioFormat,
    output: AudioFormat,
    queue_capacity: usize,
    state: Arc<RwLock<PipelineState>>,
    input_tx: Option<mpsc::Sender<Bytes>>,
    cancel: CancellationToken,
}

impl NativeTranscoder {
    pub fn new(input: AudioFormat, output: AudioFormat, queue_capacity: usize) -> Self {
        Self {
            input,
            output,
            queue_capacity: queue_capacity.max(1),
            state: Arc::new(RwLock::new(PipelineState::Idle)),
            input_tx: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transcoder for NativeTranscoder {
    fn name(&self) -> &'static str {
        if self.input == self.output {
            "passthrough"
        } else {
            "native"
        }
    }

    fn input_format(&self) -> AudioFormat {
        self.input
    }

    fn output_format(&self) -> AudioFormat {
        self.output
    }

    async fn start(&mut self, events: mpsc::Sender<TranscoderEvent>) -> TranscoderResult<()> {
        if *self.state.read() != PipelineState::Idle {
            return Err(TranscoderError::AlreadyStarted);
        }

        let (input_tx, mut input_rx) = mpsc::channel::<Bytes>(self.queue_capacity);
        self.input_tx = Some(input_tx);
        *self.state.write() = PipelineState::Running;

        if events.send(TranscoderEvent::Ready).await.is_err() {
            debug!("Transcoder event receiver dropped before ready");
        }

        let mut converter = FormatConverter::new(self.input, self.output);
        let state = self.state.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Native transcoder killed");
                        break;
                    }

                    chunk = input_rx.recv() => match chunk {
                        Some(chunk) => {
                            let out = converter.convert(&chunk);
                            if out.is_empty() {
                                continue;
                            }
                            if events.send(TranscoderEvent::Chunk(out)).await.is_err() {
                                break;
                            }
                        }
                        // Sender dropped by stop(): everything queued has been converted
                        None => break,
                    },
                }
            }

            *state.write() = PipelineState::Exited;
            let _ = events.send(TranscoderEvent::Closed { error: None }).await;
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
                warn!(bytes = chunk.len(), "Transcoder input queue full, dropping audio");
                false
            }
            _ => {
                warn!("Transcoder input closed, dropping audio");
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

impl Drop for NativeTranscoder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
