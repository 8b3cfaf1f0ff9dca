//! Base trait and types for audio transcoders.
//!
//! A transcoder converts the telephony leg's narrowband audio into the format
//! the upstream backend negotiated. It is push-in / event-out: input chunks go
//! in through [`Transcoder::push`], output and lifecycle come back on the
//! event channel handed to [`Transcoder::start`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --(flushed)--> Exited
//!                    |                                        ^
//!                    +------------- crash / kill -------------+
//! ```
//!
//! Every successful `start` is followed by exactly one [`TranscoderEvent::Ready`]
//! and, eventually, exactly one [`TranscoderEvent::Closed`].

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::codec::AudioFormat;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by a transcoder pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscoderError {
    /// The pipeline process could not be started
    #[error("Failed to spawn transcoder: {0}")]
    SpawnFailed(String),

    /// `start` was called twice
    #[error("Transcoder already started")]
    AlreadyStarted,

    /// The pipeline exited without being asked to
    #[error("Transcoder exited unexpectedly: {0}")]
    UnexpectedExit(String),

    /// Reading or writing the pipeline failed
    #[error("Transcoder I/O error: {0}")]
    Io(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for transcoder operations.
pub type TranscoderResult<T> = Result<T, TranscoderError>;

// =============================================================================
// Events and State
// =============================================================================

/// Events emitted by a running transcoder, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscoderEvent {
    /// The pipeline accepts input
    Ready,
    /// One chunk of converted audio
    Chunk(Bytes),
    /// Terminal event; `error` is set when the pipeline died on its own
    Closed { error: Option<TranscoderError> },
}

/// Lifecycle state of a transcoder pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Not started
    #[default]
    Idle,
    /// Accepting input
    Running,
    /// End of input signalled, flushing trailing output
    Stopping,
    /// Pipeline has exited
    Exited,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Running => write!(f, "Running"),
            PipelineState::Stopping => write!(f, "Stopping"),
            PipelineState::Exited => write!(f, "Exited"),
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Audio conversion pipeline owned by one call.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Format expected by [`Transcoder::push`].
    fn input_format(&self) -> AudioFormat;

    /// Format of [`TranscoderEvent::Chunk`] payloads.
    fn output_format(&self) -> AudioFormat;

    /// Spawn the pipeline and start emitting events on `events`.
    ///
    /// On error no event has been emitted and the transcoder stays unusable.
    async fn start(&mut self, events: mpsc::Sender<TranscoderEvent>) -> TranscoderResult<()>;

    /// Feed one chunk of input.
    ///
    /// Never blocks. Returns `false` and logs a warning when the pipeline is not
    /// running or its bounded input queue is full.
    fn push(&self, audio: Bytes) -> bool;

    /// Signal end of input. Trailing output is still emitted before `Closed`.
    /// Repeated calls are no-ops.
    async fn stop(&mut self);

    /// Terminate immediately, discarding queued input. `Closed` still follows.
    async fn kill(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> PipelineState;

    /// True while input is accepted.
    fn is_ready(&self) -> bool {
        self.state() == PipelineState::Running
    }
}

/// Boxed transcoder owned by a call session.
pub type BoxedTranscoder = Box<dyn Transcoder>;
