//! Call sessions.
//!
//! Each call is owned by one actor task that binds the call's media socket to
//! one transcoder and one upstream AI session. Everything else talks to the
//! actor through a cloneable [`SessionHandle`]; the actor is the only place
//! call state changes.

mod actor;
mod handle;
mod pending;
mod resources;
mod state;

pub use actor::{
    CallActor, DEFAULT_DRAIN_TIMEOUT, DEFAULT_PENDING_AUDIO_CAPACITY, SessionSettings,
};
pub use handle::SessionHandle;
pub use pending::PendingAudio;
pub use resources::{ConfiguredFactory, SessionFactory};
pub use state::CallState;

use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::core::CallIdError;
use crate::core::codec::AudioFrame;
use crate::core::transcoder::TranscoderError;
use crate::core::upstream::UpstreamError;

/// Capacity of a session's command queue.
pub const SESSION_COMMAND_CAPACITY: usize = 512;

/// Capacity of a media socket's outbound queue.
pub const MEDIA_OUTBOUND_CAPACITY: usize = 512;

// =============================================================================
// Error Types
// =============================================================================

/// Errors surfaced to callers of a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Another media socket already owns the call
    #[error("Media stream already attached to call {0}")]
    AlreadyAttached(String),

    /// No session for the call id
    #[error("No active session for call {0}")]
    NotFound(String),

    /// The session is draining or closed
    #[error("Session for call {0} is closing")]
    Closed(String),

    #[error(transparent)]
    CallId(#[from] CallIdError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Commands and Output
// =============================================================================

/// Why a session is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Media stream sent `stop`
    StreamStopped,
    /// Media socket closed without `stop`
    SocketClosed,
    /// Carrier reported hangup
    Hangup,
    /// Server shutting down
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StreamStopped => write!(f, "stream_stopped"),
            StopReason::SocketClosed => write!(f, "socket_closed"),
            StopReason::Hangup => write!(f, "hangup"),
            StopReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Messages the session sends to its media socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutput {
    /// Telephony-encoded speech for the caller
    Audio(Bytes),
    /// Drop any playback the carrier has queued (barge-in)
    Clear,
    /// The call is over; close the socket
    Close,
}

/// Media socket binding handed to a session on attach.
#[derive(Debug)]
pub struct MediaLink {
    /// Carrier stream id used to tag outbound messages
    pub stream_id: Option<String>,
    /// Outbound messages for the socket
    pub outbound: mpsc::Sender<MediaOutput>,
}

/// Commands processed by the session actor.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Attach {
        link: MediaLink,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Media(AudioFrame),
    Stop(StopReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SessionError::AlreadyAttached("abc".to_string()).to_string(),
            "Media stream already attached to call abc"
        );
        assert_eq!(
            SessionError::from(CallIdError::Empty).to_string(),
            "Call id is empty"
        );
        assert_eq!(
            SessionError::from(UpstreamError::NotConnected).to_string(),
            "Upstream error: Not connected"
        );
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Hangup.to_string(), "hangup");
        assert_eq!(StopReason::SocketClosed.to_string(), "socket_closed");
    }
}
