//! Cloneable handle to a running call session.

use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::{CallState, MediaLink, SessionCommand, SessionError, SessionResult, StopReason};
use crate::core::CallId;
use crate::core::codec::AudioFrame;

/// Handle used by webhooks, media sockets and the registry to reach a
/// session's actor.
///
/// Dropping every handle does not stop the session by itself; the actor drains
/// once its command queue closes.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    call_id: CallId,
    instance_id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<CallState>,
}

impl SessionHandle {
    pub(crate) fn new(
        call_id: CallId,
        instance_id: Uuid,
        commands: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<CallState>,
    ) -> Self {
        Self {
            call_id,
            instance_id,
            commands,
            state,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Unique id of this session instance. A later session for the same call
    /// id gets a different one.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CallState::Closed
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    /// Bind a media socket to the session.
    ///
    /// Fails with [`SessionError::AlreadyAttached`] when another socket owns
    /// the call and with [`SessionError::Closed`] once the session is draining.
    pub async fn attach(&self, link: MediaLink) -> SessionResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Attach { link, reply })
            .await
            .map_err(|_| self.closed_error())?;
        response.await.map_err(|_| self.closed_error())?
    }

    /// Deliver one inbound audio frame. Returns `false` once the session has
    /// gone away.
    pub async fn push_media(&self, frame: AudioFrame) -> bool {
        self.commands
            .send(SessionCommand::Media(frame))
            .await
            .is_ok()
    }

    /// Ask the session to drain. Repeated calls are no-ops.
    pub async fn stop(&self, reason: StopReason) -> bool {
        self.commands
            .send(SessionCommand::Stop(reason))
            .await
            .is_ok()
    }

    /// Wait until the session reaches [`CallState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // Err means the actor is gone, which only happens after Closed or a panic
        let _ = state.wait_for(|s| *s == CallState::Closed).await;
    }

    /// Wait until the session reaches `target` or a later state.
    pub async fn reached(&self, target: CallState) -> CallState {
        let mut state = self.state.clone();
        match state.wait_for(|s| *s >= target).await {
            Ok(current) => *current,
            Err(_) => CallState::Closed,
        }
    }

    fn closed_error(&self) -> SessionError {
        SessionError::Closed(self.call_id.to_string())
    }
}
