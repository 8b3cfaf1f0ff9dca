//! Call relay: entry point used by webhooks and media sockets.
//!
//! Normalizes call ids, registers sessions idempotently and routes lifecycle
//! events to the right session. Holds no per-call state itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::CallId;
use crate::core::registry::{Registration, SessionRegistry};
use crate::core::session::{
    CallActor, MediaLink, MediaOutput, SessionError, SessionFactory, SessionHandle,
    SessionResult, SessionSettings, StopReason,
};
use crate::telephony::{NoopCallControl, SharedCallControl};

/// Relay-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Settings applied to every session
    pub session: SessionSettings,
    /// Create a session when a media stream starts for an unknown call
    pub adopt_unregistered_streams: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            adopt_unregistered_streams: true,
        }
    }
}

/// Result of a call initiation event.
#[derive(Debug, Clone)]
pub struct Initiation {
    pub call_id: CallId,
    /// `false` for duplicate initiation events
    pub created: bool,
    pub handle: SessionHandle,
}

/// Routes telephony events to call sessions.
pub struct CallRelay {
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn SessionFactory>,
    settings: RelaySettings,
}

impl CallRelay {
    pub fn new(factory: Arc<dyn SessionFactory>, settings: RelaySettings) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            factory,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Number of live calls.
    pub fn active_calls(&self) -> usize {
        self.registry.len()
    }

    /// Handle a call initiation event.
    ///
    /// The first event for a call spawns its session, which answers through
    /// `control`. Later events for the same normalized id return the existing
    /// session with `created = false` and have no side effects.
    pub fn initiate(
        &self,
        raw_call_id: &str,
        control: SharedCallControl,
    ) -> SessionResult<Initiation> {
        let call_id = CallId::normalize(raw_call_id)?;
        let Registration { created, handle } = self.register(call_id.clone(), control);

        if created {
            info!(call_id = %call_id, "Call registered");
        } else {
            debug!(call_id = %call_id, "Duplicate initiation ignored");
        }

        Ok(Initiation {
            call_id,
            created,
            handle,
        })
    }

    /// Bind a media socket to its call.
    ///
    /// Streams for unknown calls are adopted with a no-op call control when
    /// enabled (the carrier already answered), otherwise rejected.
    pub async fn attach_media(
        &self,
        raw_call_id: &str,
        stream_id: Option<String>,
        outbound: mpsc::Sender<MediaOutput>,
    ) -> SessionResult<SessionHandle> {
        let call_id = CallId::normalize(raw_call_id)?;

        let handle = match self.registry.get(&call_id) {
            Some(handle) => handle,
            None if self.settings.adopt_unregistered_streams => {
                info!(call_id = %call_id, "Adopting media stream for unregistered call");
                self.register(call_id.clone(), Arc::new(NoopCallControl))
                    .handle
            }
            None => {
                warn!(call_id = %call_id, "Media stream for unknown call rejected");
                return Err(SessionError::NotFound(call_id.to_string()));
            }
        };

        handle.attach(MediaLink { stream_id, outbound }).await?;
        Ok(handle)
    }

    /// Stop the session for a call. Returns `Ok(false)` when no session is
    /// registered; stopping is idempotent either way.
    pub async fn stop(&self, raw_call_id: &str, reason: StopReason) -> SessionResult<bool> {
        let call_id = CallId::normalize(raw_call_id)?;
        match self.registry.get(&call_id) {
            Some(handle) => {
                info!(call_id = %call_id, reason = %reason, "Stopping call");
                Ok(handle.stop(reason).await)
            }
            None => {
                debug!(call_id = %call_id, reason = %reason, "Stop for unknown call ignored");
                Ok(false)
            }
        }
    }

    /// Session for a call, if registered.
    pub fn get(&self, raw_call_id: &str) -> Option<SessionHandle> {
        let call_id = CallId::normalize(raw_call_id).ok()?;
        self.registry.get(&call_id)
    }

    /// Stop every session and wait for them to close.
    pub async fn shutdown(&self) {
        let handles = self.registry.handles();
        if handles.is_empty() {
            return;
        }

        info!(calls = handles.len(), "Stopping all calls");
        for handle in &handles {
            handle.stop(StopReason::Shutdown).await;
        }
        futures::future::join_all(handles.iter().map(|h| h.closed())).await;
    }

    fn register(&self, call_id: CallId, control: SharedCallControl) -> Registration {
        let settings = self.settings.session.clone();
        let factory = self.factory.clone();
        let registry = self.registry.clone();

        self.registry.register(call_id, move |call_id| {
            CallActor::spawn(call_id, settings, factory, control, registry)
        })
    }
}

impl std::fmt::Debug for CallRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRelay")
            .field("active_calls", &self.registry.len())
            .field("settings", &self.settings)
            .finish()
    }
}
