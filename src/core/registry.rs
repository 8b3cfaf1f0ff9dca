//! Session registry.
//!
//! Maps a normalized call id to its live session. This is the only state
//! shared between calls; every operation is a point insert, lookup or remove
//! on one `DashMap` shard.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::CallId;
use crate::core::session::SessionHandle;

/// Outcome of [`SessionRegistry::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    /// `false` when a session already existed; nothing was spawned
    pub created: bool,
    /// The session registered under the call id
    pub handle: SessionHandle,
}

/// Concurrent map of call id to session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<CallId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `call_id` unless one already exists.
    ///
    /// `spawn` runs at most once, only when the id is new, while the entry is
    /// held; a concurrent registration of the same id waits and then sees
    /// `created = false`.
    pub fn register<F>(&self, call_id: CallId, spawn: F) -> Registration
    where
        F: FnOnce(CallId) -> SessionHandle,
    {
        match self.sessions.entry(call_id) {
            Entry::Occupied(entry) => Registration {
                created: false,
                handle: entry.get().clone(),
            },
            Entry::Vacant(entry) => {
                let handle = spawn(entry.key().clone());
                entry.insert(handle.clone());
                Registration {
                    created: true,
                    handle,
                }
            }
        }
    }

    /// Session registered under `call_id`, if any.
    pub fn get(&self, call_id: &CallId) -> Option<SessionHandle> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.sessions.contains_key(call_id)
    }

    /// Remove the entry for `call_id` if it still belongs to `instance_id`.
    ///
    /// Returns `false` when the id is absent or now owned by a newer session.
    pub fn remove(&self, call_id: &CallId, instance_id: Uuid) -> bool {
        self.sessions
            .remove_if(call_id, |_, handle| handle.instance_id() == instance_id)
            .is_some()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every registered session.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
