//! Registry of live sessions.
//!
//! Every accepted connection registers itself and receives a
//! [`RegistrySlot`].  The slot removes the entry when it is dropped, so a
//! session is unregistered exactly once no matter which path ends it (normal
//! close, client error, panic unwinding).
//!
//! The registry is informational: the relay uses it to report how many
//! sessions are live at shutdown.  Sessions never look each other up.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tcpgw_core::SessionId;

/// What the registry knows about one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

/// Shared, cloneable map of live sessions.
///
/// Uses a `std` mutex: every critical section is a single map operation and
/// never spans an `.await`.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and returns the slot that keeps it registered.
    pub fn register(&self, id: SessionId, peer: SocketAddr) -> RegistrySlot {
        let entry = SessionEntry {
            id,
            peer,
            connected_at: Instant::now(),
        };
        self.lock().insert(id, entry);
        RegistrySlot {
            id,
            registry: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Copies every live entry, oldest first.
    pub fn snapshot(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<SessionEntry> = self.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.connected_at);
        entries
    }

    fn remove(&self, id: SessionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        // The map stays consistent even if a holder panicked mid-operation.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one session registered for as long as it lives.
#[derive(Debug)]
pub struct RegistrySlot {
    id: SessionId,
    registry: SessionRegistry,
}

impl RegistrySlot {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for RegistrySlot {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
