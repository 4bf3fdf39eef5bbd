//! Session registry
//!
//! Maps printer addresses to running session tasks. Accept paths insert,
//! the relay dispatcher looks up, and each task removes itself when it ends.

use crate::session::SessionHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Running sessions keyed by remote address
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; a previous session for the same address is shut down
    pub fn insert(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let replaced = self
            .sessions
            .write()
            .insert(handle.remote_address().to_string(), handle);
        if let Some(old) = &replaced {
            tracing::info!("Replacing session for {}", old.remote_address());
            old.shutdown();
        }
        replaced
    }

    /// Look up the session for an address
    pub fn get(&self, remote_address: &str) -> Option<SessionHandle> {
        self.sessions.read().get(remote_address).cloned()
    }

    /// Remove a session, but only if the address still maps to that session
    pub fn remove(&self, remote_address: &str, id: Uuid) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(remote_address) {
            Some(handle) if handle.id() == id => {
                sessions.remove(remote_address);
                true
            }
            _ => false,
        }
    }

    /// The session currently flashing firmware, if any
    pub fn flashing_session(&self) -> Option<SessionHandle> {
        self.sessions
            .read()
            .values()
            .find(|handle| handle.is_flashing())
            .cloned()
    }

    /// Addresses of all registered sessions
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.sessions.read().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
