use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ClientHandle, ConnectionId};

/// Connection registry: the set of currently connected live clients.
///
/// One mutex covers register, deregister and iteration, so no caller can
/// observe a half-updated set. Iteration works on a copy taken under the
/// lock, which lets visitors deregister handles without deadlocking.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<ConnectionId, ClientHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-written,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ClientHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a handle. Returns false if it was already registered.
    pub fn register(&self, handle: ClientHandle) -> bool {
        let id = handle.id();
        let mut clients = self.lock();
        if clients.contains_key(&id) {
            return false;
        }
        clients.insert(id, handle);
        tracing::debug!(connection = %id, connections = clients.len(), "Connection registered");
        true
    }

    /// Remove a handle. Removing an absent handle is a no-op that returns false.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let mut clients = self.lock();
        let removed = clients.remove(&id).is_some();
        if removed {
            tracing::debug!(connection = %id, connections = clients.len(), "Connection deregistered");
        }
        removed
    }

    /// Point-in-time copy of the current members.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.lock().values().cloned().collect()
    }

    /// Visit each handle registered at the moment of the call, exactly once.
    /// Handles registered while visiting are not guaranteed to be seen.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&ClientHandle),
    {
        for handle in self.snapshot() {
            visitor(&handle);
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
