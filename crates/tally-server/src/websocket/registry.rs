//! The authoritative set of open connections.
//!
//! Every mutation and every iteration goes through one mutex. The lock is
//! never held across an `.await`; the work done under it (queueing frames,
//! cancelling tokens) is non-blocking.

use std::collections::HashMap;
use std::collections::hash_map::Values;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::connection::{ClientConnection, ConnectionId};

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    closed: bool,
}

/// Registry of open WebSocket connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

/// Open members visible while the registry lock is held.
///
/// Connections closed mid-iteration are skipped.
pub struct Members<'a> {
    iter: Values<'a, ConnectionId, Arc<ClientConnection>>,
}

impl<'a> Iterator for Members<'a> {
    type Item = &'a Arc<ClientConnection>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.by_ref().find(|conn| conn.is_open())
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an open connection.
    ///
    /// The caller keeps its own `Arc` as the handle to the member; the
    /// registry holds a second reference. Returns `false` (and leaves the
    /// connection untouched) when the registry has been closed for shutdown
    /// or the connection is already closed.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        self.admit(connection, |_| {})
    }

    /// Insert an open connection and run `prime` on it under the same lock.
    ///
    /// Anything `prime` queues is ordered before any fan-out that runs
    /// after this call returns.
    pub fn admit<F>(&self, connection: Arc<ClientConnection>, prime: F) -> bool
    where
        F: FnOnce(&ClientConnection),
    {
        let mut inner = self.inner.lock();
        if inner.closed || !connection.is_open() {
            return false;
        }
        prime(&connection);
        let _ = inner.connections.insert(connection.id.clone(), connection);
        true
    }

    /// Remove a connection by ID. Removing an absent ID is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner.lock().connections.remove(id)
    }

    /// Remove and close a connection in one step.
    ///
    /// Returns `true` only for the call that actually removed it, so the
    /// disconnect is reported exactly once regardless of which path (peer
    /// close, transport error, heartbeat) got there first.
    pub fn evict(&self, id: &ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        match inner.connections.remove(id) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Run `f` over the open members while holding the registry lock.
    pub fn with_members<R, F>(&self, f: F) -> R
    where
        F: FnOnce(Members<'_>) -> R,
    {
        let inner = self.inner.lock();
        f(Members {
            iter: inner.connections.values(),
        })
    }

    /// Apply `f` to every open connection.
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&Arc<ClientConnection>),
    {
        self.with_members(|members| members.for_each(f));
    }

    /// Clone out the currently open connections.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.with_members(|members| members.cloned().collect())
    }

    /// Look up a connection by ID.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner.lock().connections.get(id).cloned()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Refuse further admissions, then close and drain every connection.
    ///
    /// Returns the number of connections closed. Safe to call repeatedly.
    pub fn close_all(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let drained: Vec<_> = inner.connections.drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.close();
        }
        debug!(closed = drained.len(), "registry closed");
        drained.len()
    }
}
