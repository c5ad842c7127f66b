//! Registry of live connections.
//!
//! Shared by the acceptor (add), every reader (remove on read failure)
//! and the dispatcher (remove on write failure). Membership means
//! "believed writable"; a snapshot may still contain a connection that
//! is being removed concurrently, and the next write to it fails.
//!
//! Locks are synchronous and never held across an `.await`, which lets
//! readers deregister from a drop guard.

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::connection::{ConnectionHandle, ConnectionId};

pub struct Registry {
    members: RwLock<IndexMap<ConnectionId, ConnectionHandle>>,
    count_tx: watch::Sender<usize>,
}

impl Registry {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Registry {
            members: RwLock::new(IndexMap::new()),
            count_tx,
        }
    }

    /// Insert a connection. Adding an already registered connection is a no-op.
    pub fn add(&self, conn: ConnectionHandle) {
        let mut members = self.members.write();
        if members.contains_key(&conn.id()) {
            return;
        }
        members.insert(conn.id(), conn);
        self.count_tx.send_replace(members.len());
    }

    /// Insert a connection unless the registry already holds `cap`
    /// members. The check and the insert happen under one lock. Returns
    /// `true` if the connection is registered afterwards.
    pub fn try_add(&self, conn: ConnectionHandle, cap: usize) -> bool {
        let mut members = self.members.write();
        if members.contains_key(&conn.id()) {
            return true;
        }
        if members.len() >= cap {
            return false;
        }
        members.insert(conn.id(), conn);
        self.count_tx.send_replace(members.len());
        true
    }

    /// Remove a connection if present. Returns `true` if this call removed it.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut members = self.members.write();
        // shift_remove keeps the remaining insertion order intact.
        if members.shift_remove(&id).is_none() {
            return false;
        }
        self.count_tx.send_replace(members.len());
        true
    }

    /// Point-in-time copy of the members, in insertion order.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.members.read().values().cloned().collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the member count. A new value is published on every add or
    /// remove that changed membership.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
