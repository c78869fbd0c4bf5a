//! Process-wide table of open push-channels.
//!
//! Connections are indexed twice: by the chat they are scoped to and by the
//! user that owns them. Both indexes live behind one lock so a connection is
//! never visible in one and missing from the other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::connection::Connection;

#[derive(Default)]
struct Inner {
    connections: HashMap<String, Arc<Connection>>,
    by_chat: HashMap<String, HashSet<String>>,
    by_user: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, connection_id: &str) -> Option<Arc<Connection>> {
        let conn = self.connections.remove(connection_id)?;
        if let Some(chat_id) = &conn.chat_id {
            detach(&mut self.by_chat, chat_id, connection_id);
        }
        detach(&mut self.by_user, &conn.user_id, connection_id);
        Some(conn)
    }

    fn snapshot(&self, ids: Option<&HashSet<String>>) -> Vec<Arc<Connection>> {
        let Some(ids) = ids else {
            return Vec::new();
        };
        let mut conns: Vec<Arc<Connection>> = ids
            .iter()
            .filter_map(|id| self.connections.get(id).cloned())
            .collect();
        conns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        conns
    }
}

fn detach(index: &mut HashMap<String, HashSet<String>>, key: &str, connection_id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(connection_id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

/// Thread-safe registry of live connections.
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Add a connection under its chat and user buckets. A user may hold any
    /// number of connections at once.
    pub fn register(&self, conn: Arc<Connection>) {
        let mut inner = self.inner.lock();
        if let Some(chat_id) = &conn.chat_id {
            inner
                .by_chat
                .entry(chat_id.clone())
                .or_default()
                .insert(conn.id.clone());
        }
        inner
            .by_user
            .entry(conn.user_id.clone())
            .or_default()
            .insert(conn.id.clone());
        inner.connections.insert(conn.id.clone(), conn);
    }

    /// Remove a connection from both buckets and close it. Unknown ids are a
    /// no-op.
    pub fn unregister(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let removed = self.inner.lock().remove(connection_id);
        if let Some(conn) = &removed {
            conn.close();
        }
        removed
    }

    /// Snapshot of the chat's connections, oldest first.
    pub fn connections_for_chat(&self, chat_id: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.lock();
        inner.snapshot(inner.by_chat.get(chat_id))
    }

    /// Snapshot of every connection owned by the user, oldest first.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let inner = self.inner.lock();
        inner.snapshot(inner.by_user.get(user_id))
    }

    pub fn chat_connection_count(&self, chat_id: &str) -> usize {
        self.inner.lock().by_chat.get(chat_id).map_or(0, |ids| ids.len())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove connections whose stream has gone away or that have been
    /// silent for longer than `max_idle`. Returns what was removed.
    pub fn prune_stale(&self, max_idle: Duration) -> Vec<Arc<Connection>> {
        let mut inner = self.inner.lock();
        let stale: Vec<String> = inner
            .connections
            .values()
            .filter(|c| c.is_closed() || c.idle_longer_than(max_idle))
            .map(|c| c.id.clone())
            .collect();

        let removed: Vec<Arc<Connection>> =
            stale.iter().filter_map(|id| inner.remove(id)).collect();
        drop(inner);

        for conn in &removed {
            conn.close();
        }
        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
