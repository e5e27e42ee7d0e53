//! Thread-safe membership of live connections.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::warn;

use crate::connection::{Connection, ConnectionId};

/// The live set of connections attached to a server.
///
/// Membership is mutated by the accept path and by each receive loop's
/// termination; broadcasts iterate a snapshot taken under the lock, so a
/// member that joins or leaves mid-broadcast may or may not receive the
/// message without the registry itself faulting. The lock is never held
/// across a send.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a connection under its id.
    pub async fn add(&self, conn: Arc<Connection>) {
        self.connections.lock().await.insert(conn.id(), conn);
    }

    /// Removes a connection; a no-op when it is already absent.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.lock().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Clones the current membership for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Fans one message out to a snapshot of the current members.
    ///
    /// A send failure to one member is logged and skipped; the rest of
    /// the snapshot still gets the message. Returns how many sends
    /// succeeded; broadcasting to an empty registry delivers zero and is
    /// not an error.
    pub async fn broadcast(&self, line: &str, excluding: Option<ConnectionId>) -> usize {
        let members = self.snapshot().await;
        let mut delivered = 0;
        for conn in members {
            if excluding == Some(conn.id()) {
                continue;
            }
            match conn.send(line).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(conn = %conn, ?error, "dropping broadcast to unreachable connection");
                }
            }
        }
        delivered
    }

    /// Closes every member. Each close is idempotent and lets the
    /// member's receive loop report its own termination.
    pub async fn close_all(&self) {
        for conn in self.snapshot().await {
            conn.close().await;
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
