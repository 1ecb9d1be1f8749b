//! Live connection registry
//!
//! Tracks every connection accepted by the gateway, keyed by connection id.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use wsrpc_core::Connection;

/// All open connections of one acceptor
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Track a newly accepted connection
    pub fn add(&self, connection: Arc<Connection>) {
        let id = connection.id().to_string();
        self.connections.insert(id.clone(), connection);
        tracing::debug!(connection_id = %id, "Connection added");
    }

    /// Stop tracking a connection
    pub fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(connection_id).map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection removed");
        }
        removed
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the open connections
    ///
    /// Taken up front so no map shard stays locked across an await.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    /// Send an event to every open connection, returning how many accepted it
    pub async fn broadcast_event(&self, message_type: &str, data: &Value) -> usize {
        let mut sent = 0;
        for conn in self.snapshot() {
            if conn.send_event(message_type, data.clone()).await.is_ok() {
                sent += 1;
            }
        }

        tracing::debug!(
            message_type = %message_type,
            sent = sent,
            "Event broadcast to all connections"
        );

        sent
    }

    /// Close every tracked connection
    pub fn close_all(&self) -> usize {
        let connections = self.snapshot();
        for conn in &connections {
            conn.close();
        }
        connections.len()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .finish()
    }
}
