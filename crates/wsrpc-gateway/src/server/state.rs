//! Acceptor state
//!
//! Shared by the upgrade handler and the [`super::Acceptor`] handle.

use super::{AcceptorEvent, ConnectionRegistry};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use wsrpc_core::{Connection, ConnectionConfig};

/// Callback run for every new connection before its socket is read
pub type ConnectionCallback = dyn Fn(Arc<Connection>) + Send + Sync + 'static;

/// Acceptor application state
#[derive(Clone)]
pub struct AcceptorState {
    /// Settings for each new connection
    connection_config: Arc<ConnectionConfig>,
    /// Open connections
    connections: Arc<ConnectionRegistry>,
    /// Lifecycle notifications
    events: broadcast::Sender<AcceptorEvent>,
    /// Queue drained by `Acceptor::accept`
    incoming: Arc<Mutex<Option<mpsc::Sender<Arc<Connection>>>>>,
    on_connection: Arc<RwLock<Option<Arc<ConnectionCallback>>>>,
}

impl AcceptorState {
    pub fn new(
        connection_config: ConnectionConfig,
        incoming: mpsc::Sender<Arc<Connection>>,
        events: broadcast::Sender<AcceptorEvent>,
    ) -> Self {
        Self {
            connection_config: Arc::new(connection_config),
            connections: ConnectionRegistry::new_shared(),
            events,
            incoming: Arc::new(Mutex::new(Some(incoming))),
            on_connection: Arc::new(RwLock::new(None)),
        }
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection_config
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AcceptorEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: AcceptorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn set_on_connection(&self, callback: Arc<ConnectionCallback>) {
        *self.on_connection.write() = Some(callback);
    }

    /// Stop queueing connections for `accept`
    pub fn close_incoming(&self) {
        self.incoming.lock().take();
    }

    /// Hand a new connection to application code
    ///
    /// Goes to the `on_connection` callback when one is installed, otherwise onto the
    /// `accept` queue. Returns `false` once the acceptor is closing, in which case the
    /// caller must close the connection itself.
    pub async fn deliver(&self, connection: Arc<Connection>) -> bool {
        let Some(sender) = self.incoming.lock().clone() else {
            return false;
        };

        let callback = self.on_connection.read().clone();
        if let Some(callback) = callback {
            callback(connection);
            return true;
        }

        sender.send(connection).await.is_ok()
    }
}

impl std::fmt::Debug for AcceptorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptorState")
            .field("connection_config", &self.connection_config)
            .field("connections", &self.connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wsrpc_core::memory::pair;

    fn state() -> (AcceptorState, mpsc::Receiver<Arc<Connection>>) {
        let (tx, rx) = mpsc::channel(4);
        let (events, _) = broadcast::channel(4);
        (AcceptorState::new(ConnectionConfig::default(), tx, events), rx)
    }

    #[tokio::test]
    async fn test_deliver_to_accept_queue() {
        let (state, mut rx) = state();
        let (conn, _peer) = pair(ConnectionConfig::default());

        assert!(state.deliver(conn.clone()).await);
        assert_eq!(rx.recv().await.unwrap().id(), conn.id());
    }

    #[tokio::test]
    async fn test_deliver_prefers_callback() {
        let (state, mut rx) = state();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        state.set_on_connection(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (conn, _peer) = pair(ConnectionConfig::default());
        assert!(state.deliver(conn).await);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_refused_after_close_even_with_callback() {
        let (state, _rx) = state();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        state.set_on_connection(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        state.close_incoming();

        let (conn, _peer) = pair(ConnectionConfig::default());
        assert!(!state.deliver(conn).await);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deliver_after_close_incoming() {
        let (state, _rx) = state();
        state.close_incoming();

        let (conn, _peer) = pair(ConnectionConfig::default());
        assert!(!state.deliver(conn).await);
    }
}
