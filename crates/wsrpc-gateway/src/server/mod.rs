//! Server role
//!
//! An [`Acceptor`] listens for WebSocket upgrades and yields one [`Connection`] per session.

mod handler;
mod registry;
mod state;

pub use handler::upgrade_handler;
pub use registry::ConnectionRegistry;
pub use state::{AcceptorState, ConnectionCallback};

use crate::error::GatewayError;
use axum::{routing::get, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use wsrpc_common::AppConfig;
use wsrpc_core::{Connection, ConnectionConfig};

/// Connections waiting for `accept`
const ACCEPT_BACKLOG: usize = 128;

/// Capacity of the lifecycle event channel
const EVENT_BUFFER: usize = 64;

/// Listener settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `host:port` to bind; port 0 picks a free one
    pub address: String,
    /// Route serving the WebSocket upgrade
    pub path: String,
    pub connection: ConnectionConfig,
}

impl GatewayConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: "/".to_string(),
            connection: ConnectionConfig::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_connection_config(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }
}

impl From<&AppConfig> for GatewayConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            address: config.gateway.address(),
            path: config.gateway.path.clone(),
            connection: config.rpc.connection_config(),
        }
    }
}

/// Acceptor lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorEvent {
    Listening(SocketAddr),
    ConnectionOpened(String),
    ConnectionClosed(String),
    Closed,
}

/// Create the gateway router
pub fn create_router(path: &str) -> Router<AcceptorState> {
    let router = Router::new().route(path, get(upgrade_handler));
    if path == "/health" {
        router
    } else {
        router.route("/health", get(health_check))
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(path: &str, state: AcceptorState) -> Router {
    create_router(path)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket server handing out one [`Connection`] per session
pub struct Acceptor {
    config: GatewayConfig,
    state: AcceptorState,
    incoming: tokio::sync::Mutex<mpsc::Receiver<Arc<Connection>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    server: Mutex<Option<JoinHandle<()>>>,
    closed: Mutex<bool>,
}

impl Acceptor {
    /// Create an acceptor without binding yet
    ///
    /// Subscribe to [`Acceptor::events`] before [`Acceptor::listen`] to see `Listening`.
    pub fn new(config: GatewayConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel(ACCEPT_BACKLOG);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = AcceptorState::new(config.connection.clone(), incoming_tx, events);

        Self {
            config,
            state,
            incoming: tokio::sync::Mutex::new(incoming_rx),
            local_addr: Mutex::new(None),
            shutdown: Mutex::new(None),
            server: Mutex::new(None),
            closed: Mutex::new(false),
        }
    }

    /// Create an acceptor and start listening
    pub async fn bind(config: GatewayConfig) -> Result<Self, GatewayError> {
        let acceptor = Self::new(config);
        acceptor.listen().await?;
        Ok(acceptor)
    }

    /// Bind the listener and start serving upgrades
    pub async fn listen(&self) -> Result<SocketAddr, GatewayError> {
        if *self.closed.lock() {
            return Err(GatewayError::Closed);
        }
        if let Some(addr) = *self.local_addr.lock() {
            return Err(GatewayError::AlreadyListening(addr));
        }

        let address = self.config.address.clone();
        let bind_error = |source| GatewayError::Bind {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let app = create_app(&self.config.path, self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_state = self.state.clone();

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "Gateway server error");
            }
            tracing::info!("Gateway stopped");
            server_state.publish(AcceptorEvent::Closed);
        });

        *self.local_addr.lock() = Some(local_addr);
        *self.shutdown.lock() = Some(shutdown_tx);
        *self.server.lock() = Some(server);

        tracing::info!("Gateway listening on ws://{}{}", local_addr, self.config.path);
        self.state.publish(AcceptorEvent::Listening(local_addr));

        Ok(local_addr)
    }

    /// Bound address, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// `ws://` URL clients can connect to, once listening
    pub fn url(&self) -> Option<String> {
        self.local_addr()
            .map(|addr| format!("ws://{addr}{}", self.config.path))
    }

    /// Wait for the next connection
    ///
    /// Returns `None` once the acceptor is closed. Connections are only queued here while
    /// no `on_connection` callback is installed.
    pub async fn accept(&self) -> Option<Arc<Connection>> {
        self.incoming.lock().await.recv().await
    }

    /// Run `callback` for each new connection before its socket is read
    ///
    /// Handlers registered inside the callback see every frame the peer sends.
    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(Arc<Connection>) + Send + Sync + 'static,
    {
        self.state.set_on_connection(Arc::new(callback));
    }

    /// Subscribe to lifecycle events
    pub fn events(&self) -> broadcast::Receiver<AcceptorEvent> {
        self.state.subscribe()
    }

    /// Open connections
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        self.state.connections()
    }

    /// Stop listening and close every open connection
    ///
    /// Idempotent. Resolves once the server task has stopped.
    pub async fn close(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }

        self.state.close_incoming();
        let closed_connections = self.state.connections().close_all();
        tracing::debug!(connections = closed_connections, "Closing gateway");

        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
        let server = self.server.lock().take();
        match server {
            Some(server) => {
                if let Err(e) = server.await {
                    tracing::warn!(error = %e, "Gateway server task failed");
                }
            }
            // Never listened, so no server task will report it
            None => self.state.publish(AcceptorEvent::Closed),
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.get_mut().take() {
            let _ = shutdown.send(());
        }
    }
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr())
            .field("connections", &self.state.connections().len())
            .finish()
    }
}
