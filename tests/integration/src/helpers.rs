//! Test helpers for integration tests
//!
//! Provides a gateway with the demo handlers, protocol clients and raw WebSocket clients
//! for wire-level checks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use wsrpc_common::{try_init_tracing_with_config, TracingConfig};
use wsrpc_core::{Connection, ConnectionConfig, HandlerFailure};
use wsrpc_gateway::demo::register_demo_handlers;
use wsrpc_gateway::{connect, Acceptor, GatewayConfig};

/// Raw client socket
pub type RawSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long wire-level reads wait before giving up
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway instance that manages its own lifecycle
pub struct TestGateway {
    pub acceptor: Acceptor,
    url: String,
}

impl TestGateway {
    /// Start a gateway serving [`demo_handlers`]
    pub async fn start() -> Result<Self> {
        Self::start_with(demo_handlers).await
    }

    /// Start a gateway running `setup` on every new connection
    pub async fn start_with<F>(setup: F) -> Result<Self>
    where
        F: Fn(Arc<Connection>) + Send + Sync + 'static,
    {
        init_test_tracing();

        let acceptor = Acceptor::new(GatewayConfig::new("127.0.0.1:0"));
        acceptor.on_connection(setup);
        acceptor.listen().await?;
        let url = acceptor.url().context("acceptor has no address")?;

        Ok(Self { acceptor, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Base URL for plain HTTP routes
    pub fn http_url(&self, path: &str) -> String {
        let addr = self.acceptor.local_addr().map(|a| a.to_string()).unwrap_or_default();
        format!("http://{addr}{path}")
    }

    /// Connect a protocol client with default settings
    pub async fn client(&self) -> Result<Arc<Connection>> {
        Ok(connect(&self.url, ConnectionConfig::default()).await?)
    }

    /// Connect a protocol client with a custom default timeout
    pub async fn client_with_timeout(&self, timeout: Duration) -> Result<Arc<Connection>> {
        let config = ConnectionConfig::default().with_response_timeout(timeout);
        Ok(connect(&self.url, config).await?)
    }

    /// Connect a bare WebSocket that speaks frames, not the protocol
    pub async fn raw_client(&self) -> Result<RawSocket> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        Ok(socket)
    }

    pub async fn shutdown(self) {
        self.acceptor.close().await;
    }
}

/// The gateway binary's handlers plus a few test-only ones
///
/// - `ping`, `echo`, `divide`: see [`register_demo_handlers`]
/// - `delay`: sleeps `ms` milliseconds, then returns `tag`
/// - `emit`: sends the payload back as a `tick` event before answering
/// - `ask`: asks the client `whoami` and returns the answer
pub fn demo_handlers(connection: Arc<Connection>) {
    register_demo_handlers(connection.clone());

    connection.on_request("delay", |data| async move {
        let ms = data["ms"].as_u64().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(data["tag"].clone())
    });

    let weak = Arc::downgrade(&connection);
    connection.on_request("emit", move |data| {
        let weak = weak.clone();
        async move {
            let Some(conn) = weak.upgrade() else {
                return Err(HandlerFailure::from("connection gone"));
            };
            conn.send_event("tick", data)
                .await
                .map_err(|e| HandlerFailure::from(e.to_string()))?;
            Ok(Value::Null)
        }
    });

    let weak = Arc::downgrade(&connection);
    connection.on_request("ask", move |_data| {
        let weak = weak.clone();
        async move {
            let Some(conn) = weak.upgrade() else {
                return Err(HandlerFailure::from("connection gone"));
            };
            let answer = conn
                .send_request_with_timeout("whoami", Value::Null, Duration::from_secs(2))
                .await
                .map_err(|e| HandlerFailure::from(e.to_string()))?;
            Ok(json!({ "client": answer }))
        }
    });
}

/// Send one JSON value as a text frame
pub async fn send_json(socket: &mut RawSocket, value: &Value) -> Result<()> {
    socket.send(WsMessage::Text(value.to_string())).await?;
    Ok(())
}

/// Send an arbitrary text frame
pub async fn send_text(socket: &mut RawSocket, text: &str) -> Result<()> {
    socket.send(WsMessage::Text(text.to_string())).await?;
    Ok(())
}

/// Receive the next text frame as JSON
pub async fn recv_json(socket: &mut RawSocket) -> Result<Value> {
    recv_json_within(socket, RECV_TIMEOUT)
        .await?
        .context("no frame received in time")
}

/// Receive the next text frame as JSON, or `None` if nothing arrives within `wait`
pub async fn recv_json_within(socket: &mut RawSocket, wait: Duration) -> Result<Option<Value>> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let next = match tokio::time::timeout_at(deadline, socket.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(None),
        };
        match next.context("socket closed")?? {
            WsMessage::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
            WsMessage::Close(_) => anyhow::bail!("socket closed"),
            _ => continue,
        }
    }
}

/// Enable debug logs for test runs; repeated calls are no-ops
pub fn init_test_tracing() {
    let _ = try_init_tracing_with_config(TracingConfig::development());
}
