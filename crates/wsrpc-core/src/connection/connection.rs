//! A single logical connection
//!
//! Owns the correlation table and the handler registries of one transport session and
//! exposes the application-facing API: events, requests, handler registration.

use super::{ConnectionConfig, ConnectionEvent};
use crate::correlation::CorrelationTable;
use crate::dispatcher::Dispatcher;
use crate::error::{ProtocolError, RpcResult};
use crate::protocol::Message;
use crate::registry::{HandlerOutcome, HandlerRegistry, ListenerId};
use crate::transport::FrameSink;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport session is up
    Open,
    /// Transport session ended; nothing more is sent or dispatched
    Closed,
}

/// A request/response and event connection over one transport session
pub struct Connection {
    /// Unique connection ID
    id: String,

    /// Outgoing side of the transport
    sink: Arc<dyn FrameSink>,

    /// Requests waiting for a response
    pending: Arc<CorrelationTable>,

    /// Request handlers and event listeners
    registry: Arc<HandlerRegistry>,

    /// Inbound routing
    dispatcher: Dispatcher,

    /// Diagnostics channel
    observers: broadcast::Sender<ConnectionEvent>,

    /// Default response timeout
    response_timeout: RwLock<Duration>,

    /// Current connection state
    state: RwLock<ConnectionState>,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    /// Create a connection writing to `sink`
    ///
    /// The transport must feed every inbound frame to [`Connection::handle_frame`] and call
    /// [`Connection::close`] when the session ends.
    pub fn new(sink: Arc<dyn FrameSink>, config: ConnectionConfig) -> Arc<Self> {
        let id = Self::generate_id();
        let pending = CorrelationTable::new_shared();
        let registry = Arc::new(HandlerRegistry::new());
        let (observers, _) = broadcast::channel(config.observer_buffer.max(1));

        let dispatcher = Dispatcher::new(
            id.clone(),
            Arc::clone(&sink),
            Arc::clone(&pending),
            Arc::clone(&registry),
            observers.clone(),
        );

        tracing::debug!(connection_id = %id, "Connection opened");

        Arc::new(Self {
            id,
            sink,
            pending,
            registry,
            dispatcher,
            observers,
            response_timeout: RwLock::new(config.response_timeout),
            state: RwLock::new(ConnectionState::Open),
            created_at: Instant::now(),
        })
    }

    /// Generate a new connection ID
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Get the connection ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Default deadline applied by [`Connection::send_request`]
    pub fn response_timeout(&self) -> Duration {
        *self.response_timeout.read()
    }

    /// Set the default deadline for requests sent from now on
    pub fn set_response_timeout(&self, timeout: Duration) {
        *self.response_timeout.write() = timeout;
    }

    /// Subscribe to connection diagnostics
    pub fn observe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.observers.subscribe()
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // === Send path ===

    /// Send a fire-and-forget event
    pub async fn send_event(&self, message_type: &str, data: Value) -> RpcResult<()> {
        let frame = Message::event(message_type, data).to_json()?;

        tracing::trace!(
            connection_id = %self.id,
            message_type,
            "Sending event"
        );

        self.sink.send_frame(frame).await.map_err(|e| {
            tracing::warn!(
                connection_id = %self.id,
                message_type,
                error = %e,
                "Failed to send event"
            );
            e.into()
        })
    }

    /// Send a request and wait for its response, using the connection's default timeout
    pub async fn send_request(&self, message_type: &str, data: Value) -> RpcResult<Value> {
        self.send_request_with_timeout(message_type, data, self.response_timeout())
            .await
    }

    /// Send a request and wait at most `timeout` for its response
    ///
    /// Resolves with the response `data`, or fails with exactly one of
    /// [`RpcError::Remote`](crate::RpcError::Remote),
    /// [`RpcError::Timeout`](crate::RpcError::Timeout) or
    /// [`RpcError::Transport`](crate::RpcError::Transport). Dropping the future abandons the
    /// request; a response arriving later is reported as an orphan.
    pub async fn send_request_with_timeout(
        &self,
        message_type: &str,
        data: Value,
        timeout: Duration,
    ) -> RpcResult<Value> {
        // Registered before the write so a fast response always finds its entry
        let handle = self.pending.register(message_type, timeout)?;
        let frame = Message::request(message_type, data, handle.id().clone()).to_json()?;

        tracing::trace!(
            connection_id = %self.id,
            correlation_id = %handle.id(),
            message_type,
            "Sending request"
        );

        if let Err(e) = self.sink.send_frame(frame).await {
            tracing::warn!(
                connection_id = %self.id,
                correlation_id = %handle.id(),
                message_type,
                error = %e,
                "Failed to send request"
            );
            return Err(e.into());
        }

        handle.wait().await
    }

    /// Send a typed request and decode the typed response
    pub async fn call<Req, Resp>(&self, message_type: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let data = serde_json::to_value(request)?;
        let response = self.send_request(message_type, data).await?;
        Ok(serde_json::from_value(response)?)
    }

    // === Handler registration ===

    /// Register a request handler for `message_type`
    ///
    /// The handler's `Ok` value becomes the response `data`; its `Err` becomes the response
    /// `error`. A panicking handler is answered with an error response.
    pub fn on_request<F, Fut>(&self, message_type: &str, handler: F) -> ListenerId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        self.registry
            .add_request_handler(message_type, Arc::new(handler), false)
    }

    /// Register a request handler that answers a single request
    pub fn once_request<F, Fut>(&self, message_type: &str, handler: F) -> ListenerId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerOutcome> + Send + 'static,
    {
        self.registry
            .add_request_handler(message_type, Arc::new(handler), true)
    }

    /// Remove a request handler, or every handler for the type when `id` is `None`
    pub fn off_request(&self, message_type: &str, id: Option<ListenerId>) -> usize {
        self.registry.remove_request_handlers(message_type, id)
    }

    /// Register an event listener for `message_type`
    pub fn on_event<F>(&self, message_type: &str, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.registry
            .add_event_listener(message_type, Arc::new(listener), false)
    }

    /// Register an event listener that fires for the next event only
    pub fn once_event<F>(&self, message_type: &str, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.registry
            .add_event_listener(message_type, Arc::new(listener), true)
    }

    /// Remove an event listener, or every listener for the type when `id` is `None`
    pub fn off_event(&self, message_type: &str, id: Option<ListenerId>) -> usize {
        self.registry.remove_event_listeners(message_type, id)
    }

    // === Receive path ===

    /// Dispatch one inbound text frame
    ///
    /// Called by the transport for each frame, in arrival order.
    pub fn handle_frame(&self, frame: &str) {
        if self.is_closed() {
            tracing::trace!(connection_id = %self.id, "Ignoring frame on closed connection");
            return;
        }
        self.dispatcher.dispatch(frame);
    }

    /// Dispatch one inbound binary frame holding UTF-8 JSON
    pub fn handle_binary(&self, frame: &[u8]) {
        match std::str::from_utf8(frame) {
            Ok(text) => self.handle_frame(text),
            Err(_) => self.dispatcher.report_protocol_error(
                ProtocolError::InvalidUtf8,
                &String::from_utf8_lossy(frame),
            ),
        }
    }

    /// Close the connection
    ///
    /// Fails every pending request with a transport error, releases the transport and
    /// notifies observers. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        let failed = self.pending.close();
        self.sink.close();

        tracing::debug!(
            connection_id = %self.id,
            failed_requests = failed,
            age_ms = self.age().as_millis(),
            "Connection closed"
        );

        let _ = self.observers.send(ConnectionEvent::Closed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}
