//! WebSocket session plumbing shared by the client and server roles
//!
//! A socket is split into a receive task that feeds frames to the connection in arrival
//! order and a send task that drains the outbound queue, acknowledging every frame once
//! the socket accepted or rejected it.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use wsrpc_core::{Connection, FrameSink, TransportError};

/// One queued text frame and the slot its send result goes to
pub(crate) struct Outbound {
    frame: String,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// `FrameSink` backed by the socket's send task
pub(crate) struct WsSink {
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
}

impl WsSink {
    /// Create a sink and the queue its send task drains
    pub(crate) fn channel(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = Arc::new(Self {
            outbound: Mutex::new(Some(tx)),
        });
        (sink, rx)
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let sender = self.outbound.lock().clone().ok_or(TransportError::Closed)?;
        let (ack, acked) = oneshot::channel();
        sender
            .send(Outbound { frame, ack })
            .await
            .map_err(|_| TransportError::Closed)?;

        // Dropped ack means the send task is gone
        acked.await.map_err(|_| TransportError::Closed)?
    }

    fn close(&self) {
        self.outbound.lock().take();
    }
}

/// What an inbound WebSocket message means to the protocol
pub(crate) enum Inbound<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
    Close,
    Control,
}

/// Message type of a WebSocket implementation
pub(crate) trait WsFrame: Send + 'static {
    fn text(frame: String) -> Self;
    fn inbound(&self) -> Inbound<'_>;
}

impl WsFrame for axum::extract::ws::Message {
    fn text(frame: String) -> Self {
        Self::Text(frame)
    }

    fn inbound(&self) -> Inbound<'_> {
        match self {
            Self::Text(text) => Inbound::Text(text),
            Self::Binary(bytes) => Inbound::Binary(bytes),
            Self::Close(_) => Inbound::Close,
            Self::Ping(_) | Self::Pong(_) => Inbound::Control,
        }
    }
}

impl WsFrame for tokio_tungstenite::tungstenite::Message {
    fn text(frame: String) -> Self {
        Self::Text(frame)
    }

    fn inbound(&self) -> Inbound<'_> {
        match self {
            Self::Text(text) => Inbound::Text(text),
            Self::Binary(bytes) => Inbound::Binary(bytes),
            Self::Close(_) => Inbound::Close,
            Self::Ping(_) | Self::Pong(_) | Self::Frame(_) => Inbound::Control,
        }
    }
}

/// Drive one socket until either direction ends, then close the connection
pub(crate) async fn run_socket<S, M, E>(
    socket: S,
    connection: Weak<Connection>,
    connection_id: String,
    mut outbound: mpsc::Receiver<Outbound>,
) where
    S: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Send + 'static,
    M: WsFrame,
    E: Display + Send + 'static,
{
    let (mut ws_sink, mut ws_stream) = socket.split();

    let recv_connection = connection.clone();
    let recv_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            let Some(conn) = recv_connection.upgrade() else {
                return;
            };
            match msg {
                Ok(msg) => match msg.inbound() {
                    Inbound::Text(text) => conn.handle_frame(text),
                    Inbound::Binary(bytes) => conn.handle_binary(bytes),
                    Inbound::Close => {
                        tracing::debug!(connection_id = %recv_id, "Peer closed connection");
                        return;
                    }
                    Inbound::Control => {
                        tracing::trace!(connection_id = %recv_id, "Control frame received");
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        connection_id = %recv_id,
                        error = %e,
                        "WebSocket error"
                    );
                    return;
                }
            }
        }
    });

    let send_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(Outbound { frame, ack }) = outbound.recv().await {
            let result = ws_sink
                .send(M::text(frame))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()));
            let failed = result.is_err();
            let _ = ack.send(result);
            if failed {
                tracing::warn!(connection_id = %send_id, "Failed to write frame to WebSocket");
                break;
            }
        }

        // Queue closed or socket broken
        let _ = ws_sink.close().await;
    });

    tokio::select! {
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task ended");
        }
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task ended");
            recv_task.abort();
        }
    }

    // Closing drops the outbound queue, so the send task flushes and exits on its own
    if let Some(conn) = connection.upgrade() {
        conn.close();
    }
}
