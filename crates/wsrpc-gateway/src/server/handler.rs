//! WebSocket upgrade handler
//!
//! Turns each upgraded socket into a [`Connection`] and runs it until the socket ends.

use super::{AcceptorEvent, AcceptorState};
use crate::socket::{run_socket, WsSink};
use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use std::sync::Arc;
use wsrpc_core::Connection;

/// Upgrade route handler
pub async fn upgrade_handler(
    State(state): State<AcceptorState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(state, socket))
}

async fn handle_socket(state: AcceptorState, socket: WebSocket) {
    let config = state.connection_config().clone();
    let (sink, outbound) = WsSink::channel(config.outbound_buffer);
    let connection = Connection::new(sink, config);
    let connection_id = connection.id().to_string();

    state.connections().add(connection.clone());
    state.publish(AcceptorEvent::ConnectionOpened(connection_id.clone()));
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    if state.deliver(connection.clone()).await {
        run_socket(
            socket,
            Arc::downgrade(&connection),
            connection_id.clone(),
            outbound,
        )
        .await;
    } else {
        tracing::debug!(
            connection_id = %connection_id,
            "Acceptor no longer taking connections"
        );
    }

    cleanup_connection(&state, &connection);
}

fn cleanup_connection(state: &AcceptorState, connection: &Arc<Connection>) {
    tracing::info!(connection_id = %connection.id(), "Cleaning up connection");

    connection.close();
    state.connections().remove(connection.id());
    state.publish(AcceptorEvent::ConnectionClosed(connection.id().to_string()));
}
