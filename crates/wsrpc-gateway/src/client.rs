//! Client role
//!
//! Opens a WebSocket session with `tokio-tungstenite` and wraps it in a [`Connection`].

use crate::error::GatewayError;
use crate::socket::{run_socket, WsSink};
use std::sync::Arc;
use wsrpc_core::{Connection, ConnectionConfig};

/// Connect to an acceptor at `url` (e.g. `ws://127.0.0.1:9000/`)
///
/// The session lives as long as the returned connection: dropping the last handle or
/// calling [`Connection::close`] shuts the socket down.
pub async fn connect(url: &str, config: ConnectionConfig) -> Result<Arc<Connection>, GatewayError> {
    let (socket, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::Connect {
                url: url.to_string(),
                source: Box::new(e),
            })?;

    let (sink, outbound) = WsSink::channel(config.outbound_buffer);
    let connection = Connection::new(sink, config);

    tracing::debug!(
        connection_id = %connection.id(),
        url = %url,
        "WebSocket client connected"
    );

    tokio::spawn(run_socket(
        socket,
        Arc::downgrade(&connection),
        connection.id().to_string(),
        outbound,
    ));

    Ok(connection)
}
