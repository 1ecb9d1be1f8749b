//! Gateway error types

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while opening a WebSocket session
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listener could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The WebSocket handshake with a remote acceptor failed
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// `listen` was called on an acceptor that is already serving
    #[error("Acceptor is already listening on {0}")]
    AlreadyListening(SocketAddr),

    /// The acceptor was closed
    #[error("Acceptor closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = GatewayError::Bind {
            address: "127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Failed to bind 127.0.0.1:1: in use");
    }

    #[test]
    fn test_already_listening_display() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(
            GatewayError::AlreadyListening(addr).to_string(),
            "Acceptor is already listening on 127.0.0.1:9000"
        );
    }
}
