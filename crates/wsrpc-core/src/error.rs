//! Error types for the correlation protocol

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure at the transport boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The session is closed; nothing can be written anymore
    #[error("Connection closed")]
    Closed,

    /// The transport rejected the frame
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Errors surfaced to callers of the send operations
#[derive(Debug, Error)]
pub enum RpcError {
    /// The frame could not be handed to the transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No matching response arrived before the deadline
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The peer answered with an `error` payload
    #[error("Remote error: {0}")]
    Remote(Value),

    /// Payload could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RpcError {
    /// Check if the request hit its deadline
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if the peer reported a failure
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Check if the transport refused the frame
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The error payload sent by the peer, if this is a remote error
    pub fn remote_payload(&self) -> Option<&Value> {
        match self {
            Self::Remote(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Result type for send operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Malformed inbound frame
///
/// Never returned to application code; it is published on the connection's observer
/// channel and the frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame is not a JSON message with the expected fields
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Binary frame that is not UTF-8 text
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Failure reported by a request handler
///
/// The wrapped value is sent to the peer verbatim in the response's `error` field.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure(Value);

impl HandlerFailure {
    /// Create a failure from any JSON value
    pub fn new(payload: impl Into<Value>) -> Self {
        Self(payload.into())
    }

    /// Create a failure from a serializable value
    pub fn from_serialize<T: serde::Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self(value),
            Err(e) => Self(Value::String(e.to_string())),
        }
    }

    /// Get the error payload
    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Take the error payload
    pub fn into_payload(self) -> Value {
        self.0
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for HandlerFailure {
    fn from(message: &str) -> Self {
        Self(Value::String(message.to_string()))
    }
}

impl From<String> for HandlerFailure {
    fn from(message: String) -> Self {
        Self(Value::String(message))
    }
}

impl From<Value> for HandlerFailure {
    fn from(payload: Value) -> Self {
        Self(payload)
    }
}

impl From<serde_json::Error> for HandlerFailure {
    fn from(e: serde_json::Error) -> Self {
        Self(Value::String(e.to_string()))
    }
}
