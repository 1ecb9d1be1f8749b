//! Connection diagnostics
//!
//! Published on a broadcast channel, separate from protocol routing. Nothing here ever
//! reaches a pending caller.

use crate::error::ProtocolError;
use crate::protocol::{CorrelationId, Message};
use serde_json::Value;

/// Something observed on a connection
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A frame parsed into a message, before routing
    MessageObserved(Message),

    /// A frame was dropped because it could not be parsed
    ProtocolError { error: ProtocolError, frame: String },

    /// A response matched no pending request
    OrphanResponse {
        correlation_id: CorrelationId,
        message_type: String,
    },

    /// A request arrived for a type with no handler and was left unanswered
    UnhandledRequest {
        correlation_id: CorrelationId,
        message_type: String,
    },

    /// A request handler failed and an error response was sent instead
    HandlerFailed {
        correlation_id: CorrelationId,
        message_type: String,
        error: Value,
    },

    /// The connection closed
    Closed,
}
