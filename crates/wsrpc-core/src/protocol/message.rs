//! Wire message format
//!
//! Every frame on the connection is one JSON object of this shape:
//!
//! ```json
//! {"type": "ping", "data": {"n": 1}, "uuid": "…"}          // request
//! {"type": "ping", "data": {"n": 2}, "response": "…"}      // response
//! {"type": "ping", "error": "…", "response": "…"}          // error response
//! {"type": "tick", "data": 42}                             // event
//! ```

use super::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a message is, derived from which correlation fields are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Carries `uuid`, expects exactly one response
    Request,
    /// Carries `response`, completes a pending request
    Response,
    /// Carries neither, fire-and-forget
    Event,
}

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Request or event type name
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload
    #[serde(default)]
    pub data: Value,

    /// Correlation id of an outgoing request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<CorrelationId>,

    /// Correlation id of the request being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CorrelationId>,

    /// Failure payload of an error response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Message {
    /// Create an event message
    #[must_use]
    pub fn event(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            uuid: None,
            response: None,
            error: None,
        }
    }

    /// Create a request message
    #[must_use]
    pub fn request(message_type: impl Into<String>, data: Value, id: CorrelationId) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            uuid: Some(id),
            response: None,
            error: None,
        }
    }

    /// Create a successful response to the request `id`
    #[must_use]
    pub fn response(message_type: impl Into<String>, data: Value, id: CorrelationId) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            uuid: None,
            response: Some(id),
            error: None,
        }
    }

    /// Create an error response to the request `id`
    #[must_use]
    pub fn error_response(message_type: impl Into<String>, error: Value, id: CorrelationId) -> Self {
        Self {
            message_type: message_type.into(),
            data: Value::Null,
            uuid: None,
            response: Some(id),
            error: Some(error),
        }
    }

    /// Classify the message
    ///
    /// `response` wins over `uuid`; a message with neither is an event.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        if self.response.is_some() {
            MessageKind::Response
        } else if self.uuid.is_some() {
            MessageKind::Request
        } else {
            MessageKind::Event
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.uuid, &self.response) {
            (_, Some(id)) => write!(f, "Response(type={}, response={id})", self.message_type),
            (Some(id), None) => write!(f, "Request(type={}, uuid={id})", self.message_type),
            (None, None) => write!(f, "Event(type={})", self.message_type),
        }
    }
}
