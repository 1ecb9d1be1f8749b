//! Inbound message dispatcher
//!
//! Classifies every frame and routes it to the correlation table, a request handler, or
//! the event listeners. Frames are dispatched one at a time by the transport's read loop;
//! request handlers run on their own tasks so a slow handler never stalls the stream.

use crate::connection::ConnectionEvent;
use crate::correlation::CorrelationTable;
use crate::error::{HandlerFailure, ProtocolError, RpcError};
use crate::protocol::{CorrelationId, Message, MessageKind};
use crate::registry::{HandlerOutcome, HandlerRegistry};
use crate::transport::FrameSink;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Routes inbound messages of one connection
pub struct Dispatcher {
    connection_id: String,
    sink: Arc<dyn FrameSink>,
    pending: Arc<CorrelationTable>,
    registry: Arc<HandlerRegistry>,
    observers: broadcast::Sender<ConnectionEvent>,
}

impl Dispatcher {
    /// Create a dispatcher over the connection's shared state
    pub fn new(
        connection_id: String,
        sink: Arc<dyn FrameSink>,
        pending: Arc<CorrelationTable>,
        registry: Arc<HandlerRegistry>,
        observers: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            connection_id,
            sink,
            pending,
            registry,
            observers,
        }
    }

    /// Dispatch one inbound text frame
    ///
    /// Must be called from within a tokio runtime. Never fails: malformed frames are
    /// reported to observers and dropped.
    pub fn dispatch(&self, frame: &str) {
        let message = match Message::from_json(frame) {
            Ok(m) => m,
            Err(e) => {
                self.report_protocol_error(ProtocolError::Malformed(e.to_string()), frame);
                return;
            }
        };

        tracing::trace!(
            connection_id = %self.connection_id,
            message = %message,
            "Received message"
        );

        if self.observers.receiver_count() > 0 {
            self.publish(ConnectionEvent::MessageObserved(message.clone()));
        }

        match message.kind() {
            MessageKind::Request => self.handle_request(message),
            MessageKind::Response => self.handle_response(message),
            MessageKind::Event => self.handle_event(message),
        }
    }

    /// Report a frame that could not be turned into a message
    pub fn report_protocol_error(&self, error: ProtocolError, frame: &str) {
        tracing::warn!(
            connection_id = %self.connection_id,
            error = %error,
            "Dropping malformed frame"
        );
        self.publish(ConnectionEvent::ProtocolError {
            error,
            frame: frame.to_string(),
        });
    }

    fn publish(&self, event: ConnectionEvent) {
        // No receivers is fine
        let _ = self.observers.send(event);
    }

    fn handle_request(&self, message: Message) {
        let Message {
            message_type,
            data,
            uuid,
            ..
        } = message;
        let Some(correlation_id) = uuid else {
            return;
        };

        let Some(handler) = self.registry.request_handler(&message_type) else {
            tracing::debug!(
                connection_id = %self.connection_id,
                correlation_id = %correlation_id,
                message_type = %message_type,
                "No request handler registered, request left unanswered"
            );
            self.publish(ConnectionEvent::UnhandledRequest {
                correlation_id,
                message_type,
            });
            return;
        };

        let responder = Responder {
            connection_id: self.connection_id.clone(),
            sink: Arc::clone(&self.sink),
            observers: self.observers.clone(),
            correlation_id,
            message_type,
        };

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { handler.call(data).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HandlerFailure::from(panic_message(&*panic))));
            responder.respond(outcome).await;
        });
    }

    fn handle_response(&self, message: Message) {
        let Message {
            message_type,
            data,
            response,
            error,
            ..
        } = message;
        let Some(correlation_id) = response else {
            return;
        };

        let outcome = match error {
            Some(error) => Err(RpcError::Remote(error)),
            None => Ok(data),
        };

        if self.pending.complete(&correlation_id, outcome) {
            tracing::trace!(
                connection_id = %self.connection_id,
                correlation_id = %correlation_id,
                "Pending request completed"
            );
        } else {
            tracing::warn!(
                connection_id = %self.connection_id,
                correlation_id = %correlation_id,
                message_type = %message_type,
                "Got response without a pending request"
            );
            self.publish(ConnectionEvent::OrphanResponse {
                correlation_id,
                message_type,
            });
        }
    }

    fn handle_event(&self, message: Message) {
        let listeners = self.registry.event_listeners(&message.message_type);
        if listeners.is_empty() {
            tracing::trace!(
                connection_id = %self.connection_id,
                message_type = %message.message_type,
                "No listeners for event"
            );
            return;
        }

        for listener in listeners {
            let data = message.data.clone();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| listener(data))) {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    message_type = %message.message_type,
                    panic = %panic_message(&*panic),
                    "Event listener panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// Sends the single response owed for one incoming request
struct Responder {
    connection_id: String,
    sink: Arc<dyn FrameSink>,
    observers: broadcast::Sender<ConnectionEvent>,
    correlation_id: CorrelationId,
    message_type: String,
}

impl Responder {
    async fn respond(self, outcome: HandlerOutcome) {
        let response = match outcome {
            Ok(data) => Message::response(&self.message_type, data, self.correlation_id.clone()),
            Err(failure) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    correlation_id = %self.correlation_id,
                    message_type = %self.message_type,
                    error = %failure,
                    "Request handler failed"
                );
                let _ = self.observers.send(ConnectionEvent::HandlerFailed {
                    correlation_id: self.correlation_id.clone(),
                    message_type: self.message_type.clone(),
                    error: failure.payload().clone(),
                });
                Message::error_response(
                    &self.message_type,
                    failure.into_payload(),
                    self.correlation_id.clone(),
                )
            }
        };

        let frame = match response.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    correlation_id = %self.correlation_id,
                    error = %e,
                    "Failed to serialize response"
                );
                return;
            }
        };

        if let Err(e) = self.sink.send_frame(frame).await {
            tracing::warn!(
                connection_id = %self.connection_id,
                correlation_id = %self.correlation_id,
                error = %e,
                "Failed to send response"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
