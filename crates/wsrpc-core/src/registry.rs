//! Handler and listener registries
//!
//! Two explicit maps keyed by type name: request handlers, which produce a response, and
//! event listeners, which only observe. Callbacks are cloned out of the lock before they
//! run, so a callback may register or remove other callbacks.

use crate::error::HandlerFailure;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed future for handler results
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a request handler produces: the response `data` or the response `error`
pub type HandlerOutcome = Result<Value, HandlerFailure>;

/// Event listener callback
pub type EventListener = dyn Fn(Value) + Send + Sync + 'static;

/// Handles incoming requests of one type
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request payload
    fn call(&self, data: Value) -> BoxFuture<'static, HandlerOutcome>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    fn call(&self, data: Value) -> BoxFuture<'static, HandlerOutcome> {
        Box::pin(self(data))
    }
}

/// Token returned on registration, used to remove that one registration later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration<T: ?Sized> {
    id: ListenerId,
    once: bool,
    callback: Arc<T>,
}

struct Subscribers<T: ?Sized> {
    by_type: HashMap<String, Vec<Registration<T>>>,
}

impl<T: ?Sized> Subscribers<T> {
    fn new() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    fn add(&mut self, message_type: &str, registration: Registration<T>) {
        self.by_type
            .entry(message_type.to_string())
            .or_default()
            .push(registration);
    }

    fn remove(&mut self, message_type: &str, id: Option<ListenerId>) -> usize {
        let Some(id) = id else {
            return self.by_type.remove(message_type).map_or(0, |regs| regs.len());
        };

        let Some(regs) = self.by_type.get_mut(message_type) else {
            return 0;
        };
        let before = regs.len();
        regs.retain(|reg| reg.id != id);
        let removed = before - regs.len();
        if regs.is_empty() {
            self.by_type.remove(message_type);
        }
        removed
    }

    fn count(&self, message_type: &str) -> usize {
        self.by_type.get(message_type).map_or(0, Vec::len)
    }
}

/// Request handlers and event listeners of one connection
pub struct HandlerRegistry {
    requests: Mutex<Subscribers<dyn RequestHandler>>,
    events: Mutex<Subscribers<EventListener>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Subscribers::new()),
            events: Mutex::new(Subscribers::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a request handler
    ///
    /// Only the earliest registration for a type answers; later ones take over when it is
    /// removed. A `once` handler is removed as soon as it is picked for a request.
    pub fn add_request_handler(
        &self,
        message_type: &str,
        handler: Arc<dyn RequestHandler>,
        once: bool,
    ) -> ListenerId {
        let id = self.next_id();
        self.requests.lock().add(
            message_type,
            Registration {
                id,
                once,
                callback: handler,
            },
        );
        tracing::debug!(message_type, once, "Request handler registered");
        id
    }

    /// Register an event listener
    pub fn add_event_listener(
        &self,
        message_type: &str,
        listener: Arc<EventListener>,
        once: bool,
    ) -> ListenerId {
        let id = self.next_id();
        self.events.lock().add(
            message_type,
            Registration {
                id,
                once,
                callback: listener,
            },
        );
        tracing::debug!(message_type, once, "Event listener registered");
        id
    }

    /// Remove one request handler, or all of them for the type when `id` is `None`
    pub fn remove_request_handlers(&self, message_type: &str, id: Option<ListenerId>) -> usize {
        self.requests.lock().remove(message_type, id)
    }

    /// Remove one event listener, or all of them for the type when `id` is `None`
    pub fn remove_event_listeners(&self, message_type: &str, id: Option<ListenerId>) -> usize {
        self.events.lock().remove(message_type, id)
    }

    /// Pick the handler that answers a request of this type
    pub fn request_handler(&self, message_type: &str) -> Option<Arc<dyn RequestHandler>> {
        let mut requests = self.requests.lock();
        let regs = requests.by_type.get_mut(message_type)?;
        let first = regs.first()?;
        let handler = Arc::clone(&first.callback);

        if first.once {
            regs.remove(0);
            if regs.is_empty() {
                requests.by_type.remove(message_type);
            }
        }
        Some(handler)
    }

    /// Snapshot the listeners for an event, in registration order
    ///
    /// One-shot listeners are removed in the same step, so each fires at most once.
    pub fn event_listeners(&self, message_type: &str) -> Vec<Arc<EventListener>> {
        let mut events = self.events.lock();
        let Some(regs) = events.by_type.get_mut(message_type) else {
            return Vec::new();
        };

        let listeners = regs.iter().map(|reg| Arc::clone(&reg.callback)).collect();
        regs.retain(|reg| !reg.once);
        if regs.is_empty() {
            events.by_type.remove(message_type);
        }
        listeners
    }

    /// Number of request handlers for a type
    pub fn request_handler_count(&self, message_type: &str) -> usize {
        self.requests.lock().count(message_type)
    }

    /// Number of event listeners for a type
    pub fn event_listener_count(&self, message_type: &str) -> usize {
        self.events.lock().count(message_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("request_types", &self.requests.lock().by_type.len())
            .field("event_types", &self.events.lock().by_type.len())
            .finish()
    }
}
