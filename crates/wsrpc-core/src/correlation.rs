//! Correlation table
//!
//! Tracks requests that were sent and are waiting for their response. Every entry is
//! removed exactly once, by whichever comes first: the matching response, the caller's
//! deadline, the caller giving up, or the connection closing. All of these go through the
//! same lock, so a removal never races the insertion of a fresh identifier.

use crate::error::{RpcError, RpcResult, TransportError};
use crate::protocol::CorrelationId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

type Completion = oneshot::Sender<RpcResult<Value>>;

/// Deadline used when `now + timeout` does not fit in an `Instant` (about 30 years out)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A request waiting for its response
pub struct PendingRequest {
    /// Type name of the request, kept for diagnostics
    message_type: String,
    /// When the caller stops waiting
    deadline: Instant,
    /// Single-use completion slot
    completion: Completion,
}

impl PendingRequest {
    /// Get the request type name
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Get the deadline
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Deliver the outcome, consuming the entry
    ///
    /// Returns false if the caller already stopped listening.
    fn fire(self, outcome: RpcResult<Value>) -> bool {
        self.completion.send(outcome).is_ok()
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("message_type", &self.message_type)
            .field("deadline", &self.deadline)
            .finish()
    }
}

struct TableState {
    pending: HashMap<CorrelationId, PendingRequest>,
    closed: bool,
}

/// Map of correlation id to pending request
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Create an empty table wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new pending request under a fresh identifier
    ///
    /// The identifier is guaranteed not to collide with any entry currently in the table.
    /// Fails once the table has been closed.
    pub fn register(
        self: &Arc<Self>,
        message_type: &str,
        timeout: Duration,
    ) -> Result<PendingHandle, TransportError> {
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

        let id = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }

            let id = loop {
                let candidate = CorrelationId::generate();
                if !state.pending.contains_key(&candidate) {
                    break candidate;
                }
            };

            state.pending.insert(
                id.clone(),
                PendingRequest {
                    message_type: message_type.to_string(),
                    deadline,
                    completion: tx,
                },
            );
            id
        };

        tracing::trace!(correlation_id = %id, message_type, "Pending request registered");

        Ok(PendingHandle {
            table: Arc::clone(self),
            id,
            timeout,
            deadline,
            receiver: rx,
        })
    }

    /// Complete the pending request `id` with `outcome`
    ///
    /// Returns false when no entry exists (already completed, timed out, or never sent):
    /// the caller treats that as an orphan response.
    pub fn complete(&self, id: &CorrelationId, outcome: RpcResult<Value>) -> bool {
        let entry = self.state.lock().pending.remove(id);
        match entry {
            Some(pending) => {
                if !pending.fire(outcome) {
                    tracing::trace!(correlation_id = %id, "Caller stopped waiting before completion");
                }
                true
            }
            None => false,
        }
    }

    /// Remove an entry without completing it
    pub fn remove(&self, id: &CorrelationId) -> Option<PendingRequest> {
        self.state.lock().pending.remove(id)
    }

    /// Close the table and fail everything still pending
    ///
    /// Returns the number of requests that were failed. Later registrations are refused.
    pub fn close(&self) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            pending.fire(Err(TransportError::Closed.into()));
        }
        count
    }

    /// Check if the table was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Check if `id` is pending
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CorrelationTable")
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Caller side of a pending request
///
/// Dropping the handle releases the table entry, so a caller that is cancelled never
/// leaves a stale entry behind.
pub struct PendingHandle {
    table: Arc<CorrelationTable>,
    id: CorrelationId,
    timeout: Duration,
    deadline: Instant,
    receiver: oneshot::Receiver<RpcResult<Value>>,
}

impl PendingHandle {
    /// Get the correlation id
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Get the deadline
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response or the deadline, whichever comes first
    pub async fn wait(mut self) -> RpcResult<Value> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                if self.table.remove(&self.id).is_some() {
                    tracing::debug!(
                        correlation_id = %self.id,
                        timeout_ms = self.timeout.as_millis(),
                        "Request timed out"
                    );
                    Err(RpcError::Timeout(self.timeout))
                } else {
                    // Completed in the same instant the deadline fired
                    self.receiver
                        .try_recv()
                        .unwrap_or(Err(RpcError::Timeout(self.timeout)))
                }
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

impl std::fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish()
    }
}
