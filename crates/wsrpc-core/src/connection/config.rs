//! Per-connection settings

use std::time::Duration;

/// Response timeout used when none is configured
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settings applied to each new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Default deadline for `send_request`
    pub response_timeout: Duration,
    /// Capacity of the transport's outbound frame queue
    pub outbound_buffer: usize,
    /// Capacity of the observer broadcast channel
    pub observer_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            outbound_buffer: 100,
            observer_buffer: 64,
        }
    }
}

impl ConnectionConfig {
    /// Override the default response timeout
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}
