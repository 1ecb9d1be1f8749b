//! Transport boundary
//!
//! The outgoing half of a transport session. The incoming half is the transport's own
//! read loop calling [`crate::Connection::handle_frame`] for each frame, in order.

use crate::error::TransportError;
use async_trait::async_trait;

/// Writes frames to the peer
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Hand one text frame to the transport
    ///
    /// Resolves once the transport accepted or rejected the frame.
    async fn send_frame(&self, frame: String) -> Result<(), TransportError>;

    /// Stop accepting frames and let the session wind down
    fn close(&self);
}
