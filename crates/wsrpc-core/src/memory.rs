//! In-process transport
//!
//! Two connections joined by tokio channels. Each side gets its own pump task that feeds
//! inbound frames to its connection one at a time, exactly like a socket read loop would.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::TransportError;
use crate::transport::FrameSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Outgoing half of one side of a memory pair
struct MemorySink {
    peer: Mutex<Option<mpsc::Sender<String>>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let sender = self.peer.lock().clone().ok_or(TransportError::Closed)?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.peer.lock().take();
    }
}

/// Create two connected connections
///
/// Closing either side closes the other once its queued frames are drained.
pub fn pair(config: ConnectionConfig) -> (Arc<Connection>, Arc<Connection>) {
    let buffer = config.outbound_buffer.max(1);
    let (to_right, right_inbox) = mpsc::channel(buffer);
    let (to_left, left_inbox) = mpsc::channel(buffer);

    let left = Connection::new(
        Arc::new(MemorySink {
            peer: Mutex::new(Some(to_right)),
        }),
        config.clone(),
    );
    let right = Connection::new(
        Arc::new(MemorySink {
            peer: Mutex::new(Some(to_left)),
        }),
        config,
    );

    tokio::spawn(pump(Arc::downgrade(&left), left_inbox));
    tokio::spawn(pump(Arc::downgrade(&right), right_inbox));

    (left, right)
}

async fn pump(connection: Weak<Connection>, mut inbox: mpsc::Receiver<String>) {
    while let Some(frame) = inbox.recv().await {
        match connection.upgrade() {
            Some(conn) => conn.handle_frame(&frame),
            None => return,
        }
    }

    if let Some(conn) = connection.upgrade() {
        conn.close();
    }
}
