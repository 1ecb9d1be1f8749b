//! Wire protocol
//!
//! Message format and correlation identifiers.

mod correlation_id;
mod message;

pub use correlation_id::CorrelationId;
pub use message::{Message, MessageKind};
