//! # wsrpc-core
//!
//! Request/response and event protocol layered over a duplex message transport.
//!
//! A [`Connection`] wraps one transport session. Outgoing requests are tracked in a
//! [`CorrelationTable`] until the peer answers or the deadline passes; inbound frames are
//! classified and routed by the [`Dispatcher`]. This crate knows nothing about sockets: a
//! transport plugs in through [`FrameSink`] for the outgoing side and
//! [`Connection::handle_frame`] for the incoming side.

pub mod connection;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-export commonly used types at crate root
pub use connection::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};
pub use correlation::{CorrelationTable, PendingHandle, PendingRequest};
pub use dispatcher::Dispatcher;
pub use error::{HandlerFailure, ProtocolError, RpcError, RpcResult, TransportError};
pub use protocol::{CorrelationId, Message, MessageKind};
pub use registry::{BoxFuture, HandlerOutcome, HandlerRegistry, ListenerId, RequestHandler};
pub use transport::FrameSink;
