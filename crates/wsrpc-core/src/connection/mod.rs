//! Connection
//!
//! One logical peer: send path, receive path, and the state that ties them together.

mod config;
mod connection;
mod observer;

pub use config::{ConnectionConfig, DEFAULT_RESPONSE_TIMEOUT};
pub use connection::{Connection, ConnectionState};
pub use observer::ConnectionEvent;
