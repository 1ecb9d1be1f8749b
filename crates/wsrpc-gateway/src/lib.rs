//! # wsrpc-gateway
//!
//! WebSocket binding for [`wsrpc_core::Connection`]: a `tokio-tungstenite` client and an
//! axum-based acceptor that turns every upgraded socket into a connection.

pub mod client;
pub mod demo;
pub mod error;
pub mod server;
mod socket;

pub use client::connect;
pub use error::GatewayError;
pub use server::{
    create_app, Acceptor, AcceptorEvent, AcceptorState, ConnectionRegistry, GatewayConfig,
};
