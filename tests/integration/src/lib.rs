//! Integration test utilities for wsrpc
//!
//! Starts a real gateway on an ephemeral port and connects WebSocket clients to it.

pub mod helpers;

pub use helpers::*;
