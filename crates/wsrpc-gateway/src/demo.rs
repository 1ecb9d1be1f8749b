//! Handlers served by the demo gateway
//!
//! - `ping`: `{n}` → `{n: n + 1}`
//! - `echo`: returns its payload
//! - `divide`: `{a, b}` → `a / b`, fails on `b == 0`
//! - `log` event: written to the gateway log

use serde_json::{json, Value};
use std::sync::Arc;
use wsrpc_core::{Connection, HandlerFailure};

/// Install the demo handlers on a fresh connection
pub fn register_demo_handlers(connection: Arc<Connection>) {
    connection.on_request("ping", |data| async move {
        let Some(n) = data["n"].as_i64() else {
            return Err(HandlerFailure::from("expected integer field `n`"));
        };
        Ok(json!({ "n": n + 1 }))
    });

    connection.on_request("echo", |data| async move { Ok(data) });

    connection.on_request("divide", |data| async move {
        let (Some(a), Some(b)) = (data["a"].as_f64(), data["b"].as_f64()) else {
            return Err(HandlerFailure::from("expected numeric fields `a` and `b`"));
        };
        if b == 0.0 {
            return Err(HandlerFailure::from(json!({ "message": "division by zero" })));
        }
        Ok(json!(a / b))
    });

    let id = connection.id().to_string();
    connection.on_event("log", move |data: Value| {
        tracing::info!(connection_id = %id, data = %data, "Client log");
    });
}
