//! End-to-end protocol tests over real WebSocket sessions
//!
//! Run with: cargo test -p integration-tests --test rpc_tests

use integration_tests::{
    recv_json, recv_json_within, send_json, send_text, TestGateway,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wsrpc_core::{ConnectionEvent, RpcError};
use wsrpc_gateway::AcceptorEvent;

// ============================================================================
// Health Check
// ============================================================================

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;

    let response = reqwest::get(gateway.http_url("/health")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    gateway.shutdown().await;
    Ok(())
}

// ============================================================================
// Request / Response
// ============================================================================

#[tokio::test]
async fn test_ping_round_trip() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let response = client.send_request("ping", json!({"n": 1})).await?;
    assert_eq!(response, json!({"n": 2}));
    assert_eq!(client.pending_requests(), 0);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_typed_call() -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct Divide {
        a: f64,
        b: f64,
    }

    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let quotient: f64 = client.call("divide", &Divide { a: 9.0, b: 3.0 }).await?;
    assert!((quotient - 3.0).abs() < f64::EPSILON);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_divide_by_zero_is_remote_error() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let err = client
        .send_request("divide", json!({"a": 1, "b": 0}))
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert_eq!(
        err.remote_payload(),
        Some(&json!({"message": "division by zero"}))
    );

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_silent_peer_times_out() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let started = Instant::now();
    let err = client
        .send_request_with_timeout("slow", json!({}), Duration::from_millis(50))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RpcError::Timeout(t) if t == Duration::from_millis(50)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(client.pending_requests(), 0);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_connection_default_timeout() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client_with_timeout(Duration::from_millis(80)).await?;

    let err = client.send_request("nobody", json!(null)).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(t) if t == Duration::from_millis(80)));

    client.set_response_timeout(Duration::from_millis(30));
    let err = client.send_request("nobody", json!(null)).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(t) if t == Duration::from_millis(30)));

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_responses_in_reverse_order() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let (slow, fast) = tokio::join!(
        client.send_request("delay", json!({"ms": 200, "tag": "slow"})),
        client.send_request("delay", json!({"ms": 10, "tag": "fast"})),
    );

    assert_eq!(slow?, json!("slow"));
    assert_eq!(fast?, json!("fast"));
    assert_eq!(client.pending_requests(), 0);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_late_response_is_orphan() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;
    let mut events = client.observe();

    let err = client
        .send_request_with_timeout(
            "delay",
            json!({"ms": 150, "tag": "late"}),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let orphan = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::OrphanResponse { message_type, .. }) => return message_type,
                Ok(_) => continue,
                Err(e) => panic!("observer channel failed: {e}"),
            }
        }
    })
    .await?;
    assert_eq!(orphan, "delay");

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_server_calls_client() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;
    client.on_request("whoami", |_| async move { Ok(json!("test-client")) });

    let response = client.send_request("ask", json!(null)).await?;
    assert_eq!(response, json!({"client": "test-client"}));

    gateway.shutdown().await;
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_off_event_removes_all_listeners() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;
    let hits = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = hits.clone();
        client.on_event("tick", move |_: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    // The event frame precedes the response frame on the socket
    client.send_request("emit", json!(1)).await?;
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    assert_eq!(client.off_event("tick", None), 2);
    client.send_request("emit", json!(2)).await?;
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_once_event_fires_once() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    client.once_event("tick", move |data: Value| {
        assert_eq!(data, json!("first"));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.send_request("emit", json!("first")).await?;
    client.send_request("emit", json!("second")).await?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_event_without_listener_gets_no_reply() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut socket = gateway.raw_client().await?;

    send_json(&mut socket, &json!({"type": "nobody-listens", "data": 1})).await?;
    assert_eq!(
        recv_json_within(&mut socket, Duration::from_millis(200)).await?,
        None
    );

    gateway.shutdown().await;
    Ok(())
}

// ============================================================================
// Wire format
// ============================================================================

#[tokio::test]
async fn test_response_wire_format() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut socket = gateway.raw_client().await?;

    send_json(
        &mut socket,
        &json!({"type": "ping", "data": {"n": 41}, "uuid": "req-1"}),
    )
    .await?;

    let frame = recv_json(&mut socket).await?;
    assert_eq!(
        frame,
        json!({"type": "ping", "data": {"n": 42}, "response": "req-1"})
    );

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_error_response_wire_format() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut socket = gateway.raw_client().await?;

    send_json(
        &mut socket,
        &json!({"type": "divide", "data": {"a": 1, "b": 0}, "uuid": "req-2"}),
    )
    .await?;

    let frame = recv_json(&mut socket).await?;
    assert_eq!(frame["type"], "divide");
    assert_eq!(frame["response"], "req-2");
    assert_eq!(frame["error"], json!({"message": "division by zero"}));
    assert!(frame.get("uuid").is_none());

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unhandled_request_gets_no_reply() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut socket = gateway.raw_client().await?;

    send_json(
        &mut socket,
        &json!({"type": "nobody", "data": {}, "uuid": "req-3"}),
    )
    .await?;
    assert_eq!(
        recv_json_within(&mut socket, Duration::from_millis(200)).await?,
        None
    );

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut socket = gateway.raw_client().await?;

    send_text(&mut socket, "this is not json").await?;
    send_json(&mut socket, &json!({"data": 1, "uuid": "no-type"})).await?;
    send_json(
        &mut socket,
        &json!({"type": "echo", "data": "still here", "uuid": "req-4"}),
    )
    .await?;

    let frame = recv_json(&mut socket).await?;
    assert_eq!(frame["response"], "req-4");
    assert_eq!(frame["data"], "still here");

    gateway.shutdown().await;
    Ok(())
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_acceptor_reports_connections() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let mut events = gateway.acceptor.events();

    let client = gateway.client().await?;
    let opened = match tokio::time::timeout(Duration::from_secs(2), events.recv()).await?? {
        AcceptorEvent::ConnectionOpened(id) => id,
        other => anyhow::bail!("unexpected event: {other:?}"),
    };
    assert!(gateway.acceptor.connections().get(&opened).is_some());

    client.close();
    let closed = loop {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await?? {
            AcceptorEvent::ConnectionClosed(id) => break id,
            _ => continue,
        }
    };
    assert_eq!(closed, opened);
    assert!(gateway.acceptor.connections().is_empty());

    gateway.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_gateway_close_fails_pending_requests() -> anyhow::Result<()> {
    let gateway = TestGateway::start().await?;
    let client = gateway.client().await?;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request("delay", json!({"ms": 5000, "tag": "never"}))
                .await
        })
    };

    // Let the request reach the server
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.pending_requests(), 1);

    gateway.shutdown().await;

    let err = tokio::time::timeout(Duration::from_secs(2), pending)
        .await??
        .unwrap_err();
    assert!(err.is_transport());
    assert!(client.is_closed());
    assert!(client.send_event("x", json!(null)).await.unwrap_err().is_transport());
    Ok(())
}
