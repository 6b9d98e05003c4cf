//! WebSocket gateway tests over a real socket.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{fixtures, TestConfig, TestFixture};
use screenflow_core::{EventBus, ProgressEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: std::net::SocketAddr, path: &str) -> Result<WsStream, WsError> {
    let url = format!("ws://{}{}", addr, path);
    connect_async(url).await.map(|(stream, _)| stream)
}

/// Next JSON text frame, skipping protocol frames.
async fn next_json(ws: &mut WsStream) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no frame within 5s")
}

/// Next frame of the given `type`.
async fn next_of_type(ws: &mut WsStream, kind: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

async fn wait_for_connections(fixture: &TestFixture, owner: &str, expected: usize) {
    for _ in 0..100 {
        if fixture.state.registry().connection_count(owner).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "owner {} never reached {} connections (has {})",
        owner,
        expected,
        fixture.state.registry().connection_count(owner).await
    );
}

fn progress(owner: &str, document: &str, percent: u8) -> ProgressEvent {
    ProgressEvent::document(owner, "batch-1", document, percent, "Parsing with AI...", "parsing_with_ai")
}

#[tokio::test]
async fn test_two_connections_same_owner_both_receive() {
    let fixture = TestFixture::new().await;
    let addr = fixture.serve().await;

    let mut first = connect(addr, "/api/v1/ws/carol").await.unwrap();
    let mut second = connect(addr, "/api/v1/ws/carol").await.unwrap();
    wait_for_connections(&fixture, "carol", 2).await;

    fixture.bus.publish(progress("carol", "doc-1", 50)).await;

    for ws in [&mut first, &mut second] {
        let frame = next_json(ws).await;
        assert_eq!(frame["type"], "document_progress");
        assert_eq!(frame["document_id"], "doc-1");
        assert_eq!(frame["progress"], 50);
    }

    // Closing one connection leaves the other subscribed
    first.close(None).await.unwrap();
    wait_for_connections(&fixture, "carol", 1).await;

    fixture.bus.publish(progress("carol", "doc-2", 90)).await;
    let frame = next_json(&mut second).await;
    assert_eq!(frame["document_id"], "doc-2");
}

#[tokio::test]
async fn test_events_only_reach_their_owner() {
    let fixture = TestFixture::new().await;
    let addr = fixture.serve().await;

    let mut carol = connect(addr, "/api/v1/ws/carol").await.unwrap();
    let mut dave = connect(addr, "/api/v1/ws/dave").await.unwrap();
    wait_for_connections(&fixture, "carol", 1).await;
    wait_for_connections(&fixture, "dave", 1).await;

    fixture.bus.publish(progress("dave", "doc-d", 20)).await;
    fixture.bus.publish(progress("carol", "doc-c", 30)).await;

    let frame = next_json(&mut carol).await;
    assert_eq!(frame["document_id"], "doc-c");
    let frame = next_json(&mut dave).await;
    assert_eq!(frame["document_id"], "doc-d");
}

#[tokio::test]
async fn test_registry_entry_removed_with_last_connection() {
    let fixture = TestFixture::new().await;
    let addr = fixture.serve().await;

    let mut ws = connect(addr, "/api/v1/ws/carol").await.unwrap();
    wait_for_connections(&fixture, "carol", 1).await;
    assert_eq!(fixture.state.registry().owner_count().await, 1);

    ws.close(None).await.unwrap();
    wait_for_connections(&fixture, "carol", 0).await;
    assert_eq!(fixture.state.registry().owner_count().await, 0);

    // The aborted forwarder releases its subscription; events are then dropped
    let mut delivered = 1;
    for _ in 0..50 {
        delivered = fixture.bus.publish(progress("carol", "doc-1", 10)).await;
        if delivered == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let fixture = TestFixture::new().await;
    let addr = fixture.serve().await;

    let mut ws = connect(addr, "/api/v1/ws/carol").await.unwrap();
    ws.send(Message::text("ping")).await.unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(frame, json!({ "type": "pong" }));
}

#[tokio::test]
async fn test_idle_connection_gets_heartbeat() {
    let fixture = TestFixture::with_config(TestConfig {
        heartbeat_interval_secs: 1,
        ..Default::default()
    })
    .await;
    let addr = fixture.serve().await;

    let mut ws = connect(addr, "/api/v1/ws/carol").await.unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "heartbeat");
    assert!(frame["timestamp"].as_i64().unwrap() > 0);

    // Still open after the heartbeat
    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_of_type(&mut ws, "pong").await["type"], "pong");
}

#[tokio::test]
async fn test_invalid_token_rejected_before_upgrade() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;
    let addr = fixture.serve().await;

    for path in ["/api/v1/ws/alice", "/api/v1/ws/alice?token=wrong"] {
        match connect(addr, path).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connection to {} should be rejected", path),
        }
    }
    assert_eq!(fixture.state.registry().owner_count().await, 0);
}

#[tokio::test]
async fn test_token_must_match_owner() {
    let fixture = TestFixture::with_config(TestConfig::with_api_keys()).await;
    let addr = fixture.serve().await;

    match connect(addr, "/api/v1/ws/bob?token=alice-key").await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 403),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("alice must not subscribe to bob"),
    }

    let mut ws = connect(addr, "/api/v1/ws/alice?token=alice-key")
        .await
        .unwrap();
    wait_for_connections(&fixture, "alice", 1).await;
    fixture.bus.publish(progress("alice", "doc-a", 10)).await;
    assert_eq!(next_json(&mut ws).await["document_id"], "doc-a");
}

#[tokio::test]
async fn test_pipeline_progress_streams_to_owner() {
    let fixture = TestFixture::new().await;
    let addr = fixture.serve().await;

    let response = fixture
        .post(
            "/api/v1/batches",
            json!({ "title": "Live", "owner_id": "carol" }),
        )
        .await;
    let batch_id = response.body["id"].as_str().unwrap().to_string();
    let document_id = fixture
        .upload(&batch_id, "ada.txt", fixtures::cv_text("Ada Lovelace", None))
        .await;

    let mut ws = connect(addr, "/api/v1/ws/carol").await.unwrap();
    wait_for_connections(&fixture, "carol", 1).await;

    fixture
        .post_empty(&format!("/api/v1/batches/{}/process", batch_id))
        .await;

    // Document checkpoints arrive in stage order, ending at 100
    let mut last = 0;
    loop {
        let frame = next_of_type(&mut ws, "document_progress").await;
        assert_eq!(frame["document_id"], document_id);
        let progress = frame["progress"].as_u64().unwrap();
        assert!(progress >= last, "progress went backwards: {} -> {}", last, progress);
        last = progress;
        if progress == 100 {
            assert_eq!(frame["stage"], "completed");
            assert_eq!(frame["candidate_name"], "Ada Lovelace");
            break;
        }
    }

    // Batch aggregate eventually reports completion
    loop {
        let frame = next_of_type(&mut ws, "batch_progress").await;
        assert_eq!(frame["batch_id"], batch_id);
        if frame["status"] == "Completed" {
            assert_eq!(frame["completed"], 1);
            assert_eq!(frame["progress"], 100);
            break;
        }
    }
}
