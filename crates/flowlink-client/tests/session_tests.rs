//! Tests for the session handshake and tool call helpers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowlink_client::memory::{MemoryConnector, MemoryListener, MemoryPeer};
use flowlink_client::*;
use flowlink_protocol::{error_codes, Message, Request, CLIENT_NAME, EXECUTE_TOOL, HEALTH_TOOL};
use serde_json::{json, Value};

async fn connected() -> (Client, MemoryListener, MemoryPeer) {
    let (connector, mut listener) = MemoryConnector::new();
    let client = Client::spawn(ClientConfig::default(), connector);
    client.connect("memory://flowlink", None).await.unwrap();
    let peer = listener.accept().await.unwrap();
    (client, listener, peer)
}

async fn next_request(peer: &mut MemoryPeer) -> Request {
    match peer.recv_message().await {
        Some(Message::Request(request)) => request,
        other => panic!("expected a request, got {other:?}"),
    }
}

fn record(bus: &EventBus, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on(event, move |e| {
        sink.lock().unwrap().push(e.payload.clone());
        Ok(())
    });
    seen
}

// ═══════════════════════════════════════════════════════════════
// initialize
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn initialize_announces_client_and_emits_result() {
    let (client, _listener, mut peer) = connected().await;
    let initialized = record(client.events(), events::SESSION_INITIALIZED);

    let mut info = serde_json::Map::new();
    info.insert("terminal".into(), json!("tty"));
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.initialize_session(info).await })
    };

    let request = next_request(&mut peer).await;
    assert_eq!(request.method, "initialize");
    assert_eq!(request.params["protocolVersion"]["major"], 2024);
    assert_eq!(request.params["clientInfo"]["name"], CLIENT_NAME);
    assert_eq!(request.params["clientInfo"]["terminal"], "tty");
    assert_eq!(request.params["capabilities"]["logging"]["level"], "info");

    peer.send_message(&Message::success(
        request.id,
        json!({"serverInfo": {"name": "flow-server"}}),
    ));
    let result = call.await.unwrap().unwrap();
    assert_eq!(result["serverInfo"]["name"], "flow-server");
    assert_eq!(initialized.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn initialize_failure_emits_session_error() {
    let (client, _listener, mut peer) = connected().await;
    let failures = record(client.events(), events::SESSION_ERROR);

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.initialize_session(serde_json::Map::new()).await })
    };
    let request = next_request(&mut peer).await;
    peer.send_message(&Message::error(
        request.id,
        error_codes::INVALID_PARAMS,
        "unsupported protocol version",
    ));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Rpc { code: error_codes::INVALID_PARAMS, .. }));
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported protocol version"));
}

// ═══════════════════════════════════════════════════════════════
// Tool calls
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn execute_command_calls_the_execute_tool() {
    let (client, _listener, mut peer) = connected().await;
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.execute_command("swarm", json!(["status"])).await })
    };

    let request = next_request(&mut peer).await;
    assert_eq!(request.method, "tools/call");
    assert_eq!(request.params["name"], EXECUTE_TOOL);
    assert_eq!(request.params["arguments"]["command"], "swarm");
    assert_eq!(request.params["arguments"]["args"], json!(["status"]));

    peer.send_message(&Message::success(request.id, json!({"content": "ok"})));
    assert_eq!(call.await.unwrap().unwrap()["content"], "ok");
}

#[tokio::test]
async fn available_tools_returns_the_tool_array() {
    let (client, _listener, mut peer) = connected().await;
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.available_tools().await })
    };

    let request = next_request(&mut peer).await;
    assert_eq!(request.method, "tools/list");
    peer.send_message(&Message::success(
        request.id,
        json!({"tools": [{"name": "agent/spawn"}, {"name": "memory/query"}]}),
    ));

    let tools = call.await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[1]["name"], "memory/query");
}

#[tokio::test]
async fn available_tools_is_empty_on_error() {
    let (client, _listener, mut peer) = connected().await;
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.available_tools().await })
    };

    let request = next_request(&mut peer).await;
    peer.send_message(&Message::error(request.id, error_codes::INTERNAL_ERROR, "boom"));
    assert!(call.await.unwrap().is_empty());
}

#[tokio::test]
async fn health_status_calls_the_health_tool() {
    let (client, _listener, mut peer) = connected().await;
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.health_status().await })
    };

    let request = next_request(&mut peer).await;
    assert_eq!(request.params["name"], HEALTH_TOOL);
    assert!(request.params.get("arguments").is_none());
    peer.send_message(&Message::success(request.id, json!({"status": "healthy"})));

    let health = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(health["status"], "healthy");
}
