//! Tests for the envelope types.
//!
//! Verifies:
//! - Discrimination of request / response / notification by id and method
//! - JSON-RPC 2.0 envelope shape on the wire
//! - Error responses and non-numeric ids
//! - Session handshake and tool call payloads

use flowlink_protocol::*;

// ═══════════════════════════════════════════════════════════════
// Envelope discrimination
// ═══════════════════════════════════════════════════════════════

#[test]
fn id_and_method_decode_as_request() {
    let msg = Message::parse(r#"{"jsonrpc":"2.0","id":3,"method":"echo","params":{"v":1}}"#).unwrap();
    match msg {
        Message::Request(r) => {
            assert_eq!(r.id, RequestId::Number(3));
            assert_eq!(r.method, "echo");
            assert_eq!(r.params["v"], 1);
        }
        other => panic!("expected request, got {other:?}"),
    }
}

#[test]
fn method_without_id_decodes_as_notification() {
    let msg = Message::parse(r#"{"jsonrpc":"2.0","method":"agent/status","params":{"n":2}}"#).unwrap();
    assert!(matches!(msg, Message::Notification(ref n) if n.method == "agent/status"));
    assert!(msg.id().is_none());
}

#[test]
fn id_without_method_decodes_as_response() {
    let msg = Message::parse(r#"{"id":9,"result":{"ok":true}}"#).unwrap();
    match msg {
        Message::Response(r) => {
            assert_eq!(r.id.as_number(), Some(9));
            assert_eq!(r.outcome.unwrap()["ok"], true);
        }
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn response_error_is_carried() {
    let msg = Message::parse(
        r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
    )
    .unwrap();
    let Message::Response(r) = msg else {
        panic!("expected response");
    };
    let err = r.outcome.unwrap_err();
    assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    assert_eq!(err.message, "Method not found");
}

#[test]
fn response_without_result_resolves_to_null() {
    let msg = Message::parse(r#"{"id":1}"#).unwrap();
    let Message::Response(r) = msg else {
        panic!("expected response");
    };
    assert_eq!(r.outcome.unwrap(), serde_json::Value::Null);
}

#[test]
fn string_ids_are_accepted_but_not_numeric() {
    let msg = Message::parse(r#"{"id":"abc","result":1}"#).unwrap();
    let id = msg.id().unwrap();
    assert_eq!(id, &RequestId::Text("abc".into()));
    assert_eq!(id.as_number(), None);
}

#[test]
fn garbage_is_a_parse_error() {
    assert!(Message::parse("not json").is_err());
    assert!(Message::parse("{}").is_err());
}

#[test]
fn binary_frames_must_be_utf8() {
    let err = Message::from_slice(&[0xff, 0xfe]).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidUtf8));

    let ok = Message::from_slice(br#"{"method":"pong"}"#).unwrap();
    assert_eq!(ok.method(), Some(PONG_METHOD));
}

// ═══════════════════════════════════════════════════════════════
// Wire shape
// ═══════════════════════════════════════════════════════════════

#[test]
fn request_serializes_as_jsonrpc_envelope() {
    let text = Message::request(12u64, "tools/list", serde_json::json!({})).to_text().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["jsonrpc"], JSONRPC_VERSION);
    assert_eq!(value["id"], 12);
    assert_eq!(value["method"], "tools/list");
    assert!(value.get("result").is_none());
    assert!(value.get("error").is_none());
}

#[test]
fn notification_has_no_id_on_the_wire() {
    let text = Message::notification(PING_METHOD, serde_json::json!({"timestamp": 1}))
        .to_text()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value.get("id").is_none());
    assert_eq!(value["method"], "ping");
    assert_eq!(value["params"]["timestamp"], 1);
}

#[test]
fn error_response_omits_result() {
    let text = Message::error(5u64, error_codes::INTERNAL_ERROR, "boom").to_text().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value.get("result").is_none());
    assert_eq!(value["error"]["code"], -32603);
    assert!(value["error"].get("data").is_none());
}

// ═══════════════════════════════════════════════════════════════
// Session payloads
// ═══════════════════════════════════════════════════════════════

#[test]
fn initialize_params_default_shape() {
    let params = serde_json::to_value(InitializeParams::default()).unwrap();
    assert_eq!(params["protocolVersion"]["major"], 2024);
    assert_eq!(params["protocolVersion"]["minor"], 11);
    assert_eq!(params["protocolVersion"]["patch"], 5);
    assert_eq!(params["clientInfo"]["name"], CLIENT_NAME);
    assert_eq!(params["capabilities"]["tools"]["listChanged"], true);
    assert_eq!(params["capabilities"]["resources"]["subscribe"], false);
}

#[test]
fn initialize_params_merge_client_info() {
    let mut overrides = serde_json::Map::new();
    overrides.insert("version".into(), "9.9.9".into());
    overrides.insert("host".into(), "tty".into());
    let params = serde_json::to_value(InitializeParams::new(overrides)).unwrap();
    assert_eq!(params["clientInfo"]["name"], CLIENT_NAME);
    assert_eq!(params["clientInfo"]["version"], "9.9.9");
    assert_eq!(params["clientInfo"]["host"], "tty");
}

#[test]
fn execute_tool_call_wraps_command_and_args() {
    let params = serde_json::to_value(ToolCallParams::execute(
        "agent spawn",
        serde_json::json!(["coder"]),
    ))
    .unwrap();
    assert_eq!(params["name"], EXECUTE_TOOL);
    assert_eq!(params["arguments"]["command"], "agent spawn");
    assert_eq!(params["arguments"]["args"][0], "coder");
}

#[test]
fn bare_tool_call_has_no_arguments() {
    let params = serde_json::to_value(ToolCallParams::bare(HEALTH_TOOL)).unwrap();
    assert_eq!(params["name"], "system/health");
    assert!(params.get("arguments").is_none());
}
