//! Turning bus events and server notifications into console lines.

use std::sync::Arc;

use flowlink_bus::{BusEvent, EventBus};
use flowlink_client::events;
use flowlink_protocol::NORMAL_CLOSURE;
use serde_json::Value;

fn text<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Console line for a server notification, or `None` when there is
/// nothing worth printing.
pub fn render_notification(method: &str, params: &Value) -> Option<String> {
    match method {
        "agent/status" => text(params, "message").map(|m| format!("Agent: {m}")),
        "swarm/update" => text(params, "message").map(|m| format!("Swarm: {m}")),
        "memory/update" => text(params, "message").map(|m| format!("Memory: {m}")),
        "log/message" => {
            let level = text(params, "level")?;
            let message = text(params, "message")?;
            Some(format!("[{}] {message}", level.to_uppercase()))
        }
        "output/stream" => text(params, "content").map(str::to_string),
        "claude-flow/started" => Some(format!(
            "Claude Flow started in {} mode",
            text(params, "mode").unwrap_or("unknown")
        )),
        "claude-flow/stopped" => Some("Claude Flow stopped".to_string()),
        "claude-flow/error" => Some(format!(
            "Claude Flow error: {}",
            text(params, "message").unwrap_or("Unknown error")
        )),
        m if m.starts_with("claude-flow/") => Some(format!("Claude Flow: {m} - {params}")),
        _ => {
            tracing::debug!(method, "Unhandled notification");
            None
        }
    }
}

/// Console line for a connection lifecycle event.
///
/// `max_attempts` is the configured reconnect budget, shown next to the
/// current attempt.
pub fn describe_event(event: &BusEvent, max_attempts: u32) -> Option<String> {
    let payload = &event.payload;
    match event.name.as_str() {
        events::CONNECTED => Some("Connected to server".to_string()),
        events::DISCONNECTED => {
            let code = payload.get("code").and_then(Value::as_u64);
            if code == Some(u64::from(NORMAL_CLOSURE)) {
                Some("Disconnected from server".to_string())
            } else {
                let reason = text(payload, "reason")
                    .filter(|r| !r.is_empty())
                    .unwrap_or("Unknown reason");
                Some(format!("Disconnected from server\nConnection lost: {reason}"))
            }
        }
        events::RECONNECTING => {
            let attempt = payload.get("attempt").and_then(Value::as_u64).unwrap_or(0);
            Some(format!("Reconnecting... ({attempt}/{max_attempts})"))
        }
        events::RECONNECTION_FAILED => {
            Some("Reconnection failed, use /connect to try again".to_string())
        }
        events::ERROR => {
            let message = text(payload, "message")
                .or_else(|| text(payload, "error"))
                .unwrap_or("Unknown error");
            Some(format!("Error: {message}"))
        }
        events::SESSION_ERROR => Some(format!(
            "Session initialization failed: {}",
            text(payload, "message").unwrap_or("Unknown error")
        )),
        events::NOTIFICATION => {
            let method = text(payload, "method")?;
            let params = payload.get("params").unwrap_or(&Value::Null);
            render_notification(method, params)
        }
        _ => None,
    }
}

/// Print connection events and server notifications through `print` as
/// they are emitted on `bus`.
pub fn forward_events<F>(bus: &EventBus, max_attempts: u32, print: F)
where
    F: Fn(String) + Send + Sync + 'static,
{
    let print = Arc::new(print);
    for name in [
        events::CONNECTED,
        events::DISCONNECTED,
        events::RECONNECTING,
        events::RECONNECTION_FAILED,
        events::ERROR,
        events::SESSION_ERROR,
        events::NOTIFICATION,
    ] {
        let print = Arc::clone(&print);
        bus.on(name, move |event| {
            if let Some(line) = describe_event(event, max_attempts) {
                print(line);
            }
            Ok(())
        });
    }
}

/// Human-readable form of a tool call result.
pub fn format_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Null => "(no output)".to_string(),
        Value::Object(map) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            // Content blocks: [{ "type": "text", "text": "..." }, ...]
            Some(Value::Array(blocks)) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()),
        },
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
