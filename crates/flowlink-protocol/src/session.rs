//! Payloads for the session handshake and the tool calls the console issues.

use serde::{Deserialize, Serialize};

use crate::constants::{CLIENT_NAME, CLIENT_VERSION, EXECUTE_TOOL, SESSION_PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        let (major, minor, patch) = SESSION_PROTOCOL_VERSION;
        Self { major, minor, patch }
    }
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: ProtocolVersion,
    /// Always carries `name` and `version`; caller-supplied keys are merged on top.
    pub client_info: serde_json::Map<String, serde_json::Value>,
    pub capabilities: serde_json::Value,
}

impl InitializeParams {
    /// Build handshake parameters, merging `overrides` into the default client info.
    pub fn new(overrides: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut client_info = serde_json::Map::new();
        client_info.insert("name".into(), CLIENT_NAME.into());
        client_info.insert("version".into(), CLIENT_VERSION.into());
        client_info.extend(overrides);

        Self {
            protocol_version: ProtocolVersion::default(),
            client_info,
            capabilities: serde_json::json!({
                "logging": { "level": "info" },
                "tools": { "listChanged": true },
                "resources": { "listChanged": false, "subscribe": false },
                "prompts": { "listChanged": false },
            }),
        }
    }
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self::new(serde_json::Map::new())
    }
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl ToolCallParams {
    /// A call to the console command executor.
    pub fn execute(command: &str, args: serde_json::Value) -> Self {
        Self {
            name: EXECUTE_TOOL.to_string(),
            arguments: Some(serde_json::json!({
                "command": command,
                "args": args,
            })),
        }
    }

    /// A call to a tool that takes no arguments.
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: None,
        }
    }
}
