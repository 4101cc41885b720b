//! Session handshake and the tool calls a console issues.

use flowlink_protocol::{InitializeParams, ToolCallParams, HEALTH_TOOL};
use serde_json::json;

use crate::client::Client;
use crate::{events, ClientError};

impl Client {
    /// Send `initialize` announcing protocol version, client info and
    /// capabilities. `client_info` keys are merged over the default name
    /// and version.
    ///
    /// Emits `session_initialized` with the server's result, or
    /// `session_error` before returning the failure.
    pub async fn initialize_session(
        &self,
        client_info: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ClientError> {
        let params = serde_json::to_value(InitializeParams::new(client_info))
            .map_err(flowlink_protocol::ProtocolError::from)?;

        match self.request("initialize", params).await {
            Ok(result) => {
                tracing::info!("Session initialized");
                self.events()
                    .emit(events::SESSION_INITIALIZED, result.clone());
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Session initialization failed");
                self.events()
                    .emit(events::SESSION_ERROR, json!({ "message": error.to_string() }));
                Err(error)
            }
        }
    }

    /// Run a console command on the server through the execute tool.
    pub async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        self.call_tool(ToolCallParams::execute(command, args)).await
    }

    /// Tools the server offers. Empty if the listing fails.
    pub async fn available_tools(&self) -> Vec<serde_json::Value> {
        match self.request("tools/list", json!({})).await {
            Ok(result) => result
                .get("tools")
                .and_then(|tools| tools.as_array())
                .cloned()
                .unwrap_or_default(),
            Err(error) => {
                tracing::warn!(error = %error, "Failed to list tools");
                Vec::new()
            }
        }
    }

    pub async fn health_status(&self) -> Result<serde_json::Value, ClientError> {
        self.call_tool(ToolCallParams::bare(HEALTH_TOOL)).await
    }

    async fn call_tool(&self, call: ToolCallParams) -> Result<serde_json::Value, ClientError> {
        let params = serde_json::to_value(call).map_err(flowlink_protocol::ProtocolError::from)?;
        self.request("tools/call", params).await
    }
}
