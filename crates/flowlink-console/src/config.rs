//! Configuration loading from TOML and environment variables.
//!
//! The console reads its configuration from:
//! 1. A TOML config file (default: `$XDG_CONFIG_HOME/flowlink/console.toml`)
//! 2. Environment variables (override TOML values)
//! 3. Command-line flags (override both, applied by the binary)
//!
//! Environment variable prefix: FLOWLINK_

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flowlink_client::ClientConfig;
use serde::{Deserialize, Serialize};

/// Top-level console configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Transport tunables, passed straight to the client.
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Session handshake settings.
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket address of the server.
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Bearer token sent on connect.
    #[serde(default)]
    pub token: Option<String>,
    /// Connect on startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "flowlink_client=trace").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output JSON-formatted logs.
    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Run the `initialize` handshake after every successful connect.
    #[serde(default = "default_true")]
    pub initialize: bool,
    /// Extra client info merged into the handshake.
    #[serde(default)]
    pub client_info: BTreeMap<String, String>,
}

// -- Defaults --

fn default_server_url() -> String {
    "ws://localhost:3000/ws".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            token: None,
            auto_connect: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initialize: true,
            client_info: BTreeMap::new(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: ConsoleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// `console.toml` under the user's config directory, if one exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flowlink").join("console.toml"))
    }

    /// Load configuration from a TOML file, with environment variable overrides.
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `FLOWLINK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("FLOWLINK_SERVER_URL") {
            self.server.url = val;
        }
        if let Some(val) = lookup("FLOWLINK_TOKEN") {
            self.server.token = Some(val).filter(|t| !t.is_empty());
        }
        if let Some(val) = lookup("FLOWLINK_AUTO_CONNECT") {
            self.server.auto_connect = val == "true" || val == "1";
        }
        if let Some(val) = lookup("FLOWLINK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("FLOWLINK_LOG_JSON") {
            self.logging.json_format = val == "true" || val == "1";
        }
        if let Some(val) = lookup("FLOWLINK_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.client.request_timeout_ms = ms;
            }
        }
        if let Some(val) = lookup("FLOWLINK_HEARTBEAT_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.client.heartbeat_interval_ms = ms;
            }
        }
        if let Some(val) = lookup("FLOWLINK_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.client.max_reconnect_attempts = n;
            }
        }
    }

    /// Handshake client info as a JSON object.
    pub fn session_client_info(&self) -> serde_json::Map<String, serde_json::Value> {
        self.session
            .client_info
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect()
    }
}
