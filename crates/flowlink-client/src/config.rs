//! Client tunables.

use std::time::Duration;

use flowlink_protocol::{
    BACKGROUND_HEARTBEAT_INTERVAL_MS, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    HEARTBEAT_MISS_FACTOR,
};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Client`](crate::Client).
///
/// Durations are stored in milliseconds so the struct reads naturally from
/// a TOML `[client]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Time allowed for a socket to open.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Response timeout used by `request` when none is given.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Heartbeat interval in the foreground. Zero disables the heartbeat.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat interval while backgrounded.
    #[serde(default = "default_background_heartbeat_interval")]
    pub background_heartbeat_interval_ms: u64,
    /// The connection is declared dead after this many intervals without a pong.
    #[serde(default = "default_miss_factor")]
    pub heartbeat_miss_factor: u32,
    /// First reconnect delay; doubled on every further attempt.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Command channel buffer size.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Events kept in the bus history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            background_heartbeat_interval_ms: default_background_heartbeat_interval(),
            heartbeat_miss_factor: default_miss_factor(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            command_buffer: default_command_buffer(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Heartbeat interval for the given foreground/background mode.
    pub fn heartbeat_interval(&self, backgrounded: bool) -> Duration {
        if backgrounded {
            Duration::from_millis(self.background_heartbeat_interval_ms)
        } else {
            Duration::from_millis(self.heartbeat_interval_ms)
        }
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_background_heartbeat_interval() -> u64 {
    BACKGROUND_HEARTBEAT_INTERVAL_MS
}

fn default_miss_factor() -> u32 {
    HEARTBEAT_MISS_FACTOR
}

fn default_reconnect_base_delay() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_command_buffer() -> usize {
    256
}

fn default_history_capacity() -> usize {
    flowlink_bus::DEFAULT_HISTORY_CAPACITY
}
