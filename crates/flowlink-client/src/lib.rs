//! flowlink client - reconnecting duplex transport with request correlation
//!
//! Maintains one logical connection to a flowlink server:
//! - Connection state machine with exponential-backoff reconnection
//! - Heartbeat pings with missed-pong detection
//! - FIFO outbound queue while disconnected, flushed on (re)connect
//! - JSON-RPC request ids, pending map and per-request timeouts
//! - Unsolicited server notifications forwarded through an [`EventBus`]
//!
//! The socket itself sits behind [`SocketConnector`]; [`WebSocketConnector`]
//! speaks real WebSockets and [`memory::MemoryConnector`] is an in-process
//! fake.

pub mod backoff;
pub mod client;
pub mod config;
pub mod driver;
pub mod memory;
pub mod pending;
pub mod session;
pub mod socket;
pub mod state;
pub mod websocket;

pub use client::Client;
pub use config::ClientConfig;
pub use driver::ClientDriver;
pub use flowlink_bus::EventBus;
pub use socket::{CloseFrame, Frame, SocketConnector, SocketPair, SocketSink, SocketStream};
pub use state::{ClientStatus, ConnectionState};
pub use websocket::WebSocketConnector;

use std::time::Duration;

use thiserror::Error;

/// Names of the events the client emits on its bus.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const RECONNECTING: &str = "reconnecting";
    pub const RECONNECTION_FAILED: &str = "reconnection_failed";
    /// Shared with the bus's own handler-failure events.
    pub const ERROR: &str = flowlink_bus::ERROR_EVENT;
    pub const MESSAGE_QUEUED: &str = "message_queued";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const SEND_ERROR: &str = "send_error";
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const PARSE_ERROR: &str = "parse_error";
    pub const NOTIFICATION: &str = "notification";
    pub const SESSION_INITIALIZED: &str = "session_initialized";
    pub const SESSION_ERROR: &str = "session_error";

    /// Method-specific event carrying the params of a server notification.
    pub fn notification(method: &str) -> String {
        format!("{NOTIFICATION}.{method}")
    }
}

/// Errors originating from the client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Already connecting")]
    AlreadyConnecting,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection timed out after {}ms", .0.as_millis())]
    ConnectionTimeout(Duration),

    #[error("Request timeout: {method}")]
    RequestTimeout { method: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] flowlink_protocol::ProtocolError),

    #[error("Internal channel closed")]
    ChannelClosed,
}

impl From<flowlink_protocol::RpcError> for ClientError {
    fn from(error: flowlink_protocol::RpcError) -> Self {
        ClientError::Rpc {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}
