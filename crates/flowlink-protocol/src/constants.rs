/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// Close code for a deliberate, client-initiated disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code used when the connection dropped or was declared dead.
/// Any close with a code other than [`NORMAL_CLOSURE`] triggers reconnection.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the peer's close frame carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Reason sent with a deliberate disconnect.
pub const USER_DISCONNECT_REASON: &str = "User initiated disconnect";

/// Reason used when the heartbeat declares the connection dead.
pub const HEARTBEAT_TIMEOUT_REASON: &str = "Heartbeat timeout";

/// Method name of the outbound liveness ping notification.
pub const PING_METHOD: &str = "ping";

/// Method name of the inbound liveness pong. Never forwarded to subscribers.
pub const PONG_METHOD: &str = "pong";

/// Default time allowed for the socket to open, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default per-request response timeout, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Heartbeat interval while the host is in the foreground, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Heartbeat interval while the host is backgrounded, in milliseconds.
pub const BACKGROUND_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// A connection is dead once no pong was seen for this many heartbeat intervals.
pub const HEARTBEAT_MISS_FACTOR: u32 = 2;

/// Base delay for reconnect backoff, in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Reconnect attempts made before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Session protocol version announced by `initialize`.
pub const SESSION_PROTOCOL_VERSION: (u32, u32, u32) = (2024, 11, 5);

/// Client name announced by `initialize`.
pub const CLIENT_NAME: &str = "Claude Flow v2";

/// Client version announced by `initialize`.
pub const CLIENT_VERSION: &str = "2.0.0";

/// Tool name used to execute console commands on the server.
pub const EXECUTE_TOOL: &str = "claude-flow/execute";

/// Tool name used to query server health.
pub const HEALTH_TOOL: &str = "system/health";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
