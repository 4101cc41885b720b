use std::time::Duration;

use thiserror::Error;

/// Error returned by a failing subscriber.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors originating from the event bus.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Timeout waiting for event '{event}' after {}ms", .timeout.as_millis())]
    Timeout { event: String, timeout: Duration },

    #[error("Subscription for '{event}' was removed before the event fired")]
    Cancelled { event: String },

    #[error("Invalid wildcard pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
