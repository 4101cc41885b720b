use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique id of one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Immutable snapshot of one emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique event id (UUID v4).
    pub id: String,
    /// Event name as passed to `emit`.
    pub name: String,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(name: &str, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Payload of an `error` event raised for a failing handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// The event being dispatched when the handler failed.
    pub event: String,
    /// Display form of the handler's error or panic message.
    pub error: String,
    /// The failing registration.
    pub subscription_id: SubscriptionId,
    /// The wildcard pattern, when the failing handler was a wildcard subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Counters describing the current registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Distinct event names with at least one persistent handler.
    pub regular_events: usize,
    /// Distinct event names with at least one one-shot handler.
    pub once_events: usize,
    /// Distinct wildcard patterns.
    pub wildcard_patterns: usize,
    pub history_size: usize,
    pub total_handlers: usize,
}
