//! flowlink bus - in-process publish/subscribe hub
//!
//! Decouples producers and consumers of named events inside one process:
//! - Exact, one-shot and wildcard (`*`, `?`) subscriptions
//! - Synchronous dispatch (`emit`) and settle-all concurrent dispatch (`emit_async`)
//! - Handler failures isolated per handler and re-surfaced as `error` events
//! - Bounded FIFO history of emitted events

pub mod bus;
pub mod error;
pub mod event;
pub mod pattern;

pub use bus::{EventBus, Subscription};
pub use error::{BusError, HandlerError, HandlerResult};
pub use event::{BusEvent, BusStats, HandlerFailure, SubscriptionId};
pub use pattern::WildcardPattern;

/// Name of the event carrying [`HandlerFailure`] payloads.
pub const ERROR_EVENT: &str = "error";

/// Default number of emitted events kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
