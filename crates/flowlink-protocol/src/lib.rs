//! flowlink protocol - envelope types and wire constants
//!
//! Models the JSON-RPC 2.0 style envelopes exchanged with a flowlink server
//! over a message-oriented duplex socket. Every inbound frame decodes into
//! one of three shapes: a request, a response, or a notification.

pub mod constants;
pub mod error;
pub mod messages;
pub mod session;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use session::*;
