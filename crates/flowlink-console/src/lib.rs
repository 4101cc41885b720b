//! flowlink console - interactive front end for a flowlink client session
//!
//! Reads commands line by line, forwards free-form lines to the server's
//! execute tool, and prints connection events and server notifications as
//! they arrive.

pub mod config;
pub mod console;
pub mod render;

pub use config::ConsoleConfig;
pub use console::{Console, Flow};
