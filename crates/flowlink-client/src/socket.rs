//! The seam between the transport and a concrete message-oriented socket.

use std::future::Future;
use std::pin::Pin;

use futures::{Sink, Stream};

use crate::ClientError;

/// One discrete socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Frame {
    pub fn close(code: u16, reason: &str) -> Self {
        Frame::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// Outbound half of an open socket.
pub type SocketSink = Pin<Box<dyn Sink<Frame, Error = ClientError> + Send>>;

/// Inbound half of an open socket. A stream that ends without a close frame
/// is treated as an abnormal closure.
pub type SocketStream = Pin<Box<dyn Stream<Item = Result<Frame, ClientError>> + Send>>;

/// Both halves of a freshly opened socket.
pub struct SocketPair {
    pub sink: SocketSink,
    pub stream: SocketStream,
}

impl std::fmt::Debug for SocketPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPair").finish_non_exhaustive()
    }
}

/// Opens sockets for the transport.
///
/// Called once per connection attempt, including every reconnect. The
/// transport bounds each call with its connect timeout.
pub trait SocketConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        address: &'a str,
        credential: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SocketPair, ClientError>> + Send + 'a>>;
}
