//! In-process sockets for driving a [`Client`](crate::Client) without a network.
//!
//! A [`MemoryConnector`] hands every accepted connection to its
//! [`MemoryListener`] as a [`MemoryPeer`], the server side of the socket.
//! Connection attempts can be scripted to fail or to never complete.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use flowlink_protocol::Message;
use futures::channel::mpsc as socket_channel;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::socket::{Frame, SocketConnector, SocketPair};
use crate::ClientError;

enum Script {
    Fail(String),
    Hang,
}

/// One recorded call to [`SocketConnector::connect`].
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub address: String,
    pub credential: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct Shared {
    scripts: VecDeque<Script>,
    attempts: Vec<ConnectAttempt>,
}

/// Connector producing in-memory socket pairs.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Receives the server side of every accepted connection.
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            peers: tx,
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Make the next unscripted connection attempt fail with `reason`.
    pub fn fail_next(&self, reason: &str) {
        self.lock().scripts.push_back(Script::Fail(reason.to_string()));
    }

    /// Make the next unscripted connection attempt never complete.
    pub fn hang_next(&self) {
        self.lock().scripts.push_back(Script::Hang);
    }

    /// Every connection attempt so far, oldest first.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SocketConnector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        address: &'a str,
        credential: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<SocketPair, ClientError>> + Send + 'a>> {
        Box::pin(async move {
            let script = {
                let mut shared = self.lock();
                shared.attempts.push(ConnectAttempt {
                    address: address.to_string(),
                    credential: credential.map(str::to_string),
                    at: Instant::now(),
                });
                shared.scripts.pop_front()
            };

            match script {
                Some(Script::Fail(reason)) => return Err(ClientError::Socket(reason)),
                Some(Script::Hang) => return std::future::pending().await,
                None => {}
            }

            let (client_tx, peer_rx) = socket_channel::unbounded::<Frame>();
            let (peer_tx, client_rx) = socket_channel::unbounded::<Result<Frame, ClientError>>();
            let peer = MemoryPeer {
                address: address.to_string(),
                credential: credential.map(str::to_string),
                tx: peer_tx,
                rx: peer_rx,
            };
            self.peers
                .send(peer)
                .map_err(|_| ClientError::Socket("listener dropped".into()))?;

            Ok(SocketPair {
                sink: Box::pin(client_tx.sink_map_err(|e| ClientError::Socket(e.to_string()))),
                stream: Box::pin(client_rx),
            })
        })
    }
}

impl MemoryListener {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// Server side of one in-memory connection.
///
/// Dropping it ends the client's stream without a close frame, which the
/// client sees as an abnormal closure.
pub struct MemoryPeer {
    address: String,
    credential: Option<String>,
    tx: socket_channel::UnboundedSender<Result<Frame, ClientError>>,
    rx: socket_channel::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Returns false once the client side is gone.
    pub fn send_frame(&self, frame: Frame) -> bool {
        self.tx.unbounded_send(Ok(frame)).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send_frame(Frame::Text(text.into()))
    }

    pub fn send_message(&self, message: &Message) -> bool {
        match message.to_text() {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Deliver a socket error item to the client.
    pub fn send_error(&self, reason: &str) -> bool {
        self.tx
            .unbounded_send(Err(ClientError::Socket(reason.to_string())))
            .is_ok()
    }

    /// Send a close frame with `code`.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.send_frame(Frame::close(code, reason))
    }

    /// Next frame sent by the client; `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.next().await
    }

    /// Next decodable message sent by the client; `None` on close.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            let decoded = match self.rx.next().await? {
                Frame::Text(text) => Message::parse(&text),
                Frame::Binary(bytes) => Message::from_slice(&bytes),
                Frame::Close(_) => return None,
            };
            if let Ok(message) = decoded {
                return Some(message);
            }
        }
    }

    /// A frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
