//! Cloneable handle to a running [`ClientDriver`].

use std::sync::Arc;
use std::time::Duration;

use flowlink_bus::EventBus;
use flowlink_protocol::Message;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ClientConfig;
use crate::driver::{ClientDriver, Command};
use crate::socket::SocketConnector;
use crate::state::{ClientStatus, ConnectionState};
use crate::websocket::WebSocketConnector;
use crate::ClientError;

/// Handle for connecting, sending and issuing requests.
///
/// Every clone talks to the same driver task. The driver stops, closing
/// the connection normally, once the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<ClientStatus>,
    bus: EventBus,
    request_timeout: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        status_rx: watch::Receiver<ClientStatus>,
        bus: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            command_tx,
            status_rx,
            bus,
            request_timeout,
        }
    }

    /// Spawn a driver on the current tokio runtime and return its handle.
    pub fn spawn(config: ClientConfig, connector: impl SocketConnector + 'static) -> Self {
        let (driver, client) = ClientDriver::new(config, Arc::new(connector));
        tokio::spawn(driver.run());
        client
    }

    /// Spawn a driver that connects over WebSockets.
    pub fn websocket(config: ClientConfig) -> Self {
        Self::spawn(config, WebSocketConnector)
    }

    /// Bus carrying connection events and server notifications.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Open a connection to `address`.
    ///
    /// Resolves once the socket is open and any queued messages are flushed.
    /// Fails with `AlreadyConnecting`/`AlreadyConnected` unless disconnected,
    /// and with `ConnectionTimeout` if the socket does not open in time.
    pub async fn connect(&self, address: &str, credential: Option<&str>) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Connect {
            address: address.to_string(),
            credential: credential.map(str::to_string),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Close the connection normally, cancel any reconnect, drop the outbound
    /// queue and reject every pending request. Idempotent.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Disconnect { reply: tx }).await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Transmit `message` now if connected, otherwise queue it.
    pub async fn send(&self, message: Message) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Send { message, reply: tx }).await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), ClientError> {
        self.send(Message::notification(method, params)).await
    }

    /// Issue a request with the configured default timeout.
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Issue a request and wait for its response, or fail with
    /// `RequestTimeout` after `timeout`.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Request {
            method: method.to_string(),
            params,
            timeout,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Hint that the host is backgrounded, widening the heartbeat interval.
    pub async fn set_backgrounded(&self, backgrounded: bool) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::SetBackgrounded {
            backgrounded,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    pub fn status(&self) -> ClientStatus {
        self.status_rx.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver notified whenever the status snapshot changes.
    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.status_rx.clone()
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}
