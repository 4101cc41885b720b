//! The task that owns the connection.
//!
//! Architecture:
//! - `ClientDriver` owns the socket, the connection state, the outbound
//!   queue, the pending-request map and every timer. It runs as one tokio
//!   task, so all of that state is mutated from a single place.
//! - [`Client`] is a cheaply cloneable handle that talks to the driver over
//!   a bounded command channel and reads a status snapshot from a watch
//!   channel.
//! - Everything observable (connects, closes, notifications, failures) is
//!   emitted on the shared [`EventBus`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use flowlink_bus::EventBus;
use flowlink_protocol::{
    Message, ProtocolError, Response, ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT_REASON,
    NORMAL_CLOSURE, NO_STATUS_RECEIVED, PING_METHOD, PONG_METHOD, USER_DISCONNECT_REASON,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::backoff::reconnect_delay;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::events;
use crate::pending::{PendingRequests, Reply};
use crate::socket::{Frame, SocketConnector, SocketPair, SocketSink, SocketStream};
use crate::state::{ClientStatus, ConnectionState};
use crate::ClientError;

type ConnectFuture = Pin<Box<dyn Future<Output = Result<SocketPair, ClientError>> + Send>>;

/// Commands sent from [`Client`] handles to the driver.
pub(crate) enum Command {
    Connect {
        address: String,
        credential: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        message: Message,
        reply: oneshot::Sender<()>,
    },
    Request {
        method: String,
        params: serde_json::Value,
        timeout: Duration,
        reply: Reply,
    },
    SetBackgrounded {
        backgrounded: bool,
        reply: oneshot::Sender<()>,
    },
}

/// Owner of the connection. Run it with [`ClientDriver::run`].
pub struct ClientDriver {
    config: ClientConfig,
    connector: Arc<dyn SocketConnector>,
    bus: EventBus,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<ClientStatus>,

    state: ConnectionState,
    address: Option<String>,
    credential: Option<String>,
    sink: Option<SocketSink>,
    stream: Option<SocketStream>,

    outbound: VecDeque<Message>,
    pending: PendingRequests,

    /// In-flight socket open, bounded by the connect timeout.
    connecting: Option<ConnectFuture>,
    connect_reply: Option<oneshot::Sender<Result<(), ClientError>>>,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,

    heartbeat: Option<Interval>,
    last_pong: Instant,
    backgrounded: bool,
}

impl ClientDriver {
    /// Create a driver and the handle that controls it.
    pub fn new(config: ClientConfig, connector: Arc<dyn SocketConnector>) -> (Self, Client) {
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());
        let bus = EventBus::with_history_capacity(config.history_capacity);

        let client = Client::new(command_tx, status_rx, bus.clone(), config.request_timeout());
        let driver = Self {
            config,
            connector,
            bus,
            commands,
            status_tx,
            state: ConnectionState::Disconnected,
            address: None,
            credential: None,
            sink: None,
            stream: None,
            outbound: VecDeque::new(),
            pending: PendingRequests::new(),
            connecting: None,
            connect_reply: None,
            reconnect_attempts: 0,
            reconnect_at: None,
            heartbeat: None,
            last_pong: Instant::now(),
            backgrounded: false,
        };
        (driver, client)
    }

    /// Run until every [`Client`] handle has been dropped.
    pub async fn run(mut self) {
        tracing::debug!("Client driver started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(pair) => self.on_open(pair).await,
                        Err(error) => self.on_connect_failed(error),
                    }
                }
                item = next_frame(&mut self.stream) => {
                    self.handle_frame(item);
                }
                _ = tick(&mut self.heartbeat) => {
                    self.on_heartbeat().await;
                }
                _ = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_connect();
                }
                _ = sleep_until(self.pending.next_deadline()) => {
                    self.expire_requests();
                }
            }
            self.publish_status();
        }

        self.disconnect().await;
        tracing::debug!("Client driver stopped");
    }

    // ---- Commands ----

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                address,
                credential,
                reply,
            } => match self.state {
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    let _ = reply.send(Err(ClientError::AlreadyConnecting));
                }
                ConnectionState::Connected => {
                    let _ = reply.send(Err(ClientError::AlreadyConnected));
                }
                ConnectionState::Disconnected => {
                    tracing::info!(address = %address, "Connecting");
                    self.address = Some(address);
                    self.credential = credential;
                    self.state = ConnectionState::Connecting;
                    self.connect_reply = Some(reply);
                    self.start_connect();
                }
            },
            Command::Disconnect { reply } => {
                self.disconnect().await;
                self.publish_status();
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                self.send_message(message).await;
                self.publish_status();
                let _ = reply.send(());
            }
            Command::Request {
                method,
                params,
                timeout,
                reply,
            } => {
                let id = self.pending.insert(&method, timeout, reply);
                tracing::debug!(id, method = %method, "Request issued");
                self.send_message(Message::request(id, &method, params)).await;
            }
            Command::SetBackgrounded {
                backgrounded,
                reply,
            } => {
                if self.backgrounded != backgrounded {
                    self.backgrounded = backgrounded;
                    tracing::debug!(backgrounded, "Heartbeat mode changed");
                    if self.state == ConnectionState::Connected {
                        self.start_heartbeat();
                    }
                }
                self.publish_status();
                let _ = reply.send(());
            }
        }
    }

    // ---- Connection lifecycle ----

    fn start_connect(&mut self) {
        let Some(address) = self.address.clone() else {
            return;
        };
        let credential = self.credential.clone();
        let connector = Arc::clone(&self.connector);
        let timeout = self.config.connect_timeout();

        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&address, credential.as_deref())).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::ConnectionTimeout(timeout)),
            }
        }));
    }

    async fn on_open(&mut self, pair: SocketPair) {
        let reconnected = self.state == ConnectionState::Reconnecting;
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.reconnect_at = None;
        self.sink = Some(pair.sink);
        self.stream = Some(pair.stream);
        self.last_pong = Instant::now();
        self.start_heartbeat();

        tracing::info!(
            address = self.address.as_deref().unwrap_or_default(),
            reconnected,
            "Connected"
        );
        self.bus.emit(
            events::CONNECTED,
            json!({ "address": self.address, "reconnected": reconnected }),
        );

        self.flush_queue().await;
        self.publish_status();
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Ok(()));
        }
    }

    fn on_connect_failed(&mut self, error: ClientError) {
        tracing::warn!(
            error = %error,
            attempt = self.reconnect_attempts,
            "Connection attempt failed"
        );
        self.bus.emit(events::ERROR, json!({ "message": error.to_string() }));

        if self.state == ConnectionState::Reconnecting {
            if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                self.state = ConnectionState::Disconnected;
                tracing::warn!(attempts = self.reconnect_attempts, "Reconnection failed");
                self.bus.emit(
                    events::RECONNECTION_FAILED,
                    json!({ "attempts": self.reconnect_attempts }),
                );
            } else {
                self.schedule_reconnect();
            }
            return;
        }

        self.state = ConnectionState::Disconnected;
        self.publish_status();
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(error));
        }
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_attempts += 1;
        let delay = reconnect_delay(self.config.reconnect_base_delay(), self.reconnect_attempts);
        self.state = ConnectionState::Reconnecting;
        // A delay past the clock's range leaves the retry unscheduled until
        // the caller disconnects.
        self.reconnect_at = Instant::now().checked_add(delay);

        tracing::info!(
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.bus.emit(
            events::RECONNECTING,
            json!({
                "attempt": self.reconnect_attempts,
                "delay_ms": delay.as_millis() as u64,
            }),
        );
    }

    /// Tear down after the socket closed. Any code other than a normal
    /// closure schedules a reconnect while attempts remain.
    fn on_closed(&mut self, code: u16, reason: String) {
        let was_connected = self.state == ConnectionState::Connected;
        self.sink = None;
        self.stream = None;
        self.heartbeat = None;
        self.state = ConnectionState::Disconnected;

        let rejected = self.pending.reject_all();
        tracing::info!(code, reason = %reason, rejected, "Connection closed");
        self.bus.emit(
            events::DISCONNECTED,
            json!({ "code": code, "reason": reason }),
        );

        if was_connected
            && code != NORMAL_CLOSURE
            && self.reconnect_attempts < self.config.max_reconnect_attempts
        {
            self.schedule_reconnect();
        }
    }

    /// Deliberate disconnect. Idempotent.
    async fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.connecting = None;
        self.heartbeat = None;
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(ClientError::ConnectionClosed));
        }

        if let Some(mut sink) = self.sink.take() {
            let close = Frame::close(NORMAL_CLOSURE, USER_DISCONNECT_REASON);
            if let Err(e) = sink.send(close).await {
                tracing::debug!(error = %e, "Failed to send close frame");
            }
            let _ = sink.close().await;
        }
        self.stream = None;

        let dropped = self.outbound.len();
        self.outbound.clear();
        let rejected = self.pending.reject_all();
        self.reconnect_attempts = 0;

        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            tracing::info!(dropped, rejected, "Disconnected");
            self.bus.emit(
                events::DISCONNECTED,
                json!({ "code": NORMAL_CLOSURE, "reason": USER_DISCONNECT_REASON }),
            );
        }
    }

    // ---- Heartbeat ----

    fn start_heartbeat(&mut self) {
        let period = self.config.heartbeat_interval(self.backgrounded);
        if period.is_zero() {
            self.heartbeat = None;
            return;
        }
        // Later ticks add the period again, so the second one must fit too.
        let now = Instant::now();
        let (Some(start), Some(_)) = (
            now.checked_add(period),
            now.checked_add(period.saturating_mul(2)),
        ) else {
            tracing::warn!(
                period_ms = period.as_millis() as u64,
                "Heartbeat interval out of range, heartbeat disabled"
            );
            self.heartbeat = None;
            return;
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.heartbeat = Some(interval);
    }

    async fn on_heartbeat(&mut self) {
        let period = self.config.heartbeat_interval(self.backgrounded);
        let limit = period.saturating_mul(self.config.heartbeat_miss_factor);
        let silence = self.last_pong.elapsed();

        if silence > limit {
            tracing::warn!(
                silence_ms = silence.as_millis() as u64,
                "No pong received, closing connection"
            );
            // 1006 is reserved for local reporting and never goes on the wire.
            if let Some(sink) = self.sink.as_mut() {
                let _ = sink.send(Frame::Close(None)).await;
            }
            self.on_closed(ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT_REASON.to_string());
            return;
        }

        let ping = Message::notification(
            PING_METHOD,
            json!({ "timestamp": chrono::Utc::now().timestamp_millis() }),
        );
        if let Err(e) = self.transmit(&ping).await {
            tracing::debug!(error = %e, "Heartbeat ping failed");
        }
    }

    // ---- Outbound ----

    async fn send_message(&mut self, message: Message) {
        if self.state != ConnectionState::Connected {
            let payload = json!({
                "message": message.to_value(),
                "queue_size": self.outbound.len() + 1,
            });
            self.outbound.push_back(message);
            tracing::debug!(queued = self.outbound.len(), "Message queued");
            self.bus.emit(events::MESSAGE_QUEUED, payload);
            return;
        }
        self.outbound.push_back(message);
        self.flush_queue().await;
    }

    /// Drain the queue in order. On a transmit failure the message goes back
    /// to the front and draining stops.
    async fn flush_queue(&mut self) {
        if !self.outbound.is_empty() {
            tracing::debug!(queued = self.outbound.len(), "Flushing outbound queue");
        }
        while let Some(message) = self.outbound.pop_front() {
            let Err(error) = self.transmit(&message).await else {
                continue;
            };
            tracing::warn!(error = %error, "Failed to send message");
            self.bus.emit(
                events::SEND_ERROR,
                json!({ "error": error.to_string(), "message": message.to_value() }),
            );
            if !matches!(error, ClientError::Protocol(_)) {
                self.outbound.push_front(message);
                break;
            }
        }
    }

    async fn transmit(&mut self, message: &Message) -> Result<(), ClientError> {
        let sink = self.sink.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let text = message.to_text()?;
        sink.send(Frame::Text(text)).await?;
        self.bus.emit(events::MESSAGE_SENT, message.to_value());
        Ok(())
    }

    // ---- Inbound ----

    fn handle_frame(&mut self, item: Option<Result<Frame, ClientError>>) {
        match item {
            Some(Ok(Frame::Text(text))) => {
                let parsed = Message::parse(&text);
                self.handle_inbound(parsed, &text);
            }
            Some(Ok(Frame::Binary(bytes))) => {
                let parsed = Message::from_slice(&bytes);
                self.handle_inbound(parsed, &String::from_utf8_lossy(&bytes));
            }
            Some(Ok(Frame::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (f.code, f.reason))
                    .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                self.on_closed(code, reason);
            }
            Some(Err(error)) => {
                tracing::warn!(error = %error, "Socket error");
                self.bus.emit(events::ERROR, json!({ "message": error.to_string() }));
            }
            None => self.on_closed(ABNORMAL_CLOSURE, "Connection lost".to_string()),
        }
    }

    fn handle_inbound(&mut self, parsed: Result<Message, ProtocolError>, raw: &str) {
        let message = match parsed {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to parse inbound message");
                self.bus.emit(
                    events::PARSE_ERROR,
                    json!({ "error": error.to_string(), "data": raw }),
                );
                return;
            }
        };

        if message.method() == Some(PONG_METHOD) {
            self.last_pong = Instant::now();
            return;
        }

        match message {
            Message::Response(Response { id, outcome }) => {
                match id.as_number().and_then(|n| self.pending.take(n)) {
                    Some(entry) => {
                        tracing::debug!(id = %id, method = entry.method(), "Response received");
                        entry.settle(outcome);
                    }
                    None => {
                        tracing::debug!(id = %id, "Response for unknown request");
                        let message = Message::Response(Response { id, outcome });
                        self.bus.emit(events::MESSAGE_RECEIVED, message.to_value());
                    }
                }
            }
            // Server-initiated requests are surfaced the same way as notifications.
            unsolicited => {
                let (method, params) = match &unsolicited {
                    Message::Request(r) => (r.method.clone(), r.params.clone()),
                    Message::Notification(n) => (n.method.clone(), n.params.clone()),
                    Message::Response(_) => return,
                };
                tracing::trace!(method = %method, "Notification received");
                self.bus.emit(events::NOTIFICATION, unsolicited.to_value());
                self.bus.emit(&events::notification(&method), params);
            }
        }
    }

    fn expire_requests(&mut self) {
        for (id, method) in self.pending.expire(Instant::now()) {
            tracing::warn!(id, method = %method, "Request timed out");
        }
    }

    // ---- Status ----

    fn publish_status(&self) {
        self.status_tx.send_replace(ClientStatus {
            state: self.state,
            address: self.address.clone(),
            reconnect_attempts: self.reconnect_attempts,
            queued_messages: self.outbound.len(),
            pending_requests: self.pending.len(),
            backgrounded: self.backgrounded,
        });
    }
}

// ---- select! helpers: each waits forever when its source is absent ----

async fn poll_connect(connecting: &mut Option<ConnectFuture>) -> Result<SocketPair, ClientError> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(stream: &mut Option<SocketStream>) -> Option<Result<Frame, ClientError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
