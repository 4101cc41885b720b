//! Line-oriented command handling.
//!
//! Lines starting with `/` are console commands; anything else is sent to the
//! server as a command through the execute tool. Output goes to any
//! [`Write`] sink so the loop can run against stdout or a buffer.

use std::future::Future;
use std::io::Write;

use flowlink_client::{Client, ClientError, ConnectionState};
use serde_json::Value;
use tokio::io::{AsyncBufRead, Lines};

use crate::config::ConsoleConfig;
use crate::render::format_result;

/// Whether the input loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console state: the client session plus where output is written.
pub struct Console<W> {
    client: Client,
    config: ConsoleConfig,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(client: Client, config: ConsoleConfig, out: W) -> Self {
        Self { client, config, out }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The writer output goes to.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Print the banner and connect when `auto_connect` is set.
    pub async fn start(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "flowlink console. Type /help for available commands.")?;
        if self.config.server.auto_connect {
            let url = self.config.server.url.clone();
            let token = self.config.server.token.clone();
            self.connect(&url, token.as_deref()).await?;
        }
        Ok(())
    }

    /// Connect to `url` and run the session handshake if configured.
    ///
    /// Failures are reported on the output, not returned.
    pub async fn connect(&mut self, url: &str, token: Option<&str>) -> std::io::Result<()> {
        writeln!(self.out, "Connecting to {url}...")?;
        if let Err(e) = self.client.connect(url, token).await {
            writeln!(self.out, "Connection failed: {e}")?;
            return Ok(());
        }

        self.config.server.url = url.to_string();
        if token.is_some() {
            self.config.server.token = token.map(str::to_string);
        }

        if self.config.session.initialize {
            // session_error is printed by the event forwarder.
            if let Ok(result) = self
                .client
                .initialize_session(self.config.session_client_info())
                .await
            {
                let server = result
                    .pointer("/serverInfo/name")
                    .and_then(Value::as_str)
                    .unwrap_or("server");
                writeln!(self.out, "Session initialized with {server}")?;
            }
        }
        Ok(())
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> std::io::Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        if line.starts_with('/') {
            return self.process_command(line).await;
        }
        self.execute(line).await?;
        Ok(Flow::Continue)
    }

    /// Read and handle lines until input ends, a quit command, or `shutdown`.
    ///
    /// `shutdown` also interrupts a command still waiting on the server.
    pub async fn run<R, S>(&mut self, mut lines: Lines<R>, shutdown: S) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = &mut shutdown => break,
            };
            let Some(line) = line else {
                return Ok(());
            };
            let flow = tokio::select! {
                flow = self.handle_line(&line) => flow?,
                () = &mut shutdown => break,
            };
            if flow == Flow::Quit {
                return Ok(());
            }
        }
        tracing::info!("Interrupted");
        Ok(())
    }

    async fn process_command(&mut self, cmd: &str) -> std::io::Result<Flow> {
        let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
        let command = parts[0];
        let args = parts.get(1).copied().unwrap_or("").trim();

        match command {
            "/help" => {
                writeln!(self.out, "Available commands:")?;
                writeln!(self.out, "  <command> [args]      - Run a command on the server")?;
                writeln!(self.out, "  /status               - Show connection status")?;
                writeln!(self.out, "  /connect [url] [token] - Connect to a server")?;
                writeln!(self.out, "  /disconnect           - Close the connection")?;
                writeln!(self.out, "  /tools                - List tools offered by the server")?;
                writeln!(self.out, "  /health               - Show server health")?;
                writeln!(self.out, "  /help                 - Show this help message")?;
                writeln!(self.out, "  /quit                 - Exit the console")?;
            }
            "/status" => {
                let status = self.client.status();
                let stats = self.client.events().stats();
                writeln!(self.out, "State: {}", status.state)?;
                writeln!(
                    self.out,
                    "Server: {}",
                    status.address.as_deref().unwrap_or("(none)")
                )?;
                writeln!(self.out, "Reconnect attempts: {}", status.reconnect_attempts)?;
                writeln!(self.out, "Queued messages: {}", status.queued_messages)?;
                writeln!(self.out, "Pending requests: {}", status.pending_requests)?;
                writeln!(
                    self.out,
                    "Event handlers: {} ({} events in history)",
                    stats.total_handlers, stats.history_size
                )?;
            }
            "/connect" => {
                let mut words = args.split_whitespace();
                let url = words
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.config.server.url.clone());
                let token = words
                    .next()
                    .map(str::to_string)
                    .or_else(|| self.config.server.token.clone());
                self.connect(&url, token.as_deref()).await?;
            }
            "/disconnect" => {
                if self.client.status().state == ConnectionState::Disconnected {
                    writeln!(self.out, "Not connected.")?;
                } else if let Err(e) = self.client.disconnect().await {
                    writeln!(self.out, "Disconnect failed: {e}")?;
                }
            }
            "/tools" => {
                if !self.require_connection()? {
                    return Ok(Flow::Continue);
                }
                let tools = self.client.available_tools().await;
                if tools.is_empty() {
                    writeln!(self.out, "No tools available.")?;
                }
                for tool in tools {
                    let name = tool.get("name").and_then(Value::as_str).unwrap_or("?");
                    match tool.get("description").and_then(Value::as_str) {
                        Some(description) => writeln!(self.out, "  {name} - {description}")?,
                        None => writeln!(self.out, "  {name}")?,
                    }
                }
            }
            "/health" => {
                if !self.require_connection()? {
                    return Ok(Flow::Continue);
                }
                match self.client.health_status().await {
                    Ok(health) => writeln!(self.out, "{}", format_result(&health))?,
                    Err(e) => writeln!(self.out, "Health check failed: {e}")?,
                }
            }
            "/quit" | "/exit" | "/q" => return Ok(Flow::Quit),
            _ => {
                writeln!(
                    self.out,
                    "Unknown command: {}. Type /help for available commands.",
                    command
                )?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Send a free-form line to the server: first word is the command,
    /// remaining words its arguments.
    async fn execute(&mut self, line: &str) -> std::io::Result<()> {
        if !self.require_connection()? {
            return Ok(());
        }
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(());
        };
        let args: Vec<Value> = words.map(|w| Value::String(w.to_string())).collect();

        match self.client.execute_command(command, Value::Array(args)).await {
            Ok(result) => writeln!(self.out, "{}", format_result(&result)),
            Err(ClientError::Rpc { message, .. }) => writeln!(self.out, "Error: {message}"),
            Err(e) => writeln!(self.out, "Command failed: {e}"),
        }
    }

    fn require_connection(&mut self) -> std::io::Result<bool> {
        if self.client.is_connected() {
            return Ok(true);
        }
        writeln!(self.out, "Not connected. Use /connect to connect to a server.")?;
        Ok(false)
    }
}
