//! CLI binary entry point for the flowlink console.
//!
//! Usage:
//!   flowlink [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Path to configuration TOML file
//!   -u, --url <URL>        Server address (overrides config)
//!   -t, --token <TOKEN>    Bearer token (overrides config)
//!   --no-connect           Do not connect on startup
//!   --json-logs            Emit logs as JSON
//!   -v, --verbose          Increase logging verbosity

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use flowlink_client::Client;
use flowlink_console::render::forward_events;
use flowlink_console::{Console, ConsoleConfig};

/// flowlink - console client for a JSON-RPC server over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "flowlink")]
#[command(about = "Interactive console for a flowlink server")]
#[command(version)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server address (e.g., ws://localhost:3000/ws).
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// Bearer token sent when connecting.
    #[arg(short, long, value_name = "TOKEN")]
    token: Option<String>,

    /// Start disconnected; use /connect later.
    #[arg(long)]
    no_connect: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Increase logging verbosity (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration.
    let path = cli.config.clone().or_else(ConsoleConfig::default_path);
    let mut config = ConsoleConfig::load(path.as_deref())?;

    // Apply CLI overrides.
    if let Some(url) = cli.url {
        config.server.url = url;
    }
    if let Some(token) = cli.token {
        config.server.token = Some(token);
    }
    if cli.no_connect {
        config.server.auto_connect = false;
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }

    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so they do not interleave with console output.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(url = %config.server.url, "Starting flowlink console");

    let client = Client::websocket(config.client.clone());
    forward_events(
        client.events(),
        config.client.max_reconnect_attempts,
        |line| println!("{line}"),
    );

    let mut console = Console::new(client.clone(), config, std::io::stdout());
    console.start().await?;

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    console.run(lines, interrupted).await?;

    if client.is_connected() {
        client.disconnect().await?;
    }
    tracing::info!("Console stopped");
    Ok(())
}
