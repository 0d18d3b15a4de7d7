//! Chat CLI - Line-Oriented Surface for the Realtime Session
//!
//! Reads prompts from stdin, streams assistant turns to stdout and reports
//! conversation titles as they are revealed. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Connect with a token from the environment
//! CHAT_TOKEN=secret chat-cli
//!
//! # Custom endpoint and config file
//! chat-cli --endpoint wss://chat.example.com/ws/chat --config ./client.toml --token secret
//!
//! # Verbose logging
//! RUST_LOG=debug chat-cli --token secret
//! ```
//!
//! # Commands
//!
//! - `/new`: start a new conversation
//! - `/list`: show known conversations
//! - `/status`: show connection state and counters
//! - `/quit`: close the session and exit

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use realtime_core::{
    load_config_from_path, ChatClient, ClientConfig, ClientError, ClientUpdate, ConfigSource,
    Identity, TurnId,
};

/// Chat CLI - terminal client for the realtime chat server
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Session token sent as the `token` query parameter
    #[arg(short = 't', long, env = "CHAT_TOKEN", hide_env_values = true)]
    token: String,

    /// WebSocket endpoint (overrides config and CHAT_ENDPOINT)
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delay per revealed title character in milliseconds (0 = instant)
    #[arg(long, value_name = "MS")]
    reveal_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_cli={level},realtime_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Layer command-line overrides over file and environment config
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .with_context(|| format!("Failed to load config: {:?}", args.config))?;

    let mut overridden = false;
    if let Some(endpoint) = &args.endpoint {
        config.transport.endpoint.clone_from(endpoint);
        overridden = true;
    }
    if let Some(ms) = args.reveal_ms {
        config.title_reveal_interval = Duration::from_millis(ms);
        overridden = true;
    }
    if overridden {
        config.set_source(ConfigSource::Cli);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Writes streamed turns incrementally
#[derive(Default)]
struct Printer {
    printed: HashMap<TurnId, usize>,
}

impl Printer {
    fn render(&mut self, client: &ChatClient, update: &ClientUpdate) -> Result<()> {
        let mut out = std::io::stdout().lock();

        match update {
            ClientUpdate::TurnStarted { turn_id } | ClientUpdate::TurnAppended { turn_id } => {
                self.write_delta(&mut out, client, turn_id)?;
            }
            ClientUpdate::TurnCompleted { turn_id } => {
                self.write_delta(&mut out, client, turn_id)?;
                self.printed.remove(turn_id);
                writeln!(out)?;
            }
            ClientUpdate::TitleChanged {
                conversation_id,
                title,
                finished: true,
            } => {
                writeln!(out, "[conversation {conversation_id}: {title}]")?;
            }
            ClientUpdate::RawText { content } => {
                writeln!(out, "{content}")?;
            }
            ClientUpdate::ConversationCorrelated { .. }
            | ClientUpdate::TitleChanged { .. }
            | ClientUpdate::Ignored => {}
        }

        out.flush()?;
        Ok(())
    }

    fn write_delta(
        &mut self,
        out: &mut impl Write,
        client: &ChatClient,
        turn_id: &TurnId,
    ) -> Result<()> {
        let Some(turn) = client.turns().iter().find(|t| &t.id == turn_id) else {
            return Ok(());
        };

        let printed = self.printed.entry(turn_id.clone()).or_insert(0);
        if let Some(delta) = turn.content.get(*printed..) {
            write!(out, "{delta}")?;
        }
        *printed = turn.content.len();
        Ok(())
    }
}

/// Handle one line of input; false when the session should end
async fn handle_line(client: &mut ChatClient, line: &str) -> Result<bool> {
    match line.trim() {
        "/quit" => return Ok(false),
        "/new" => {
            client.new_conversation();
            println!("[new conversation]");
        }
        "/list" => {
            let active = client.active_conversation().cloned();
            for entry in client.conversations() {
                let marker = if Some(&entry.id) == active.as_ref() {
                    '*'
                } else {
                    ' '
                };
                println!("{marker} {} {}", entry.id, entry.title);
            }
        }
        "/status" => {
            let stats = client.connection().stats().await;
            println!(
                "[{:?}] sent={} received={} buffered={} dropped={} reconnects={}",
                client.connection_state(),
                stats.sent,
                stats.received,
                stats.buffered,
                stats.dropped,
                stats.reconnects
            );
        }
        text => match client.submit(text) {
            Ok(_) | Err(ClientError::EmptyInput) => {}
            Err(e) => warn!(error = %e, "Message not sent"),
        },
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Chat CLI starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    info!(
        endpoint = %config.transport.endpoint,
        source = %config.source(),
        "Configuration resolved"
    );

    let mut client = ChatClient::new(config).context("Failed to create chat client")?;
    client.open(Identity::new(args.token.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer = Printer::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !handle_line(&mut client, &line).await? {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                }
            }
            update = client.next_update() => {
                match update {
                    Some(update) => printer.render(&client, &update)?,
                    None => {
                        error!("Session channels closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    client.close();
    client.connection().close_and_wait().await;
    info!("Chat CLI stopped");
    Ok(())
}
