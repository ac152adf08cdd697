//! Command-line inspector for a sqlmate chat history directory.

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, info};
use sqlmate::{SqlmateConfig, open_history};
use std::path::PathBuf;

/// Command-line options for the history inspector.
#[derive(Parser)]
#[command(name = "sqlmate", version)]
struct Cli {
    /// Optional path to a sqlmate.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// History directory (overrides storage.path)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List chats, most recently updated first
    Chats {
        /// Only chats scoped to this connection
        #[arg(long)]
        connection: Option<String>,
    },
    /// Print a chat's messages in order as JSON lines
    Messages { chat_id: String },
    /// Delete a chat with its messages and hidden actions
    Delete { chat_id: String },
    /// Drop a chat's oldest messages
    Prune {
        chat_id: String,
        /// Number of messages to remove
        #[arg(long)]
        count: usize,
    },
    /// Show storage usage
    Usage,
}

/// Entry point for the sqlmate CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let config = if let Some(path) = cli.config.as_ref() {
        info!("loading config from path: {}", path.display());
        SqlmateConfig::load_from_path(path).context("failed to load config")?
    } else {
        let cwd = std::env::current_dir().context("cwd")?;
        info!("loading layered config from cwd: {}", cwd.display());
        let layered = SqlmateConfig::load_layered(&cwd).context("failed to load layered config")?;
        debug!("layered config loaded (layers={})", layered.layers.len());
        layered.config
    };
    let history = open_history(&config, cli.data_dir.as_deref())?;

    match cli.command {
        Command::Chats { connection } => {
            let chats = match connection {
                Some(connection) => history.list_chats_for_connection(&connection).await?,
                None => history.list_chats().await?,
            };
            for chat in chats {
                println!(
                    "{}\t{}\t{}\t{}",
                    chat.id,
                    chat.updated_at.to_rfc3339(),
                    chat.connection_id.as_deref().unwrap_or("-"),
                    chat.title
                );
            }
        }
        Command::Messages { chat_id } => {
            for message in history.list_messages(&chat_id).await? {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        Command::Delete { chat_id } => {
            if history.delete_chat(&chat_id).await? {
                println!("deleted {chat_id}");
            } else {
                println!("no chat named {chat_id}; removed any leftover messages");
            }
        }
        Command::Prune { chat_id, count } => {
            let removed = history.prune_messages(&chat_id, count).await?;
            println!("removed {removed} messages from {chat_id}");
        }
        Command::Usage => {
            let usage = history.usage().await?;
            match usage.capacity_bytes {
                Some(capacity) => println!("{} / {} bytes", usage.used_bytes, capacity),
                None => println!("{} bytes (unbounded)", usage.used_bytes),
            }
            let chats = history.list_chats().await?.len();
            let documents = history.messages().chat_ids().await?.len();
            let limits = history.limits();
            println!("{chats} chats, {documents} message documents");
            println!(
                "eviction: chat_batch={} prune_batch={} max_attempts={}",
                limits.chat_batch, limits.prune_batch, limits.max_attempts
            );
        }
    }
    Ok(())
}
