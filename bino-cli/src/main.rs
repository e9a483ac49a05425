//! bino — terminal frontend for the BinkoO chat widget
//!
//! Drives the same controller the website embeds, against the same webhook.
//!
//! # Subcommands
//! - `chat`            — interactive session (default)
//! - `send <text>`     — one-shot message, prints the bot reply
//! - `session`         — print the persisted session id
//! - `reset`           — forget the session id and welcome flag

mod terminal;

use std::sync::Arc;

use bino_core::{
    BinoConfig, ChatWidget, FileStore, HeadlessView, KeyValueStore, SendOutcome, SessionResolver,
    StoreKeys, WidgetEvent,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, EnvFilter};

use terminal::TerminalView;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "bino", version, about = "Chat with Bino from the terminal")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "BINO_CONFIG", default_value = "bino.toml")]
    config: String,

    /// Webhook URL (overrides the config file)
    #[arg(long, env = "BINO_WEBHOOK_URL")]
    webhook: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat,

    /// Send one message and print the reply
    Send {
        /// Message text
        text: String,

        /// Print the whole transcript as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the session id, creating it if needed
    Session,

    /// Clear the persisted session id and welcome flag
    Reset,
}

// ============================================================================
// Commands
// ============================================================================

async fn run_chat(config: &BinoConfig) -> anyhow::Result<()> {
    let widget = Arc::new(ChatWidget::from_config(config, Arc::new(TerminalView::new()))?);
    widget.activate();

    println!("Commandes : /open /close /toggle /session /quit");
    widget.dispatch(WidgetEvent::ToggleClicked).await;

    let mut pending: JoinSet<Option<SendOutcome>> = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let command = line.trim().to_string();
        match command.as_str() {
            "/quit" => break,
            "/open" if !widget.is_open() => {
                widget.dispatch(WidgetEvent::ToggleClicked).await;
            }
            "/close" if widget.is_open() => {
                widget.dispatch(WidgetEvent::CloseClicked).await;
            }
            "/open" | "/close" => {}
            "/toggle" => {
                widget.dispatch(WidgetEvent::ToggleClicked).await;
            }
            "/session" => println!("{}", widget.session_id()),
            _ => {
                if widget.is_loading() {
                    println!("(une réponse est déjà en attente)");
                    continue;
                }
                if !widget.is_open() {
                    widget.dispatch(WidgetEvent::ToggleClicked).await;
                }
                widget.dispatch(WidgetEvent::InputChanged(line)).await;

                // Replies arrive in the background so /close keeps working.
                spawn_send(&mut pending, &widget);
            }
        }
    }

    finish_chat(&widget, pending).await;
    Ok(())
}

/// Press Enter on the widget without blocking the input loop.
fn spawn_send(pending: &mut JoinSet<Option<SendOutcome>>, widget: &Arc<ChatWidget>) {
    let widget = Arc::clone(widget);
    pending.spawn(async move {
        widget
            .dispatch(WidgetEvent::KeyPressed {
                key: "Enter".to_string(),
                shift: false,
            })
            .await
    });
}

/// Wait for replies still in flight, then detach the widget.
async fn finish_chat(widget: &ChatWidget, mut pending: JoinSet<Option<SendOutcome>>) {
    if !pending.is_empty() {
        tracing::debug!(pending = pending.len(), "Waiting for replies in flight");
    }
    while let Some(result) = pending.join_next().await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Send task failed");
        }
    }
    widget.dispose();
}

async fn run_send(config: &BinoConfig, text: &str, json: bool) -> anyhow::Result<bool> {
    let view = Arc::new(HeadlessView::new());
    let widget = ChatWidget::from_config(config, view)?;
    widget.activate();
    widget.toggle();

    let outcome = widget.submit(text).await;
    widget.dispose();

    let Some(outcome) = outcome else {
        anyhow::bail!("nothing to send");
    };

    let transcript = widget.transcript();
    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else if let Some(reply) = transcript.last() {
        println!("{}", terminal::format_message(reply));
    }

    Ok(!matches!(outcome, SendOutcome::TransportError(_)))
}

/// Resolve the session id from the store alone; no webhook is contacted.
fn resolve_session(config: &BinoConfig) -> anyhow::Result<String> {
    let store = FileStore::open(config.storage.resolved_path())?;
    let keys = StoreKeys::with_prefix(&config.storage.key_prefix);
    Ok(SessionResolver::new(Arc::new(store), keys).session_id())
}

fn run_reset(config: &BinoConfig) -> anyhow::Result<()> {
    let path = config.storage.resolved_path();
    let store = FileStore::open(&path)?;
    store.clear()?;
    println!("Cleared {}", path.display());
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match BinoConfig::load_with_webhook(&cli.config, cli.webhook.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("bino: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    // Logs go to stderr; stdout is the conversation.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&config).await?,
        Commands::Send { text, json } => {
            if !run_send(&config, &text, json).await? {
                std::process::exit(2);
            }
        }
        Commands::Session => println!("{}", resolve_session(&config)?),
        Commands::Reset => run_reset(&config)?,
    }

    Ok(())
}
