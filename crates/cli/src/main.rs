//! Gigline CLI
//!
//! Terminal front-end over the sync layer: store or clear credentials,
//! resolve the signed-in identity, fetch the notification inbox, and tail
//! live pushes from the channel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use gigline_client::{
    aggregate, ActionDispatcher, AppEvent, Backend, ChannelConfig, ChannelState, CredentialStore,
    EventBus, FileCredentialStore, HttpBackend, LiveChannel, NotificationStore, SessionContext,
};
use gigline_protocol::{ClientMessage, Identity, Notification};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gigline", about = "Marketplace session and notification tool")]
struct Cli {
    /// REST API base URL
    #[arg(long, env = "GIGLINE_API_URL", default_value = "http://localhost:4000")]
    api_url: String,

    /// Push channel URL
    #[arg(long, env = "GIGLINE_WS_URL", default_value = "ws://localhost:4000/ws")]
    ws_url: String,

    /// Directory holding credentials (defaults to ~/.gigline)
    #[arg(long, env = "GIGLINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a bearer token for this machine
    Login {
        #[arg(long)]
        token: String,
    },
    /// Clear persisted credentials
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Fetch and print the notification inbox
    Inbox {
        /// Flip every notification to read after printing
        #[arg(long)]
        mark_all_read: bool,
    },
    /// List conversations derived from the message history
    Chats,
    /// Send a direct message over the push channel
    Send {
        /// Receiving user id
        #[arg(long)]
        to: String,
        /// Message body
        #[arg(long)]
        message: String,
    },
    /// Stay connected and print pushes as they arrive
    Tail,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let credentials: Arc<dyn CredentialStore> = match &cli.data_dir {
        Some(dir) => Arc::new(FileCredentialStore::new(dir)),
        None => Arc::new(FileCredentialStore::default_location()?),
    };
    let bus = EventBus::default();
    let session = SessionContext::new(credentials.clone(), bus.clone());

    match cli.command {
        Command::Login { token } => {
            credentials
                .store_token(&token)
                .context("failed to persist token")?;
            match session.resolve_identity() {
                Some(identity) => println!("Signed in as {}", describe(&identity)),
                None => bail!("token stored but its claims could not be decoded"),
            }
        }
        Command::Logout => {
            session.invalidate();
            println!("Signed out");
        }
        Command::Whoami => match session.resolve_identity() {
            Some(identity) => println!("{}", describe(&identity)),
            None => bail!("not signed in"),
        },
        Command::Inbox { mark_all_read } => {
            let _ = require_identity(&session)?;
            let dispatcher = dispatcher(&cli.api_url, &credentials, &bus);

            if let Err(e) = dispatcher.refresh().await {
                // A failed read-only fetch is non-fatal: render what we have.
                warn!(error = %e, "Failed to fetch notifications");
                eprintln!(
                    "{} could not reach the backend, showing nothing",
                    style("warning:").yellow().bold()
                );
            }

            {
                let store = dispatcher.store();
                let guard = store.lock().await;
                if guard.is_empty() {
                    println!("Inbox empty");
                } else {
                    for n in guard.snapshot() {
                        print_notification(&n);
                    }
                    println!(
                        "\n{} unread of {}",
                        style(guard.unread_count()).bold(),
                        guard.len()
                    );
                }
            }

            if mark_all_read {
                dispatcher.mark_all_read().await;
                println!("All notifications marked read");
            }
        }
        Command::Chats => {
            let identity = require_identity(&session)?;
            let backend = HttpBackend::new(&cli.api_url, credentials.load_token());

            let messages = match backend.fetch_messages().await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch messages");
                    eprintln!(
                        "{} could not reach the backend, showing nothing",
                        style("warning:").yellow().bold()
                    );
                    Vec::new()
                }
            };

            let conversations = aggregate(&messages, &identity.id);
            if conversations.is_empty() {
                println!("No conversations");
            }
            for conv in conversations {
                let unread = if conv.unread_count > 0 {
                    format!(" [{} unread]", conv.unread_count)
                } else {
                    String::new()
                };
                println!(
                    "{}{}  {}",
                    style(&conv.counterpart_id).bold(),
                    style(unread).yellow(),
                    conv.last_message.content
                );
            }
        }
        Command::Send { to, message } => {
            let identity = require_identity(&session)?;
            let store = NotificationStore::shared();
            let mut channel = LiveChannel::new(ChannelConfig::new(cli.ws_url.clone()));
            let handle = channel.connect(&identity, store, bus.clone());

            let mut state = handle.state_changes();
            while *state.borrow() != ChannelState::Connected {
                state
                    .changed()
                    .await
                    .context("channel closed before connecting")?;
            }
            handle
                .send(ClientMessage::direct_message(to.clone(), message))
                .await
                .context("failed to queue message")?;
            // The channel flushes queued frames before closing the transport.
            channel.disconnect().await;
            println!("Message sent to {}", style(to).bold());
        }
        Command::Tail => {
            let identity = require_identity(&session)?;
            let store = NotificationStore::shared();
            let mut channel = LiveChannel::new(ChannelConfig::new(cli.ws_url.clone()));
            let mut events = bus.subscribe();
            channel.connect(&identity, store, bus.clone());

            println!(
                "Tailing pushes for {} (ctrl-c to stop)",
                style(&identity.id).bold()
            );
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(AppEvent::NotificationArrived { notification }) => {
                            print_notification(&notification);
                        }
                        Ok(AppEvent::DirectMessageArrived { message }) => {
                            println!(
                                "{} {}: {}",
                                style("msg").cyan(),
                                message.sender_id,
                                message.content
                            );
                        }
                        Ok(AppEvent::ProposalsChanged { proposal_id }) => {
                            println!(
                                "{} proposal list changed ({})",
                                style("sync").magenta(),
                                proposal_id.as_deref().unwrap_or("unspecified")
                            );
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    },
                }
            }
            channel.disconnect().await;
        }
    }

    Ok(())
}

fn dispatcher(
    api_url: &str,
    credentials: &Arc<dyn CredentialStore>,
    bus: &EventBus,
) -> ActionDispatcher<HttpBackend> {
    let backend = HttpBackend::new(api_url, credentials.load_token());
    ActionDispatcher::new(backend, NotificationStore::shared(), bus.clone())
}

fn require_identity(session: &SessionContext) -> anyhow::Result<Identity> {
    session
        .resolve_identity()
        .ok_or_else(|| anyhow::anyhow!("not signed in; run `gigline login --token <jwt>`"))
}

fn describe(identity: &Identity) -> String {
    let name = identity.name.as_deref().unwrap_or(&identity.id);
    format!("{} ({})", name, identity.role)
}

fn print_notification(n: &Notification) {
    let marker = if n.read {
        style(" ").dim()
    } else {
        style("*").yellow().bold()
    };
    let title = n.title.as_deref().unwrap_or(&n.kind);
    match &n.message {
        Some(body) => println!("{} {}  {}: {}", marker, n.created_at, title, body),
        None => println!("{} {}  {}", marker, n.created_at, title),
    }
}
