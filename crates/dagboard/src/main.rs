//! # dagboard
//!
//! Command-line client for a dagboard server.
//!
//! - `watch`: mirror dags, ports and logs, keep the channel open and log
//!   every event until Ctrl-C
//! - `login` / `logout`: manage the persisted session
//! - `save`: ask the orchestrator to persist the running graph

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dagboard_api::{ApiClient, SessionEvent};
use dagboard_auth::ClientStorage;
use dagboard_channel::{ChannelClient, Handler};
use dagboard_core::logging::{init_json_subscriber, init_subscriber};
use dagboard_core::{EventAction, EventGroup, EventKey, MessageCenter};
use dagboard_settings::DagboardSettings;
use dagboard_store::{DagsStore, LogsStore, PortsStore, spawn_resync};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// dagboard command-line client.
#[derive(Parser, Debug)]
#[command(name = "dagboard", version, about = "Command-line client for a dagboard server")]
struct Cli {
    /// Settings file (defaults to `~/.dagboard/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server origin, overriding the settings file.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Mirror server state and log live events until Ctrl-C.
    Watch,
    /// Log in and persist the session.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// Forget the persisted session.
    Logout,
    /// Persist the running dag graph on the server.
    Save,
}

impl Cli {
    fn load_settings(&self) -> Result<DagboardSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(dagboard_settings::settings_path);
        let mut settings = dagboard_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(origin) = &self.server {
            settings.server.origin.clone_from(origin);
        }
        Ok(settings)
    }
}

fn init_logging(settings: &DagboardSettings) {
    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }
}

fn build_api(settings: &DagboardSettings) -> Result<Arc<ApiClient>> {
    let storage = Arc::new(ClientStorage::open(settings.storage.state_path()));
    let messages = Arc::new(MessageCenter::new(settings.messages.ttl()));
    let api = ApiClient::from_settings(settings, storage, messages).context("Invalid server settings")?;
    Ok(Arc::new(api))
}

/// Print the user messages reported so far.
fn print_messages(api: &ApiClient) {
    for message in api.messages().messages() {
        eprintln!("[{}] {}", message.kind.as_str(), message.text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_logging(&settings);
    let api = build_api(&settings)?;

    let outcome = match &cli.command {
        Command::Watch => watch(&settings, Arc::clone(&api)).await,
        Command::Login { username, password } => login(&api, username, password).await,
        Command::Logout => api.logout().context("Failed to clear session"),
        Command::Save => save(&settings, Arc::clone(&api)).await,
    };
    if !matches!(cli.command, Command::Watch) {
        print_messages(&api);
    }
    outcome
}

async fn login(api: &ApiClient, username: &str, password: &str) -> Result<()> {
    let outcome = api.login(username, password).await.context("Login failed")?;
    println!("Logged in as {}", outcome.user);
    Ok(())
}

async fn save(settings: &DagboardSettings, api: Arc<ApiClient>) -> Result<()> {
    let channel = ChannelClient::from_settings(settings).context("Invalid channel settings")?;
    DagsStore::new(api, channel)
        .save_dags()
        .await
        .context("Save failed")
}

fn watched_events() -> Vec<EventKey> {
    vec![
        EventKey::new(EventGroup::Dag, EventAction::Add),
        EventKey::new(EventGroup::Dag, EventAction::Update),
        EventKey::new(EventGroup::Dag, EventAction::UpdateParams),
        EventKey::new(EventGroup::Dag, EventAction::Remove),
        EventKey::new(EventGroup::Template, EventAction::Add),
        EventKey::new(EventGroup::Template, EventAction::Update),
        EventKey::new(EventGroup::Port, EventAction::In),
        EventKey::new(EventGroup::Log, EventAction::Unspecified),
    ]
}

async fn watch(settings: &DagboardSettings, api: Arc<ApiClient>) -> Result<()> {
    let channel = ChannelClient::from_settings(settings).context("Invalid channel settings")?;
    let dags = Arc::new(DagsStore::new(Arc::clone(&api), channel.clone()));
    let ports = Arc::new(PortsStore::new(Arc::clone(&api), channel.clone()));
    let logs = LogsStore::with_limit(channel.clone(), settings.store.log_history_limit);

    logs.initialize();
    let loaded = tokio::try_join!(dags.initialize(), ports.initialize());
    if let Err(e) = loaded {
        print_messages(&api);
        return Err(e).context("Initial load failed");
    }
    let resync = [
        spawn_resync(&channel, Arc::clone(&dags)),
        spawn_resync(&channel, Arc::clone(&ports)),
    ];

    for key in watched_events() {
        let name = key.to_string();
        channel.on_message(
            key,
            Handler::new(move |data| {
                info!(event = %name, data = %data, "event");
                Ok(())
            }),
        );
    }

    let mut states = channel.subscribe_transitions();
    let mut messages = api.messages().subscribe();
    let mut sessions = api.subscribe_session();
    channel.connect();
    info!(
        url = %channel.url(),
        dags = dags.dags().len(),
        ports = ports.len(),
        "watching; press Ctrl-C to stop"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
            state = states.recv() => match state {
                Ok(state) => info!(state = %state, retries = channel.retry_count(), "channel state"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "channel states dropped"),
                Err(RecvError::Closed) => break,
            },
            message = messages.recv() => match message {
                Ok(message) => eprintln!("[{}] {}", message.kind.as_str(), message.text),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "user messages dropped"),
                Err(RecvError::Closed) => break,
            },
            event = sessions.recv() => {
                if let Ok(SessionEvent::LoginRequired { redirect }) = event {
                    warn!(redirect = %redirect, "session expired; run `dagboard login`");
                }
            }
        }
    }

    info!("Shutting down...");
    channel.shutdown();
    for task in resync {
        task.abort();
    }
    info!(logs_limit = logs.limit(), "Shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
