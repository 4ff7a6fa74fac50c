use crate::backend::{HandshakeSource, PctSource};
use crate::config::Config;
use crate::ledger::LedgerStore;
use crate::lock::RunLock;
use crate::names::{NameResolver, WgConfNames};
use crate::notify::{event_message, format_elapsed, Notifier, PushoverNotifier};
use crate::reconcile::{reconcile, Transition};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

mod backend;
mod config;
mod ledger;
mod lock;
mod names;
mod notify;
mod reconcile;

use clap::{Parser, Subcommand};

const DEFAULT_CONFIG: &str = "/etc/wgwatch/config.toml";

/// Wgwatch: connect/disconnect notifications for WireGuard peers on a
/// containerized gateway
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one poll/diff/notify cycle and exit
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Validate configuration file
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Show the persisted connectivity ledger
    Status {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run {
        config: DEFAULT_CONFIG.to_string(),
    }) {
        Commands::Run { config } => run_cycle(&config).await,
        Commands::Validate { config } => validate_config(&config),
        Commands::Status { config, json } => show_status(&config, json),
    }
}

/// One reconciliation cycle: lock, poll, diff, notify, persist. Invoked by
/// an external scheduler; exits 1 only on setup failures that happen before
/// any state mutation.
async fn run_cycle(config_path: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let (token, user) = config.credentials()?;

    let lock_path = format!("{}.lock", config.state.path);
    let _guard = RunLock::acquire(Path::new(&lock_path))?;

    let source = PctSource::new(config.backend.container.clone());
    let snapshot = source.snapshot()?;

    let store = LedgerStore::new(&config.state.path);
    let previous = store.load()?;

    let now = unix_now();
    let (events, next) = reconcile(
        &snapshot,
        &previous,
        now,
        config.backend.threshold_secs,
    );

    if events.is_empty() {
        info!(
            "No connectivity changes ({} peers polled, {} connected)",
            snapshot.len(),
            next.connected.len()
        );
    } else {
        let names = match &config.backend.names_path {
            Some(path) => WgConfNames::load(Path::new(path)),
            None => WgConfNames::empty(),
        };
        let notifier = PushoverNotifier::new(token, user);
        let label = config.pushover.label.as_deref().unwrap_or("");

        for event in &events {
            let display_name = names.label_for(&event.peer);
            info!(
                "{} {} ({} ago)",
                display_name,
                match event.kind {
                    Transition::Connected => "connected",
                    Transition::Disconnected => "disconnected",
                },
                format_elapsed(event.elapsed_secs)
            );

            let (title, body) = event_message(event, &display_name, label);
            if let Err(e) = notifier.send(&title, &body).await {
                warn!("Failed to deliver notification for {}: {}", display_name, e);
            }
        }
    }

    // A failed save leaves the previous ledger intact; the next successful
    // cycle re-detects and self-heals.
    if let Err(e) = store.save(&next) {
        error!("Failed to persist ledger to {}: {}", config.state.path, e);
    }

    Ok(())
}

fn validate_config(path: &str) -> anyhow::Result<()> {
    match Config::load(path) {
        Ok(cfg) => {
            info!("Configuration '{}' is valid.", path);
            info!("Container: {}", cfg.backend.container);
            info!("Threshold: {}s", cfg.backend.threshold_secs);
            info!("State path: {}", cfg.state.path);
            info!(
                "Names file: {}",
                cfg.backend.names_path.as_deref().unwrap_or("(none)")
            );
            match cfg.credentials() {
                Ok(_) => info!("Pushover credentials present"),
                Err(e) => warn!("{}", e),
            }
            Ok(())
        }
        Err(e) => {
            error!("Configuration '{}' is INVALID: {}", path, e);
            Err(anyhow::anyhow!("Invalid config"))
        }
    }
}

/// Read-only: inspects the persisted ledger without taking the run lock.
fn show_status(config_path: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let ledger = LedgerStore::new(&config.state.path).load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ledger)?);
        return Ok(());
    }

    if ledger.connected.is_empty() && ledger.last_handshake.is_empty() {
        println!("No peers recorded yet.");
        return Ok(());
    }

    let now = unix_now();
    for (peer, ts) in &ledger.last_handshake {
        let state = if ledger.connected.contains(peer) {
            "connected"
        } else {
            "offline"
        };
        println!(
            "{:<10} {}  last handshake {} ago",
            state,
            peer,
            format_elapsed(now.saturating_sub(*ts))
        );
    }
    for peer in &ledger.connected {
        if !ledger.last_handshake.contains_key(peer) {
            println!("{:<10} {}  no handshake recorded", "connected", peer);
        }
    }

    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
