//! # Herald — game-event notification scheduler & dispatcher
//!
//! Usage:
//!   herald schedule --file events.json    # Schedule notifications for events
//!   herald resync --file events.json      # Reconcile store against a full event list
//!   herald dispatch                       # Run one delivery cycle and exit (cron-friendly)
//!   herald watch                          # Long-lived polling dispatcher
//!   herald pending                        # List scheduled notifications
//!   herald set-message --id 7 --message … # Override one notification's text
//!   herald purge-sent                     # Trim old sent rows

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use herald_channels::channel_from_config;
use herald_core::config::HeraldConfig;
use herald_core::types::Event;
use herald_notify::templates::timing_label;
use herald_notify::{
    spawn_dispatcher, Dispatcher, EventLifecycle, NotificationStore, PolicyTable, TemplateRegistry,
};

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "🔔 Herald — game-event notification scheduler & dispatcher"
)]
struct Cli {
    /// Config file path (default: ~/.herald/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule notifications for the events in a JSON file
    Schedule {
        /// Event file: a JSON array of events, or a single event object
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Reconcile the store against a full event list (drops orphans)
    Resync {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Remove all pending notifications for one event
    Remove {
        #[arg(long)]
        event_id: String,
    },
    /// Run one delivery cycle and exit
    Dispatch,
    /// Run the polling dispatcher until interrupted
    Watch,
    /// List scheduled notifications
    Pending {
        /// Filter by profile tag
        #[arg(short, long)]
        profile: Option<String>,
        /// Show every row for one event, sent included
        #[arg(long)]
        event_id: Option<String>,
    },
    /// Set (or clear, when --message is omitted) a custom message override
    SetMessage {
        #[arg(long)]
        id: i64,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Delete sent rows older than the retention window
    PurgeSent {
        /// Override the configured retention in days
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "herald=debug" } else { "herald=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => HeraldConfig::load_from(path)?,
        None => HeraldConfig::load()?,
    };
    let store = Arc::new(NotificationStore::open(std::path::Path::new(
        &config.store_path,
    ))?);

    match cli.command {
        Command::Schedule { file } => {
            let lifecycle = build_lifecycle(&config, Arc::clone(&store));
            let events = load_events(&file)?;
            let mut total = 0;
            for event in &events {
                total += lifecycle.on_event_saved(event)?;
            }
            println!(
                "✅ Scheduled {} event(s), {} new notification(s)",
                events.len(),
                total
            );
        }
        Command::Resync { file } => {
            let lifecycle = build_lifecycle(&config, Arc::clone(&store));
            let events = load_events(&file)?;
            let scheduled = lifecycle.on_events_resynced(&events)?;
            println!("✅ Resynced: {scheduled}/{} event(s) scheduled", events.len());
        }
        Command::Remove { event_id } => {
            let removed = store.delete_for_event(&event_id)?;
            println!("✅ Removed {removed} notification(s) for event '{event_id}'");
        }
        Command::Dispatch => {
            let dispatcher = build_dispatcher(&config, Arc::clone(&store))?;
            let stats = dispatcher.run_cycle(chrono::Utc::now().timestamp()).await?;
            // Failures stay pending and retry on the next invocation.
            println!(
                "✅ Cycle done: {} sent, {} failed, {} reaped",
                stats.sent, stats.failed, stats.reaped
            );
        }
        Command::Watch => {
            println!("🔔 Herald v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Store: {}", config.store_path);
            println!("   ⏰ Poll:  every {}s", config.poll_interval_secs);
            let dispatcher = Arc::new(build_dispatcher(&config, Arc::clone(&store))?);
            let handle = spawn_dispatcher(dispatcher, config.poll_interval_secs);
            tokio::signal::ctrl_c().await?;
            handle.abort();
            println!("\n👋 Herald stopped");
        }
        Command::Pending { profile, event_id } => {
            let rows = match &event_id {
                Some(id) => store.list_for_event(id)?,
                None => store.list_pending(profile.as_deref())?,
            };
            if rows.is_empty() {
                println!("No notifications scheduled.");
            } else {
                for n in &rows {
                    let when = chrono::DateTime::from_timestamp(n.fire_at, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                        .unwrap_or_else(|| n.fire_at.to_string());
                    let detail = n
                        .phase
                        .as_deref()
                        .or(n.sub_item.as_deref())
                        .map(|d| format!(" [{d}]"))
                        .unwrap_or_default();
                    println!(
                        "  #{:<5} {} {:8} {} '{}'{} ({})",
                        n.id,
                        when,
                        n.status.as_str(),
                        n.profile,
                        n.title,
                        detail,
                        timing_label(n.anchor, n.offset_minutes)
                    );
                }
                println!("\n{} notification(s)", rows.len());
            }
        }
        Command::SetMessage { id, message } => {
            if store.set_custom_message(id, message.as_deref())? {
                match message {
                    Some(_) => println!("✅ Custom message set on #{id}"),
                    None => println!("✅ Custom message cleared on #{id}"),
                }
            } else {
                anyhow::bail!("notification #{id} not found or already sent");
            }
        }
        Command::PurgeSent { days } => {
            let days = days.unwrap_or(config.sent_retention_days);
            let cutoff = chrono::Utc::now().timestamp() - days * 86_400;
            let purged = store.purge_sent_before(cutoff)?;
            println!("✅ Purged {purged} sent notification(s) older than {days} day(s)");
        }
    }

    Ok(())
}

fn build_lifecycle(config: &HeraldConfig, store: Arc<NotificationStore>) -> EventLifecycle {
    EventLifecycle::new(
        store,
        PolicyTable::from_config(&config.policy),
        TemplateRegistry::builtin(),
        config.grace_window_min,
    )
}

fn build_dispatcher(config: &HeraldConfig, store: Arc<NotificationStore>) -> Result<Dispatcher> {
    let channel = channel_from_config(&config.delivery)?;
    Ok(Dispatcher::new(
        store,
        channel,
        TemplateRegistry::builtin(),
        config.delivery.clone(),
        config.batch_limit,
        config.claim_timeout_min,
    ))
}

/// Read events from a JSON file: either an array or a single object.
fn load_events(path: &PathBuf) -> Result<Vec<Event>> {
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Vec<Event>>(&text) {
        Ok(events) => Ok(events),
        Err(_) => Ok(vec![serde_json::from_str::<Event>(&text)?]),
    }
}
