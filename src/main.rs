//! `discord-notifier`: polls a Discord account and raises desktop alerts for
//! new messages in direct messages, groups and guild text channels.

mod api;
mod checkpoint;
mod consts;
mod core;
mod cycle;
mod detector;
mod diagnostics;
mod dispatcher;
mod enumerator;
mod error;
mod logging;
mod model;
mod mute;
mod notification_log;
mod notifications;
mod scheduler;
mod settings;
mod store;
mod throttle;

#[cfg(test)]
mod testing;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::{
    api::{ChatApi as _, HttpChatApi, HttpConnector},
    core::default_settings_file,
    cycle::{run_cycle, CycleOutcome, PollContext, PollerConfig},
    mute::set_channel_muted,
    notification_log::NotificationLog,
    notifications::DesktopAlertSink,
    scheduler::{Scheduler, StartRefused},
    settings::Settings,
    store::{JsonFileStore, KvStore},
};

#[derive(Parser, Debug)]
#[command(name = "discord-notifier", version, about = "Desktop alerts for new Discord messages")]
struct Cli {
    /// Settings file (default: <config dir>/discord-notifier/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll until interrupted or until notifications get disabled.
    Run {
        /// Seconds between cycles.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Start polling only if notifications are enabled and logged in.
    Boot,
    /// Run a single cycle and print its report.
    PollOnce {
        /// Only sync checkpoints, never notify.
        #[arg(long)]
        baseline: bool,
    },
    /// Verify a token and store it with the account's user id.
    Login {
        #[arg(long)]
        token: String,
        /// API root, e.g. https://discord.com/api/v10.
        #[arg(long)]
        api_base: Option<String>,
    },
    /// Forget the stored token and user id.
    Logout,
    /// Turn notifications on; the next cycle only syncs checkpoints.
    Enable,
    /// Turn notifications off; a running poller stops at its next cycle.
    Disable,
    /// Keep logging a channel's messages but stop alerting for it.
    Mute { channel_id: String },
    Unmute { channel_id: String },
    /// Show the notification log, newest first.
    Notifications {
        /// Leave the unread counter untouched.
        #[arg(long)]
        keep_unread: bool,
    },
    ClearNotifications,
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose).context("failed to install logger")?;

    let settings_path = match cli.config {
        Some(path) => path,
        None => default_settings_file().map_err(anyhow::Error::msg)?,
    };
    debug!(path = %settings_path.display(), "opening settings");
    let file_store = Arc::new(
        JsonFileStore::open(&settings_path)
            .with_context(|| format!("failed to open {}", settings_path.display()))?,
    );
    let store: Arc<dyn KvStore> = file_store.clone();
    let settings = Settings::new(store.clone());
    let mut config = PollerConfig::default();

    match cli.command {
        Commands::Run { interval_secs } => {
            if let Some(secs) = interval_secs.filter(|secs| *secs > 0) {
                config.poll_interval = Duration::from_secs(secs);
            }
            let scheduler = Scheduler::new(poll_context(store, config));
            scheduler.start().context("cannot start polling")?;
            wait_for_shutdown(&scheduler).await;
        }
        Commands::Boot => {
            let scheduler = Scheduler::new(poll_context(store, config));
            match scheduler.start() {
                Ok(()) => wait_for_shutdown(&scheduler).await,
                Err(StartRefused::Poisoned) => bail!("runtime lock poisoned"),
                Err(refused) => info!(reason = %refused, "not starting at boot"),
            }
        }
        Commands::PollOnce { baseline } => {
            let ctx = poll_context(store, config);
            let outcome = run_cycle(&ctx, baseline).await;
            match &outcome {
                CycleOutcome::Completed(report) | CycleOutcome::Baseline(report) => {
                    println!("{}: {}", outcome.label(), serde_json::to_string_pretty(report)?);
                }
                CycleOutcome::Failed(error) => bail!("cycle failed: {error}"),
                other => println!("{}", other.label()),
            }
        }
        Commands::Login { token, api_base } => {
            if let Some(api_base) = api_base {
                settings
                    .set_api_base_url(&api_base)
                    .map_err(anyhow::Error::msg)?;
            }
            let api = HttpChatApi::new(&settings.api_base_url(), &token, config.request_timeout)?;
            let me = api
                .current_user()
                .await
                .context("token was rejected")?;
            settings.save_credentials(&token, &me.id)?;
            println!("logged in as {} ({})", me.username, me.id);
        }
        Commands::Logout => {
            settings.logout()?;
            println!("logged out");
        }
        Commands::Enable => {
            settings.enable_notifications()?;
            println!("notifications enabled; the next cycle only syncs checkpoints");
        }
        Commands::Disable => {
            settings.disable_notifications()?;
            println!("notifications disabled");
        }
        Commands::Mute { channel_id } => {
            let changed = set_channel_muted(&settings, &channel_id, true)?;
            println!("{channel_id} {}", if changed { "muted" } else { "already muted" });
        }
        Commands::Unmute { channel_id } => {
            let changed = set_channel_muted(&settings, &channel_id, false)?;
            println!("{channel_id} {}", if changed { "unmuted" } else { "was not muted" });
        }
        Commands::Notifications { keep_unread } => {
            let log = NotificationLog::new(store, config.log_limit);
            let records = log.recent_first();
            if records.is_empty() {
                println!("no notifications");
            }
            for record in &records {
                println!(
                    "[{}] #{} {}: {}",
                    record.time, record.channel_name, record.sender, record.content
                );
            }
            if !keep_unread {
                log.mark_read()?;
            }
        }
        Commands::ClearNotifications => {
            NotificationLog::new(store, config.log_limit).clear()?;
            println!("notifications cleared");
        }
        Commands::Status => {
            let log = NotificationLog::new(store, config.log_limit);
            println!("settings: {}", file_store.path().display());
            println!("{}", serde_json::to_string_pretty(&settings.status_report(&log))?);
        }
    }

    Ok(())
}

fn poll_context(store: Arc<dyn KvStore>, config: PollerConfig) -> Arc<PollContext> {
    Arc::new(PollContext {
        store,
        connector: Arc::new(HttpConnector::new(config.request_timeout)),
        alerts: Arc::new(DesktopAlertSink::new()),
        config,
    })
}

async fn wait_for_shutdown(scheduler: &Scheduler) {
    debug!(state = ?scheduler.state(), "waiting for ctrl-c");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::warn!(%error, "failed to listen for ctrl-c");
            }
            scheduler.stop("interrupted");
        }
        _ = scheduler.wait_until_stopped() => {}
    }

    match scheduler.diagnostics() {
        Ok(diag) => info!(
            cycles = diag.cycles_finished,
            in_flight = diag.cycles_in_flight,
            rate_limited = diag.rate_limited_cycles,
            reason = diag.last_stop_reason.as_deref().unwrap_or("unknown"),
            "poller exited"
        ),
        Err(error) => debug!(%error, "no runtime diagnostics"),
    }
}
