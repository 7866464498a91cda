use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use vfl_tracker::config::{AppConfig, DEFAULT_CONFIG_PATH};
use vfl_tracker::db::store::Store;
use vfl_tracker::discovery::{ChromiumObserver, SeasonDiscovery};
use vfl_tracker::feed::FeedClient;
use vfl_tracker::monitoring::dashboard::{self, DashboardState};
use vfl_tracker::monitoring::health::HealthState;
use vfl_tracker::monitoring;
use vfl_tracker::tracker::{CycleOutcome, Tracker};

#[derive(Debug, Parser)]
#[command(name = "vfl-tracker", version, about = "Virtual football season tracker")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the long-running season tracker.
    Run {
        /// Seconds between polling cycles.
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Serve the standings API without polling.
    Serve,
    /// Fill missing team leagues from same-season matches.
    Backfill,
    /// Delete leagues with no team in an active season.
    PruneLeagues,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;

    monitoring::init_logging(&config.monitoring)?;

    let store = Store::new(&config.database.path).await?;

    match cli.command {
        Command::Run { poll_interval } => {
            if let Some(seconds) = poll_interval {
                config.tracker.poll_interval_seconds = seconds;
            }
            run_tracker(config, store).await
        }
        Command::Serve => serve(config, store).await,
        Command::Backfill => {
            let updated = store.backfill_team_leagues().await?;
            tracing::info!(updated, "Backfilled team leagues");
            Ok(())
        }
        Command::PruneLeagues => {
            let deleted = store.prune_inactive_leagues().await?;
            tracing::info!(deleted, "Pruned leagues without active teams");
            Ok(())
        }
    }
}

/// Poll forever; only startup errors end the process.
async fn run_tracker(config: AppConfig, store: Store) -> Result<()> {
    tracing::info!(
        poll_interval_s = config.tracker.poll_interval_seconds,
        offsets = ?config.tracker.offsets(),
        "Season tracker starting"
    );

    let health = HealthState::new();
    let _dashboard = config.dashboard.enabled.then(|| {
        let state = DashboardState::new(Store::from_pool(store.pool().clone()), health.clone());
        dashboard::spawn_dashboard(state, &config.dashboard.bind, config.dashboard.port)
    });

    let feed = FeedClient::new(&config.feed)?;
    let discovery = SeasonDiscovery::from_config(
        Box::new(ChromiumObserver::new(config.discovery.headless)),
        &config.discovery,
    );
    let mut tracker =
        Tracker::new(config.tracker.clone(), store, Box::new(feed), discovery).await?;

    let poll_interval = Duration::from_secs(config.tracker.poll_interval_seconds);
    let discovery_backoff = Duration::from_secs(config.tracker.discovery_backoff_seconds);

    loop {
        let delay = match tracker.run_cycle().await {
            Ok(outcome) => {
                health
                    .record_cycle(tracker.cycle_number(), tracker.state(), &outcome)
                    .await;
                match outcome {
                    CycleOutcome::DiscoveryFailed => discovery_backoff,
                    CycleOutcome::Polled { .. } => poll_interval,
                }
            }
            Err(e) => {
                tracing::error!(cycle = tracker.cycle_number(), error = %e, "Cycle failed");
                poll_interval
            }
        };

        tokio::time::sleep(delay).await;
    }
}

async fn serve(config: AppConfig, store: Store) -> Result<()> {
    let state = DashboardState::new(store, HealthState::new());
    dashboard::serve_dashboard(state, &config.dashboard.bind, config.dashboard.port).await
}
