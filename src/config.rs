use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub feed: FeedConfig,
    pub discovery: DiscoveryConfig,
    pub monitoring: MonitoringConfig,
    pub dashboard: DashboardConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_seconds: u64,
    pub discovery_backoff_seconds: u64,
    /// Lowest round number at which a fully scored final round ends the season.
    pub season_end_round: u32,
    pub leagues: Vec<LeagueSlot>,
}

/// A sibling league addressed by adding `offset` to the base season id.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSlot {
    pub offset: i64,
    pub name: Option<String>,
}

impl TrackerConfig {
    pub fn offsets(&self) -> Vec<i64> {
        self.leagues.iter().map(|l| l.offset).collect()
    }

    /// Configured display name for an offset, or `League <offset>`.
    pub fn league_name(&self, offset: i64) -> String {
        self.leagues
            .iter()
            .find(|l| l.offset == offset)
            .and_then(|l| l.name.clone())
            .unwrap_or_else(|| format!("League {offset}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl FeedConfig {
    pub fn season_url(&self, season_id: &str) -> String {
        format!(
            "{}/stats_season_lastx/{season_id}/13",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub landing_url: String,
    pub league_link_text: String,
    pub headless: bool,
    pub listen_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_seconds: u64,
    pub navigation_timeout_seconds: u64,
    pub selector_timeout_seconds: u64,
}

impl DiscoveryConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl AppConfig {
    /// Load configuration from a TOML file, after loading `.env` into the environment.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Ok(db_path) = std::env::var("VFL_DATABASE_PATH") {
            config.database.path = db_path;
        }

        Ok(config)
    }
}
