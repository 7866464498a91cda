//! Process observability: structured logs, poll loop health, standings API.

pub mod dashboard;
pub mod health;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, MonitoringConfig};

/// `RUST_LOG` wins over the configured level when it parses.
fn log_filter(config: &MonitoringConfig, env: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.log_level))
}

/// Install the global subscriber. Unattended runs use JSON lines.
pub fn init_logging(config: &MonitoringConfig) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(config, env.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let installed = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))
}
