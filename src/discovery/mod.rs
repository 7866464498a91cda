//! Season id discovery.
//!
//! The landing page loads the season feed lazily, so the current season id
//! is only visible in the browser's outgoing requests. A [`RequestObserver`]
//! records those request URLs; [`SeasonDiscovery`] retries until one of them
//! carries a season id.

pub mod browser;

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use crate::config::DiscoveryConfig;

pub use browser::ChromiumObserver;

/// Substrings that mark a request URL as a season feed request.
pub const SEASON_URL_MARKERS: &[&str] = &["stats_season_lastx", "stats_season"];

/// What to open and how long to listen.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub landing_url: String,
    pub league_link_text: String,
    pub listen: Duration,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
}

impl CaptureTarget {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            landing_url: config.landing_url.clone(),
            league_link_text: config.league_link_text.clone(),
            listen: Duration::from_secs(config.listen_seconds),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_seconds),
            selector_timeout: Duration::from_secs(config.selector_timeout_seconds),
        }
    }
}

/// Runs one browsing session and returns every season feed request URL it saw.
#[async_trait]
pub trait RequestObserver: Send + Sync {
    async fn capture(&self, target: &CaptureTarget) -> Result<Vec<String>>;
}

pub fn is_season_request(url: &str) -> bool {
    SEASON_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

fn season_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"stats_season_lastx/(\d+)/").expect("valid regex"),
            Regex::new(r"stats_season/(\d+)").expect("valid regex"),
        ]
    })
}

/// Season id from the first captured URL that carries one.
pub fn extract_season_id<S: AsRef<str>>(urls: &[S]) -> Option<String> {
    let [primary, secondary] = season_patterns();
    urls.iter().find_map(|url| {
        let url = url.as_ref();
        primary
            .captures(url)
            .or_else(|| secondary.captures(url))
            .map(|caps| caps[1].to_string())
    })
}

pub struct SeasonDiscovery {
    observer: Box<dyn RequestObserver>,
    target: CaptureTarget,
    max_retries: u32,
    retry_backoff: Duration,
}

impl SeasonDiscovery {
    pub fn new(
        observer: Box<dyn RequestObserver>,
        target: CaptureTarget,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            observer,
            target,
            max_retries,
            retry_backoff,
        }
    }

    pub fn from_config(observer: Box<dyn RequestObserver>, config: &DiscoveryConfig) -> Self {
        Self::new(
            observer,
            CaptureTarget::from_config(config),
            config.max_retries,
            config.retry_backoff(),
        )
    }

    /// Try up to `max_retries` browsing sessions. `None` means no id was seen;
    /// the caller backs off and tries again later.
    pub async fn discover(&self) -> Option<String> {
        for attempt in 1..=self.max_retries {
            info!(attempt, max_retries = self.max_retries, "Discovering season id");

            match self.observer.capture(&self.target).await {
                Ok(urls) => {
                    if let Some(season_id) = extract_season_id(&urls) {
                        info!(attempt, season_id = %season_id, "Season id captured");
                        return Some(season_id);
                    }
                    warn!(attempt, captured = urls.len(), "No season id in captured requests");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Browser capture failed");
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        warn!(max_retries = self.max_retries, "Season id discovery exhausted retries");
        None
    }
}
