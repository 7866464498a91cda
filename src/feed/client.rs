//! HTTP client for the season feed.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::config::FeedConfig;
use crate::feed::{parse_feed, FeedError, MatchFeed, SeasonFeed};

pub struct FeedClient {
    http: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Single GET of the season document. Any failure is returned as a [`FeedError`].
    pub async fn try_fetch_season(&self, season_id: &str) -> Result<SeasonFeed, FeedError> {
        let url = self.config.season_url(season_id);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(FeedError::Status(resp.status()));
        }

        let bytes = resp.bytes().await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        parse_feed(&body)
    }
}

#[async_trait]
impl MatchFeed for FeedClient {
    #[instrument(skip(self))]
    async fn fetch_season(&self, season_id: &str) -> Option<SeasonFeed> {
        match self.try_fetch_season(season_id).await {
            Ok(feed) => {
                debug!(season_id, matches = feed.matches.len(), "Feed fetched");
                Some(feed)
            }
            Err(e) => {
                warn!(season_id, error = %e, "Feed unavailable, skipping this cycle");
                None
            }
        }
    }
}
