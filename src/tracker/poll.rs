//! The long-running poll loop.
//!
//! Two states: `Discovering` when no season is tracked, `Tracking` once a
//! base season id is known. The tracked id is never kept only in memory: on
//! startup it is recovered from the most recently started active season.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::TrackerConfig;
use crate::db::store::Store;
use crate::discovery::SeasonDiscovery;
use crate::feed::MatchFeed;
use crate::ingest::{self, lifecycle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    Discovering,
    Tracking { base_season_id: String },
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovering => write!(f, "DISCOVERING"),
            Self::Tracking { base_season_id } => write!(f, "TRACKING({base_season_id})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No season id could be obtained; retry discovery after the longer back-off.
    DiscoveryFailed,
    Polled { new_matches: usize, season_ended: bool },
}

pub struct Tracker {
    config: TrackerConfig,
    store: Store,
    feed: Box<dyn MatchFeed>,
    discovery: SeasonDiscovery,
    state: TrackerState,
    cycle_number: u64,
}

impl Tracker {
    pub async fn new(
        config: TrackerConfig,
        store: Store,
        feed: Box<dyn MatchFeed>,
        discovery: SeasonDiscovery,
    ) -> Result<Self> {
        let state = match store.current_season().await? {
            Some(season) => {
                info!(season_id = %season.season_id, "Resuming active season");
                TrackerState::Tracking {
                    base_season_id: season.season_id,
                }
            }
            None => TrackerState::Discovering,
        };

        Ok(Self {
            config,
            store,
            feed,
            discovery,
            state,
            cycle_number: 0,
        })
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn cycle_number(&self) -> u64 {
        self.cycle_number
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.cycle_number += 1;

        let base_season_id = match &self.state {
            TrackerState::Tracking { base_season_id } => base_season_id.clone(),
            TrackerState::Discovering => match self.start_season().await? {
                Some(id) => id,
                None => return Ok(CycleOutcome::DiscoveryFailed),
            },
        };

        info!(cycle = self.cycle_number, season_id = %base_season_id, "Polling leagues");

        let base: i64 = base_season_id
            .parse()
            .with_context(|| format!("Tracked season id is not numeric: {base_season_id}"))?;

        let mut new_matches = 0;
        for offset in self.config.offsets() {
            let season_id = (base + offset).to_string();
            match self.poll_league(&base_season_id, &season_id, offset).await {
                Ok(created) => new_matches += created,
                Err(e) => {
                    error!(season_id = %season_id, offset, error = %e, "League batch failed");
                }
            }
        }

        let season_ended = match self.feed.fetch_season(&base_season_id).await {
            Some(reference) => {
                lifecycle::close_if_ended(
                    &self.store,
                    &base_season_id,
                    &reference.matches,
                    self.config.season_end_round,
                )
                .await?
            }
            None => false,
        };

        if season_ended {
            self.state = TrackerState::Discovering;
        }

        Ok(CycleOutcome::Polled {
            new_matches,
            season_ended,
        })
    }

    /// Discover a season id and start tracking it.
    async fn start_season(&mut self) -> Result<Option<String>> {
        let Some(season_id) = self.discovery.discover().await else {
            warn!("Could not capture season id");
            return Ok(None);
        };

        // Right after a season ends the landing page may still point at it.
        if let Some(existing) = self.store.get_season(&season_id).await? {
            if !existing.active {
                warn!(season_id = %season_id, "Discovered season has already ended");
                return Ok(None);
            }
        }

        let (season, created) = self
            .store
            .get_or_create_season(&season_id, &season_id)
            .await?;
        if created {
            info!(season_id = %season.season_id, "New season created");
        }

        self.state = TrackerState::Tracking {
            base_season_id: season_id.clone(),
        };
        Ok(Some(season_id))
    }

    async fn poll_league(&self, base_season_id: &str, season_id: &str, offset: i64) -> Result<usize> {
        let Some(feed) = self.feed.fetch_season(season_id).await else {
            return Ok(0);
        };
        if feed.matches.is_empty() {
            return Ok(0);
        }

        let (season, _) = self
            .store
            .get_or_create_season(season_id, base_season_id)
            .await?;
        let league = ingest::resolve_league(
            &self.store,
            season_id,
            &feed,
            &self.config.league_name(offset),
        )
        .await?;

        ingest::ingest_batch(&self.store, &season, &league, &feed.matches).await
    }
}
