//! End-to-end poll loop behaviour against an in-memory store and scripted feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use vfl_tracker::config::{LeagueSlot, TrackerConfig};
use vfl_tracker::db::store::Store;
use vfl_tracker::discovery::{CaptureTarget, RequestObserver, SeasonDiscovery};
use vfl_tracker::feed::{MatchFeed, RawMatch, SeasonFeed};
use vfl_tracker::ingest::ingest_batch;
use vfl_tracker::tracker::{CycleOutcome, Tracker, TrackerState};

// ──────────────────────────────────────────
// Test doubles
// ──────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeFeed {
    seasons: Arc<Mutex<HashMap<String, Vec<RawMatch>>>>,
}

impl FakeFeed {
    fn set(&self, season_id: &str, matches: Vec<RawMatch>) {
        self.seasons
            .lock()
            .unwrap()
            .insert(season_id.to_string(), matches);
    }
}

#[async_trait]
impl MatchFeed for FakeFeed {
    async fn fetch_season(&self, season_id: &str) -> Option<SeasonFeed> {
        let seasons = self.seasons.lock().unwrap();
        seasons.get(season_id).map(|matches| SeasonFeed {
            matches: matches.clone(),
            season: None,
        })
    }
}

#[derive(Clone, Default)]
struct FakeObserver {
    urls: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicU32>,
}

impl FakeObserver {
    fn serve_season(&self, season_id: &str) {
        *self.urls.lock().unwrap() = vec![format!(
            "https://cdn.local/gismo/stats_season_lastx/{season_id}/13"
        )];
    }
}

#[async_trait]
impl RequestObserver for FakeObserver {
    async fn capture(&self, _target: &CaptureTarget) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.urls.lock().unwrap().clone())
    }
}

fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval_seconds: 10,
        discovery_backoff_seconds: 30,
        season_end_round: 30,
        leagues: vec![
            LeagueSlot {
                offset: 0,
                name: Some("English League".into()),
            },
            LeagueSlot {
                offset: 2,
                name: Some("German League".into()),
            },
        ],
    }
}

fn discovery(observer: &FakeObserver) -> SeasonDiscovery {
    let target = CaptureTarget {
        landing_url: "http://landing.local".into(),
        league_link_text: "Virtual Football English League".into(),
        listen: Duration::ZERO,
        navigation_timeout: Duration::ZERO,
        selector_timeout: Duration::ZERO,
    };
    SeasonDiscovery::new(Box::new(observer.clone()), target, 3, Duration::ZERO)
}

fn m(id: u32, round: u32, home: &str, away: &str, score: Option<(u32, u32)>) -> RawMatch {
    RawMatch {
        id: id.to_string(),
        round,
        home: home.to_string(),
        away: away.to_string(),
        home_score: score.map(|s| s.0),
        away_score: score.map(|s| s.1),
        league: None,
    }
}

async fn tracker_with(feed: &FakeFeed, observer: &FakeObserver, store: Store) -> Tracker {
    Tracker::new(
        tracker_config(),
        store,
        Box::new(feed.clone()),
        discovery(observer),
    )
    .await
    .unwrap()
}

// ──────────────────────────────────────────
// Poll loop state machine
// ──────────────────────────────────────────

#[tokio::test]
async fn discovery_failure_backs_off_after_retry_bound() {
    let feed = FakeFeed::default();
    let observer = FakeObserver::default();
    let store = Store::new(":memory:").await.unwrap();
    let mut tracker = tracker_with(&feed, &observer, store).await;

    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::DiscoveryFailed);
    assert_eq!(observer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.state(), &TrackerState::Discovering);
}

#[tokio::test]
async fn discovered_season_is_tracked_across_offsets() {
    let feed = FakeFeed::default();
    let observer = FakeObserver::default();
    observer.serve_season("700");
    feed.set("700", vec![m(1, 1, "ARS", "CHE", Some((2, 0)))]);
    feed.set("702", vec![m(2, 1, "BAY", "BVB", Some((1, 1)))]);

    let store = Store::new(":memory:").await.unwrap();
    let mut tracker = tracker_with(&feed, &observer, store).await;

    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Polled {
            new_matches: 2,
            season_ended: false
        }
    );
    assert_eq!(
        tracker.state(),
        &TrackerState::Tracking {
            base_season_id: "700".into()
        }
    );

    let store = tracker.store();
    let leagues = store.list_active_leagues().await.unwrap();
    let names: Vec<&str> = leagues.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["English League", "German League"]);

    let sibling = store.get_season("702").await.unwrap().unwrap();
    assert_eq!(sibling.base_season_id, "700");

    let bay = store.get_team("BAY", "702").await.unwrap().unwrap();
    assert_eq!((bay.draws, bay.streak), (1, 0));
    assert_eq!(bay.league_id, Some(leagues[1].id));

    // Second cycle reuses the tracked id without another browser session.
    tracker.run_cycle().await.unwrap();
    assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn restart_resumes_active_season_from_store() {
    let store = Store::new(":memory:").await.unwrap();
    store.get_or_create_season("700", "700").await.unwrap();
    store.get_or_create_season("702", "700").await.unwrap();

    let feed = FakeFeed::default();
    let observer = FakeObserver::default();
    let tracker = tracker_with(&feed, &observer, store).await;

    assert_eq!(
        tracker.state(),
        &TrackerState::Tracking {
            base_season_id: "700".into()
        }
    );
}

#[tokio::test]
async fn season_end_returns_to_discovery_and_rejects_stale_id() {
    let feed = FakeFeed::default();
    let observer = FakeObserver::default();
    observer.serve_season("700");

    let mut last_round: Vec<RawMatch> = (0..5)
        .map(|i| m(100 + i, 30, &format!("H{i}"), &format!("A{i}"), Some((1, 0))))
        .collect();
    last_round.push(m(200, 30, "LAST", "ONE", None));
    feed.set("700", last_round.clone());

    let store = Store::new(":memory:").await.unwrap();
    let mut tracker = tracker_with(&feed, &observer, store).await;

    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Polled {
            new_matches: 5,
            season_ended: false
        }
    );

    last_round.last_mut().unwrap().home_score = Some(2);
    last_round.last_mut().unwrap().away_score = Some(2);
    feed.set("700", last_round);

    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Polled {
            new_matches: 1,
            season_ended: true
        }
    );
    assert_eq!(tracker.state(), &TrackerState::Discovering);

    let season = tracker.store().get_season("700").await.unwrap().unwrap();
    assert!(!season.active);
    assert!(season.ended_at.is_some());
    assert!(tracker.store().current_season().await.unwrap().is_none());

    // Landing page still advertises the finished season.
    assert_eq!(
        tracker.run_cycle().await.unwrap(),
        CycleOutcome::DiscoveryFailed
    );

    observer.serve_season("707");
    feed.set("707", vec![m(300, 1, "ARS", "CHE", Some((0, 1)))]);
    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Polled {
            new_matches: 1,
            season_ended: false
        }
    );

    // Same team name in a new season is a fresh record.
    let ars = tracker.store().get_team("ARS", "707").await.unwrap().unwrap();
    assert_eq!((ars.wins, ars.losses), (0, 1));
}

#[tokio::test]
async fn missing_feed_is_an_empty_cycle() {
    let feed = FakeFeed::default();
    let observer = FakeObserver::default();
    observer.serve_season("700");
    let store = Store::new(":memory:").await.unwrap();
    let mut tracker = tracker_with(&feed, &observer, store).await;

    let outcome = tracker.run_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Polled {
            new_matches: 0,
            season_ended: false
        }
    );
    assert_eq!(tracker.store().get_match_count().await.unwrap(), 0);
}

// ──────────────────────────────────────────
// Ingestion invariants
// ──────────────────────────────────────────

fn season_batch() -> Vec<RawMatch> {
    vec![
        m(1, 1, "A", "B", Some((1, 0))),
        m(2, 1, "C", "D", Some((2, 2))),
        m(3, 2, "A", "C", Some((0, 3))),
        m(4, 2, "B", "D", Some((1, 1))),
        m(5, 3, "A", "D", Some((2, 1))),
        m(6, 3, "B", "C", None),
    ]
}

async fn standings(store: &Store, season_id: &str) -> Vec<(String, i64, i64, i64, i64)> {
    let mut rows = Vec::new();
    for name in ["A", "B", "C", "D"] {
        if let Some(t) = store.get_team(name, season_id).await.unwrap() {
            rows.push((t.name, t.streak, t.wins, t.losses, t.draws));
        }
    }
    rows
}

#[tokio::test]
async fn ingesting_twice_changes_nothing() {
    let store = Store::new(":memory:").await.unwrap();
    let (season, _) = store.get_or_create_season("700", "700").await.unwrap();
    let league = store.upsert_league(700, "English League").await.unwrap();

    let first = ingest_batch(&store, &season, &league, &season_batch()).await.unwrap();
    let after_first = standings(&store, "700").await;
    let second = ingest_batch(&store, &season, &league, &season_batch()).await.unwrap();

    assert_eq!(first, 5);
    assert_eq!(second, 0);
    assert_eq!(store.get_match_count().await.unwrap(), 5);
    assert_eq!(standings(&store, "700").await, after_first);
}

#[tokio::test]
async fn permuted_input_gives_identical_state() {
    let ordered = Store::new(":memory:").await.unwrap();
    let shuffled = Store::new(":memory:").await.unwrap();

    let mut permuted = season_batch();
    permuted.reverse();
    permuted.swap(0, 3);

    for (store, batch) in [(&ordered, season_batch()), (&shuffled, permuted)] {
        let (season, _) = store.get_or_create_season("700", "700").await.unwrap();
        let league = store.upsert_league(700, "English League").await.unwrap();
        ingest_batch(store, &season, &league, &batch).await.unwrap();
    }

    let ids = |rows: Vec<vfl_tracker::db::store::MatchRecord>| -> Vec<String> {
        rows.into_iter().map(|r| r.match_id).collect()
    };
    let ordered_ids = ids(ordered.matches_for_season("700").await.unwrap());
    assert_eq!(ordered_ids, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(ordered_ids, ids(shuffled.matches_for_season("700").await.unwrap()));
    assert_eq!(standings(&ordered, "700").await, standings(&shuffled, "700").await);

    // A: W, L, W  -> streak 3, D: D, D, L -> streak 1 after the loss
    let rows = standings(&ordered, "700").await;
    assert_eq!(rows[0], ("A".to_string(), 3, 2, 1, 0));
    assert_eq!(rows[3], ("D".to_string(), 1, 0, 1, 2));
}

#[tokio::test]
async fn stale_team_league_is_corrected() {
    let store = Store::new(":memory:").await.unwrap();
    let (season, _) = store.get_or_create_season("700", "700").await.unwrap();
    let wrong = store.upsert_league(702, "German League").await.unwrap();
    let right = store.upsert_league(700, "English League").await.unwrap();

    sqlx::query("INSERT INTO teams (name, season_id, league_id, wins) VALUES ('A', ?, ?, 4)")
        .bind(season.id)
        .bind(wrong.id)
        .execute(store.pool())
        .await
        .unwrap();

    ingest_batch(&store, &season, &right, &[m(1, 1, "A", "B", Some((0, 0)))])
        .await
        .unwrap();

    let a = store.get_team("A", "700").await.unwrap().unwrap();
    assert_eq!(a.league_id, Some(right.id));
    assert_eq!((a.wins, a.draws), (4, 1));
}

// ──────────────────────────────────────────
// Maintenance paths
// ──────────────────────────────────────────

#[tokio::test]
async fn backfill_fills_missing_team_leagues() {
    let store = Store::new(":memory:").await.unwrap();
    let (season, _) = store.get_or_create_season("700", "700").await.unwrap();
    let league = store.upsert_league(700, "English League").await.unwrap();
    ingest_batch(&store, &season, &league, &[m(1, 1, "A", "B", Some((1, 0)))])
        .await
        .unwrap();

    sqlx::query("UPDATE teams SET league_id = NULL")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO teams (name, season_id) VALUES ('ORPHAN', ?)")
        .bind(season.id)
        .execute(store.pool())
        .await
        .unwrap();

    assert_eq!(store.backfill_team_leagues().await.unwrap(), 2);
    let a = store.get_team("A", "700").await.unwrap().unwrap();
    assert_eq!(a.league_id, Some(league.id));
    let orphan = store.get_team("ORPHAN", "700").await.unwrap().unwrap();
    assert_eq!(orphan.league_id, None);
}

#[tokio::test]
async fn prune_removes_only_leagues_without_active_teams() {
    let store = Store::new(":memory:").await.unwrap();
    let (old, _) = store.get_or_create_season("700", "700").await.unwrap();
    let (new, _) = store.get_or_create_season("707", "707").await.unwrap();
    let old_league = store.upsert_league(700, "English League").await.unwrap();
    let new_league = store.upsert_league(707, "English League").await.unwrap();

    ingest_batch(&store, &old, &old_league, &[m(1, 1, "A", "B", Some((1, 0)))])
        .await
        .unwrap();
    ingest_batch(&store, &new, &new_league, &[m(2, 1, "A", "B", Some((1, 0)))])
        .await
        .unwrap();
    store.end_season_family("700").await.unwrap();

    let active: Vec<i64> = store
        .list_active_leagues()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.external_id)
        .collect();
    assert_eq!(active, vec![707]);

    assert_eq!(store.prune_inactive_leagues().await.unwrap(), 1);
    assert!(store.get_league(old_league.id).await.unwrap().is_none());
    assert!(store.get_league(new_league.id).await.unwrap().is_some());

    // History survives with the league reference cleared.
    let a = store.get_team("A", "700").await.unwrap().unwrap();
    assert_eq!((a.wins, a.league_id), (1, None));
}
