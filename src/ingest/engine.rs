//! Transactional match ingestion.
//!
//! A batch is one feed fetch for one league season. Every new final match in
//! the batch is inserted and applied to both teams' standings inside a single
//! transaction. The UNIQUE `match_id` column is what keeps a match from ever
//! being counted twice.

use anyhow::{Context, Result};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::db::store::{now_rfc3339, LeagueRecord, SeasonRecord, Store, TeamRecord};
use crate::feed::{RawMatch, SeasonFeed};
use crate::ingest::standings::{MatchOutcome, Standing};

/// Upsert the league a season feed belongs to.
///
/// The league is keyed by the season id it was fetched under. Its name comes
/// from the feed's season metadata, then the first labelled match, then
/// `fallback_name`.
pub async fn resolve_league(
    store: &Store,
    season_id: &str,
    feed: &SeasonFeed,
    fallback_name: &str,
) -> Result<LeagueRecord> {
    let external_id: i64 = season_id
        .parse()
        .with_context(|| format!("Season id is not numeric: {season_id}"))?;

    let name = feed
        .season
        .as_ref()
        .and_then(|s| s.name.clone())
        .or_else(|| feed.matches.iter().find_map(|m| m.league.clone()))
        .unwrap_or_else(|| fallback_name.to_string());

    store.upsert_league(external_id, &name).await
}

/// Persist the new final matches of one batch and update team standings.
/// Returns how many matches were inserted.
pub async fn ingest_batch(
    store: &Store,
    season: &SeasonRecord,
    league: &LeagueRecord,
    matches: &[RawMatch],
) -> Result<usize> {
    let mut ordered: Vec<&RawMatch> = matches.iter().collect();
    ordered.sort_by(|a, b| a.processing_order(b));

    let mut tx = store
        .pool()
        .begin()
        .await
        .context("Failed to begin ingest transaction")?;

    let fetched_at = now_rfc3339();
    let mut created = 0usize;

    for m in ordered {
        if match_exists(&mut tx, &m.id).await? {
            continue;
        }

        let (Some(home_score), Some(away_score)) = (m.home_score, m.away_score) else {
            continue;
        };

        if m.home == m.away {
            warn!(match_id = %m.id, team = %m.home, "Match lists the same team twice, skipping");
            continue;
        }

        sqlx::query(
            "INSERT INTO matches (match_id, season_id, round_number, home_team, away_team, home_score, away_score, league_id, league_name, processed, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&m.id)
        .bind(season.id)
        .bind(i64::from(m.round))
        .bind(&m.home)
        .bind(&m.away)
        .bind(i64::from(home_score))
        .bind(i64::from(away_score))
        .bind(league.id)
        .bind(m.league.as_deref().unwrap_or(&league.name))
        .bind(&fetched_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert match {}", m.id))?;

        let mut home = get_or_create_team(&mut tx, &m.home, season.id, league.id).await?;
        let mut away = get_or_create_team(&mut tx, &m.away, season.id, league.id).await?;

        let mut home_standing = standing_of(&home);
        let mut away_standing = standing_of(&away);
        Standing::apply_result(
            &mut home_standing,
            &mut away_standing,
            MatchOutcome::from_score(home_score, away_score),
        );

        save_team(&mut tx, &mut home, home_standing, league.id).await?;
        save_team(&mut tx, &mut away, away_standing, league.id).await?;

        created += 1;
    }

    tx.commit().await.context("Failed to commit ingest transaction")?;

    if created > 0 {
        info!(
            season_id = %season.season_id,
            league = %league.name,
            created,
            "Ingested new matches"
        );
    }

    Ok(created)
}

async fn match_exists(conn: &mut SqliteConnection, match_id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM matches WHERE match_id = ?")
        .bind(match_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to check for existing match")?;
    Ok(found.is_some())
}

async fn get_or_create_team(
    conn: &mut SqliteConnection,
    name: &str,
    season_pk: i64,
    league_id: i64,
) -> Result<TeamRecord> {
    sqlx::query(
        "INSERT INTO teams (name, season_id, league_id) VALUES (?, ?, ?)
         ON CONFLICT (name, season_id) DO NOTHING",
    )
    .bind(name)
    .bind(season_pk)
    .bind(league_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to create team {name}"))?;

    let team = sqlx::query_as::<_, TeamRecord>(
        "SELECT * FROM teams WHERE name = ? AND season_id = ?",
    )
    .bind(name)
    .bind(season_pk)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("Failed to load team {name}"))?;

    Ok(team)
}

fn standing_of(team: &TeamRecord) -> Standing {
    Standing {
        streak: team.streak,
        wins: team.wins,
        losses: team.losses,
        draws: team.draws,
    }
}

/// Write back standings and force the team into the batch's league.
async fn save_team(
    conn: &mut SqliteConnection,
    team: &mut TeamRecord,
    standing: Standing,
    league_id: i64,
) -> Result<()> {
    if team.league_id != Some(league_id) {
        debug!(
            team = %team.name,
            from = ?team.league_id,
            to = league_id,
            "Correcting team league"
        );
    }

    team.league_id = Some(league_id);
    team.streak = standing.streak;
    team.wins = standing.wins;
    team.losses = standing.losses;
    team.draws = standing.draws;

    sqlx::query(
        "UPDATE teams SET league_id = ?, streak = ?, wins = ?, losses = ?, draws = ? WHERE id = ?",
    )
    .bind(team.league_id)
    .bind(team.streak)
    .bind(team.wins)
    .bind(team.losses)
    .bind(team.draws)
    .bind(team.id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to update team {}", team.name))?;

    Ok(())
}
