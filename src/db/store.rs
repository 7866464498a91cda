use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeagueRecord {
    pub id: i64,
    pub external_id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SeasonRecord {
    pub id: i64,
    pub season_id: String,
    pub base_season_id: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TeamRecord {
    pub id: i64,
    pub name: String,
    pub season_id: i64,
    pub league_id: Option<i64>,
    pub streak: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchRecord {
    pub id: i64,
    pub match_id: String,
    pub season_id: i64,
    pub round_number: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub league_id: Option<i64>,
    pub league_name: Option<String>,
    pub processed: bool,
    pub fetched_at: String,
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl Store {
    /// Create a Store from an existing pool (for sharing between tracker and dashboard).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        let in_memory = database_path == ":memory:";

        if !in_memory {
            if let Some(dir) = std::path::Path::new(database_path).parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir).with_context(|| {
                        format!("Failed to create database directory: {}", dir.display())
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every in-memory connection is its own database, so tests get exactly one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Season operations ---

    /// Fetch a season row, creating it (active, `started_at` stamped) on first observation.
    /// The flag is true when the row was created by this call.
    pub async fn get_or_create_season(
        &self,
        season_id: &str,
        base_season_id: &str,
    ) -> Result<(SeasonRecord, bool)> {
        let result = sqlx::query(
            "INSERT INTO seasons (season_id, base_season_id, started_at, active)
             VALUES (?, ?, ?, 1)
             ON CONFLICT (season_id) DO NOTHING",
        )
        .bind(season_id)
        .bind(base_season_id)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert season")?;

        let season = self
            .get_season(season_id)
            .await?
            .with_context(|| format!("Season {season_id} missing after insert"))?;

        Ok((season, result.rows_affected() == 1))
    }

    pub async fn get_season(&self, season_id: &str) -> Result<Option<SeasonRecord>> {
        let season =
            sqlx::query_as::<_, SeasonRecord>("SELECT * FROM seasons WHERE season_id = ?")
                .bind(season_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch season")?;
        Ok(season)
    }

    /// The season currently being tracked: the most recently started active base season.
    pub async fn current_season(&self) -> Result<Option<SeasonRecord>> {
        let season = sqlx::query_as::<_, SeasonRecord>(
            "SELECT * FROM seasons
             WHERE active = 1 AND base_season_id = season_id
             ORDER BY started_at DESC, id DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch current season")?;
        Ok(season)
    }

    /// Mark a base season and all its sibling league seasons inactive.
    /// Rows already inactive keep their original `ended_at`.
    pub async fn end_season_family(&self, base_season_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE seasons SET active = 0, ended_at = ?
             WHERE base_season_id = ? AND active = 1",
        )
        .bind(now_rfc3339())
        .bind(base_season_id)
        .execute(&self.pool)
        .await
        .context("Failed to end season")?;
        Ok(result.rows_affected())
    }

    // --- League operations ---

    /// Insert a league by external id, correcting its name if it changed.
    pub async fn upsert_league(&self, external_id: i64, name: &str) -> Result<LeagueRecord> {
        let league = sqlx::query_as::<_, LeagueRecord>(
            "INSERT INTO leagues (external_id, name) VALUES (?, ?)
             ON CONFLICT (external_id) DO UPDATE SET name = excluded.name
             RETURNING *",
        )
        .bind(external_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert league")?;
        Ok(league)
    }

    pub async fn get_league(&self, id: i64) -> Result<Option<LeagueRecord>> {
        let league = sqlx::query_as::<_, LeagueRecord>("SELECT * FROM leagues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch league")?;
        Ok(league)
    }

    /// Leagues with at least one team in an active season, ordered by external id.
    pub async fn list_active_leagues(&self) -> Result<Vec<LeagueRecord>> {
        let leagues = sqlx::query_as::<_, LeagueRecord>(
            "SELECT l.* FROM leagues l
             WHERE EXISTS (
                 SELECT 1 FROM teams t
                 JOIN seasons s ON s.id = t.season_id
                 WHERE t.league_id = l.id AND s.active = 1
             )
             ORDER BY l.external_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active leagues")?;
        Ok(leagues)
    }

    /// Delete leagues none of whose teams belong to an active season.
    pub async fn prune_inactive_leagues(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM leagues
             WHERE NOT EXISTS (
                 SELECT 1 FROM teams t
                 JOIN seasons s ON s.id = t.season_id
                 WHERE t.league_id = leagues.id AND s.active = 1
             )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to prune leagues")?;
        Ok(result.rows_affected())
    }

    // --- Team operations ---

    /// Standings for one league within one season.
    pub async fn teams_for_league(
        &self,
        league_id: i64,
        season_id: &str,
    ) -> Result<Vec<TeamRecord>> {
        let teams = sqlx::query_as::<_, TeamRecord>(
            "SELECT t.* FROM teams t
             JOIN seasons s ON s.id = t.season_id
             WHERE t.league_id = ? AND s.season_id = ?
             ORDER BY t.streak DESC, t.wins DESC, t.name ASC",
        )
        .bind(league_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch league standings")?;
        Ok(teams)
    }

    pub async fn get_team(&self, name: &str, season_id: &str) -> Result<Option<TeamRecord>> {
        let team = sqlx::query_as::<_, TeamRecord>(
            "SELECT t.* FROM teams t
             JOIN seasons s ON s.id = t.season_id
             WHERE t.name = ? AND s.season_id = ?",
        )
        .bind(name)
        .bind(season_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch team")?;
        Ok(team)
    }

    /// Fill missing team league references from a same-season match the team played in.
    pub async fn backfill_team_leagues(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE teams SET league_id = (
                 SELECT m.league_id FROM matches m
                 WHERE m.season_id = teams.season_id
                   AND (m.home_team = teams.name OR m.away_team = teams.name)
                   AND m.league_id IS NOT NULL
                 ORDER BY m.id
                 LIMIT 1
             )
             WHERE league_id IS NULL
               AND EXISTS (
                 SELECT 1 FROM matches m
                 WHERE m.season_id = teams.season_id
                   AND (m.home_team = teams.name OR m.away_team = teams.name)
                   AND m.league_id IS NOT NULL
             )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to backfill team leagues")?;
        Ok(result.rows_affected())
    }

    // --- Match operations ---

    /// Matches of a season in insertion order.
    pub async fn matches_for_season(&self, season_id: &str) -> Result<Vec<MatchRecord>> {
        let matches = sqlx::query_as::<_, MatchRecord>(
            "SELECT m.* FROM matches m
             JOIN seasons s ON s.id = m.season_id
             WHERE s.season_id = ?
             ORDER BY m.id",
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch season matches")?;
        Ok(matches)
    }

    pub async fn get_match_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM matches")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count matches")?;
        Ok(row.0)
    }
}
