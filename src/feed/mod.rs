//! Virtual football season feed.
//!
//! The feed serves one JSON document per season id. Matches appear either
//! directly under `doc[0].data.matches` or grouped by round under
//! `doc[0].data[*].matches`; both shapes flatten into [`RawMatch`] records.

pub mod client;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::FeedClient;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected feed shape: {0}")]
    Shape(&'static str),
}

/// One match as reported by the feed. Scores stay `None` until the result is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub id: String,
    pub round: u32,
    pub home: String,
    pub away: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub league: Option<String>,
}

impl RawMatch {
    pub fn is_final(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    /// Processing order: round ascending, then numeric ids by value before
    /// non-numeric ids, ties broken on the raw id text.
    pub fn processing_order(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }

    fn order_key(&self) -> (u32, bool, Option<u64>, &str) {
        let numeric = self.id.parse::<u64>().ok();
        (self.round, numeric.is_none(), numeric, self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonMeta {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SeasonFeed {
    pub matches: Vec<RawMatch>,
    pub season: Option<SeasonMeta>,
}

/// Source of season match lists. `None` means "nothing to process this cycle".
#[async_trait]
pub trait MatchFeed: Send + Sync {
    async fn fetch_season(&self, season_id: &str) -> Option<SeasonFeed>;
}

/// Parse a feed document into matches and season metadata.
pub fn parse_feed(body: &Value) -> Result<SeasonFeed, FeedError> {
    let doc = body
        .get("doc")
        .and_then(Value::as_array)
        .and_then(|docs| docs.first())
        .ok_or(FeedError::Shape("missing doc[0]"))?;

    let data = doc.get("data").ok_or(FeedError::Shape("missing doc[0].data"))?;

    let mut records: Vec<&Value> = Vec::new();
    match data {
        Value::Object(obj) => {
            if let Some(matches) = obj.get("matches") {
                let list = matches
                    .as_array()
                    .ok_or(FeedError::Shape("data.matches is not an array"))?;
                records.extend(list);
            }
        }
        Value::Array(rounds) => {
            for round in rounds {
                if let Some(matches) = round.get("matches") {
                    let list = matches
                        .as_array()
                        .ok_or(FeedError::Shape("round matches is not an array"))?;
                    records.extend(list);
                }
            }
        }
        Value::Null => {}
        _ => return Err(FeedError::Shape("doc[0].data is neither object nor array")),
    }

    let total = records.len();
    let matches: Vec<RawMatch> = records.into_iter().filter_map(parse_match).collect();
    if matches.len() < total {
        tracing::debug!(
            skipped = total - matches.len(),
            total,
            "Skipped malformed match records"
        );
    }

    let season = data.get("season").filter(|s| s.is_object()).map(|s| SeasonMeta {
        id: s.get("_id").and_then(id_string),
        name: s.get("name").and_then(Value::as_str).map(str::to_string),
    });

    Ok(SeasonFeed { matches, season })
}

fn parse_match(value: &Value) -> Option<RawMatch> {
    let id = value.get("_id").and_then(id_string)?;
    let teams = value.get("teams")?;
    let home = team_name(teams.get("home")?)?;
    let away = team_name(teams.get("away")?)?;
    let round = value.get("round").and_then(as_u32).unwrap_or(0);

    let result = value.get("result");
    let home_score = result.and_then(|r| r.get("home")).and_then(as_u32);
    let away_score = result.and_then(|r| r.get("away")).and_then(as_u32);

    let league = value
        .get("competition")
        .and_then(|c| c.get("name"))
        .or_else(|| value.get("league"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    Some(RawMatch {
        id,
        round,
        home,
        away,
        home_score,
        away_score,
        league,
    })
}

fn team_name(team: &Value) -> Option<String> {
    team.get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
