//! Season end detection.

use anyhow::Result;
use tracing::info;

use crate::db::store::Store;
use crate::feed::RawMatch;

/// Round number from which a fully scored last round means the season is over.
pub const DEFAULT_SEASON_END_ROUND: u32 = 30;

/// A season has ended once its highest observed round is at least
/// `end_round` and every match in that round has a final score.
pub fn season_has_ended(matches: &[RawMatch], end_round: u32) -> bool {
    let Some(max_round) = matches.iter().map(|m| m.round).max() else {
        return false;
    };

    if max_round < end_round {
        return false;
    }

    matches
        .iter()
        .filter(|m| m.round == max_round)
        .all(RawMatch::is_final)
}

/// Evaluate the reference league's matches and, if the season is over, mark
/// the whole season family inactive. Returns true when the season ended.
pub async fn close_if_ended(
    store: &Store,
    base_season_id: &str,
    reference_matches: &[RawMatch],
    end_round: u32,
) -> Result<bool> {
    if !season_has_ended(reference_matches, end_round) {
        return Ok(false);
    }

    let closed = store.end_season_family(base_season_id).await?;
    info!(season_id = base_season_id, seasons_closed = closed, "Season ended");
    Ok(true)
}
