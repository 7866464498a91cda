//! Running standings deltas.
//!
//! Counters are only ever moved forward by one match outcome at a time;
//! nothing here recomputes a table from the match history.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    HomeWin,
    AwayWin,
    Draw,
}

impl MatchOutcome {
    pub fn from_score(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Self::HomeWin,
            std::cmp::Ordering::Less => Self::AwayWin,
            std::cmp::Ordering::Equal => Self::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standing {
    pub streak: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

impl Standing {
    /// Apply one final result to both participants.
    ///
    /// A draw resets both streaks and counts a draw for each side. A decisive
    /// result counts a win and a loss and extends both streaks.
    pub fn apply_result(home: &mut Standing, away: &mut Standing, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Draw => {
                home.draws += 1;
                away.draws += 1;
                home.streak = 0;
                away.streak = 0;
            }
            MatchOutcome::HomeWin | MatchOutcome::AwayWin => {
                let (winner, loser) = if outcome == MatchOutcome::HomeWin {
                    (&mut *home, &mut *away)
                } else {
                    (&mut *away, &mut *home)
                };
                winner.wins += 1;
                loser.losses += 1;
                home.streak += 1;
                away.streak += 1;
            }
        }
    }
}
