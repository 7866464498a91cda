pub mod engine;
pub mod lifecycle;
pub mod standings;

pub use engine::{ingest_batch, resolve_league};
pub use lifecycle::season_has_ended;
pub use standings::{MatchOutcome, Standing};
