pub mod poll;

pub use poll::{CycleOutcome, Tracker, TrackerState};
