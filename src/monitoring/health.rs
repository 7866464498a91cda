//! Poll loop health, shared with the dashboard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::tracker::{CycleOutcome, TrackerState};

/// Shared health state updated by the poll loop.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthData>>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthData {
    status: String,
    tracker_state: String,
    cycle_number: u64,
    started_at: DateTime<Utc>,
    last_cycle_at: Option<DateTime<Utc>>,
    last_new_matches: usize,
    total_new_matches: u64,
    consecutive_discovery_failures: u32,
    uptime_seconds: i64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HealthData {
                status: "ok".to_string(),
                tracker_state: "INITIALIZING".to_string(),
                cycle_number: 0,
                started_at: Utc::now(),
                last_cycle_at: None,
                last_new_matches: 0,
                total_new_matches: 0,
                consecutive_discovery_failures: 0,
                uptime_seconds: 0,
            })),
        }
    }

    pub async fn record_cycle(&self, cycle_number: u64, state: &TrackerState, outcome: &CycleOutcome) {
        let mut data = self.inner.write().await;
        data.cycle_number = cycle_number;
        data.tracker_state = state.to_string();
        data.last_cycle_at = Some(Utc::now());
        data.uptime_seconds = (Utc::now() - data.started_at).num_seconds();

        match outcome {
            CycleOutcome::DiscoveryFailed => {
                data.consecutive_discovery_failures += 1;
                data.last_new_matches = 0;
            }
            CycleOutcome::Polled { new_matches, .. } => {
                data.consecutive_discovery_failures = 0;
                data.last_new_matches = *new_matches;
                data.total_new_matches += *new_matches as u64;
            }
        }

        data.status = if data.consecutive_discovery_failures >= 3 {
            "degraded".to_string()
        } else {
            "ok".to_string()
        };
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let data = self.inner.read().await;
        serde_json::to_value(&*data).unwrap_or_default()
    }
}
