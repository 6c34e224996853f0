use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Volatility-driven TTL: the first step whose threshold the volatility index exceeds wins,
/// otherwise `default_secs`. Steps are ordered from the highest threshold down.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TtlSchedule {
    /// `(volatility index above, ttl seconds)`
    pub steps: Vec<(f64, u64)>,
    pub default_secs: u64,
}

impl TtlSchedule {
    pub fn new(steps: impl IntoIterator<Item = (f64, u64)>, default_secs: u64) -> Self {
        let mut steps: Vec<_> = steps.into_iter().collect();
        steps.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self {
            steps,
            default_secs,
        }
    }

    /// Global cues: 8s above 20, 12s above 16, 20s above 13, else 30s.
    pub fn global_cues() -> Self {
        Self::new([(20.0, 8), (16.0, 12), (13.0, 20)], 30)
    }

    /// News: 20s above 20, 30s above 16, else 60s.
    pub fn news() -> Self {
        Self::new([(20.0, 20), (16.0, 30)], 60)
    }

    /// Institutional flows: 30s above 18, else 60s.
    pub fn flows() -> Self {
        Self::new([(18.0, 30)], 60)
    }

    pub fn ttl(&self, vix: Option<f64>) -> Duration {
        let secs = vix
            .and_then(|vix| {
                self.steps
                    .iter()
                    .find(|(threshold, _)| vix > *threshold)
                    .map(|(_, secs)| *secs)
            })
            .unwrap_or(self.default_secs);
        Duration::from_secs(secs)
    }
}
