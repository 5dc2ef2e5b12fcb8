//! Validator enrollment terms.
//!
//! Terms are deterministic: the same policy, host index and clock reading
//! always give the same weight and validity window. Each further host's
//! window ends one stagger step later than the previous one so a cluster's
//! validators never all expire together.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Weight and validity window of one enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorTerms {
    pub weight: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ValidatorTerms {
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// How enrollment terms are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingPolicy {
    pub weight: u64,
    pub duration: Duration,
    /// Added per host index to the duration.
    pub stagger: Duration,
    /// Delay between now and the start of validation.
    pub lead_time: Duration,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(d.as_secs()).unwrap_or(i64::MAX / 1000))
}

impl StakingPolicy {
    /// Terms for the host at `index` in enrollment order.
    #[must_use]
    pub fn terms(&self, index: usize, now: DateTime<Utc>) -> ValidatorTerms {
        let start = now + to_chrono(self.lead_time);
        let steps = u32::try_from(index).unwrap_or(u32::MAX);
        let stagger = self.stagger.saturating_mul(steps);
        let end = start + to_chrono(self.duration.saturating_add(stagger));
        ValidatorTerms {
            weight: self.weight,
            start,
            end,
        }
    }
}
