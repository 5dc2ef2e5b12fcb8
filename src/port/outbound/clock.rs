//! Time source port.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Monotonic and wall-clock time plus sleeping.
///
/// Polling loops read time and sleep only through this trait, so tests can
/// run multi-minute timeouts instantly.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn utc_now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}
