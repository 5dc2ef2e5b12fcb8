//! Virtual time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::port::outbound::clock::Clock;

/// A [`Clock`] whose `sleep` advances virtual time instantly.
///
/// Multi-minute gate timeouts run in microseconds, and tests can assert on
/// exactly how much virtual time passed and how often the code slept.
pub struct ManualClock {
    base: Instant,
    utc_base: DateTime<Utc>,
    offset: Mutex<Duration>,
    sleeps: AtomicU32,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            utc_base: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now),
            offset: Mutex::new(Duration::ZERO),
            sleeps: AtomicU32::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Virtual time passed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    pub fn sleep_count(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.utc_base + chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
