//! Wall-clock [`Clock`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::port::outbound::clock::Clock;

/// Real time, sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_monotonic_time() {
        let clock = SystemClock;
        let before = tokio::time::Instant::now();
        clock.sleep(Duration::from_secs(30)).await;
        assert!(tokio::time::Instant::now() - before >= Duration::from_secs(30));
    }
}
