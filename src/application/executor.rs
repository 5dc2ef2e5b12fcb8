//! Parallel task executor.
//!
//! Fans one operation out across a host set, one task per host, and joins
//! them all before returning. A host's failure or panic is recorded against
//! that host and never touches its siblings.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::cancel::CancelSignal;
use crate::domain::host::Host;
use crate::domain::result::ResultAggregator;
use crate::error::{Error, Result};

/// Runs per-host operations concurrently, optionally bounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor {
    max_concurrency: Option<usize>,
}

impl ParallelExecutor {
    /// `None` runs every host at once; `Some(n)` keeps at most `n` in flight.
    #[must_use]
    pub const fn new(max_concurrency: Option<usize>) -> Self {
        Self { max_concurrency }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub const fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Run `op` once per distinct host and collect every outcome.
    ///
    /// The returned aggregator has exactly one entry per distinct host id.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`]: per-host failures are data, not errors.
    /// In-flight tasks are aborted on cancellation.
    pub async fn run<T, F, Fut>(
        &self,
        hosts: &[Host],
        op: F,
        cancel: &CancelSignal,
    ) -> Result<ResultAggregator<T>>
    where
        T: Send + 'static,
        F: Fn(Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        cancel.check()?;

        let results = Arc::new(ResultAggregator::new());
        let op = Arc::new(op);
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut seen = HashSet::with_capacity(hosts.len());
        let mut tasks = JoinSet::new();

        for host in hosts {
            if !seen.insert(host.id.clone()) {
                debug!(host = %host.id, "Duplicate host skipped");
                continue;
            }
            let host = host.clone();
            let results = Arc::clone(&results);
            let op = Arc::clone(&op);
            let limiter = limiter.clone();

            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let id = host.id.clone();
                let outcome = AssertUnwindSafe(async move { op(host).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(Error::TaskPanicked(panic_message(&panic))));
                results.add_result(id, outcome);
            });
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(Error::Cancelled);
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!(error = %e, "Executor task ended abnormally"),
                },
            }
        }

        Arc::try_unwrap(results)
            .map_err(|_| Error::State("executor results still shared after join".to_string()))
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
