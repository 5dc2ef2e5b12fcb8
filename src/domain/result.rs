//! Per-host result collection for fan-out stages.
//!
//! Writers call [`ResultAggregator::add_result`] concurrently while a stage
//! runs. Readers only look at the aggregator after every writer has joined,
//! at which point each host appears exactly once.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::warn;

use super::id::HostId;
use crate::error::Error;

/// Outcome of one host's task.
#[derive(Debug)]
pub enum TaskResult<T> {
    Success(T),
    Failure(Error),
}

impl<T> TaskResult<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failure(e) => Some(e),
            Self::Success(_) => None,
        }
    }
}

impl<T> From<crate::error::Result<T>> for TaskResult<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Failure(e),
        }
    }
}

/// Thread-safe map of host to task outcome.
#[derive(Debug)]
pub struct ResultAggregator<T> {
    results: Mutex<BTreeMap<HostId, TaskResult<T>>>,
}

impl<T> Default for ResultAggregator<T> {
    fn default() -> Self {
        Self {
            results: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T> ResultAggregator<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `host`.
    ///
    /// Returns `false` and keeps the first outcome if `host` already has one.
    pub fn add_result(&self, host: HostId, result: crate::error::Result<T>) -> bool {
        let mut results = self.results.lock();
        if results.contains_key(&host) {
            warn!(host = %host, "Duplicate result ignored");
            return false;
        }
        results.insert(host, result.into());
        true
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.results.lock().values().any(|r| !r.is_success())
    }

    /// Rendered error per failed host.
    #[must_use]
    pub fn errors_by_host(&self) -> BTreeMap<HostId, String> {
        self.results
            .lock()
            .iter()
            .filter_map(|(id, r)| r.error().map(|e| (id.clone(), e.to_string())))
            .collect()
    }

    /// Every host with a recorded outcome.
    #[must_use]
    pub fn host_list(&self) -> Vec<HostId> {
        self.results.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn failed_hosts(&self) -> Vec<HostId> {
        self.results
            .lock()
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(id, _)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, host: &HostId) -> bool {
        self.results.lock().contains_key(host)
    }

    /// Whether any failure matches `predicate`.
    pub fn any_error(&self, predicate: impl Fn(&Error) -> bool) -> bool {
        self.results
            .lock()
            .values()
            .filter_map(TaskResult::error)
            .any(predicate)
    }

    /// Consume the aggregator into its outcomes.
    #[must_use]
    pub fn into_results(self) -> BTreeMap<HostId, TaskResult<T>> {
        self.results.into_inner()
    }

    /// Split into successes and rendered failures.
    #[must_use]
    pub fn partition(self) -> (BTreeMap<HostId, T>, BTreeMap<HostId, Error>) {
        let mut ok = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (id, result) in self.into_results() {
            match result {
                TaskResult::Success(v) => {
                    ok.insert(id, v);
                }
                TaskResult::Failure(e) => {
                    failed.insert(id, e);
                }
            }
        }
        (ok, failed)
    }
}

impl<T: Clone> ResultAggregator<T> {
    /// Successful values per host.
    #[must_use]
    pub fn successes(&self) -> BTreeMap<HostId, T> {
        self.results
            .lock()
            .iter()
            .filter_map(|(id, r)| match r {
                TaskResult::Success(v) => Some((id.clone(), v.clone())),
                TaskResult::Failure(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn first_result_wins() {
        let agg = ResultAggregator::new();
        assert!(agg.add_result(HostId::new("a"), Ok(1)));
        assert!(!agg.add_result(HostId::new("a"), Err(Error::Cancelled)));

        assert_eq!(agg.len(), 1);
        assert!(!agg.has_errors());
        assert_eq!(agg.successes()[&HostId::new("a")], 1);
    }

    #[test]
    fn errors_are_rendered_per_host() {
        let agg: ResultAggregator<()> = ResultAggregator::new();
        agg.add_result(HostId::new("a"), Ok(()));
        agg.add_result(
            HostId::new("b"),
            Err(Error::Remote {
                host: HostId::new("b"),
                message: "boom".into(),
            }),
        );

        assert!(agg.has_errors());
        let errors = agg.errors_by_host();
        assert_eq!(errors.len(), 1);
        assert!(errors[&HostId::new("b")].contains("boom"));
        assert_eq!(agg.failed_hosts(), vec![HostId::new("b")]);
        assert_eq!(agg.host_list().len(), 2);
    }

    #[test]
    fn concurrent_writers_each_land_once() {
        let agg = Arc::new(ResultAggregator::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    agg.add_result(HostId::new(format!("h{i}")), Ok(i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(agg.len(), 16);
    }

    #[test]
    fn partition_splits_outcomes() {
        let agg = ResultAggregator::new();
        agg.add_result(HostId::new("a"), Ok("up"));
        agg.add_result(HostId::new("b"), Err(Error::Cancelled));
        let (ok, failed) = agg.partition();
        assert_eq!(ok.len(), 1);
        assert!(matches!(failed[&HostId::new("b")], Error::Cancelled));
    }
}
