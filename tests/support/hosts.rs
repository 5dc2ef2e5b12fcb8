//! Context and host helpers shared by the integration tests.

use std::sync::Arc;

use nodewiz::application::cancel::CancelSignal;
use nodewiz::application::context::StageContext;
use nodewiz::application::executor::ParallelExecutor;
use nodewiz::domain::id::HostId;
use nodewiz::port::outbound::notifier::Notifier;
use nodewiz::testkit::clock::ManualClock;

/// Everything a [`StageContext`] borrows, owned in one place.
pub struct Harness {
    pub executor: ParallelExecutor,
    pub clock: Arc<ManualClock>,
    pub cancel: CancelSignal,
}

impl Harness {
    pub fn new(max_concurrency: Option<usize>) -> Self {
        Self {
            executor: ParallelExecutor::new(max_concurrency),
            clock: Arc::new(ManualClock::new()),
            cancel: CancelSignal::never(),
        }
    }

    pub fn context<'a>(&'a self, notifier: &'a dyn Notifier) -> StageContext<'a> {
        StageContext::new(&self.executor, self.clock.as_ref(), &self.cancel, notifier)
    }
}

pub fn ids(names: &[&str]) -> Vec<HostId> {
    names.iter().map(|n| HostId::new(*n)).collect()
}
