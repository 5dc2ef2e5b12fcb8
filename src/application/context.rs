//! Shared per-run context passed to every stage.

use super::cancel::CancelSignal;
use super::executor::ParallelExecutor;
use crate::port::outbound::clock::Clock;
use crate::port::outbound::notifier::{Event, Notifier};

/// Borrowed handles every stage needs: fan-out, time, cancellation and
/// progress reporting.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub executor: &'a ParallelExecutor,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancelSignal,
    pub notifier: &'a dyn Notifier,
}

impl<'a> StageContext<'a> {
    #[must_use]
    pub fn new(
        executor: &'a ParallelExecutor,
        clock: &'a dyn Clock,
        cancel: &'a CancelSignal,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            executor,
            clock,
            cancel,
            notifier,
        }
    }

    pub fn emit(&self, event: Event) {
        self.notifier.notify(event);
    }

    /// Same context with a different cancel signal.
    #[must_use]
    pub fn with_cancel(self, cancel: &'a CancelSignal) -> Self {
        Self { cancel, ..self }
    }
}
