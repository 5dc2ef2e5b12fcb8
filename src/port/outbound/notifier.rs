//! Notifier port for orchestration progress events.
//!
//! The application layer never prints. It emits [`Event`]s, and each
//! registered [`Notifier`] decides how to surface them (logs, terminal,
//! nothing).

use std::time::Duration;

use crate::domain::cluster::RollbackReport;
use crate::domain::gate::GateKind;
use crate::domain::id::HostId;
use crate::domain::stage::{StageOutcome, StageRecord, WizardStage};

/// Events emitted while provisioning and orchestrating a cluster.
#[derive(Debug, Clone)]
pub enum Event {
    StageStarted(WizardStage),
    StageFinished(StageRecord),
    /// Instances launched in one region.
    InstancesCreated {
        region: String,
        count: usize,
    },
    /// A host dropped out of a stage.
    HostFailed {
        host: HostId,
        stage: String,
        reason: String,
    },
    /// One polling round of a gate finished.
    GateRound(GateRoundEvent),
    ProvisionSummary {
        running: usize,
        total: usize,
    },
    RollbackCompleted(RollbackReport),
}

/// Gate polling progress.
#[derive(Debug, Clone)]
pub struct GateRoundEvent {
    pub gate: GateKind,
    pub round: u32,
    pub pending: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// Trait for event handlers.
///
/// `notify` is called inline from orchestration code and must return quickly.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// Registry of notifiers (composite pattern).
///
/// Broadcasts events to all registered notifiers.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for NotifierRegistry {
    fn notify(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A no-op notifier.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

/// A logging notifier that logs events via tracing.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        use tracing::{debug, info, warn};
        match event {
            Event::StageStarted(stage) => {
                info!(stage = stage.code(), name = %stage, "Stage started");
            }
            Event::StageFinished(record) => match record.outcome {
                StageOutcome::Completed => info!(
                    stage = record.stage.code(),
                    elapsed_ms = record.elapsed.as_millis() as u64,
                    "Stage completed"
                ),
                StageOutcome::Skipped(reason) => {
                    info!(stage = record.stage.code(), reason = %reason, "Stage skipped");
                }
                StageOutcome::NotRequested => {
                    debug!(stage = record.stage.code(), "Stage not requested");
                }
            },
            Event::InstancesCreated { region, count } => {
                info!(region = %region, count, "Instances created");
            }
            Event::HostFailed {
                host,
                stage,
                reason,
            } => {
                warn!(host = %host, stage = %stage, reason = %reason, "Host failed");
            }
            Event::GateRound(e) => {
                info!(
                    gate = %e.gate,
                    round = e.round,
                    pending = e.pending,
                    total = e.total,
                    elapsed_secs = e.elapsed.as_secs(),
                    "Gate round"
                );
            }
            Event::ProvisionSummary { running, total } => {
                info!(running, total, "Provisioning finished");
            }
            Event::RollbackCompleted(report) => {
                warn!(
                    destroyed = report.destroyed.len(),
                    failed = report.failed.len(),
                    "Rollback completed"
                );
            }
        }
    }
}
