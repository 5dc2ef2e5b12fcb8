//! Poll-until primitive behind every stage gate.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::context::StageContext;
use crate::domain::gate::{Readiness, StageGate};
use crate::domain::host::Host;
use crate::domain::id::HostId;
use crate::domain::result::TaskResult;
use crate::error::{Error, Result};
use crate::port::outbound::notifier::{Event, GateRoundEvent};

/// Shortest wait between rounds, so a zero interval cannot spin.
const MIN_ROUND_GAP: Duration = Duration::from_millis(1);

/// Result of polling a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Hosts that never became ready, with the last reason seen.
    pub failing: BTreeMap<HostId, String>,
    pub elapsed: Duration,
    pub rounds: u32,
}

impl PollOutcome {
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.failing.is_empty()
    }

    /// `Ok` when satisfied, otherwise [`Error::GateTimeout`].
    pub fn into_result(self, gate: &StageGate) -> Result<()> {
        if self.is_satisfied() {
            return Ok(());
        }
        Err(Error::GateTimeout {
            gate: gate.kind,
            elapsed: self.elapsed,
            failing: self.failing,
        })
    }
}

/// Re-run `check` on not-yet-ready hosts until all are ready or the gate's
/// timeout passes.
///
/// Hosts are checked in parallel each round. A host that answers
/// [`Readiness::Ready`] is not checked again. An error from `check` counts as
/// not ready. The first round runs immediately; a satisfied first round
/// returns without sleeping. The last round starts once `timeout` has elapsed
/// on the context clock, so a zero timeout means exactly one round.
///
/// # Errors
///
/// Only [`Error::Cancelled`]. A timeout is reported in the outcome.
pub async fn poll_until<F, Fut>(
    ctx: &StageContext<'_>,
    hosts: &[Host],
    gate: &StageGate,
    check: F,
) -> Result<PollOutcome>
where
    F: Fn(Host) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Readiness>> + Send + 'static,
{
    let start = ctx.clock.now();
    let total = hosts.len();
    let check = Arc::new(check);
    let mut pending: Vec<Host> = hosts.to_vec();
    let mut failing = BTreeMap::new();
    let mut rounds = 0u32;

    loop {
        rounds += 1;
        let round_check = Arc::clone(&check);
        let results = ctx
            .executor
            .run(&pending, move |host| round_check(host), ctx.cancel)
            .await?;

        failing.clear();
        for (id, result) in results.into_results() {
            match result {
                TaskResult::Success(Readiness::Ready) => {}
                TaskResult::Success(Readiness::Pending(reason)) => {
                    failing.insert(id, reason);
                }
                TaskResult::Failure(Error::Cancelled) => return Err(Error::Cancelled),
                TaskResult::Failure(e) => {
                    failing.insert(id, e.to_string());
                }
            }
        }
        pending.retain(|h| failing.contains_key(&h.id));

        let elapsed = ctx.clock.now().saturating_duration_since(start);
        ctx.emit(Event::GateRound(GateRoundEvent {
            gate: gate.kind,
            round: rounds,
            pending: pending.len(),
            total,
            elapsed,
        }));
        debug!(
            gate = %gate.kind,
            round = rounds,
            pending = pending.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Gate round finished"
        );

        if pending.is_empty() || elapsed >= gate.timeout {
            return Ok(PollOutcome {
                failing,
                elapsed,
                rounds,
            });
        }

        let wait = gate.interval.max(MIN_ROUND_GAP).min(gate.timeout - elapsed);
        tokio::select! {
            () = ctx.clock.sleep(wait) => {}
            () = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}
