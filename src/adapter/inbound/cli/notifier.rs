//! Terminal rendering of orchestration events.

use crate::adapter::inbound::cli::output;
use crate::domain::stage::StageOutcome;
use crate::port::outbound::notifier::{Event, Notifier};

/// Prints progress as the run advances.
///
/// Gate rounds are only shown with `-v`; everything else is always shown
/// unless `--quiet` is set.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, event: Event) {
        match event {
            Event::StageStarted(stage) => {
                output::stage(stage.code(), &format!("{stage}..."));
            }
            Event::StageFinished(record) => {
                let code = record.stage.code();
                match record.outcome {
                    StageOutcome::Completed => output::stage(
                        code,
                        &format!("{} done {}", record.stage, output::muted(format!("({:.1?})", record.elapsed))),
                    ),
                    StageOutcome::Skipped(reason) => {
                        output::stage(code, &format!("{} skipped: {}", record.stage, output::muted(reason)));
                    }
                    StageOutcome::NotRequested => {
                        if output::verbosity() > 0 {
                            output::stage(code, &output::muted(format!("{} not requested", record.stage)));
                        }
                    }
                }
            }
            Event::InstancesCreated { region, count } => {
                output::success(&format!("{count} instances running in {}", output::highlight(region)));
            }
            Event::HostFailed { host, stage, reason } => {
                output::host_line(host.as_str(), &format!("{stage}: {reason}"));
            }
            Event::GateRound(round) => {
                if output::verbosity() > 0 {
                    output::note(&format!(
                        "{} round {}: {}/{} pending after {}s",
                        round.gate,
                        round.round,
                        round.pending,
                        round.total,
                        round.elapsed.as_secs()
                    ));
                }
            }
            Event::ProvisionSummary { running, total } => {
                let line = format!("{running}/{total} hosts running");
                if running == total {
                    output::success(&line);
                } else {
                    output::warning(&line);
                }
            }
            Event::RollbackCompleted(report) => {
                output::warning(&format!(
                    "Rolled back: {} destroyed, {} could not be destroyed",
                    report.destroyed.len(),
                    report.failed.len()
                ));
                for (host, reason) in &report.failed {
                    output::host_line(host.as_str(), reason);
                }
            }
        }
    }
}
