//! Handler for the `wiz` command.

use std::path::Path;

use crate::adapter::inbound::cli::cluster::spec_from_flags;
use crate::adapter::inbound::cli::command::WizArgs;
use crate::adapter::inbound::cli::notifier::ConsoleNotifier;
use crate::adapter::inbound::cli::{operator, output};
use crate::domain::report::WizardReport;
use crate::domain::stage::{StageOutcome, StageRecord, WizardPlan};
use crate::domain::subnet::SubnetSpec;
use crate::error::Result;
use crate::port::inbound::operator::cluster::WizardRequest;

#[must_use]
pub fn plan_from_args(args: &WizArgs) -> WizardPlan {
    WizardPlan {
        cluster: args.cluster.clone(),
        spec: spec_from_flags(&args.flags),
        subnet: args.subnet.as_ref().map(|name| SubnetSpec {
            name: name.clone(),
            vm: args.vm,
            rpc_version: args.rpc_version,
            evm_chain_id: args.evm_chain_id,
            token_symbol: args.evm_token.clone(),
            relay_ready: args.relayer,
        }),
        validators: args.validators.clone(),
        relayer: args.relayer,
        force_subnet_define: args.force_subnet_create,
    }
}

/// Execute `wiz`.
pub async fn execute(config: Option<&Path>, args: &WizArgs) -> Result<()> {
    let request = WizardRequest {
        config_toml: operator::read_config_toml(config)?,
        plan: plan_from_args(args),
    };
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Cluster", &args.cluster);
    if let Some(subnet) = &args.subnet {
        output::field("Subnet", subnet);
    }

    let report = operator::operator()
        .run_wizard(request, Box::new(ConsoleNotifier))
        .await?;
    print_report(&report)
}

fn print_report(report: &WizardReport) -> Result<()> {
    if output::is_json() {
        output::json_output(serde_json::to_value(report)?);
        return Ok(());
    }

    output::section("Done");
    output::field("Run", &report.run_id);
    output::field("Cluster", if report.created { format!("{} (created)", report.cluster) } else { report.cluster.clone() });
    if let Some(provision) = &report.provision {
        output::field("Hosts", provision.summary());
    }
    let completed = report.stages.iter().filter(|r| r.is_completed()).count();
    let skipped = report.stages.iter().filter(|r| r.is_skipped()).count();
    output::field("Stages", format!("{completed} completed, {skipped} already in place"));
    if output::verbosity() > 0 {
        report.stages.iter().for_each(print_stage);
    }
    if let Some(subnet) = &report.subnet {
        output::field("Subnet", subnet);
    }
    if let Some(url) = &report.rpc_url {
        output::field("RPC", output::highlight(url));
    }
    if let Some(host) = &report.relay_host {
        output::field("Relayer", host);
    }
    output::success("Cluster is validating");
    Ok(())
}

/// One `S6 subnet tracking: completed` line.
pub(crate) fn print_stage(record: &StageRecord) {
    let outcome = match &record.outcome {
        StageOutcome::Completed => "completed".to_string(),
        StageOutcome::Skipped(reason) => format!("skipped ({reason})"),
        StageOutcome::NotRequested => "not requested".to_string(),
    };
    output::stage(record.stage.code(), &format!("{}: {outcome}", record.stage));
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::adapter::inbound::cli::command::{Cli, Commands};

    fn wiz(args: &[&str]) -> WizArgs {
        let cli = Cli::try_parse_from(std::iter::once("nodewiz").chain(args.iter().copied())).unwrap();
        match cli.command {
            Commands::Wiz(args) => *args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plan_without_subnet_only_brings_cluster_up() {
        let plan = plan_from_args(&wiz(&["wiz", "alpha", "--region", "us-east-1"]));
        assert!(plan.subnet.is_none());
        assert!(!plan.relayer);
        assert_eq!(plan.spec.regions.len(), 1);
    }

    #[test]
    fn relayer_marks_subnet_relay_ready() {
        let plan = plan_from_args(&wiz(&["wiz", "alpha", "s1", "--relayer", "--evm-token", "TKN", "--force-subnet-create"]));
        let subnet = plan.subnet.unwrap();
        assert!(subnet.relay_ready);
        assert_eq!(subnet.token_symbol.as_deref(), Some("TKN"));
        assert!(plan.force_subnet_define);
    }
}
