//! Handlers for the `cluster` command group.

use std::path::Path;

use serde::Serialize;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::{
    ClusterFlags, CreateArgs, DescribeArgs, DestroyArgs, SyncArgs, ValidateCommand, WhitelistArgs,
};
use crate::adapter::inbound::cli::notifier::ConsoleNotifier;
use crate::adapter::inbound::cli::wiz::print_stage;
use crate::adapter::inbound::cli::{operator, output};
use crate::domain::cluster::{ClusterSpec, RegionPlan};
use crate::domain::host::CloudKind;
use crate::domain::report::StageRunReport;
use crate::error::{ConfigError, Result};
use crate::port::inbound::operator::cluster::{
    CreateClusterRequest, DestroyClusterRequest, SyncRequest, ValidateRequest, ValidationTarget,
    WhitelistRequest,
};

/// Turn command-line flags into a cluster description.
#[must_use]
pub fn spec_from_flags(flags: &ClusterFlags) -> ClusterSpec {
    ClusterSpec {
        cloud: if flags.gcp { CloudKind::Gcp } else { CloudKind::Aws },
        network: flags.network,
        regions: flags
            .regions
            .iter()
            .map(|region| RegionPlan {
                region: region.trim().to_string(),
                validators: flags.num_validators,
                apis: flags.num_apis,
            })
            .collect(),
        instance_type: flags.node_type.clone(),
        image: flags.image.clone(),
        monitoring: flags.monitoring,
        static_addresses: !flags.no_static_ip,
        public_api: flags.public_api,
    }
}

/// Execute `cluster create`.
pub async fn execute_create(config: Option<&Path>, args: &CreateArgs) -> Result<()> {
    let request = CreateClusterRequest {
        config_toml: operator::read_config_toml(config)?,
        name: args.name.clone(),
        spec: spec_from_flags(&args.cluster),
    };
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Cluster", &args.name);
    output::field("Instances", request.spec.instance_count());

    let report = operator::operator()
        .create_cluster(request, Box::new(ConsoleNotifier))
        .await?;

    if output::is_json() {
        output::json_output(serde_json::to_value(&report)?);
        return Ok(());
    }
    output::section("Cluster Created");
    output::field("Name", &report.cluster);
    output::field("Hosts", report.hosts.len());
    output::field("Provisioned", report.provision.summary());
    for (host, failure) in report.provision.failures() {
        output::host_line(host.as_str(), &failure);
    }
    if !report.provision.is_complete() {
        output::hint(&format!(
            "run `nodewiz wiz {}` to retry provisioning on the failed hosts",
            report.cluster
        ));
    }
    Ok(())
}

/// Execute `cluster destroy`.
pub async fn execute_destroy(config: Option<&Path>, args: &DestroyArgs) -> Result<()> {
    let config_toml = operator::read_config_toml(config)?;
    if !args.yes {
        if output::is_json() {
            return Err(ConfigError::InvalidValue {
                field: "--yes",
                reason: "destroying a cluster in JSON mode needs --yes".to_string(),
            }
            .into());
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Terminate every instance of cluster {}?", args.name))
            .default(false)
            .interact()?;
        if !confirmed {
            output::note("Aborted");
            return Ok(());
        }
    }

    let request = DestroyClusterRequest {
        config_toml,
        name: args.name.clone(),
    };
    let spinner = output::spinner(&format!("Destroying {}", args.name));
    let report = match operator::operator()
        .destroy_cluster(request, Box::new(ConsoleNotifier))
        .await
    {
        Ok(report) => report,
        Err(e) => {
            output::spinner_fail(&spinner, "Destroy failed");
            return Err(e);
        }
    };

    if report.failed.is_empty() {
        output::spinner_success(&spinner, &format!("Destroyed {} instances", report.destroyed.len()));
    } else {
        output::spinner_fail(
            &spinner,
            &format!("{} instances could not be destroyed", report.failed.len()),
        );
        for (host, reason) in &report.failed {
            output::host_line(host.as_str(), reason);
        }
        output::hint("the cluster record is kept; rerun destroy once the provider issue is resolved");
    }
    if output::is_json() {
        output::json_output(serde_json::to_value(&report)?);
    }
    Ok(())
}

/// Execute `cluster whitelist`.
pub async fn execute_whitelist(config: Option<&Path>, args: &WhitelistArgs) -> Result<()> {
    let request = WhitelistRequest {
        config_toml: operator::read_config_toml(config)?,
        name: args.name.clone(),
        source: args.ip.clone(),
    };
    let report = operator::operator()
        .whitelist(request, Box::new(ConsoleNotifier))
        .await?;

    if output::is_json() {
        output::json_output(serde_json::to_value(&report)?);
        return Ok(());
    }
    output::section(&format!("Whitelist {}", report.cluster));
    output::field("Source", output::highlight(&report.cidr));
    for (region, rules) in &report.added {
        let added = if rules.is_empty() {
            "already allowed".to_string()
        } else {
            rules.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        output::field(region, added);
    }
    output::success(&format!("{} rule(s) added", report.rules_added()));
    Ok(())
}

/// Execute `cluster sync`.
pub async fn execute_sync(config: Option<&Path>, args: &SyncArgs) -> Result<()> {
    let request = SyncRequest {
        config_toml: operator::read_config_toml(config)?,
        name: args.name.clone(),
        subnet: args.subnet.clone(),
    };
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Cluster", &args.name);
    output::field("Subnet", &args.subnet);

    let report = operator::operator()
        .sync_subnet(request, Box::new(ConsoleNotifier))
        .await?;
    print_stage_run(&report, &format!("Nodes are syncing {}", args.subnet))
}

/// Execute `cluster validate primary|subnet`.
pub async fn execute_validate(config: Option<&Path>, command: &ValidateCommand) -> Result<()> {
    let (name, target, validators) = match command {
        ValidateCommand::Primary(args) => (&args.name, ValidationTarget::Primary, &args.validators),
        ValidateCommand::Subnet(args) => (
            &args.name,
            ValidationTarget::Subnet(args.subnet.clone()),
            &args.validators,
        ),
    };
    let done = match &target {
        ValidationTarget::Primary => "Validators are in the primary network".to_string(),
        ValidationTarget::Subnet(subnet) => format!("Validators are validating {subnet}"),
    };
    let request = ValidateRequest {
        config_toml: operator::read_config_toml(config)?,
        name: name.clone(),
        target,
        validators: validators.clone(),
    };
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Cluster", name);

    let report = operator::operator()
        .validate(request, Box::new(ConsoleNotifier))
        .await?;
    print_stage_run(&report, &done)
}

fn print_stage_run(report: &StageRunReport, done: &str) -> Result<()> {
    if output::is_json() {
        output::json_output(serde_json::to_value(report)?);
        return Ok(());
    }
    output::section("Done");
    report.stages.iter().for_each(print_stage);
    if !report.enrolled.is_empty() {
        let enrolled: Vec<&str> = report.enrolled.iter().map(|id| id.as_str()).collect();
        output::field("Enrolled", enrolled.join(", "));
    }
    output::success(done);
    Ok(())
}

#[derive(Tabled, Serialize)]
struct ClusterRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "NETWORK")]
    network: String,
    #[tabled(rename = "HOSTS")]
    hosts: usize,
    #[tabled(rename = "REGIONS")]
    regions: String,
    #[tabled(rename = "SUBNETS")]
    subnets: String,
    #[tabled(rename = "CREATED")]
    created: String,
}

/// Execute `cluster list`.
pub fn execute_list(config: Option<&Path>) -> Result<()> {
    let config_toml = operator::read_config_toml(config)?;
    let clusters = operator::operator().list_clusters(&config_toml)?;
    if clusters.is_empty() {
        output::note("No clusters");
        output::hint("create one with `nodewiz cluster create <name> --region <region>`");
        return Ok(());
    }
    let rows: Vec<ClusterRow> = clusters
        .into_iter()
        .map(|c| ClusterRow {
            name: c.name,
            network: c.network.to_string(),
            hosts: c.hosts,
            regions: c.regions.join(", "),
            subnets: if c.subnets.is_empty() { "-".into() } else { c.subnets.join(", ") },
            created: c.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();
    output::table(&rows);
    Ok(())
}

#[derive(Tabled, Serialize)]
struct HostRow {
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "CLOUD")]
    cloud: String,
    #[tabled(rename = "REGION")]
    region: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "NODE ID")]
    node_id: String,
}

/// Execute `cluster describe`.
pub fn execute_describe(config: Option<&Path>, args: &DescribeArgs) -> Result<()> {
    let config_toml = operator::read_config_toml(config)?;
    let detail = operator::operator().describe_cluster(&config_toml, &args.name)?;

    output::section(&format!("Cluster {}", detail.summary.name));
    output::field("Network", detail.summary.network);
    output::field("Regions", detail.summary.regions.join(", "));
    output::field("Created", detail.summary.created_at.to_rfc3339());
    if let Some(host) = &detail.monitoring_host {
        output::field("Monitoring", host);
    }
    if let Some(host) = &detail.relay_host {
        output::field("Relayer", host);
    }

    output::section("Hosts");
    let rows: Vec<HostRow> = detail
        .hosts
        .into_iter()
        .map(|h| HostRow {
            host: h.id.to_string(),
            role: h.role.to_string(),
            cloud: h.cloud.to_string(),
            region: h.region,
            address: h.address.unwrap_or_else(|| "-".into()),
            node_id: h.node_id.unwrap_or_else(|| "-".into()),
        })
        .collect();
    output::table(&rows);

    if !detail.deployments.is_empty() {
        output::section("Subnets");
        for deployment in &detail.deployments {
            output::field("Subnet", &deployment.subnet);
            output::field("Subnet ID", deployment.subnet_id.as_deref().unwrap_or("-"));
            output::field("Blockchain", deployment.blockchain_id.as_deref().unwrap_or("-"));
            if let Some(url) = &deployment.rpc_url {
                output::field("RPC", output::highlight(url));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::NetworkKind;

    fn flags() -> ClusterFlags {
        ClusterFlags {
            aws: false,
            gcp: false,
            regions: vec!["us-east-1".into(), " eu-west-1".into()],
            num_validators: 3,
            num_apis: 1,
            network: NetworkKind::Testnet,
            monitoring: true,
            node_type: None,
            image: None,
            no_static_ip: false,
            public_api: false,
        }
    }

    #[test]
    fn spec_defaults_to_aws_with_static_addresses() {
        let spec = spec_from_flags(&flags());
        assert_eq!(spec.cloud, CloudKind::Aws);
        assert!(spec.static_addresses);
        assert_eq!(spec.regions[1].region, "eu-west-1");
        assert_eq!(spec.instance_count(), 2 * 4 + 1);
    }

    #[test]
    fn gcp_flag_and_no_static_ip() {
        let mut f = flags();
        f.gcp = true;
        f.no_static_ip = true;
        let spec = spec_from_flags(&f);
        assert_eq!(spec.cloud, CloudKind::Gcp);
        assert!(!spec.static_addresses);
    }
}
