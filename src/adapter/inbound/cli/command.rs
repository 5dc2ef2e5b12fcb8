//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::cluster::NetworkKind;
use crate::domain::subnet::VmKind;

/// Protocol version spoken by the current node release.
pub const DEFAULT_RPC_VERSION: u32 = 35;

/// Provision validator clusters and deploy subnets onto them
#[derive(Parser, Debug)]
#[command(name = "nodewiz")]
#[command(version)]
pub struct Cli {
    /// Configuration file [default: ~/.nodewiz/config.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Color output mode [auto, always, never]
    #[arg(long, global = true, default_value = "auto", hide_possible_values = true)]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect and destroy clusters
    #[command(subcommand)]
    Cluster(ClusterCommand),

    /// Bring a cluster up and make it validate a subnet, resuming where a
    /// previous run stopped
    Wiz(Box<WizArgs>),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Launch and provision a new cluster.
    Create(Box<CreateArgs>),
    /// Terminate every instance of a cluster and forget it.
    Destroy(DestroyArgs),
    /// List known clusters.
    List,
    /// Show hosts and deployments of one cluster.
    Describe(DescribeArgs),
    /// Open a cluster's SSH, API and monitoring ports to another address.
    Whitelist(WhitelistArgs),
    /// Make every node track a deployed subnet and wait until it syncs.
    Sync(SyncArgs),
    /// Enroll a cluster's validators in the primary network or a subnet.
    #[command(subcommand)]
    Validate(ValidateCommand),
}

#[derive(Subcommand, Debug)]
pub enum ValidateCommand {
    /// Wait for healthy, bootstrapped nodes and enroll them in the primary network.
    Primary(ValidatePrimaryArgs),
    /// Enroll synced nodes as validators of a deployed subnet.
    Subnet(ValidateSubnetArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a documented configuration file.
    Init(ConfigInitArgs),
    /// Display the effective configuration with defaults applied.
    Show,
    /// Check the configuration for errors.
    Validate,
}

/// Shape of a cluster to create.
#[derive(Args, Debug, Clone)]
pub struct ClusterFlags {
    /// Create instances on AWS (default)
    #[arg(long, conflicts_with = "gcp")]
    pub aws: bool,

    /// Create instances on Google Cloud
    #[arg(long)]
    pub gcp: bool,

    /// Region to use; repeat or comma-separate for several
    #[arg(long = "region", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Validators per region
    #[arg(long, default_value_t = 1)]
    pub num_validators: usize,

    /// Non-validating API hosts per region
    #[arg(long, default_value_t = 0)]
    pub num_apis: usize,

    /// Network the nodes join [mainnet, testnet, devnet]
    #[arg(long, default_value = "devnet")]
    pub network: NetworkKind,

    /// Add a monitoring host
    #[arg(long)]
    pub monitoring: bool,

    /// Instance type, overriding the configured one
    #[arg(long)]
    pub node_type: Option<String>,

    /// Machine image, overriding the configured one
    #[arg(long)]
    pub image: Option<String>,

    /// Keep the provider-assigned addresses instead of reserving static ones
    #[arg(long)]
    pub no_static_ip: bool,

    /// Open the node API on API hosts to everyone
    #[arg(long)]
    pub public_api: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Cluster name
    pub name: String,

    #[command(flatten)]
    pub cluster: ClusterFlags,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Cluster name
    pub name: String,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Cluster name
    pub name: String,
}

#[derive(Args, Debug)]
pub struct WhitelistArgs {
    /// Cluster name
    pub name: String,

    /// Address or CIDR range to allow; your current address when omitted
    #[arg(long)]
    pub ip: Option<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Cluster name
    pub name: String,

    /// Deployed subnet to track
    pub subnet: String,
}

#[derive(Args, Debug)]
pub struct ValidatePrimaryArgs {
    /// Cluster name
    pub name: String,

    /// Hosts to enroll (instance id, address or node id); all validators
    /// when omitted
    #[arg(long, value_delimiter = ',')]
    pub validators: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ValidateSubnetArgs {
    /// Cluster name
    pub name: String,

    /// Deployed subnet to validate
    pub subnet: String,

    /// Hosts to enroll (instance id, address or node id); all validators
    /// when omitted
    #[arg(long, value_delimiter = ',')]
    pub validators: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WizArgs {
    /// Cluster name; created when it does not exist
    pub cluster: String,

    /// Subnet to define, deploy and validate
    pub subnet: Option<String>,

    #[command(flatten)]
    pub flags: ClusterFlags,

    /// RPC protocol version every validator must speak; only used when
    /// the subnet is defined by this run
    #[arg(long, default_value_t = DEFAULT_RPC_VERSION)]
    pub rpc_version: u32,

    /// Virtual machine of the subnet [subnet-evm, custom]
    #[arg(long, default_value = "subnet-evm")]
    pub vm: VmKind,

    /// EVM chain id of the subnet's blockchain
    #[arg(long)]
    pub evm_chain_id: Option<u64>,

    /// Native token symbol of the subnet's blockchain
    #[arg(long)]
    pub evm_token: Option<String>,

    /// Deploy an interchain relayer
    #[arg(long)]
    pub relayer: bool,

    /// Hosts that should validate the subnet (instance id, address or
    /// node id); all validators when omitted
    #[arg(long, value_delimiter = ',')]
    pub validators: Vec<String>,

    /// Redefine the subnet even if a definition exists
    #[arg(long)]
    pub force_subnet_create: bool,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nodewiz").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "nodewiz");
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = parse(&["cluster", "list", "--json", "-vv", "--color", "never"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.color, ColorChoice::Never));
        assert!(matches!(cli.command, Commands::Cluster(ClusterCommand::List)));
    }

    #[test]
    fn regions_accept_repeat_and_commas() {
        let cli = parse(&[
            "cluster", "create", "alpha", "--region", "us-east-1,eu-west-1", "--region", "ap-south-1",
        ]);
        let Commands::Cluster(ClusterCommand::Create(args)) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.cluster.regions, ["us-east-1", "eu-west-1", "ap-south-1"]);
        assert_eq!(args.cluster.num_validators, 1);
        assert_eq!(args.cluster.network, NetworkKind::Devnet);
    }

    #[test]
    fn aws_and_gcp_conflict() {
        assert!(Cli::try_parse_from(["nodewiz", "cluster", "create", "a", "--aws", "--gcp"]).is_err());
    }

    #[test]
    fn wiz_takes_subnet_and_deploy_flags() {
        let cli = parse(&[
            "wiz",
            "alpha",
            "mysubnet",
            "--network",
            "testnet",
            "--rpc-version",
            "36",
            "--evm-chain-id",
            "4321",
            "--relayer",
            "--validators",
            "i-1,10.0.0.2",
        ]);
        let Commands::Wiz(args) = cli.command else {
            panic!("expected wiz");
        };
        assert_eq!(args.subnet.as_deref(), Some("mysubnet"));
        assert_eq!(args.flags.network, NetworkKind::Testnet);
        assert_eq!(args.rpc_version, 36);
        assert_eq!(args.vm, VmKind::SubnetEvm);
        assert!(args.relayer);
        assert_eq!(args.validators, ["i-1", "10.0.0.2"]);
    }

    #[test]
    fn destroy_yes_flag() {
        let cli = parse(&["cluster", "destroy", "alpha", "-y"]);
        assert!(matches!(cli.command, Commands::Cluster(ClusterCommand::Destroy(DestroyArgs { yes: true, .. }))));
    }

    #[test]
    fn whitelist_ip_is_optional() {
        let cli = parse(&["cluster", "whitelist", "alpha", "--ip", "198.51.100.7"]);
        let Commands::Cluster(ClusterCommand::Whitelist(args)) = cli.command else {
            panic!("expected whitelist");
        };
        assert_eq!(args.ip.as_deref(), Some("198.51.100.7"));

        let cli = parse(&["cluster", "whitelist", "alpha"]);
        assert!(matches!(cli.command, Commands::Cluster(ClusterCommand::Whitelist(WhitelistArgs { ip: None, .. }))));
    }

    #[test]
    fn sync_and_validate_take_cluster_and_subnet() {
        let cli = parse(&["cluster", "sync", "alpha", "demo"]);
        let Commands::Cluster(ClusterCommand::Sync(args)) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!((args.name.as_str(), args.subnet.as_str()), ("alpha", "demo"));

        let cli = parse(&["cluster", "validate", "subnet", "alpha", "demo", "--validators", "i-1,i-2"]);
        let Commands::Cluster(ClusterCommand::Validate(ValidateCommand::Subnet(args))) = cli.command else {
            panic!("expected validate subnet");
        };
        assert_eq!(args.subnet, "demo");
        assert_eq!(args.validators, ["i-1", "i-2"]);

        let cli = parse(&["cluster", "validate", "primary", "alpha"]);
        assert!(matches!(
            cli.command,
            Commands::Cluster(ClusterCommand::Validate(ValidateCommand::Primary(_)))
        ));
        assert!(Cli::try_parse_from(["nodewiz", "cluster", "sync", "alpha"]).is_err());
    }
}
