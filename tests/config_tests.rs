use std::fs;
use std::time::Duration;

use nodewiz::domain::gate::GateKind;
use nodewiz::error::{ConfigError, Error};
use nodewiz::infrastructure::config::settings::Config;

const TEMPLATE: &str = include_str!("../config.toml.example");

fn load(contents: &str) -> Result<Config, Error> {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, contents).expect("write temp config");
    Config::load(&path)
}

fn invalid_field(result: Result<Config, Error>) -> &'static str {
    match result {
        Err(Error::Config(ConfigError::InvalidValue { field, .. })) => field,
        Err(Error::Config(ConfigError::MissingField { field })) => field,
        Err(err) => panic!("expected a field error, got {err}"),
        Ok(_) => panic!("expected a field error, got a valid config"),
    }
}

#[test]
fn shipped_template_loads_and_matches_defaults() {
    let config = load(TEMPLATE).unwrap();
    let defaults = Config::parse_toml("").unwrap();

    assert_eq!(config.gates, defaults.gates);
    assert_eq!(config.node.api_port, defaults.node.api_port);
    assert_eq!(config.relayer.fund_amount, 5_000_000_000_000_000_000);
    assert!(config.network.operator_cidr.is_none());
    assert!(config.gcp.project.is_none());
}

#[test]
fn gates_resolve_to_orchestrator_settings() {
    let config = load(
        r#"
[executor]
max_concurrency = 8

[gates.health]
timeout_secs = 120
interval_secs = 4

[network]
operator_cidr = "203.0.113.9"
"#,
    )
    .unwrap();

    let settings = config.orchestrator_settings("203.0.113.9/32".to_string());
    assert_eq!(settings.max_concurrency, Some(8));
    assert_eq!(settings.gates.health.kind, GateKind::Healthy);
    assert_eq!(settings.gates.health.timeout, Duration::from_secs(120));
    assert_eq!(settings.gates.health.interval, Duration::from_secs(4));
    assert_eq!(settings.gates.bootstrapped.kind, GateKind::Bootstrapped);
    assert_eq!(settings.cluster.operator_cidr, "203.0.113.9/32");
    assert_eq!(settings.provision.node.api_port, 9650);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = Config::load(dir.path().join("absent.toml"));
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::ReadFile(_)))
    ));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    assert!(matches!(
        load("[gates.health\ntimeout_secs = 1"),
        Err(Error::Config(ConfigError::Parse(_)))
    ));
}

#[test]
fn zero_gate_timeout_is_rejected() {
    let field = invalid_field(load("[gates.bootstrapped]\ntimeout_secs = 0\ninterval_secs = 0\n"));
    assert_eq!(field, "gates.bootstrapped");
}

#[test]
fn colliding_node_ports_are_rejected() {
    let field = invalid_field(load("[node]\napi_port = 9650\nstaking_port = 9650\n"));
    assert_eq!(field, "node.staking_port");
}

#[test]
fn zero_command_timeout_is_rejected() {
    let field = invalid_field(load("[remote]\ncommand_timeout_secs = 0\n"));
    assert_eq!(field, "remote.command_timeout_secs");
}

#[test]
fn blank_ssh_user_is_missing() {
    let field = invalid_field(load("[remote]\nssh_user = \"  \"\n"));
    assert_eq!(field, "remote.ssh_user");
}

#[test]
fn malformed_chain_url_is_rejected() {
    let field = invalid_field(load("[chain]\ntestnet_url = \"not a url\"\n"));
    assert_eq!(field, "chain.testnet_url");
}

#[test]
fn empty_gcp_project_is_rejected() {
    let field = invalid_field(load("[gcp]\nproject = \"\"\n"));
    assert_eq!(field, "gcp.project");
}

#[test]
fn operator_cidr_prefix_is_checked() {
    let field = invalid_field(load("[network]\noperator_cidr = \"198.51.100.0/200\"\n"));
    assert_eq!(field, "network.operator_cidr");
    assert!(load("[network]\noperator_cidr = \"198.51.100.0/24\"\n").is_ok());
}

#[test]
fn zero_subnet_weight_is_rejected() {
    let field = invalid_field(load("[validator]\nsubnet_weight = 0\n"));
    assert_eq!(field, "validator.weight");
}
