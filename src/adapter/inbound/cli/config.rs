//! Handler for the `config` command group.

use std::fs;
use std::path::Path;

use crate::adapter::inbound::cli::{operator, output, paths};
use crate::error::{ConfigError, Result};

/// Default config template with documentation.
const CONFIG_TEMPLATE: &str = include_str!("../../../../config.toml.example");

/// Execute `config init`.
pub fn execute_init(path: Option<&Path>, force: bool) -> Result<()> {
    let default = paths::default_config();
    let path = path.unwrap_or(&default);
    if path.exists() && !force {
        return Err(ConfigError::InvalidValue {
            field: "config",
            reason: format!("{} already exists (use --force to overwrite)", path.display()),
        }
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, CONFIG_TEMPLATE)?;
    output::section("Config Initialized");
    output::success("Created configuration file");
    output::field("Path", path.display());
    output::section("Next Steps");
    output::note(&format!("1. Edit {} with your settings", path.display()));
    output::note("2. Make sure `aws` or `gcloud` is logged in");
    output::note("3. Run: nodewiz config validate");
    output::note("4. Run: nodewiz wiz <cluster> <subnet> --region <region>");
    Ok(())
}

/// Execute `config show`.
pub fn execute_show(path: Option<&Path>) -> Result<()> {
    let config_toml = operator::read_config_toml(path)?;
    let config = operator::operator().show_config(&config_toml)?;

    output::section("Effective Configuration");
    output::field("State dir", &config.state_dir);
    output::field("Log level", &config.log_level);
    output::field("Log format", &config.log_format);
    output::field(
        "Concurrency",
        config
            .max_concurrency
            .map_or_else(|| "one task per host".to_string(), |n| n.to_string()),
    );

    output::section("Gates");
    for gate in &config.gates {
        output::field(
            &gate.name,
            format!("timeout {}s, every {}s", gate.timeout_secs, gate.interval_secs),
        );
    }

    output::section("Hosts");
    output::field("SSH user", &config.ssh_user);
    output::field("Node image", &config.node_image);
    output::field(
        "Operator CIDR",
        config.operator_cidr.as_deref().unwrap_or("discovered at run time"),
    );

    output::section("Clouds");
    output::field("AWS profile", &config.aws_profile);
    output::field("AWS type", &config.aws_instance_type);
    output::field("GCP project", config.gcp_project.as_deref().unwrap_or("-"));
    output::field("GCP type", &config.gcp_instance_type);

    output::section("Chain");
    match &config.signer_url {
        Some(url) => output::field("Signer", url),
        None => output::warning("No signer configured; chain transactions will fail"),
    }
    Ok(())
}

/// Execute `config validate`.
pub fn execute_validate(path: Option<&Path>) -> Result<()> {
    output::section("Config Validation");
    match path {
        Some(path) => output::field("Path", path.display()),
        None => output::field("Path", paths::default_config().display()),
    }
    let config_toml = operator::read_config_toml(path)?;
    let validation = operator::operator().validate_config(&config_toml)?;
    output::success("Config is valid");

    if !validation.warnings.is_empty() {
        output::section("Warnings");
        for warning in &validation.warnings {
            output::warning(warning);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_valid_toml() {
        let result: std::result::Result<toml::Value, _> = toml::from_str(CONFIG_TEMPLATE);
        assert!(result.is_ok(), "CONFIG_TEMPLATE is not valid TOML");
    }

    #[test]
    fn init_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        execute_init(Some(&path), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), CONFIG_TEMPLATE);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "existing").unwrap();

        assert!(execute_init(Some(&path), false).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing");

        execute_init(Some(&path), true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), CONFIG_TEMPLATE);
    }
}
