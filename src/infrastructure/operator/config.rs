//! Configuration operator implementation.

use crate::error::Result;
use crate::port::inbound::operator::configuration::{
    ConfigValidationReport, ConfigView, ConfigurationOperator, GateView,
};

use super::entry::Operator;

impl ConfigurationOperator for Operator {
    fn show_config(&self, config_toml: &str) -> Result<ConfigView> {
        let config = self.load_config(config_toml)?;

        Ok(ConfigView {
            state_dir: config.state_dir().display().to_string(),
            log_level: config.logging.level.clone(),
            log_format: config.logging.format.clone(),
            max_concurrency: config.executor.max_concurrency,
            gates: config
                .gates
                .named()
                .into_iter()
                .map(|(name, gate)| GateView {
                    name: name.to_string(),
                    timeout_secs: gate.timeout_secs,
                    interval_secs: gate.interval_secs,
                })
                .collect(),
            ssh_user: config.remote.ssh_user.clone(),
            node_image: format!("{}:{}", config.node.image, config.node.version),
            aws_profile: config.aws.profile.clone(),
            aws_instance_type: config.aws.instance_type.clone(),
            gcp_project: config.gcp.project.clone(),
            gcp_instance_type: config.gcp.instance_type.clone(),
            operator_cidr: config.network.operator_cidr.clone(),
            signer_url: config.chain.signer_url.clone(),
        })
    }

    fn validate_config(&self, config_toml: &str) -> Result<ConfigValidationReport> {
        let config = self.load_config(config_toml)?;
        let mut warnings = Vec::new();

        if config.chain.signer_url.is_none() {
            warnings.push(
                "chain.signer_url not set (required to enroll validators and deploy subnets)"
                    .to_string(),
            );
        }

        if config.gcp.project.is_none() {
            warnings.push("gcp.project not set; only AWS clusters can be created".to_string());
        }

        if config.relayer.address.is_none() {
            warnings.push("relayer.address not set; --relayer will deploy an unfunded relayer".to_string());
        }

        if config.executor.max_concurrency.is_some_and(|n| n < 4) {
            warnings.push("executor.max_concurrency below 4 makes large clusters slow".to_string());
        }

        Ok(ConfigValidationReport { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_show_every_gate_in_order() {
        let view = Operator::new().show_config("").unwrap();
        let names: Vec<_> = view.gates.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(
            names,
            ["health", "bootstrapped", "rpc_compatibility", "subnet_syncing", "subnet_validating"]
        );
        assert!(view.max_concurrency.is_none());
    }

    #[test]
    fn missing_signer_is_a_warning_not_an_error() {
        let report = Operator::new().validate_config("").unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("signer_url")));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Operator::new().validate_config("[executor\n").is_err());
    }
}
