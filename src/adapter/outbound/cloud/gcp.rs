//! [`CloudProvider`] for Google Compute Engine through `gcloud`.
//!
//! GCE has no security groups or key pairs. A "group" here is a network
//! tag: instances carry the tag and every firewall rule targets it. The
//! "key pair" is a local SSH key whose public half is injected into
//! instance metadata.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::cli::{is_code, CliRunner};
use crate::adapter::outbound::process;
use crate::domain::cluster::KeyPair;
use crate::domain::host::CloudKind;
use crate::domain::id::HostId;
use crate::domain::security::{normalize_cidr, IngressRule, Protocol};
use crate::error::Result;
use crate::port::outbound::cloud::{CloudProvider, InstanceRequest, SecurityGroup, StaticAddress};

const ALREADY_EXISTS: &str = "already exists";
const NOT_FOUND: &str = "was not found";
const ACCESS_CONFIG: &str = "external-nat";

/// Compute Engine driven through the `gcloud` CLI.
#[derive(Debug, Clone)]
pub struct GcloudCli {
    cli: CliRunner,
    project: String,
    zone_suffix: String,
    ssh_user: String,
    key_dir: PathBuf,
    timeout: Duration,
}

impl GcloudCli {
    #[must_use]
    pub fn new(
        binary: &str,
        project: &str,
        zone_suffix: &str,
        ssh_user: &str,
        key_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            cli: CliRunner::new(CloudKind::Gcp, binary, None, timeout),
            project: project.to_string(),
            zone_suffix: zone_suffix.to_string(),
            ssh_user: ssh_user.to_string(),
            key_dir,
            timeout,
        }
    }

    fn zone(&self, region: &str) -> String {
        format!("{region}-{}", self.zone_suffix)
    }

    fn args(&self, parts: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = std::iter::once("compute")
            .chain(parts.iter().copied())
            .map(str::to_string)
            .collect();
        args.push(format!("--project={}", self.project));
        args.push("--format=json".to_string());
        args.push("--quiet".to_string());
        args
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.key_dir.join(format!("gcp-{name}"))
    }

    async fn firewall_rules(&self, tag: &str) -> Result<Vec<FirewallRule>> {
        let filter = format!("--filter=targetTags:({tag})");
        let value = self.cli.json(&self.args(&["firewall-rules", "list", &filter])).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).map_err(|e| self.cli.failure(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirewallRule {
    #[serde(default)]
    allowed: Vec<Allowed>,
    #[serde(default)]
    source_ranges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Allowed {
    #[serde(rename = "IPProtocol")]
    protocol: String,
    #[serde(default)]
    ports: Vec<String>,
}

fn flatten_rules(firewall: Vec<FirewallRule>) -> Vec<IngressRule> {
    let mut rules = Vec::new();
    for entry in firewall {
        for allowed in &entry.allowed {
            let protocol = match allowed.protocol.as_str() {
                "tcp" => Protocol::Tcp,
                "udp" => Protocol::Udp,
                _ => continue,
            };
            for port in allowed.ports.iter().filter_map(|p| p.parse::<u16>().ok()) {
                for range in &entry.source_ranges {
                    rules.push(IngressRule {
                        protocol,
                        port,
                        cidr: normalize_cidr(range),
                    });
                }
            }
        }
    }
    rules
}

/// Firewall rule names are lowercase letters, digits and dashes.
fn rule_name(tag: &str, rule: &IngressRule) -> String {
    let cidr: String = rule
        .cidr
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let mut name = format!("{tag}-{}-{}-{cidr}", rule.protocol, rule.port);
    name.truncate(63);
    name.trim_end_matches('-').to_string()
}

fn instance_name(request: &InstanceRequest) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", request.cluster, request.role, &suffix[..8])
}

fn nat_addresses(value: &Value) -> BTreeMap<HostId, String> {
    let mut out = BTreeMap::new();
    for instance in value.as_array().into_iter().flatten() {
        let Some(name) = instance["name"].as_str() else { continue };
        let nat = instance["networkInterfaces"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|nic| nic["accessConfigs"].as_array().into_iter().flatten())
            .find_map(|config| config["natIP"].as_str());
        if let Some(address) = nat {
            out.insert(HostId::new(name), address.to_string());
        }
    }
    out
}

#[async_trait]
impl CloudProvider for GcloudCli {
    fn kind(&self) -> CloudKind {
        CloudKind::Gcp
    }

    async fn ensure_key_pair(&self, _region: &str, name: &str) -> Result<KeyPair> {
        let path = self.key_path(name);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = path.display().to_string();
            let output = process::run(
                "ssh-keygen",
                ["-q", "-t", "ed25519", "-N", "", "-C", self.ssh_user.as_str(), "-f", file.as_str()],
                self.timeout,
            )
            .await
            .map_err(|failure| self.cli.failure(format!("ssh-keygen {failure}")))?;
            if !output.success() {
                return Err(self.cli.failure(format!("ssh-keygen: {}", output.diagnostic())));
            }
            info!(name, path = %path.display(), "Generated SSH key");
        }
        Ok(KeyPair {
            name: name.to_string(),
            private_key: path,
        })
    }

    async fn ensure_security_group(&self, _region: &str, name: &str) -> Result<SecurityGroup> {
        let rules = flatten_rules(self.firewall_rules(name).await?);
        Ok(SecurityGroup {
            id: name.to_string(),
            name: name.to_string(),
            rules,
        })
    }

    async fn authorize_ingress(&self, _region: &str, group: &SecurityGroup, rules: &[IngressRule]) -> Result<()> {
        for rule in rules {
            let name = rule_name(&group.id, rule);
            let allow = format!("--allow={}:{}", rule.protocol, rule.port);
            let source = format!("--source-ranges={}", rule.cidr);
            let tags = format!("--target-tags={}", group.id);
            let result = self
                .cli
                .text(&self.args(&[
                    "firewall-rules",
                    "create",
                    &name,
                    "--direction=INGRESS",
                    &allow,
                    &source,
                    &tags,
                ]))
                .await;
            match result {
                Ok(_) => debug!(rule = %name, "Firewall rule created"),
                Err(e) if is_code(&e, ALREADY_EXISTS) => debug!(rule = %name, "Firewall rule already present"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn create_instances(&self, request: &InstanceRequest) -> Result<Vec<HostId>> {
        let public_key = std::fs::read_to_string(self.key_path(&request.key_pair).with_extension("pub"))?;
        let names: Vec<String> = (0..request.count).map(|_| instance_name(request)).collect();
        let zone = format!("--zone={}", self.zone(&request.region));
        let machine = format!("--machine-type={}", request.instance_type);
        let image = format!("--image={}", request.image);
        let tags = format!("--tags={}", request.security_group.id);
        let metadata = format!("--metadata=ssh-keys={}:{}", self.ssh_user, public_key.trim());
        let labels = format!("--labels=nodewiz-cluster={},nodewiz-role={}", request.cluster, request.role);

        let mut args = vec!["instances", "create"];
        args.extend(names.iter().map(String::as_str));
        args.extend([
            zone.as_str(),
            machine.as_str(),
            image.as_str(),
            tags.as_str(),
            metadata.as_str(),
            labels.as_str(),
        ]);
        let created = self.cli.json(&self.args(&args)).await?;
        let ids: Vec<HostId> = created
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|i| i["name"].as_str())
            .map(HostId::new)
            .collect();
        if ids.len() != request.count {
            return Err(self.cli.failure(format!(
                "asked for {} instances in {}, got {}",
                request.count,
                request.region,
                ids.len()
            )));
        }
        info!(region = %request.region, role = %request.role, count = ids.len(), "Instances running");
        Ok(ids)
    }

    async fn public_addresses(&self, region: &str, ids: &[HostId]) -> Result<BTreeMap<HostId, String>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let names: Vec<&str> = ids.iter().map(HostId::as_str).collect();
        let filter = format!("--filter=name:({})", names.join(" "));
        let zones = format!("--zones={}", self.zone(region));
        let value = self.cli.json(&self.args(&["instances", "list", &filter, &zones])).await?;
        Ok(nat_addresses(&value))
    }

    async fn allocate_static_address(&self, region: &str, host: &HostId) -> Result<StaticAddress> {
        let name = format!("{host}-ip");
        let region_flag = format!("--region={region}");
        self.cli
            .text(&self.args(&["addresses", "create", &name, &region_flag]))
            .await?;
        let described = self
            .cli
            .json(&self.args(&["addresses", "describe", &name, &region_flag]))
            .await?;
        let address = described["address"]
            .as_str()
            .ok_or_else(|| self.cli.failure(format!("address {name} has no IP")))?;
        Ok(StaticAddress {
            allocation_id: name,
            address: address.to_string(),
        })
    }

    async fn associate_address(&self, region: &str, host: &HostId, address: &StaticAddress) -> Result<()> {
        let zone = format!("--zone={}", self.zone(region));
        let config = format!("--access-config-name={ACCESS_CONFIG}");
        self.cli
            .text(&self.args(&["instances", "delete-access-config", host.as_str(), &config, &zone]))
            .await?;
        let ip = format!("--address={}", address.address);
        self.cli
            .text(&self.args(&["instances", "add-access-config", host.as_str(), &config, &ip, &zone]))
            .await?;
        Ok(())
    }

    async fn destroy_instance(&self, region: &str, host: &HostId) -> Result<()> {
        let zone = format!("--zone={}", self.zone(region));
        match self.cli.text(&self.args(&["instances", "delete", host.as_str(), &zone])).await {
            Ok(_) => Ok(()),
            Err(e) if is_code(&e, NOT_FOUND) => {
                debug!(region, host = %host, "Instance already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn release_static_address(&self, region: &str, address: &StaticAddress) -> Result<()> {
        let region_flag = format!("--region={region}");
        let name = address.allocation_id.as_str();
        match self.cli.text(&self.args(&["addresses", "delete", name, &region_flag])).await {
            Ok(_) => {
                info!(region, name, address = %address.address, "Released address");
                Ok(())
            }
            Err(e) if is_code(&e, NOT_FOUND) => {
                debug!(region, name, "Address already released");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::host::HostRole;

    fn gcloud() -> GcloudCli {
        GcloudCli::new("gcloud", "proj", "b", "ubuntu", PathBuf::from("/k"), Duration::from_secs(5))
    }

    #[test]
    fn firewall_rules_flatten_per_port_and_range() {
        let firewall: Vec<FirewallRule> = serde_json::from_value(json!([
            { "allowed": [{ "IPProtocol": "tcp", "ports": ["22", "9650"] }], "sourceRanges": ["1.2.3.4/32"] },
            { "allowed": [{ "IPProtocol": "icmp" }], "sourceRanges": ["0.0.0.0/0"] },
            { "allowed": [{ "IPProtocol": "tcp", "ports": ["9000-9100"] }], "sourceRanges": ["0.0.0.0/0"] }
        ]))
        .unwrap();
        let rules = flatten_rules(firewall);
        assert_eq!(rules, vec![IngressRule::tcp(22, "1.2.3.4/32"), IngressRule::tcp(9650, "1.2.3.4/32")]);
    }

    #[test]
    fn rule_names_are_valid_resource_names() {
        let name = rule_name("nodewiz", &IngressRule::tcp(22, "1.2.3.4/32"));
        assert_eq!(name, "nodewiz-tcp-22-1-2-3-4-32");
        let long = rule_name(&"x".repeat(70), &IngressRule::tcp(22, "0.0.0.0/0"));
        assert!(long.len() <= 63);
    }

    #[test]
    fn nat_ip_is_the_public_address() {
        let value = json!([
            { "name": "a", "networkInterfaces": [{ "accessConfigs": [{ "natIP": "5.5.5.5" }] }] },
            { "name": "b", "networkInterfaces": [{ "accessConfigs": [] }] }
        ]);
        let found = nat_addresses(&value);
        assert_eq!(found.len(), 1);
        assert_eq!(found[&HostId::new("a")], "5.5.5.5");
    }

    #[test]
    fn zone_and_flags() {
        let g = gcloud();
        assert_eq!(g.zone("us-east1"), "us-east1-b");
        let args = g.args(&["instances", "list"]);
        assert_eq!(args[0], "compute");
        assert!(args.contains(&"--project=proj".to_string()));
    }

    #[test]
    fn instance_names_are_unique_and_labelled() {
        let request = InstanceRequest {
            cluster: "alpha".into(),
            region: "us-east1".into(),
            role: HostRole::Api,
            count: 2,
            instance_type: "e2-standard-8".into(),
            image: "img".into(),
            key_pair: "nodewiz".into(),
            security_group: SecurityGroup {
                id: "nodewiz".into(),
                name: "nodewiz".into(),
                rules: Vec::new(),
            },
        };
        let a = instance_name(&request);
        let b = instance_name(&request);
        assert!(a.starts_with("alpha-api-"));
        assert_ne!(a, b);
    }
}
