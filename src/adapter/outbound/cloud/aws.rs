//! [`CloudProvider`] for AWS through the `aws` command-line tool.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::cli::{is_code, CliRunner};
use super::keyfile::write_private_key;
use crate::domain::cluster::KeyPair;
use crate::domain::host::CloudKind;
use crate::domain::id::HostId;
use crate::domain::security::{normalize_cidr, IngressRule, Protocol};
use crate::error::Result;
use crate::port::outbound::cloud::{CloudProvider, InstanceRequest, SecurityGroup, StaticAddress};

const KEY_NOT_FOUND: &str = "InvalidKeyPair.NotFound";
const DUPLICATE_RULE: &str = "InvalidPermission.Duplicate";
const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";
const ALLOCATION_NOT_FOUND: &str = "InvalidAllocationID.NotFound";

/// AWS EC2 driven through the `aws` CLI.
#[derive(Debug, Clone)]
pub struct AwsCli {
    cli: CliRunner,
    profile: String,
    /// Where private keys of created key pairs are written.
    key_dir: PathBuf,
}

impl AwsCli {
    #[must_use]
    pub fn new(binary: &str, profile: &str, key_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            cli: CliRunner::new(CloudKind::Aws, binary, Some(profile.to_string()), timeout),
            profile: profile.to_string(),
            key_dir,
        }
    }

    fn args(&self, region: &str, parts: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = parts.iter().map(|p| (*p).to_string()).collect();
        args.extend([
            "--region".to_string(),
            region.to_string(),
            "--profile".to_string(),
            self.profile.clone(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        args
    }

    fn key_path(&self, region: &str, name: &str) -> PathBuf {
        self.key_dir.join(format!("aws-{region}-{name}.pem"))
    }

    async fn find_security_group(&self, region: &str, name: &str) -> Result<Option<SecurityGroup>> {
        let filter = format!("Name=group-name,Values={name}");
        let value = self
            .cli
            .json(&self.args(region, &["ec2", "describe-security-groups", "--filters", &filter]))
            .await?;
        let parsed: DescribeGroups = serde_json::from_value(value).map_err(|e| self.cli.failure(e.to_string()))?;
        Ok(parsed.security_groups.into_iter().next().map(DescribedGroup::into_group))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeGroups {
    #[serde(default)]
    security_groups: Vec<DescribedGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedGroup {
    group_id: String,
    group_name: String,
    #[serde(default)]
    ip_permissions: Vec<IpPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpPermission {
    ip_protocol: String,
    #[serde(default)]
    from_port: Option<i64>,
    #[serde(default)]
    to_port: Option<i64>,
    #[serde(default)]
    ip_ranges: Vec<IpRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpRange {
    cidr_ip: String,
}

impl DescribedGroup {
    /// Single-port tcp/udp permissions become rules; ranges and other
    /// protocols are not something this tool manages and are skipped.
    fn into_group(self) -> SecurityGroup {
        let mut rules = Vec::new();
        for permission in self.ip_permissions {
            let protocol = match permission.ip_protocol.as_str() {
                "tcp" => Protocol::Tcp,
                "udp" => Protocol::Udp,
                _ => continue,
            };
            let (Some(from), Some(to)) = (permission.from_port, permission.to_port) else {
                continue;
            };
            let Ok(port) = u16::try_from(from) else { continue };
            if from != to {
                continue;
            }
            for range in permission.ip_ranges {
                rules.push(IngressRule {
                    protocol,
                    port,
                    cidr: normalize_cidr(&range.cidr_ip),
                });
            }
        }
        SecurityGroup {
            id: self.group_id,
            name: self.group_name,
            rules,
        }
    }
}

fn ip_permissions(rules: &[IngressRule]) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "IpProtocol": rule.protocol.to_string(),
                    "FromPort": rule.port,
                    "ToPort": rule.port,
                    "IpRanges": [{ "CidrIp": rule.cidr, "Description": "nodewiz" }],
                })
            })
            .collect(),
    )
}

fn instance_ids(value: &Value) -> Vec<HostId> {
    value["Instances"]
        .as_array()
        .map(|instances| {
            instances
                .iter()
                .filter_map(|i| i["InstanceId"].as_str())
                .map(HostId::new)
                .collect()
        })
        .unwrap_or_default()
}

fn addresses(value: &Value) -> BTreeMap<HostId, String> {
    let mut out = BTreeMap::new();
    for reservation in value["Reservations"].as_array().into_iter().flatten() {
        for instance in reservation["Instances"].as_array().into_iter().flatten() {
            if let (Some(id), Some(address)) = (instance["InstanceId"].as_str(), instance["PublicIpAddress"].as_str()) {
                out.insert(HostId::new(id), address.to_string());
            }
        }
    }
    out
}

fn tag_spec(request: &InstanceRequest) -> String {
    format!(
        "ResourceType=instance,Tags=[{{Key=Name,Value={}-{}}},{{Key=nodewiz:cluster,Value={}}},{{Key=nodewiz:role,Value={}}}]",
        request.cluster, request.role, request.cluster, request.role
    )
}

#[async_trait]
impl CloudProvider for AwsCli {
    fn kind(&self) -> CloudKind {
        CloudKind::Aws
    }

    async fn ensure_key_pair(&self, region: &str, name: &str) -> Result<KeyPair> {
        let path = self.key_path(region, name);
        let described = self
            .cli
            .json(&self.args(region, &["ec2", "describe-key-pairs", "--key-names", name]))
            .await;
        match described {
            Ok(_) if path.exists() => {
                return Ok(KeyPair {
                    name: name.to_string(),
                    private_key: path,
                });
            }
            Ok(_) => {
                return Err(self.cli.failure(format!(
                    "key pair {name} exists in {region} but its private key is not at {}",
                    path.display()
                )));
            }
            Err(e) if is_code(&e, KEY_NOT_FOUND) => {}
            Err(e) => return Err(e),
        }

        let created = self
            .cli
            .json(&self.args(region, &["ec2", "create-key-pair", "--key-name", name]))
            .await?;
        let material = created["KeyMaterial"]
            .as_str()
            .ok_or_else(|| self.cli.failure("create-key-pair returned no key material".into()))?;
        write_private_key(&path, material)?;
        info!(region, name, path = %path.display(), "Created key pair");
        Ok(KeyPair {
            name: name.to_string(),
            private_key: path,
        })
    }

    async fn ensure_security_group(&self, region: &str, name: &str) -> Result<SecurityGroup> {
        if let Some(group) = self.find_security_group(region, name).await? {
            return Ok(group);
        }
        let created = self
            .cli
            .json(&self.args(
                region,
                &["ec2", "create-security-group", "--group-name", name, "--description", "nodewiz cluster"],
            ))
            .await?;
        let id = created["GroupId"]
            .as_str()
            .ok_or_else(|| self.cli.failure("create-security-group returned no GroupId".into()))?;
        info!(region, name, id, "Created security group");
        Ok(SecurityGroup {
            id: id.to_string(),
            name: name.to_string(),
            rules: Vec::new(),
        })
    }

    async fn authorize_ingress(&self, region: &str, group: &SecurityGroup, rules: &[IngressRule]) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let permissions = ip_permissions(rules).to_string();
        let result = self
            .cli
            .text(&self.args(
                region,
                &[
                    "ec2",
                    "authorize-security-group-ingress",
                    "--group-id",
                    &group.id,
                    "--ip-permissions",
                    &permissions,
                ],
            ))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_code(&e, DUPLICATE_RULE) => {
                debug!(region, group = %group.id, "Ingress rules already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_instances(&self, request: &InstanceRequest) -> Result<Vec<HostId>> {
        let count = request.count.to_string();
        let tags = tag_spec(request);
        let launched = self
            .cli
            .json(&self.args(
                &request.region,
                &[
                    "ec2",
                    "run-instances",
                    "--image-id",
                    &request.image,
                    "--instance-type",
                    &request.instance_type,
                    "--key-name",
                    &request.key_pair,
                    "--security-group-ids",
                    &request.security_group.id,
                    "--count",
                    &count,
                    "--tag-specifications",
                    &tags,
                ],
            ))
            .await?;
        let ids = instance_ids(&launched);
        if ids.len() != request.count {
            return Err(self.cli.failure(format!(
                "asked for {} instances in {}, got {}",
                request.count,
                request.region,
                ids.len()
            )));
        }

        let mut wait = vec!["ec2", "wait", "instance-running", "--instance-ids"];
        wait.extend(ids.iter().map(HostId::as_str));
        self.cli.text(&self.args(&request.region, &wait)).await?;
        info!(region = %request.region, role = %request.role, count = ids.len(), "Instances running");
        Ok(ids)
    }

    async fn public_addresses(&self, region: &str, ids: &[HostId]) -> Result<BTreeMap<HostId, String>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut describe = vec!["ec2", "describe-instances", "--instance-ids"];
        describe.extend(ids.iter().map(HostId::as_str));
        let value = self.cli.json(&self.args(region, &describe)).await?;
        Ok(addresses(&value))
    }

    async fn allocate_static_address(&self, region: &str, host: &HostId) -> Result<StaticAddress> {
        let value = self
            .cli
            .json(&self.args(region, &["ec2", "allocate-address", "--domain", "vpc"]))
            .await?;
        let (Some(allocation_id), Some(address)) = (value["AllocationId"].as_str(), value["PublicIp"].as_str()) else {
            return Err(self.cli.failure(format!("allocate-address for {host} returned no address")));
        };
        Ok(StaticAddress {
            allocation_id: allocation_id.to_string(),
            address: address.to_string(),
        })
    }

    async fn associate_address(&self, region: &str, host: &HostId, address: &StaticAddress) -> Result<()> {
        self.cli
            .text(&self.args(
                region,
                &[
                    "ec2",
                    "associate-address",
                    "--instance-id",
                    host.as_str(),
                    "--allocation-id",
                    &address.allocation_id,
                ],
            ))
            .await?;
        Ok(())
    }

    async fn destroy_instance(&self, region: &str, host: &HostId) -> Result<()> {
        let result = self
            .cli
            .text(&self.args(region, &["ec2", "terminate-instances", "--instance-ids", host.as_str()]))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_code(&e, INSTANCE_NOT_FOUND) => {
                debug!(region, host = %host, "Instance already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn release_static_address(&self, region: &str, address: &StaticAddress) -> Result<()> {
        let allocation = address.allocation_id.as_str();
        let described = self
            .cli
            .json(&self.args(region, &["ec2", "describe-addresses", "--allocation-ids", allocation]))
            .await;
        let described = match described {
            Ok(value) => value,
            Err(e) if is_code(&e, ALLOCATION_NOT_FOUND) => {
                debug!(region, allocation, "Address already released");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if let Some(association) = association_id(&described) {
            self.cli
                .text(&self.args(region, &["ec2", "disassociate-address", "--association-id", association]))
                .await?;
        }
        match self
            .cli
            .text(&self.args(region, &["ec2", "release-address", "--allocation-id", allocation]))
            .await
        {
            Ok(_) => {
                info!(region, allocation, address = %address.address, "Released address");
                Ok(())
            }
            Err(e) if is_code(&e, ALLOCATION_NOT_FOUND) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Association of the first address in a `describe-addresses` reply.
fn association_id(described: &Value) -> Option<&str> {
    described["Addresses"]
        .as_array()?
        .first()?
        .get("AssociationId")?
        .as_str()
}
