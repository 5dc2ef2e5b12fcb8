//! Ingress rules and the diff used to reconcile a security group.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Source range that matches every address.
pub const ANYWHERE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// One allowed inbound flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub port: u16,
    pub cidr: String,
}

impl IngressRule {
    pub fn tcp(port: u16, cidr: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port,
            cidr: normalize_cidr(&cidr.into()),
        }
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} from {}", self.protocol, self.port, self.cidr)
    }
}

/// Ports the cluster exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePorts {
    pub ssh: u16,
    pub api: u16,
    pub staking: u16,
    pub metrics: u16,
    pub dashboard: u16,
}

/// Bare addresses become single-host ranges.
#[must_use]
pub fn normalize_cidr(cidr: &str) -> String {
    let cidr = cidr.trim();
    if cidr.contains('/') {
        cidr.to_string()
    } else if cidr.contains(':') {
        format!("{cidr}/128")
    } else {
        format!("{cidr}/32")
    }
}

/// Whether `input` is an address or a CIDR range with a prefix that fits it.
#[must_use]
pub fn is_cidr(input: &str) -> bool {
    let input = input.trim();
    let (address, prefix) = match input.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (input, None),
    };
    let max = match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => 32,
        Ok(IpAddr::V6(_)) => 128,
        Err(_) => return false,
    };
    prefix.map_or(true, |p| p.parse::<u8>().is_ok_and(|bits| bits <= max))
}

/// Rules that give `cidr` the same access the operator range has.
#[must_use]
pub fn operator_rules(ports: &ServicePorts, cidr: &str) -> Vec<IngressRule> {
    vec![
        IngressRule::tcp(ports.ssh, cidr),
        IngressRule::tcp(ports.api, cidr),
        IngressRule::tcp(ports.metrics, cidr),
        IngressRule::tcp(ports.dashboard, cidr),
    ]
}

/// Rules every cluster security group must carry.
#[must_use]
pub fn required_rules(ports: &ServicePorts, operator_cidr: &str, public_api: bool) -> Vec<IngressRule> {
    let api_source = if public_api { ANYWHERE } else { operator_cidr };
    vec![
        IngressRule::tcp(ports.ssh, operator_cidr),
        IngressRule::tcp(ports.api, api_source),
        IngressRule::tcp(ports.staking, ANYWHERE),
        IngressRule::tcp(ports.metrics, operator_cidr),
        IngressRule::tcp(ports.dashboard, operator_cidr),
    ]
}

/// Required rules absent from `existing`, deduplicated and sorted.
#[must_use]
pub fn missing_rules(required: &[IngressRule], existing: &[IngressRule]) -> Vec<IngressRule> {
    let present: BTreeSet<&IngressRule> = existing.iter().collect();
    let missing: BTreeSet<IngressRule> = required
        .iter()
        .filter(|rule| !present.contains(rule))
        .cloned()
        .collect();
    missing.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> ServicePorts {
        ServicePorts {
            ssh: 22,
            api: 9650,
            staking: 9651,
            metrics: 9090,
            dashboard: 3000,
        }
    }

    #[test]
    fn required_rules_scope_api_to_operator_unless_public() {
        let private = required_rules(&ports(), "1.2.3.4", false);
        assert!(private.contains(&IngressRule::tcp(9650, "1.2.3.4/32")));

        let public = required_rules(&ports(), "1.2.3.4/32", true);
        assert!(public.contains(&IngressRule::tcp(9650, ANYWHERE)));
        assert!(public.contains(&IngressRule::tcp(9651, ANYWHERE)));
    }

    #[test]
    fn missing_rules_is_set_difference() {
        let required = required_rules(&ports(), "1.2.3.4/32", false);
        let existing = vec![IngressRule::tcp(22, "1.2.3.4/32"), IngressRule::tcp(8080, ANYWHERE)];

        let missing = missing_rules(&required, &existing);
        assert_eq!(missing.len(), required.len() - 1);
        assert!(!missing.contains(&IngressRule::tcp(22, "1.2.3.4/32")));
    }

    #[test]
    fn missing_rules_dedups_required() {
        let rule = IngressRule::tcp(22, "1.2.3.4/32");
        let missing = missing_rules(&[rule.clone(), rule.clone()], &[]);
        assert_eq!(missing, vec![rule]);
    }

    #[test]
    fn normalize_cidr_handles_bare_addresses() {
        assert_eq!(normalize_cidr("10.0.0.1"), "10.0.0.1/32");
        assert_eq!(normalize_cidr("::1"), "::1/128");
        assert_eq!(normalize_cidr("10.0.0.0/8"), "10.0.0.0/8");
    }

    #[test]
    fn cidr_check_accepts_addresses_and_bounded_prefixes() {
        assert!(is_cidr("10.0.0.1"));
        assert!(is_cidr("10.0.0.0/8"));
        assert!(is_cidr("2001:db8::/32"));
        assert!(!is_cidr("10.0.0.1/33"));
        assert!(!is_cidr("10.0.0.1/33x"));
        assert!(!is_cidr("my-laptop"));
    }

    #[test]
    fn operator_rules_leave_staking_alone() {
        let rules = operator_rules(&ports(), "5.6.7.8");
        assert_eq!(rules.len(), 4);
        assert!(rules.iter().all(|r| r.cidr == "5.6.7.8/32"));
        assert!(!rules.iter().any(|r| r.port == 9651));
    }
}
