//! Security group reconciliation.

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::security::{missing_rules, IngressRule};
use crate::error::Result;
use crate::port::outbound::cloud::{CloudProvider, SecurityGroup};

/// What reconciling one group changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub group: String,
    pub added: Vec<IngressRule>,
    pub present: usize,
}

/// Make sure `name` in `region` carries every rule in `required`.
///
/// Only missing rules are sent to the provider, so re-running against a
/// group that already matches makes no changes.
pub async fn reconcile_security_group(
    cloud: &dyn CloudProvider,
    region: &str,
    name: &str,
    required: &[IngressRule],
) -> Result<(SecurityGroup, ReconcileReport)> {
    let mut group = cloud.ensure_security_group(region, name).await?;
    let added = missing_rules(required, &group.rules);
    let present = required.len() - required.iter().filter(|r| added.contains(r)).count();

    if added.is_empty() {
        debug!(region, group = %group.name, "Security group up to date");
    } else {
        cloud.authorize_ingress(region, &group, &added).await?;
        info!(region, group = %group.name, added = added.len(), "Security group rules added");
        group.rules.extend(added.iter().cloned());
    }

    let report = ReconcileReport {
        group: group.id.clone(),
        added,
        present,
    };
    Ok((group, report))
}
