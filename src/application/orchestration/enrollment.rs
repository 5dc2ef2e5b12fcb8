//! Node id discovery and validator enrollment.
//!
//! Enrollment transactions all spend from one funding key, so they are
//! issued one host at a time. A host that fails is recorded and the rest
//! are still attempted.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::application::checks::NodeProbe;
use crate::application::context::StageContext;
use crate::domain::host::Host;
use crate::domain::id::{HostId, NodeId, SubnetId};
use crate::domain::result::ResultAggregator;
use crate::domain::validator::StakingPolicy;
use crate::error::{Error, Result};
use crate::port::outbound::chain::{ChainClient, ChainEndpoint, ValidatorEnrollment};
use crate::port::outbound::notifier::Event;
use crate::port::outbound::store::ClusterStore;

/// Which hosts an enrollment pass touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentOutcome {
    pub enrolled: Vec<HostId>,
    pub already: Vec<HostId>,
}

/// Where a host's enrollment goes.
#[derive(Debug, Clone, Copy)]
pub enum Membership<'a> {
    Primary,
    Subnet(&'a SubnetId),
}

impl Membership<'_> {
    fn stage(&self) -> &'static str {
        match self {
            Self::Primary => "primary network enrollment",
            Self::Subnet(_) => "subnet enrollment",
        }
    }
}

/// Fill in missing node ids and persist them in the node records.
///
/// # Errors
///
/// [`Error::HostFailures`] naming every host whose id could not be read.
pub async fn discover_node_ids(
    ctx: &StageContext<'_>,
    probe: &NodeProbe,
    store: &dyn ClusterStore,
    hosts: &mut [Host],
) -> Result<()> {
    let unknown: Vec<Host> = hosts.iter().filter(|h| h.node_id.is_none()).cloned().collect();
    if unknown.is_empty() {
        return Ok(());
    }

    let probe = probe.clone();
    let results = ctx
        .executor
        .run(
            &unknown,
            move |host| {
                let probe = probe.clone();
                async move { probe.node_id(&host).await }
            },
            ctx.cancel,
        )
        .await?;
    let (found, failed) = results.partition();

    for host in hosts.iter_mut() {
        if let Some(node_id) = found.get(&host.id) {
            host.node_id = Some(node_id.clone());
            if let Some(mut record) = store.load_node(&host.id)? {
                record.node_id = Some(node_id.clone());
                store.save_node(&record)?;
            }
            debug!(host = %host.id, node_id = %node_id, "Node id recorded");
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    Err(escalate(ctx, "node id discovery", failed))
}

/// Enroll every host not yet a member, in order.
///
/// A host's terms depend on its index in `hosts`, so the same host set gets
/// the same staggering on every run.
///
/// # Errors
///
/// [`Error::HostFailures`] when any host could not be enrolled, after all
/// hosts were attempted. [`Error::Cancelled`] stops immediately.
pub async fn enroll(
    ctx: &StageContext<'_>,
    chain: &dyn ChainClient,
    endpoint: &ChainEndpoint,
    membership: Membership<'_>,
    hosts: &[Host],
    policy: &StakingPolicy,
) -> Result<EnrollmentOutcome> {
    let results: ResultAggregator<bool> = ResultAggregator::new();

    for (index, host) in hosts.iter().enumerate() {
        ctx.cancel.check()?;
        let outcome = enroll_one(ctx, chain, endpoint, membership, host, index, policy).await;
        if matches!(outcome, Err(Error::Cancelled)) {
            return Err(Error::Cancelled);
        }
        results.add_result(host.id.clone(), outcome);
    }

    let (done, failed) = results.partition();
    if !failed.is_empty() {
        return Err(escalate(ctx, membership.stage(), failed));
    }

    let mut outcome = EnrollmentOutcome::default();
    for host in hosts {
        match done.get(&host.id) {
            Some(true) => outcome.enrolled.push(host.id.clone()),
            Some(false) => outcome.already.push(host.id.clone()),
            None => {}
        }
    }
    info!(
        stage = membership.stage(),
        enrolled = outcome.enrolled.len(),
        already = outcome.already.len(),
        "Enrollment finished"
    );
    Ok(outcome)
}

/// `Ok(true)` when a transaction was issued, `Ok(false)` when the host was
/// already a member.
async fn enroll_one(
    ctx: &StageContext<'_>,
    chain: &dyn ChainClient,
    endpoint: &ChainEndpoint,
    membership: Membership<'_>,
    host: &Host,
    index: usize,
    policy: &StakingPolicy,
) -> Result<bool> {
    let node_id: &NodeId = host.node_id.as_ref().ok_or_else(|| Error::Remote {
        host: host.id.clone(),
        message: "node id unknown".into(),
    })?;

    let member = match membership {
        Membership::Primary => chain.is_primary_validator(endpoint, node_id).await?,
        Membership::Subnet(subnet) => chain.is_subnet_validator(endpoint, subnet, node_id).await?,
    };
    if member {
        debug!(host = %host.id, node_id = %node_id, "Already a validator");
        return Ok(false);
    }

    let enrollment = ValidatorEnrollment {
        node_id: node_id.clone(),
        terms: policy.terms(index, ctx.clock.utc_now()),
    };
    let tx = match membership {
        Membership::Primary => chain.add_primary_validator(endpoint, &enrollment).await?,
        Membership::Subnet(subnet) => chain.add_subnet_validator(endpoint, subnet, &enrollment).await?,
    };
    info!(
        host = %host.id,
        node_id = %node_id,
        tx = %tx,
        weight = enrollment.terms.weight,
        end = %enrollment.terms.end,
        "Validator enrolled"
    );
    Ok(true)
}

fn escalate(ctx: &StageContext<'_>, stage: &str, failed: BTreeMap<HostId, Error>) -> Error {
    let failures: BTreeMap<HostId, String> = failed
        .into_iter()
        .map(|(id, e)| (id, e.to_string()))
        .collect();
    for (host, reason) in &failures {
        ctx.emit(Event::HostFailed {
            host: host.clone(),
            stage: stage.to_string(),
            reason: reason.clone(),
        });
    }
    Error::HostFailures {
        stage: stage.to_string(),
        failures,
    }
}
