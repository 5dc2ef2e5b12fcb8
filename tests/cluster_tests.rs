//! Cluster creation, rollback, security groups and teardown.

mod support;

use miette::Diagnostic;

use nodewiz::application::cancel::{cancel_pair, CancelSignal};
use nodewiz::application::cluster::security::reconcile_security_group;
use nodewiz::domain::host::{CloudKind, HostRole};
use nodewiz::domain::security::IngressRule;
use nodewiz::error::Error;
use nodewiz::port::outbound::notifier::Event;
use nodewiz::port::outbound::store::ClusterStore;
use nodewiz::testkit::cloud::FakeCloud;
use nodewiz::testkit::domain::{cluster_spec, RecordingNotifier};
use nodewiz::testkit::rig::{cluster_settings, Rig, OPERATOR_CIDR};

use support::hosts::ids;

#[tokio::test]
async fn create_spreads_hosts_over_regions_and_persists_them() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 2);

    let report = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.hosts, ids(&["i-0001", "i-0002", "i-0003", "i-0004"]));
    assert_eq!(report.provision.summary(), "4/4 hosts running");

    let state = rig.store.load_cluster("alpha").unwrap();
    assert_eq!(state.regions, vec!["us-east-1".to_string(), "eu-west-1".to_string()]);
    assert_eq!(state.host_ids().len(), 4);
    assert_eq!(rig.store.node_ids().len(), 4);

    let inventory = rig.store.load_inventory(&state).unwrap();
    assert!(inventory.iter().all(|h| h.address.is_some()));
    assert!(inventory
        .iter()
        .filter(|h| h.region == "eu-west-1")
        .all(|h| h.ssh_key.ends_with("eu-west-1/nodewiz.pem")));
    assert_eq!(
        notifier.count(|e| matches!(e, Event::InstancesCreated { count: 2, .. })),
        2
    );
}

#[tokio::test]
async fn failing_region_rolls_back_everything_created() {
    let rig = Rig::builder()
        .cloud(FakeCloud::aws().with_failing_region("ap-south-1"))
        .build();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1", "ap-south-1"], 2);

    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap_err();

    let (source, rollback) = match err {
        Error::Provisioning { source, rollback } => (source, rollback),
        other => panic!("expected provisioning error, got {other:?}"),
    };
    assert!(matches!(*source, Error::Cloud { .. }));
    assert!(rollback.is_clean());
    assert_eq!(rollback.destroyed.len(), 4);
    assert_eq!(rollback.total(), rig.cloud.created().len());

    assert!(rig.cloud.live().is_empty());
    assert!(rig.store.load_registry().unwrap().clusters.is_empty());
    assert!(rig.store.node_ids().is_empty());
    assert_eq!(rig.store.registry_writes(), 0);
    assert_eq!(
        notifier.count(|e| matches!(e, Event::RollbackCompleted(_))),
        1
    );
}

#[tokio::test]
async fn rollback_lists_instances_it_could_not_destroy() {
    let rig = Rig::builder()
        .cloud(
            FakeCloud::aws()
                .with_failing_region("eu-west-1")
                .with_undestroyable("i-0002"),
        )
        .build();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 3);

    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap_err();

    let Error::Provisioning { rollback, .. } = &err else {
        panic!("expected provisioning error, got {err:?}");
    };
    assert_eq!(rollback.destroyed, ids(&["i-0001", "i-0003"]));
    assert_eq!(rollback.failed.keys().cloned().collect::<Vec<_>>(), ids(&["i-0002"]));
    assert_eq!(rig.cloud.live(), ids(&["i-0002"]));
    assert!(err.to_string().contains("i-0002"));
}

#[tokio::test]
async fn expired_credentials_surface_without_creating_anything() {
    let rig = Rig::builder()
        .cloud(FakeCloud::aws().with_expired_credentials())
        .build();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 1);

    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(err.is_credential_expired());
    assert!(err.is_permanent());
    assert_eq!(rig.cloud.create_calls(), 0);

    let help = err.help().map(|h| h.to_string());
    assert_eq!(help.as_deref(), Some("refresh credentials"));
    let rendered = format!("{:?}", miette::Report::new(err));
    assert!(rendered.contains("refresh credentials"));
}

#[tokio::test]
async fn cancelled_create_leaves_no_instances() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let err = rig
        .wizard
        .create_cluster(
            "alpha",
            &cluster_spec(CloudKind::Aws, &["us-east-1"], 2),
            &notifier,
            &signal,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(rig.cloud.live().is_empty());
    assert!(rig.store.load_registry().unwrap().clusters.is_empty());
}

#[tokio::test]
async fn duplicate_cluster_name_is_rejected() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 1);
    let never = CancelSignal::never();

    rig.wizard.create_cluster("alpha", &spec, &notifier, &never).await.unwrap();
    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &never)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::State(_)));
    assert_eq!(rig.cloud.created().len(), 1);
}

#[tokio::test]
async fn monitoring_host_lives_in_the_first_region() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 1);
    spec.monitoring = true;
    spec.regions[1].apis = 1;

    let report = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap();

    let roles: Vec<_> = report
        .hosts
        .iter()
        .map(|id| rig.cloud.role_of(id).unwrap())
        .collect();
    assert_eq!(
        roles,
        vec![HostRole::Validator, HostRole::Monitoring, HostRole::Validator, HostRole::Api]
    );
    let state = rig.store.load_cluster("alpha").unwrap();
    assert_eq!(state.ids_with_role(HostRole::Monitoring), ids(&["i-0002"]));
}

#[tokio::test]
async fn static_addresses_are_recorded() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 2);
    spec.static_addresses = true;

    rig.wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap();

    for id in ids(&["i-0001", "i-0002"]) {
        let record = rig.store.load_node(&id).unwrap().unwrap();
        assert!(record.static_address);
        assert_eq!(record.allocation_id, Some(format!("eipalloc-{id}")));
        assert!(record.address.unwrap().starts_with("203.0.113."));
    }
    assert_eq!(rig.cloud.live_addresses().len(), 2);
}

#[tokio::test]
async fn failed_association_releases_every_reserved_address() {
    let rig = Rig::builder()
        .cloud(FakeCloud::aws().with_failing_association("i-0002"))
        .build();
    let notifier = RecordingNotifier::new();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 2);
    spec.static_addresses = true;

    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap_err();

    let Error::Provisioning { rollback, .. } = &err else {
        panic!("expected provisioning error, got {err:?}");
    };
    assert!(rollback.is_clean());
    assert_eq!(rollback.destroyed, ids(&["i-0001", "i-0002"]));
    assert!(rig.cloud.live().is_empty());
    assert!(rig.cloud.live_addresses().is_empty());
}

#[tokio::test]
async fn rollback_reports_addresses_it_could_not_release() {
    let rig = Rig::builder()
        .cloud(
            FakeCloud::aws()
                .with_failing_region("eu-west-1")
                .with_unreleasable_address("i-0001"),
        )
        .build();
    let notifier = RecordingNotifier::new();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 2);
    spec.static_addresses = true;

    let err = rig
        .wizard
        .create_cluster("alpha", &spec, &notifier, &CancelSignal::never())
        .await
        .unwrap_err();

    let Error::Provisioning { rollback, .. } = &err else {
        panic!("expected provisioning error, got {err:?}");
    };
    assert_eq!(rollback.destroyed, ids(&["i-0002"]));
    assert_eq!(rollback.failed.keys().cloned().collect::<Vec<_>>(), ids(&["i-0001"]));
    assert_eq!(rollback.total(), 2);
    assert!(rig.cloud.live().is_empty());
    assert_eq!(rig.cloud.live_addresses(), vec!["eipalloc-i-0001".to_string()]);
}

#[tokio::test]
async fn security_group_reconciliation_is_idempotent() {
    let cloud = FakeCloud::aws();
    let required = cluster_settings().required_rules(false);

    let (_, first) = reconcile_security_group(&cloud, "us-east-1", "nodewiz", &required)
        .await
        .unwrap();
    let (group, second) = reconcile_security_group(&cloud, "us-east-1", "nodewiz", &required)
        .await
        .unwrap();

    assert_eq!(first.added.len(), required.len());
    assert!(second.added.is_empty());
    assert_eq!(second.present, required.len());
    assert_eq!(cloud.authorize_calls(), 1);
    assert_eq!(group.rules.len(), required.len());
    assert!(cloud
        .group_rules("us-east-1", "nodewiz")
        .iter()
        .any(|r| r.cidr == OPERATOR_CIDR));
}

#[tokio::test]
async fn second_cluster_in_a_region_reuses_the_group() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 1);
    let never = CancelSignal::never();

    rig.wizard.create_cluster("alpha", &spec, &notifier, &never).await.unwrap();
    rig.wizard.create_cluster("beta", &spec, &notifier, &never).await.unwrap();

    assert_eq!(rig.cloud.authorize_calls(), 1);
}

#[tokio::test]
async fn destroy_removes_instances_records_and_keys() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();
    rig.wizard
        .create_cluster("alpha", &cluster_spec(CloudKind::Aws, &["us-east-1"], 3), &notifier, &never)
        .await
        .unwrap();
    assert_eq!(rig.vault.len(), 3);

    let report = rig.wizard.destroy_cluster("alpha", &notifier, &never).await.unwrap();

    assert!(report.removed);
    assert_eq!(report.destroyed.len(), 3);
    assert!(report.failed.is_empty());
    assert!(rig.cloud.live().is_empty());
    assert!(rig.store.node_ids().is_empty());
    assert!(rig.vault.is_empty());
    assert!(matches!(
        rig.store.load_cluster("alpha"),
        Err(Error::ClusterNotFound(_))
    ));
}

#[tokio::test]
async fn destroy_releases_static_addresses() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 1);
    spec.static_addresses = true;
    rig.wizard.create_cluster("alpha", &spec, &notifier, &never).await.unwrap();
    assert_eq!(rig.cloud.live_addresses().len(), 2);

    let report = rig.wizard.destroy_cluster("alpha", &notifier, &never).await.unwrap();

    assert!(report.removed);
    assert!(report.failed.is_empty());
    assert!(rig.cloud.live().is_empty());
    assert!(rig.cloud.live_addresses().is_empty());
}

#[tokio::test]
async fn unreleased_address_keeps_the_host_for_another_destroy() {
    let rig = Rig::builder()
        .cloud(FakeCloud::aws().with_unreleasable_address("i-0001"))
        .build();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();
    let mut spec = cluster_spec(CloudKind::Aws, &["us-east-1"], 2);
    spec.static_addresses = true;
    rig.wizard.create_cluster("alpha", &spec, &notifier, &never).await.unwrap();

    let report = rig.wizard.destroy_cluster("alpha", &notifier, &never).await.unwrap();

    let leaked = &ids(&["i-0001"])[0];
    assert!(!report.removed);
    assert_eq!(report.destroyed, ids(&["i-0002"]));
    assert!(report.failed[leaked].contains("still in use"));
    assert!(rig.cloud.live().is_empty());
    assert_eq!(rig.cloud.live_addresses(), vec!["eipalloc-i-0001".to_string()]);

    let record = rig.store.load_node(leaked).unwrap().unwrap();
    assert_eq!(record.allocation_id.as_deref(), Some("eipalloc-i-0001"));
    assert_eq!(rig.store.load_cluster("alpha").unwrap().host_ids(), vec![leaked.clone()]);
}

#[tokio::test]
async fn destroy_keeps_hosts_that_survived() {
    let rig = Rig::builder()
        .cloud(FakeCloud::aws().with_undestroyable("i-0001"))
        .build();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();
    rig.wizard
        .create_cluster("alpha", &cluster_spec(CloudKind::Aws, &["us-east-1"], 2), &notifier, &never)
        .await
        .unwrap();

    let report = rig.wizard.destroy_cluster("alpha", &notifier, &never).await.unwrap();

    assert!(!report.removed);
    assert_eq!(report.destroyed, ids(&["i-0002"]));
    assert!(report.failed.contains_key(&ids(&["i-0001"])[0]));

    let state = rig.store.load_cluster("alpha").unwrap();
    assert_eq!(state.host_ids(), ids(&["i-0001"]));
    assert!(rig.vault.holds(&ids(&["i-0001"])[0]));
}

#[tokio::test]
async fn destroy_unknown_cluster_fails() {
    let rig = Rig::new();
    let err = rig
        .wizard
        .destroy_cluster("ghost", &RecordingNotifier::new(), &CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClusterNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn gcp_clusters_need_a_gcp_backend() {
    let rig = Rig::new();
    let err = rig
        .wizard
        .create_cluster(
            "alpha",
            &cluster_spec(CloudKind::Gcp, &["us-central1"], 1),
            &RecordingNotifier::new(),
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(rig.cloud.created().is_empty());
}

#[tokio::test]
async fn whitelist_opens_operator_ports_in_every_region() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();
    let spec = cluster_spec(CloudKind::Aws, &["us-east-1", "eu-west-1"], 1);
    rig.wizard
        .create_cluster("alpha", &spec, &notifier, &never)
        .await
        .unwrap();

    let report = rig
        .wizard
        .whitelist("alpha", "198.51.100.7", &notifier, &never)
        .await
        .unwrap();

    assert_eq!(report.cidr, "198.51.100.7/32");
    assert_eq!(report.added.len(), 2);
    assert!(report.added.values().all(|rules| rules.len() == 4));
    assert_eq!(report.rules_added(), 8);
    for region in ["us-east-1", "eu-west-1"] {
        let rules = rig.cloud.group_rules(region, "nodewiz");
        assert!(rules.contains(&IngressRule::tcp(22, "198.51.100.7/32")));
        assert!(!rules.contains(&IngressRule::tcp(9651, "198.51.100.7/32")));
    }

    let again = rig
        .wizard
        .whitelist("alpha", "198.51.100.7/32", &notifier, &never)
        .await
        .unwrap();
    assert_eq!(again.rules_added(), 0);
}

#[tokio::test]
async fn whitelist_rejects_bad_sources_and_unknown_clusters() {
    let rig = Rig::new();
    let notifier = RecordingNotifier::new();
    let never = CancelSignal::never();

    let err = rig
        .wizard
        .whitelist("alpha", "nope", &notifier, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let err = rig
        .wizard
        .whitelist("ghost", "198.51.100.7", &notifier, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClusterNotFound(name) if name == "ghost"));
    assert_eq!(rig.cloud.authorize_calls(), 0);
}
