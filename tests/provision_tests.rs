//! Provisioning pipeline over a simulated fleet.

mod support;

use std::sync::Arc;

use rand::rngs::OsRng;

use nodewiz::application::provision::pipeline::{ProvisionTarget, ProvisioningPipeline};
use nodewiz::application::provision::scripts;
use nodewiz::domain::cluster::NetworkKind;
use nodewiz::domain::host::{Host, HostRole};
use nodewiz::domain::id::SubnetId;
use nodewiz::domain::keys::StakingKeys;
use nodewiz::domain::report::ProvisionStage;
use nodewiz::port::outbound::notifier::Event;
use nodewiz::port::outbound::store::KeyVault;
use nodewiz::testkit::chain::FakeChain;
use nodewiz::testkit::domain::{host, validators, RecordingNotifier};
use nodewiz::testkit::fleet::FakeFleet;
use nodewiz::testkit::rig::provision_settings;
use nodewiz::testkit::store::MemoryVault;

use support::hosts::{ids, Harness};

fn fleet(setup: impl FnOnce(FakeFleet) -> FakeFleet) -> Arc<FakeFleet> {
    Arc::new(setup(FakeFleet::new(Arc::new(FakeChain::new()))))
}

fn target(hosts: Vec<Host>) -> ProvisionTarget {
    ProvisionTarget::from_inventory(&hosts, NetworkKind::Devnet)
}

#[tokio::test]
async fn unreachable_host_is_reported_and_the_rest_run() {
    let fleet = fleet(|f| f.with_unreachable("v3"));
    let vault = Arc::new(MemoryVault::new());
    let pipeline = ProvisioningPipeline::new(fleet.clone(), vault.clone(), provision_settings());
    let harness = Harness::new(Some(4));
    let notifier = RecordingNotifier::new();

    let report = pipeline
        .run(&harness.context(&notifier), &target(validators(6)))
        .await
        .unwrap();

    assert_eq!(report.summary(), "5/6 hosts running");
    assert_eq!(report.running, ids(&["v0", "v1", "v2", "v4", "v5"]));
    let failure = &report.failed[&ids(&["v3"])[0]];
    assert_eq!(failure.stage, ProvisionStage::Reachable);
    assert!(failure.error.contains("not reachable"));

    for id in &report.running {
        assert!(fleet.is_running(id), "{id} should run a node");
        assert!(vault.holds(id));
    }
    assert!(fleet.commands_on(&ids(&["v3"])[0]).is_empty());
    assert_eq!(notifier.host_failures(), vec![(ids(&["v3"])[0].clone(), "reachable".to_string())]);
    assert_eq!(
        notifier.count(|e| matches!(e, Event::ProvisionSummary { running: 5, total: 6 })),
        1
    );
}

#[tokio::test]
async fn host_dropped_at_install_keeps_its_stage() {
    let fleet = fleet(|f| f.with_failing_command(Some("v1"), "docker pull"));
    let pipeline = ProvisioningPipeline::new(fleet.clone(), Arc::new(MemoryVault::new()), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();

    let report = pipeline
        .run(&harness.context(&notifier), &target(validators(3)))
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[&ids(&["v1"])[0]].stage, ProvisionStage::SoftwareInstalled);
    assert!(!fleet.is_running(&ids(&["v1"])[0]));
    assert!(report
        .failures()
        .values()
        .all(|f| f.starts_with("software-installed:")));
}

#[tokio::test]
async fn staking_keys_are_uploaded_before_the_node_starts() {
    let fleet = fleet(|f| f);
    let pipeline = ProvisioningPipeline::new(fleet.clone(), Arc::new(MemoryVault::new()), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();

    let report = pipeline
        .run(&harness.context(&notifier), &target(validators(1)))
        .await
        .unwrap();
    assert!(report.is_complete());

    let v0 = &ids(&["v0"])[0];
    let uploads = fleet.uploads_to(v0);
    assert!(uploads.contains(&format!("{}/staker.key", scripts::STAKING_DIR)));
    assert!(uploads.contains(&format!("{}/signer.key", scripts::STAKING_DIR)));

    let commands = fleet.commands_on(v0);
    assert_eq!(commands.first(), Some(&scripts::prepare_dirs()));
    assert_eq!(commands.last(), Some(&scripts::compose_up(scripts::NODE_COMPOSE)));
}

#[tokio::test]
async fn existing_keys_are_reused() {
    let keys = StakingKeys::generate(&mut OsRng);
    let vault = Arc::new(MemoryVault::new().with_keys("v0", keys.clone()));
    let pipeline = ProvisioningPipeline::new(fleet(|f| f), vault.clone(), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();

    pipeline
        .run(&harness.context(&notifier), &target(validators(1)))
        .await
        .unwrap();

    let stored = vault.load(&ids(&["v0"])[0]).unwrap().unwrap();
    assert_eq!(stored.fingerprint(), keys.fingerprint());
}

#[tokio::test]
async fn shared_key_material_drops_both_hosts() {
    let keys = StakingKeys::generate(&mut OsRng);
    let vault = MemoryVault::new()
        .with_keys("v0", keys.clone())
        .with_keys("v2", keys);
    let pipeline = ProvisioningPipeline::new(fleet(|f| f), Arc::new(vault), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();

    let report = pipeline
        .run(&harness.context(&notifier), &target(validators(3)))
        .await
        .unwrap();

    assert_eq!(report.running, ids(&["v1"]));
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .values()
        .all(|f| f.stage == ProvisionStage::Credentialed));
}

#[tokio::test]
async fn tracked_subnets_land_in_the_node_config() {
    let fleet = fleet(|f| f);
    let pipeline = ProvisioningPipeline::new(fleet.clone(), Arc::new(MemoryVault::new()), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let mut target = target(validators(2));
    target.tracked = vec![SubnetId::new("subnet-7")];

    pipeline.run(&harness.context(&notifier), &target).await.unwrap();

    for id in ids(&["v0", "v1"]) {
        assert_eq!(fleet.tracked(&id), vec![SubnetId::new("subnet-7")]);
        let config = fleet.file(&id, scripts::NODE_CONFIG).unwrap();
        assert!(config.contains("\"network-id\": \"local\""));
    }
}

#[tokio::test]
async fn monitoring_host_scrapes_every_running_node() {
    let fleet = fleet(|f| f.with_unreachable("v1"));
    let pipeline = ProvisioningPipeline::new(fleet.clone(), Arc::new(MemoryVault::new()), provision_settings());
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let mut hosts = validators(3);
    hosts.push(host("mon", HostRole::Monitoring));

    let report = pipeline
        .run(&harness.context(&notifier), &target(hosts.clone()))
        .await
        .unwrap();

    assert_eq!(report.summary(), "3/4 hosts running");
    assert!(report.running.contains(&ids(&["mon"])[0]));

    let targets = fleet
        .file(&ids(&["mon"])[0], scripts::MONITORING_TARGETS)
        .unwrap();
    let address = |id: &str| {
        hosts
            .iter()
            .find(|h| h.id.as_str() == id)
            .and_then(|h| h.address.clone())
            .unwrap()
    };
    assert!(targets.contains(&address("v0")));
    assert!(targets.contains(&address("v2")));
    assert!(!targets.contains(&address("v1")));
}
