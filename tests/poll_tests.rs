//! Gate polling against virtual time.

mod support;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use nodewiz::application::cancel::{cancel_pair, CancelHandle};
use nodewiz::application::context::StageContext;
use nodewiz::application::executor::ParallelExecutor;
use nodewiz::application::poll::poll_until;
use nodewiz::domain::gate::{GateKind, Readiness, StageGate};
use nodewiz::error::Error;
use nodewiz::port::outbound::clock::Clock;
use nodewiz::port::outbound::notifier::Event;
use nodewiz::testkit::clock::ManualClock;
use nodewiz::testkit::domain::{validators, RecordingNotifier};

use support::hosts::{ids, Harness};

fn gate(timeout_secs: u64, interval_secs: u64) -> StageGate {
    StageGate::new(
        GateKind::Healthy,
        Duration::from_secs(timeout_secs),
        Duration::from_secs(interval_secs),
    )
}

#[tokio::test]
async fn ready_first_round_never_sleeps() {
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);

    let outcome = poll_until(&ctx, &validators(3), &gate(60, 5), |_| async {
        Ok(Readiness::Ready)
    })
    .await
    .unwrap();

    assert!(outcome.is_satisfied());
    assert_eq!(outcome.rounds, 1);
    assert_eq!(harness.clock.sleep_count(), 0);
    assert_eq!(notifier.count(|e| matches!(e, Event::GateRound(_))), 1);
}

#[tokio::test]
async fn zero_timeout_runs_exactly_one_round() {
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);

    let outcome = poll_until(&ctx, &validators(2), &gate(0, 5), |_| async {
        Ok(Readiness::pending("still starting"))
    })
    .await
    .unwrap();

    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.failing.len(), 2);
    assert_eq!(harness.clock.sleep_count(), 0);
}

#[tokio::test]
async fn never_ready_host_times_out_with_last_reason() {
    let harness = Harness::new(Some(4));
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);
    let gate = gate(60, 5);

    let outcome = poll_until(&ctx, &validators(3), &gate, |h| async move {
        Ok(Readiness::when(h.id.as_str() != "v1", || {
            "health endpoint returned 503".to_string()
        }))
    })
    .await
    .unwrap();

    assert!(!outcome.is_satisfied());
    assert!(outcome.elapsed >= Duration::from_secs(60));
    assert_eq!(outcome.failing.keys().cloned().collect::<Vec<_>>(), ids(&["v1"]));
    assert_eq!(outcome.failing[&ids(&["v1"])[0]], "health endpoint returned 503");
    assert_eq!(outcome.rounds, 13);

    match outcome.into_result(&gate) {
        Err(Error::GateTimeout { gate, failing, .. }) => {
            assert_eq!(gate, GateKind::Healthy);
            assert!(failing.contains_key(&ids(&["v1"])[0]));
        }
        other => panic!("expected gate timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn ready_hosts_are_not_checked_again() {
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);
    let probes: Arc<Mutex<HashMap<String, u32>>> = Arc::default();

    let counts = Arc::clone(&probes);
    let outcome = poll_until(&ctx, &validators(3), &gate(60, 5), move |h| {
        let counts = Arc::clone(&counts);
        async move {
            let seen = {
                let mut counts = counts.lock();
                let n = counts.entry(h.id.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            // v2 needs three probes, the rest answer at once
            Ok(Readiness::when(h.id.as_str() != "v2" || seen >= 3, || {
                format!("probe {seen}")
            }))
        }
    })
    .await
    .unwrap();

    assert!(outcome.is_satisfied());
    assert_eq!(outcome.rounds, 3);
    assert_eq!(harness.clock.elapsed(), Duration::from_secs(10));

    let probes = probes.lock();
    assert_eq!(probes["v0"], 1);
    assert_eq!(probes["v1"], 1);
    assert_eq!(probes["v2"], 3);
}

#[tokio::test]
async fn check_error_counts_as_not_ready() {
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);

    let outcome = poll_until(&ctx, &validators(1), &gate(10, 5), |h| async move {
        Err::<Readiness, _>(Error::Remote {
            host: h.id.clone(),
            message: "connection refused".into(),
        })
    })
    .await
    .unwrap();

    assert_eq!(outcome.failing.len(), 1);
    assert!(outcome.failing[&ids(&["v0"])[0]].contains("connection refused"));
}

#[tokio::test]
async fn last_sleep_is_clipped_to_the_deadline() {
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = harness.context(&notifier);

    let outcome = poll_until(&ctx, &validators(1), &gate(12, 5), |_| async {
        Ok(Readiness::pending("syncing"))
    })
    .await
    .unwrap();

    assert_eq!(outcome.elapsed, Duration::from_secs(12));
    assert_eq!(outcome.rounds, 4);
}

/// Requests cancellation when a sleep starts, then never wakes.
struct CancellingClock {
    time: ManualClock,
    handle: CancelHandle,
}

#[async_trait]
impl Clock for CancellingClock {
    fn now(&self) -> Instant {
        self.time.now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.time.utc_now()
    }

    async fn sleep(&self, _duration: Duration) {
        self.handle.cancel();
        std::future::pending::<()>().await;
    }
}

#[tokio::test]
async fn cancellation_interrupts_the_wait_between_rounds() {
    let (handle, cancel) = cancel_pair();
    let clock = CancellingClock {
        time: ManualClock::new(),
        handle,
    };
    let executor = ParallelExecutor::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = StageContext::new(&executor, &clock, &cancel, &notifier);
    let checks = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&checks);
    let nodes = validators(2);
    let gate_cfg = gate(60, 5);
    let polled = poll_until(&ctx, &nodes, &gate_cfg, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Readiness::pending("syncing")) }
    });
    let result = tokio::time::timeout(Duration::from_secs(5), polled)
        .await
        .expect("poll kept waiting after cancellation");

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.count(|e| matches!(e, Event::GateRound(_))), 1);
}

#[tokio::test]
async fn cancelled_signal_runs_no_round() {
    let (handle, cancel) = cancel_pair();
    handle.cancel();
    let harness = Harness::new(None);
    let notifier = RecordingNotifier::new();
    let ctx = StageContext::new(&harness.executor, harness.clock.as_ref(), &cancel, &notifier);

    let result = poll_until(&ctx, &validators(2), &gate(60, 5), |_| async {
        Ok(Readiness::Ready)
    })
    .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(notifier.count(|e| matches!(e, Event::GateRound(_))), 0);
    assert_eq!(harness.clock.sleep_count(), 0);
}
