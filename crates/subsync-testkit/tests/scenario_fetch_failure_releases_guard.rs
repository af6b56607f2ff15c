//! Scenario: billing provider failures
//!
//! # Invariants under test
//!
//! 1. A fetch error aborts the cycle before the store is touched.
//! 2. A fetch that outlives `fetch_timeout` fails with `Timeout`.
//! 3. In both cases the sync guard is released and a later cycle succeeds.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use subsync_runtime::{BillingError, ReconcileError, ReconcileOutcome};
use subsync_schemas::SubscriptionStatus;
use subsync_testkit::{pro_snapshot, t0, Harness};

#[tokio::test(start_paused = true)]
async fn fetch_error_leaves_store_untouched() {
    let h = Harness::new(pro_snapshot("u", t0() + ChronoDuration::days(30)));
    h.billing
        .fail_with(BillingError::Unreachable("connection refused".to_string()));

    let err = h.coordinator.reconcile("u").await.expect_err("fetch fails");
    assert!(matches!(
        err,
        ReconcileError::BillingFetch(BillingError::Unreachable(_))
    ));
    assert_eq!(err.kind(), "BILLING_FETCH");
    assert_eq!(h.store.read_calls(), 0);
    assert_eq!(h.store.write_calls(), 0);
    assert!(h.events.events().is_empty());
    assert!(!h.coordinator.session_state().is_syncing);

    tokio::time::advance(Duration::from_secs(3)).await;
    h.billing
        .set_snapshot(pro_snapshot("u", t0() + ChronoDuration::days(30)));
    let out = h.coordinator.reconcile("u").await.expect("recovers");
    assert_eq!(out.as_str(), "updated");
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out() {
    let h = Harness::builder(pro_snapshot("u", t0() + ChronoDuration::days(30)))
        .fetch_timeout(Duration::from_secs(10))
        .build();
    h.billing.set_delay(Duration::from_secs(30));

    let err = h.coordinator.reconcile("u").await.expect_err("times out");
    assert_eq!(
        err,
        ReconcileError::BillingFetch(BillingError::Timeout(Duration::from_secs(10)))
    );
    assert_eq!(h.store.write_calls(), 0);
    assert!(!h.coordinator.session_state().is_syncing);

    h.billing.set_delay(Duration::ZERO);
    let out = h.coordinator.reconcile("u").await.expect("next cycle runs");
    match out {
        ReconcileOutcome::Updated(t) => assert_eq!(t.new_status, SubscriptionStatus::Pro),
        other => panic!("expected update, got {other:?}"),
    }
}
