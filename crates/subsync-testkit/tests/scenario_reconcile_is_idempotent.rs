//! Scenario: reconciling an unchanged snapshot twice
//!
//! # Invariants under test
//!
//! 1. The first cycle for a new user creates the default record and moves it
//!    free → pro with exactly one write.
//! 2. A second cycle outside the debounce window, against the same snapshot,
//!    is a no-op: no write, no bus event, no restart request.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use subsync_runtime::{ReconcileOutcome, RestartDecision};
use subsync_schemas::{SubscriptionStatus, Topic};
use subsync_testkit::{pro_snapshot, t0, Harness};

#[tokio::test(start_paused = true)]
async fn second_cycle_with_same_snapshot_changes_nothing() {
    let expires = t0() + ChronoDuration::days(30);
    let h = Harness::new(pro_snapshot("user-1", expires));

    let first = h.coordinator.reconcile("user-1").await.expect("first cycle");
    let ReconcileOutcome::Updated(t) = first else {
        panic!("expected an update, got {first:?}");
    };
    assert_eq!(t.old_status, SubscriptionStatus::Free);
    assert_eq!(t.new_status, SubscriptionStatus::Pro);
    assert_eq!(t.expires_at, Some(expires));
    assert_eq!(t.restart, RestartDecision::Scheduled { delay: Duration::from_secs(1) });

    tokio::time::advance(Duration::from_secs(3)).await;

    let second = h.coordinator.reconcile("user-1").await.expect("second cycle");
    assert_eq!(
        second,
        ReconcileOutcome::Unchanged {
            status: SubscriptionStatus::Pro
        }
    );

    assert_eq!(h.billing.fetch_calls(), 2);
    assert_eq!(h.store.write_calls(), 1);
    assert_eq!(h.events.count(Topic::SubscriptionChanged), 1);
    assert_eq!(h.events.count(Topic::CacheCleared), 1);
    assert_eq!(h.restart.count(), 1);

    let rec = h.store.get("user-1").expect("record persisted");
    assert_eq!(rec.status, SubscriptionStatus::Pro);
    assert_eq!(rec.expires_at, Some(expires));
    assert_eq!(rec.updated_at, t0());
}
