//! Scenario: a bus subscriber panics
//!
//! # Invariants under test
//!
//! 1. The cycle still commits and returns `Updated`.
//! 2. Other subscribers of the same topic still receive the event.
//! 3. The guard is released afterwards.

use chrono::Duration as ChronoDuration;
use subsync_schemas::Topic;
use subsync_testkit::{pro_snapshot, t0, Harness};

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_break_the_cycle() {
    let h = Harness::new(pro_snapshot("u", t0() + ChronoDuration::days(30)));
    h.coordinator
        .bus()
        .subscribe(Topic::SubscriptionChanged, |_| panic!("subscriber bug"));

    let out = h.coordinator.reconcile("u").await.expect("cycle");
    assert_eq!(out.as_str(), "updated");
    assert_eq!(h.events.count(Topic::SubscriptionChanged), 1);
    assert_eq!(h.events.count(Topic::CacheCleared), 1);
    assert_eq!(h.restart.count(), 1);
    assert!(!h.coordinator.session_state().is_syncing);
}
