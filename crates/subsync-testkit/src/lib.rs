//! subsync-testkit
//!
//! Deterministic fakes for every seam of the reconciliation engine, plus a
//! [`Harness`] that wires them into a [`Coordinator`]. All fakes can share a
//! [`Journal`] so scenarios can assert the cross-component order of effects.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use subsync_runtime::{
    Coordinator, CoordinatorDeps, CoordinatorSettings, PrincipalResolver, RestartTrigger,
    TrustedPrincipals,
};
use subsync_schemas::{Entitlement, EntitlementSnapshot, PeriodType};

mod billing;
mod clock;
mod recorder;
mod restart;
mod store;

pub use billing::FakeBillingClient;
pub use clock::ManualClock;
pub use recorder::EventRecorder;
pub use restart::RecordingRestart;
pub use store::RecordingStore;

/// Fixed reference time used across scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Snapshot with one active `pro` entitlement.
pub fn pro_snapshot(user_id: &str, expires_at: DateTime<Utc>) -> EntitlementSnapshot {
    EntitlementSnapshot::empty(user_id).with_active(Entitlement::new(
        "pro",
        Some(expires_at),
        PeriodType::Normal,
    ))
}

/// Snapshot with one active trial-marked entitlement.
pub fn trial_snapshot(user_id: &str, expires_at: DateTime<Utc>) -> EntitlementSnapshot {
    EntitlementSnapshot::empty(user_id).with_active(Entitlement::new(
        "pro_trial",
        Some(expires_at),
        PeriodType::Trial,
    ))
}

pub fn free_snapshot(user_id: &str) -> EntitlementSnapshot {
    EntitlementSnapshot::empty(user_id)
}

/// Append-only log of effects, shared between fakes.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A coordinator wired entirely to fakes.
pub struct Harness {
    pub coordinator: Coordinator,
    pub billing: Arc<FakeBillingClient>,
    pub store: Arc<RecordingStore>,
    pub restart: Arc<RecordingRestart>,
    pub events: EventRecorder,
    pub clock: Arc<ManualClock>,
    pub journal: Journal,
}

pub struct HarnessBuilder {
    snapshot: EntitlementSnapshot,
    settings: CoordinatorSettings,
    restart_delay: std::time::Duration,
    principals: Arc<dyn PrincipalResolver>,
    now: DateTime<Utc>,
}

impl Harness {
    pub fn builder(snapshot: EntitlementSnapshot) -> HarnessBuilder {
        HarnessBuilder {
            snapshot,
            settings: CoordinatorSettings::default(),
            restart_delay: std::time::Duration::from_secs(1),
            principals: Arc::new(TrustedPrincipals),
            now: t0(),
        }
    }

    /// Defaults throughout: 2s debounce, 10s fetch timeout, 1s restart delay.
    pub fn new(snapshot: EntitlementSnapshot) -> Self {
        Self::builder(snapshot).build()
    }
}

impl HarnessBuilder {
    pub fn settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn fetch_timeout(mut self, d: std::time::Duration) -> Self {
        self.settings.fetch_timeout = d;
        self
    }

    pub fn restart_delay(mut self, d: std::time::Duration) -> Self {
        self.restart_delay = d;
        self
    }

    pub fn principals(mut self, p: Arc<dyn PrincipalResolver>) -> Self {
        self.principals = p;
        self
    }

    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(self) -> Harness {
        let journal = Journal::new();
        let billing = Arc::new(FakeBillingClient::new(self.snapshot));
        let store = Arc::new(RecordingStore::new(journal.clone()));
        let restart = Arc::new(RecordingRestart::new(journal.clone()));
        let clock = Arc::new(ManualClock::new(self.now));

        let mut deps = CoordinatorDeps::new(
            billing.clone(),
            store.clone(),
            self.principals,
            RestartTrigger::new(restart.clone(), self.restart_delay),
        );
        deps.clock = clock.clone();

        let coordinator = Coordinator::new(deps, self.settings);
        let events = EventRecorder::attach(coordinator.bus(), journal.clone());

        Harness {
            coordinator,
            billing,
            store,
            restart,
            events,
            clock,
            journal,
        }
    }
}
