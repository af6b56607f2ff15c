use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use subsync_runtime::{BillingClient, BillingError};
use subsync_schemas::EntitlementSnapshot;

struct Script {
    snapshot: Result<EntitlementSnapshot, BillingError>,
    link: Result<(), BillingError>,
    delay: Duration,
    link_delay: Duration,
}

/// Scripted billing provider. Answers with whatever was last configured,
/// optionally after a (tokio) delay, and counts calls.
pub struct FakeBillingClient {
    script: Mutex<Script>,
    fetches: AtomicUsize,
    links: AtomicUsize,
}

impl FakeBillingClient {
    pub fn new(snapshot: EntitlementSnapshot) -> Self {
        Self {
            script: Mutex::new(Script {
                snapshot: Ok(snapshot),
                link: Ok(()),
                delay: Duration::ZERO,
                link_delay: Duration::ZERO,
            }),
            fetches: AtomicUsize::new(0),
            links: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_snapshot(&self, snapshot: EntitlementSnapshot) {
        self.lock().snapshot = Ok(snapshot);
    }

    pub fn fail_with(&self, err: BillingError) {
        self.lock().snapshot = Err(err);
    }

    pub fn fail_link_with(&self, err: BillingError) {
        self.lock().link = Err(err);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Every link sleeps this long before answering.
    pub fn set_link_delay(&self, delay: Duration) {
        self.lock().link_delay = delay;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingClient for FakeBillingClient {
    async fn entitlement_snapshot(
        &self,
        _user_id: &str,
    ) -> Result<EntitlementSnapshot, BillingError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lock().snapshot.clone()
    }

    async fn link_user(&self, _user_id: &str) -> Result<(), BillingError> {
        self.links.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock().link_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lock().link.clone()
    }
}
