//! Reconciliation coordinator.
//!
//! The single entry point that fetches a snapshot, classifies it, diffs it
//! against the persisted record and, on change, writes, publishes and hands
//! significant transitions to the restart trigger.
//!
//! Cycle order is fixed: fetch → classify → read → compare → write →
//! `subscriptionChanged` → `cacheCleared` → analytics → release guard →
//! restart trigger. Nothing is written unless fetch, classify and read all
//! succeeded, and nothing is published unless the write succeeded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use subsync_classify::{classify, ClassifierRules};
use subsync_config::EngineConfig;
use subsync_db::RecordStore;
use subsync_schemas::{BusEvent, CacheCleared, SubscriptionChanged, SubscriptionStatus};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, NoopAnalytics};
use crate::billing::{BillingClient, BillingError};
use crate::bus::EventBus;
use crate::error::{PersistenceOp, ReconcileError};
use crate::principal::PrincipalResolver;
use crate::session::{Admission, ReconciliationSession, SessionState, SyncGuard};
use crate::trigger::{RestartDecision, RestartTrigger};

/// Wall-clock source for classification and record timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub debounce: Duration,
    pub fetch_timeout: Duration,
    pub rules: ClassifierRules,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_engine_config(&EngineConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_engine_config(cfg: &EngineConfig) -> Self {
        Self {
            debounce: cfg.debounce,
            fetch_timeout: cfg.fetch_timeout,
            rules: cfg.classifier_rules(),
        }
    }
}

/// Collaborators of one coordinator.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub billing: Arc<dyn BillingClient>,
    pub store: Arc<dyn RecordStore>,
    pub principals: Arc<dyn PrincipalResolver>,
    pub trigger: RestartTrigger,
    pub bus: EventBus,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub clock: Arc<dyn Clock>,
}

impl CoordinatorDeps {
    /// Fresh bus, no-op analytics, system clock.
    pub fn new(
        billing: Arc<dyn BillingClient>,
        store: Arc<dyn RecordStore>,
        principals: Arc<dyn PrincipalResolver>,
        trigger: RestartTrigger,
    ) -> Self {
        Self {
            billing,
            store,
            principals,
            trigger,
            bus: EventBus::new(),
            analytics: Arc::new(NoopAnalytics),
            clock: Arc::new(SystemClock),
        }
    }
}

/// A committed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub cycle_id: Uuid,
    pub user_id: String,
    pub old_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
    pub restart: RestartDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Folded into the single pending retry.
    Deferred { retry_in: Duration, collapsed: bool },
    /// Verdict matched the record; nothing written or published.
    Unchanged { status: SubscriptionStatus },
    Updated(Transition),
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Deferred { .. } => "deferred",
            ReconcileOutcome::Unchanged { .. } => "unchanged",
            ReconcileOutcome::Updated(_) => "updated",
        }
    }
}

struct Inner {
    deps: CoordinatorDeps,
    settings: CoordinatorSettings,
    session: ReconciliationSession,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("settings", &self.inner.settings)
            .field("session", &self.inner.session.state())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps, settings: CoordinatorSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                settings,
                session: ReconciliationSession::new(),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.deps.bus
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.deps.store
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Abort any scheduled retry. In-flight cycles are not cancellable.
    pub fn shutdown(&self) {
        if let Some(user_id) = self.inner.session.cancel_pending() {
            tracing::debug!(user_id = %user_id, "pending reconcile retry cancelled");
        }
    }

    /// Run, or defer, one reconciliation cycle for `user_id`.
    pub async fn reconcile(&self, user_id: &str) -> Result<ReconcileOutcome, ReconcileError> {
        self.clone().reconcile_owned(user_id.to_string()).await
    }

    /// Link the billing identity to `user_id`, then reconcile.
    pub async fn link_and_reconcile(
        &self,
        user_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let principal = self.authenticate(user_id)?;
        let timeout = self.inner.settings.fetch_timeout;
        tokio::time::timeout(timeout, self.inner.deps.billing.link_user(&principal))
            .await
            .unwrap_or(Err(BillingError::Timeout(timeout)))
            .map_err(|e| {
                tracing::error!(user_id = %principal, error = %e, "billing link failed");
                ReconcileError::BillingFetch(e)
            })?;
        tracing::info!(user_id = %principal, "billing identity linked");
        self.reconcile(&principal).await
    }

    fn authenticate(&self, user_id: &str) -> Result<String, ReconcileError> {
        match self.inner.deps.principals.resolve(user_id) {
            Some(p) => Ok(p.user_id),
            None => {
                tracing::warn!(user_id, "reconcile refused: no authenticated principal");
                Err(ReconcileError::Unauthenticated {
                    user_id: user_id.to_string(),
                })
            }
        }
    }

    // Boxed so the retry task spawned from here can call back in.
    fn reconcile_owned(
        self,
        user_id: String,
    ) -> BoxFuture<'static, Result<ReconcileOutcome, ReconcileError>> {
        async move {
            let principal = self.authenticate(&user_id)?;
            let settings = &self.inner.settings;

            let admission =
                self.inner
                    .session
                    .admit(&principal, Instant::now(), settings.debounce, |delay| {
                        let retry = self.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            retry.run_pending().await;
                        })
                    });

            match admission {
                Admission::Defer {
                    retry_in,
                    collapsed,
                } => {
                    tracing::debug!(
                        user_id = %principal,
                        retry_in_ms = retry_in.as_millis() as u64,
                        collapsed,
                        "reconcile deferred"
                    );
                    Ok(ReconcileOutcome::Deferred {
                        retry_in,
                        collapsed,
                    })
                }
                Admission::Run(guard) => {
                    let cycle_id = Uuid::new_v4();
                    let span = tracing::info_span!("reconcile", %cycle_id, user_id = %principal);
                    self.run_cycle(guard, cycle_id, principal)
                        .instrument(span)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn run_pending(self) {
        let Some(user_id) = self.inner.session.take_pending() else {
            return;
        };
        match self.clone().reconcile_owned(user_id.clone()).await {
            Ok(outcome) => {
                tracing::debug!(user_id = %user_id, outcome = outcome.as_str(), "pending retry finished")
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, kind = e.kind(), "pending retry failed")
            }
        }
    }

    async fn run_cycle(
        &self,
        guard: SyncGuard,
        cycle_id: Uuid,
        user_id: String,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let deps = &self.inner.deps;
        let settings = &self.inner.settings;

        // 1. fetch
        let fetched = tokio::time::timeout(
            settings.fetch_timeout,
            deps.billing.entitlement_snapshot(&user_id),
        )
        .await
        .unwrap_or(Err(BillingError::Timeout(settings.fetch_timeout)));
        let snapshot = fetched.map_err(|e| {
            tracing::error!(error = %e, "snapshot fetch failed; no write");
            ReconcileError::BillingFetch(e)
        })?;
        if snapshot.owner_id != user_id {
            tracing::debug!(owner_id = %snapshot.owner_id, "snapshot owned by a provisional billing id");
        }

        // 2. classify
        let now = deps.clock.now();
        let classification = classify(&snapshot, now, &settings.rules);
        let verdict = classification.verdict;
        tracing::debug!(status = %verdict.status, rule = ?classification.rule, "classified");

        // 3. read (create-on-read)
        let current = deps
            .store
            .read_record(&user_id, now)
            .await
            .map_err(|source| {
                tracing::error!(error = %source, "record read failed");
                ReconcileError::Persistence {
                    op: PersistenceOp::Read,
                    source,
                }
            })?;

        // 4. compare
        if current.matches(&verdict) {
            tracing::debug!(status = %verdict.status, "record already up to date");
            return Ok(ReconcileOutcome::Unchanged {
                status: verdict.status,
            });
        }

        // 5. write
        deps.store
            .write_record(&user_id, verdict.status, verdict.expires_at, now)
            .await
            .map_err(|source| {
                tracing::error!(error = %source, "record write failed; verdict discarded");
                ReconcileError::Persistence {
                    op: PersistenceOp::Write,
                    source,
                }
            })?;
        let old = current.status;
        let new = verdict.status;
        tracing::info!(old_status = %old, new_status = %new, expires_at = ?verdict.expires_at, "subscription status updated");

        // 6-7. publish
        deps.bus
            .emit(&BusEvent::SubscriptionChanged(SubscriptionChanged {
                user_id: user_id.clone(),
                old_status: old,
                new_status: new,
                expires_at: verdict.expires_at,
                timestamp: now,
            }));
        deps.bus.emit(&BusEvent::CacheCleared(CacheCleared {
            user_id: user_id.clone(),
        }));

        for ev in AnalyticsEvent::for_transition(&user_id, old, new) {
            deps.analytics.track(&ev);
        }

        // 8. restart, evaluated after this cycle's guard is released
        drop(guard);
        let restart = deps.trigger.on_transition(&self.inner.session, old, new);

        Ok(ReconcileOutcome::Updated(Transition {
            cycle_id,
            user_id,
            old_status: old,
            new_status: new,
            expires_at: verdict.expires_at,
            at: now,
            restart,
        }))
    }
}
