//! Restart side effect for significant transitions.
//!
//! The trigger never restarts anything itself: it decides whether a restart
//! should be scheduled and hands the delay to a [`RestartMechanism`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use subsync_schemas::SubscriptionStatus;
use tokio::time::Instant;

use crate::session::ReconciliationSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartError(pub String);

impl std::fmt::Display for RestartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "restart mechanism unavailable: {}", self.0)
    }
}

impl std::error::Error for RestartError {}

/// Platform primitive that reloads the running application.
pub trait RestartMechanism: Send + Sync {
    /// Schedule one restart after `delay`. Must not block.
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError>;
}

/// Mechanism for contexts with nothing to reload; logs and succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyRestart;

impl RestartMechanism for LogOnlyRestart {
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError> {
        tracing::info!(delay_ms = delay.as_millis() as u64, "restart requested (log only)");
        Ok(())
    }
}

/// What happened to the restart side effect for one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// Transition into `free`, or no status change.
    NotSignificant,
    Scheduled { delay: Duration },
    /// Another cycle was already in flight; that cycle owns the side effect.
    SkippedWhileSyncing,
    /// A restart is already scheduled inside the delay window.
    Suppressed,
    /// Mechanism failed. The committed write and emitted events stand.
    Unavailable { reason: String },
}

impl RestartDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartDecision::NotSignificant => "not_significant",
            RestartDecision::Scheduled { .. } => "scheduled",
            RestartDecision::SkippedWhileSyncing => "skipped_while_syncing",
            RestartDecision::Suppressed => "suppressed",
            RestartDecision::Unavailable { .. } => "unavailable",
        }
    }
}

/// `true` for transitions that warrant a restart: into a non-free tier that
/// differs from the old one. Downgrades to `free` never interrupt the user.
pub fn is_significant(old: SubscriptionStatus, new: SubscriptionStatus) -> bool {
    new != SubscriptionStatus::Free && new != old
}

#[derive(Clone)]
pub struct RestartTrigger {
    mechanism: Arc<dyn RestartMechanism>,
    delay: Duration,
    scheduled_until: Arc<Mutex<Option<Instant>>>,
}

impl std::fmt::Debug for RestartTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartTrigger")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl RestartTrigger {
    pub fn new(mechanism: Arc<dyn RestartMechanism>, delay: Duration) -> Self {
        Self {
            mechanism,
            delay,
            scheduled_until: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Evaluate and, when warranted, schedule one restart.
    ///
    /// Checked in order: significance, the session's `is_syncing` flag, an
    /// outstanding schedule inside the delay window, then the mechanism.
    pub fn on_transition(
        &self,
        session: &ReconciliationSession,
        old: SubscriptionStatus,
        new: SubscriptionStatus,
    ) -> RestartDecision {
        if !is_significant(old, new) {
            return RestartDecision::NotSignificant;
        }
        if session.is_syncing() {
            tracing::debug!(%old, %new, "restart skipped: a cycle is in flight");
            return RestartDecision::SkippedWhileSyncing;
        }

        let now = Instant::now();
        let mut until = self
            .scheduled_until
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if until.is_some_and(|t| now < t) {
            tracing::debug!(%old, %new, "restart suppressed: already scheduled");
            return RestartDecision::Suppressed;
        }

        match self.mechanism.schedule_restart(self.delay) {
            Ok(()) => {
                *until = Some(now + self.delay);
                tracing::info!(%old, %new, delay_ms = self.delay.as_millis() as u64, "restart scheduled");
                RestartDecision::Scheduled { delay: self.delay }
            }
            Err(e) => {
                tracing::warn!(%old, %new, error = %e, "restart unavailable; user must restart manually");
                RestartDecision::Unavailable { reason: e.0 }
            }
        }
    }
}
