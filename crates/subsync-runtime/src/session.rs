//! Re-entrancy and debounce state for one coordinator.
//!
//! `is_syncing`, `last_sync_at` and the single pending retry are the only
//! mutable state of the engine. They sit behind one mutex so admission is a
//! single atomic decision even on a multi-threaded runtime.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
struct PendingRetry {
    user_id: String,
    fire_at: Instant,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct SessionInner {
    is_syncing: bool,
    last_sync_at: Option<Instant>,
    pending: Option<PendingRetry>,
}

/// Result of asking the session whether a cycle may start now.
#[derive(Debug)]
pub(crate) enum Admission {
    /// Guard acquired; the caller runs the cycle while holding it.
    Run(SyncGuard),
    /// Deferred into the single pending retry.
    Defer { retry_in: Duration, collapsed: bool },
}

/// Read-only view of the session for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub is_syncing: bool,
    pub last_sync_elapsed: Option<Duration>,
    pub pending_user: Option<String>,
    pub pending_fires_in: Option<Duration>,
}

#[derive(Clone, Debug, Default)]
pub struct ReconciliationSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl ReconciliationSession {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking holder never leaves the state half-written, so poison is ignored.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_syncing(&self) -> bool {
        self.lock().is_syncing
    }

    pub fn state(&self) -> SessionState {
        let now = Instant::now();
        let s = self.lock();
        SessionState {
            is_syncing: s.is_syncing,
            last_sync_elapsed: s.last_sync_at.map(|t| now.saturating_duration_since(t)),
            pending_user: s.pending.as_ref().map(|p| p.user_id.clone()),
            pending_fires_in: s
                .pending
                .as_ref()
                .map(|p| p.fire_at.saturating_duration_since(now)),
        }
    }

    /// Decide whether `user_id` may run now.
    ///
    /// A call is deferred while a cycle is in flight or while `debounce` has
    /// not elapsed since the last start. Deferred calls share one pending
    /// retry: the first one creates it through `spawn_retry(delay)`, later ones
    /// only replace its user id and keep the original fire time.
    ///
    /// `spawn_retry` runs under the session lock and must not block.
    pub(crate) fn admit<F>(
        &self,
        user_id: &str,
        now: Instant,
        debounce: Duration,
        spawn_retry: F,
    ) -> Admission
    where
        F: FnOnce(Duration) -> JoinHandle<()>,
    {
        let mut s = self.lock();

        let remaining = s
            .last_sync_at
            .map(|last| (last + debounce).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        if s.is_syncing || !remaining.is_zero() {
            if let Some(p) = s.pending.as_mut() {
                p.user_id = user_id.to_string();
                return Admission::Defer {
                    retry_in: p.fire_at.saturating_duration_since(now),
                    collapsed: true,
                };
            }

            // In flight past its own window: wait one more window for it to finish.
            let delay = if remaining.is_zero() { debounce } else { remaining };
            let handle = spawn_retry(delay);
            s.pending = Some(PendingRetry {
                user_id: user_id.to_string(),
                fire_at: now + delay,
                handle: Some(handle),
            });
            return Admission::Defer {
                retry_in: delay,
                collapsed: false,
            };
        }

        // A direct run for the pending user makes that retry redundant.
        if s.pending.as_ref().is_some_and(|p| p.user_id == user_id) {
            if let Some(handle) = s.pending.take().and_then(|p| p.handle) {
                handle.abort();
            }
        }

        s.is_syncing = true;
        s.last_sync_at = Some(now);
        Admission::Run(SyncGuard {
            session: self.clone(),
        })
    }

    /// Claim the pending retry when its timer fires. Returns the latest user id.
    pub(crate) fn take_pending(&self) -> Option<String> {
        self.lock().pending.take().map(|p| p.user_id)
    }

    /// Abort a scheduled retry, if any. Returns the user id it would have run for.
    pub fn cancel_pending(&self) -> Option<String> {
        let pending = self.lock().pending.take()?;
        if let Some(handle) = pending.handle {
            handle.abort();
        }
        Some(pending.user_id)
    }
}

/// Holds `is_syncing = true` for the lifetime of one cycle.
///
/// Dropping it (normal return, `?` early exit, or panic unwind) releases the
/// guard.
#[derive(Debug)]
pub(crate) struct SyncGuard {
    session: ReconciliationSession,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.session.lock().is_syncing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(2);

    fn noop_retry(_delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_runs_and_sets_syncing() {
        let s = ReconciliationSession::new();
        let a = s.admit("u1", Instant::now(), WINDOW, noop_retry);
        assert!(matches!(a, Admission::Run(_)));
        assert!(s.is_syncing());
        drop(a);
        assert!(!s.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn calls_while_syncing_collapse_into_one_retry() {
        let s = ReconciliationSession::new();
        let now = Instant::now();
        let _guard = s.admit("u1", now, WINDOW, noop_retry);

        let mut spawned = 0;
        for i in 0..5 {
            let a = s.admit("u1", now, WINDOW, |_| {
                spawned += 1;
                tokio::spawn(async {})
            });
            match a {
                Admission::Defer { retry_in, collapsed } => {
                    assert_eq!(retry_in, WINDOW);
                    assert_eq!(collapsed, i > 0);
                }
                Admission::Run(_) => panic!("must not run while syncing"),
            }
        }
        assert_eq!(spawned, 1);
        assert_eq!(s.state().pending_user.as_deref(), Some("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn collapsed_call_updates_pending_user() {
        let s = ReconciliationSession::new();
        let now = Instant::now();
        let _guard = s.admit("u1", now, WINDOW, noop_retry);
        let _ = s.admit("u1", now, WINDOW, noop_retry);
        let _ = s.admit("u2", now, WINDOW, noop_retry);
        assert_eq!(s.take_pending().as_deref(), Some("u2"));
        assert_eq!(s.take_pending(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_defers_for_remaining_window() {
        let s = ReconciliationSession::new();
        let t0 = Instant::now();
        drop(s.admit("u1", t0, WINDOW, noop_retry));

        let later = t0 + Duration::from_millis(500);
        match s.admit("u1", later, WINDOW, noop_retry) {
            Admission::Defer { retry_in, .. } => {
                assert_eq!(retry_in, Duration::from_millis(1500))
            }
            Admission::Run(_) => panic!("inside debounce window"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn window_elapsed_runs_again() {
        let s = ReconciliationSession::new();
        let t0 = Instant::now();
        drop(s.admit("u1", t0, WINDOW, noop_retry));
        let a = s.admit("u1", t0 + WINDOW, WINDOW, noop_retry);
        assert!(matches!(a, Admission::Run(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_cycle_retries_one_window_later() {
        let s = ReconciliationSession::new();
        let t0 = Instant::now();
        let _guard = s.admit("u1", t0, WINDOW, noop_retry);
        match s.admit("u1", t0 + Duration::from_secs(5), WINDOW, noop_retry) {
            Admission::Defer { retry_in, .. } => assert_eq!(retry_in, WINDOW),
            Admission::Run(_) => panic!("still syncing"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_clears_slot() {
        let s = ReconciliationSession::new();
        let now = Instant::now();
        let _guard = s.admit("u1", now, WINDOW, noop_retry);
        let _ = s.admit("u7", now, WINDOW, noop_retry);
        assert_eq!(s.cancel_pending().as_deref(), Some("u7"));
        assert!(s.state().pending_user.is_none());
    }
}
