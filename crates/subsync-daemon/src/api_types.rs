//! Request and response types for all subsync-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subsync_runtime::{ReconcileError, ReconcileOutcome, SessionState};
use subsync_schemas::SubscriptionStatus;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub is_syncing: bool,
    pub last_sync_elapsed_ms: Option<u64>,
    pub pending_user: Option<String>,
    pub pending_fires_in_ms: Option<u64>,
}

impl StatusResponse {
    pub fn from_session(daemon_uptime_secs: u64, s: &SessionState) -> Self {
        Self {
            daemon_uptime_secs,
            is_syncing: s.is_syncing,
            last_sync_elapsed_ms: s.last_sync_elapsed.map(millis),
            pending_user: s.pending_user.clone(),
            pending_fires_in_ms: s.pending_fires_in.map(millis),
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/reconcile/:user_id
// ---------------------------------------------------------------------------

/// Wire form of [`ReconcileOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileResponse {
    Deferred {
        retry_in_ms: u64,
        collapsed: bool,
    },
    Unchanged {
        status: SubscriptionStatus,
    },
    Updated {
        cycle_id: Uuid,
        user_id: String,
        old_status: SubscriptionStatus,
        new_status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        /// "not_significant" | "scheduled" | "skipped_while_syncing" | "suppressed" | "unavailable"
        restart: String,
    },
}

impl From<&ReconcileOutcome> for ReconcileResponse {
    fn from(out: &ReconcileOutcome) -> Self {
        match out {
            ReconcileOutcome::Deferred {
                retry_in,
                collapsed,
            } => ReconcileResponse::Deferred {
                retry_in_ms: millis(*retry_in),
                collapsed: *collapsed,
            },
            ReconcileOutcome::Unchanged { status } => {
                ReconcileResponse::Unchanged { status: *status }
            }
            ReconcileOutcome::Updated(t) => ReconcileResponse::Updated {
                cycle_id: t.cycle_id,
                user_id: t.user_id.clone(),
                old_status: t.old_status,
                new_status: t.new_status,
                expires_at: t.expires_at,
                restart: t.restart.as_str().to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/webhooks/billing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileResponse>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. "BILLING_FETCH".
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&ReconcileError> for ErrorResponse {
    fn from(e: &ReconcileError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
