use subsync_db::StoreError;

use crate::billing::BillingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceOp {
    Read,
    Write,
}

impl PersistenceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceOp::Read => "read",
            PersistenceOp::Write => "write",
        }
    }
}

/// Why a reconciliation cycle was aborted.
///
/// Every variant leaves the session usable and the persisted record at its
/// last committed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// No principal could be resolved for the requested user. Nothing was fetched.
    Unauthenticated { user_id: String },
    /// Snapshot fetch failed or timed out. Nothing was written.
    BillingFetch(BillingError),
    /// Record store read or write failed. No events were emitted.
    Persistence {
        op: PersistenceOp,
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Unauthenticated { .. } => "UNAUTHENTICATED",
            ReconcileError::BillingFetch(_) => "BILLING_FETCH",
            ReconcileError::Persistence { .. } => "PERSISTENCE",
        }
    }
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Unauthenticated { user_id } => {
                write!(f, "no authenticated principal for user '{user_id}'")
            }
            ReconcileError::BillingFetch(e) => write!(f, "{e}"),
            ReconcileError::Persistence { op, source } => {
                write!(f, "record {} failed: {source}", op.as_str())
            }
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Unauthenticated { .. } => None,
            ReconcileError::BillingFetch(e) => Some(e),
            ReconcileError::Persistence { source, .. } => Some(source),
        }
    }
}
