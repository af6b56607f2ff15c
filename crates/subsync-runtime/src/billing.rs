use std::time::Duration;

use async_trait::async_trait;
use subsync_schemas::EntitlementSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Transport failure; the provider could not be reached.
    Unreachable(String),
    /// Provider answered with a non-success status.
    Rejected { status: u16, body: String },
    /// Response body could not be decoded or normalized.
    Malformed(String),
    /// No response within the coordinator's fetch timeout.
    Timeout(Duration),
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingError::Unreachable(msg) => write!(f, "billing provider unreachable: {msg}"),
            BillingError::Rejected { status, body } => {
                write!(f, "billing provider rejected request ({status}): {body}")
            }
            BillingError::Malformed(msg) => write!(f, "malformed billing response: {msg}"),
            BillingError::Timeout(d) => {
                write!(f, "billing provider timed out after {}ms", d.as_millis())
            }
        }
    }
}

impl std::error::Error for BillingError {}

/// Source of entitlement snapshots.
#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn entitlement_snapshot(
        &self,
        user_id: &str,
    ) -> Result<EntitlementSnapshot, BillingError>;

    /// Attach a provisional billing identity to the application user id.
    async fn link_user(&self, user_id: &str) -> Result<(), BillingError>;
}
