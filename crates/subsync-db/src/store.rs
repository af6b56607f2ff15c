use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subsync_schemas::{SubscriptionRecord, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the statement failed.
    Backend(String),
    /// A row exists but cannot be decoded into a record.
    CorruptRow { user_id: String, detail: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "record store error: {msg}"),
            StoreError::CorruptRow { user_id, detail } => {
                write!(f, "corrupt subscription record for '{user_id}': {detail}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Read/write contract over the subscription record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current record for `user_id`. A missing row is created as `free` with
    /// `updated_at = now`; that insert is idempotent and not a transition.
    async fn read_record(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError>;

    /// Atomic single-row upsert. Returns the record as stored.
    async fn write_record(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError>;
}
