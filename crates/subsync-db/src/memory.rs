use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subsync_schemas::{SubscriptionRecord, SubscriptionStatus};

use crate::store::{RecordStore, StoreError};

/// In-process record store. Same semantics as the Postgres store, no durability.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    rows: Mutex<BTreeMap<String, SubscriptionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row directly, bypassing the write path.
    pub fn seed(&self, record: SubscriptionRecord) {
        self.lock().insert(record.user_id.clone(), record);
    }

    /// Current row without the create-on-read side effect.
    pub fn get(&self, user_id: &str) -> Option<SubscriptionRecord> {
        self.lock().get(user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SubscriptionRecord>> {
        self.rows.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read_record(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        let mut rows = self.lock();
        let rec = rows
            .entry(user_id.to_string())
            .or_insert_with(|| SubscriptionRecord::default_free(user_id, now));
        Ok(rec.clone())
    }

    async fn write_record(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        let rec = SubscriptionRecord {
            user_id: user_id.to_string(),
            status,
            expires_at,
            updated_at,
        };
        self.lock().insert(user_id.to_string(), rec.clone());
        Ok(rec)
    }
}
