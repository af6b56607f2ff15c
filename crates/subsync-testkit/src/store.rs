use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use subsync_db::{MemoryRecordStore, RecordStore, StoreError};
use subsync_schemas::{SubscriptionRecord, SubscriptionStatus};

use crate::Journal;

/// In-memory store with call counters and failure switches.
#[derive(Debug)]
pub struct RecordingStore {
    inner: MemoryRecordStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    journal: Journal,
}

impl RecordingStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            journal,
        }
    }

    pub fn seed(&self, record: SubscriptionRecord) {
        self.inner.seed(record);
    }

    pub fn get(&self, user_id: &str) -> Option<SubscriptionRecord> {
        self.inner.get(user_id)
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful writes only.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn read_record(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_record(user_id, now).await
    }

    async fn write_record(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.journal.push("write_failed");
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let rec = self
            .inner
            .write_record(user_id, status, expires_at, updated_at)
            .await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.journal.push("write");
        Ok(rec)
    }
}
