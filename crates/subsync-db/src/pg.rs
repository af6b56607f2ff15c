use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use subsync_schemas::{SubscriptionRecord, SubscriptionStatus};

use crate::store::{RecordStore, StoreError};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(op: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Backend(format!("{op}: {e}"))
}

fn decode_row(user_id: &str, row: &sqlx::postgres::PgRow) -> Result<SubscriptionRecord, StoreError> {
    let corrupt = |detail: String| StoreError::CorruptRow {
        user_id: user_id.to_string(),
        detail,
    };
    let raw_status: String = row
        .try_get("subscription_status")
        .map_err(|e| corrupt(e.to_string()))?;
    let status = SubscriptionStatus::parse(&raw_status).map_err(|e| corrupt(e.to_string()))?;
    let expires_at: Option<DateTime<Utc>> = row
        .try_get("subscription_expires_at")
        .map_err(|e| corrupt(e.to_string()))?;
    let updated_at: DateTime<Utc> = row
        .try_get("subscription_updated_at")
        .map_err(|e| corrupt(e.to_string()))?;

    Ok(SubscriptionRecord {
        user_id: user_id.to_string(),
        status,
        expires_at,
        updated_at,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn read_record(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        let created = sqlx::query(
            r#"
            insert into subscription_records (user_id, subscription_status, subscription_updated_at)
            values ($1, 'free', $2)
            on conflict (user_id) do nothing
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend("read_record create-default"))?
        .rows_affected();
        if created > 0 {
            tracing::debug!(user_id, "created default free subscription record");
        }

        let row = sqlx::query(
            r#"
            select subscription_status, subscription_expires_at, subscription_updated_at
            from subscription_records
            where user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend("read_record select"))?;

        decode_row(user_id, &row)
    }

    async fn write_record(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<SubscriptionRecord, StoreError> {
        let row = sqlx::query(
            r#"
            insert into subscription_records (
              user_id, subscription_status, subscription_expires_at, subscription_updated_at
            ) values ($1, $2, $3, $4)
            on conflict (user_id) do update
              set subscription_status     = excluded.subscription_status,
                  subscription_expires_at = excluded.subscription_expires_at,
                  subscription_updated_at = excluded.subscription_updated_at
            returning subscription_status, subscription_expires_at, subscription_updated_at
            "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .bind(expires_at)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend("write_record upsert"))?;

        decode_row(user_id, &row)
    }
}
