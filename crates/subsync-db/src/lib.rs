//! subsync-db
//!
//! Persistence gateway for [`SubscriptionRecord`]s.
//!
//! [`RecordStore`] is the contract the coordinator consumes. Two
//! implementations live here: [`PgRecordStore`] over Postgres (sqlx, embedded
//! migrations) and [`MemoryRecordStore`] for tests and single-process tools.
//!
//! Writes are single-row upserts. Two processes reconciling the same user
//! race with last-write-wins; there is no cross-process lock.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod memory;
mod pg;
mod store;

pub use memory::MemoryRecordStore;
pub use pg::PgRecordStore;
pub use store::{RecordStore, StoreError};

pub const ENV_DB_URL: &str = "SUBSYNC_DATABASE_URL";

/// Connect to Postgres using the URL held in `env_var`.
pub async fn connect(env_var: &str) -> Result<PgPool> {
    let url = std::env::var(env_var).with_context(|| format!("missing env var {env_var}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Connect using [`ENV_DB_URL`].
pub async fn connect_from_env() -> Result<PgPool> {
    connect(ENV_DB_URL).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_records_table: bool,
    /// `None` when the table does not exist yet.
    pub record_count: Option<i64>,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='subscription_records'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    let record_count = if exists {
        let (n,): (i64,) =
            sqlx::query_as::<_, (i64,)>("select count(*)::bigint from subscription_records")
                .fetch_one(pool)
                .await
                .context("status record count failed")?;
        Some(n)
    } else {
        None
    };

    Ok(DbStatus {
        ok: one == 1,
        has_records_table: exists,
        record_count,
    })
}
