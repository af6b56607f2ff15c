//! One-shot reconcile against the live billing provider and database.

use std::sync::Arc;

use anyhow::{Context, Result};
use subsync_billing_http::HttpBillingClient;
use subsync_config::{resolve_secrets, EngineConfig};
use subsync_db::PgRecordStore;
use subsync_runtime::{
    Coordinator, CoordinatorDeps, CoordinatorSettings, LogOnlyRestart, ReconcileOutcome,
    RestartTrigger, TracingAnalytics, TrustedPrincipals,
};

/// Wire a coordinator from config and environment.
///
/// There is no client to restart from a terminal, so restarts are only logged.
pub async fn build_coordinator(cfg: &EngineConfig) -> Result<Coordinator> {
    let secrets = resolve_secrets(cfg, |name| std::env::var(name).ok());
    let base_url = cfg
        .billing_base_url
        .clone()
        .context("config key /billing/base_url is required")?;
    let billing = HttpBillingClient::new(base_url, secrets.require_billing_api_key(cfg)?);

    let pool = subsync_db::connect(&cfg.database_url_env).await?;
    let store = PgRecordStore::new(pool);

    let mut deps = CoordinatorDeps::new(
        Arc::new(billing),
        Arc::new(store),
        Arc::new(TrustedPrincipals),
        RestartTrigger::new(Arc::new(LogOnlyRestart), cfg.restart_delay),
    );
    deps.analytics = Arc::new(TracingAnalytics);

    Ok(Coordinator::new(
        deps,
        CoordinatorSettings::from_engine_config(cfg),
    ))
}

/// `key=value` summary line, in the CLI's usual output style.
pub fn outcome_line(user_id: &str, out: &ReconcileOutcome) -> String {
    match out {
        ReconcileOutcome::Deferred {
            retry_in,
            collapsed,
        } => format!(
            "user_id={user_id} outcome=deferred retry_in_ms={} collapsed={collapsed}",
            retry_in.as_millis()
        ),
        ReconcileOutcome::Unchanged { status } => {
            format!("user_id={user_id} outcome=unchanged status={status}")
        }
        ReconcileOutcome::Updated(t) => format!(
            "user_id={user_id} outcome=updated old_status={} new_status={} expires_at={} restart={} cycle_id={}",
            t.old_status,
            t.new_status,
            t.expires_at
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "none".to_string()),
            t.restart.as_str(),
            t.cycle_id
        ),
    }
}
