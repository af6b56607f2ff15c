//! Offline classification: no network, no database.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use subsync_classify::snapshot_adapter::normalize_json;
use subsync_classify::webhook::{classify_webhook, RawWebhook, WebhookDisposition};
use subsync_classify::{classify, ClassifierRules, MatchedRule};

/// Classify a saved provider subscriber payload.
pub fn classify_snapshot_json(
    raw: &str,
    now: DateTime<Utc>,
    rules: &ClassifierRules,
) -> Result<Value> {
    let snapshot = normalize_json(raw, now).map_err(|e| anyhow!("snapshot decode failed: {e}"))?;
    let c = classify(&snapshot, now, rules);
    Ok(json!({
        "owner_id": snapshot.owner_id,
        "now": now,
        "status": c.verdict.status,
        "expires_at": c.verdict.expires_at,
        "rule": rule_name(&c.rule),
        "entitlement": rule_entitlement(&c.rule),
        "active_entitlements": snapshot.active_entitlements.keys().collect::<Vec<_>>(),
    }))
}

/// Show what the engine would do with a saved webhook payload.
pub fn classify_webhook_json(raw: &str, now: DateTime<Utc>) -> Result<Value> {
    let hook: RawWebhook = serde_json::from_str(raw).context("webhook payload must be valid JSON")?;
    Ok(match classify_webhook(&hook.event, now) {
        WebhookDisposition::Reconcile {
            user_id,
            hint,
            expires_at,
        } => json!({
            "action": "reconcile",
            "user_id": user_id,
            "hint": hint,
            "expires_at": expires_at,
        }),
        WebhookDisposition::Ignore { event_type, reason } => json!({
            "action": "ignore",
            "event_type": event_type,
            "reason": format!("{reason:?}"),
        }),
    })
}

fn rule_name(rule: &MatchedRule) -> &'static str {
    match rule {
        MatchedRule::Trial { .. } => "trial",
        MatchedRule::ActivePro { .. } => "active_pro",
        MatchedRule::RecentlyExpired { .. } => "recently_expired",
        MatchedRule::NoProEntitlement => "no_pro_entitlement",
        MatchedRule::NoEntitlement => "no_entitlement",
    }
}

fn rule_entitlement(rule: &MatchedRule) -> Option<&str> {
    match rule {
        MatchedRule::Trial { entitlement, .. }
        | MatchedRule::ActivePro { entitlement }
        | MatchedRule::RecentlyExpired { entitlement } => Some(entitlement),
        MatchedRule::NoProEntitlement | MatchedRule::NoEntitlement => None,
    }
}
