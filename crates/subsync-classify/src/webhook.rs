//! Billing provider webhook classification.
//!
//! A webhook only tells us *that* something happened to a subscriber. It is
//! never written to the record store directly: events that can move the tier
//! resolve to [`WebhookDisposition::Reconcile`], and the coordinator then
//! re-fetches the authoritative snapshot. The status hint is for logs only.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use subsync_schemas::SubscriptionStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct RawWebhook {
    pub event: RawWebhookEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub app_user_id: String,
    #[serde(default)]
    pub expiration_at_ms: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Known event that never changes the tier.
    NoStatusChange,
    /// Event type this engine does not handle.
    Unhandled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    Reconcile {
        user_id: String,
        hint: SubscriptionStatus,
        expires_at: Option<DateTime<Utc>>,
    },
    Ignore {
        event_type: String,
        reason: IgnoreReason,
    },
}

impl WebhookDisposition {
    pub fn requires_reconcile(&self) -> bool {
        matches!(self, WebhookDisposition::Reconcile { .. })
    }
}

fn expiry_from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|v| Utc.timestamp_millis_opt(v).single())
}

/// Map a webhook event to what the engine should do with it.
pub fn classify_webhook(ev: &RawWebhookEvent, now: DateTime<Utc>) -> WebhookDisposition {
    let expires_at = expiry_from_ms(ev.expiration_at_ms);
    let reconcile = |hint: SubscriptionStatus| WebhookDisposition::Reconcile {
        user_id: ev.app_user_id.clone(),
        hint,
        expires_at: if hint == SubscriptionStatus::Free {
            None
        } else {
            expires_at
        },
    };

    match ev.event_type.trim().to_ascii_uppercase().as_str() {
        "INITIAL_PURCHASE"
        | "RENEWAL"
        | "PRODUCT_CHANGE"
        | "UNCANCELLATION"
        | "SUBSCRIPTION_EXTENDED"
        | "BILLING_ISSUE"
        | "NON_RENEWING_PURCHASE"
        | "SUBSCRIPTION_PAUSED"
        | "TRANSFER"
        | "TEMPORARY_ENTITLEMENT_GRANT" => reconcile(SubscriptionStatus::Pro),

        "CANCELLATION" | "EXPIRATION" => reconcile(SubscriptionStatus::Free),

        "TEST" => match expires_at {
            Some(exp) if exp > now => reconcile(SubscriptionStatus::Pro),
            _ => reconcile(SubscriptionStatus::Free),
        },

        "INVOICE_ISSUANCE" | "REFUND_REVERSED" | "VIRTUAL_CURRENCY_TRANSACTION" => {
            WebhookDisposition::Ignore {
                event_type: ev.event_type.clone(),
                reason: IgnoreReason::NoStatusChange,
            }
        }

        _ => WebhookDisposition::Ignore {
            event_type: ev.event_type.clone(),
            reason: IgnoreReason::Unhandled,
        },
    }
}
