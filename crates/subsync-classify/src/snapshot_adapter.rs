//! Snapshot adapter: deserialize the billing provider's subscriber payload
//! and normalize it into an [`EntitlementSnapshot`].
//!
//! # Purpose
//! The provider's REST API returns entitlements keyed by identifier with RFC 3339
//! timestamps, and reports the billing period per *product* rather than per
//! entitlement. This module mirrors that wire shape in `Raw*` structs and
//! provides [`normalize`] to turn it into the internal snapshot type.
//!
//! # Design constraints
//! - Pure, deterministic conversion. `now` is supplied by the caller and decides
//!   which entitlements are active.
//! - Unknown fields are ignored so provider additions do not break decoding.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use subsync_schemas::{Entitlement, EntitlementSnapshot, PeriodType};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotAdapterError {
    /// `original_app_user_id` was empty.
    MissingOwnerId,
    /// An entitlement key was empty or whitespace.
    EmptyEntitlementId,
    /// A timestamp field could not be parsed as RFC 3339.
    BadTimestamp {
        entitlement: String,
        field: &'static str,
        raw: String,
    },
    /// A `period_type` string could not be mapped to [`PeriodType`].
    UnknownPeriodType { entitlement: String, raw: String },
}

impl std::fmt::Display for SnapshotAdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOwnerId => write!(f, "subscriber has empty original_app_user_id"),
            Self::EmptyEntitlementId => write!(f, "subscriber has an entitlement with empty id"),
            Self::BadTimestamp {
                entitlement,
                field,
                raw,
            } => write!(
                f,
                "entitlement '{entitlement}' has unparseable {field} '{raw}'"
            ),
            Self::UnknownPeriodType { entitlement, raw } => write!(
                f,
                "entitlement '{entitlement}' has unrecognised period_type '{raw}'"
            ),
        }
    }
}

impl std::error::Error for SnapshotAdapterError {}

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

/// Top-level subscriber response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubscriberResponse {
    pub subscriber: RawSubscriber,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubscriber {
    pub original_app_user_id: String,
    #[serde(default)]
    pub entitlements: BTreeMap<String, RawEntitlement>,
    /// Keyed by product identifier.
    #[serde(default)]
    pub subscriptions: BTreeMap<String, RawSubscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEntitlement {
    /// `null` for lifetime / non-expiring grants.
    pub expires_date: Option<String>,
    pub product_identifier: Option<String>,
    pub purchase_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSubscription {
    /// `"normal"` | `"intro"` | `"trial"` (case-insensitive).
    pub period_type: Option<String>,
    pub expires_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

fn parse_ts(
    entitlement: &str,
    field: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, SnapshotAdapterError> {
    // Stored timestamps keep microseconds; finer digits would never compare equal.
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc).trunc_subsecs(6))
        .map_err(|_| SnapshotAdapterError::BadTimestamp {
            entitlement: entitlement.to_string(),
            field,
            raw: raw.to_string(),
        })
}

fn normalize_period_type(entitlement: &str, raw: &str) -> Result<PeriodType, SnapshotAdapterError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "normal" => Ok(PeriodType::Normal),
        "intro" => Ok(PeriodType::Intro),
        "trial" => Ok(PeriodType::Trial),
        _ => Err(SnapshotAdapterError::UnknownPeriodType {
            entitlement: entitlement.to_string(),
            raw: raw.to_string(),
        }),
    }
}

fn period_for(
    entitlement: &str,
    raw: &RawEntitlement,
    subscriptions: &BTreeMap<String, RawSubscription>,
) -> Result<PeriodType, SnapshotAdapterError> {
    let period = raw
        .product_identifier
        .as_ref()
        .and_then(|p| subscriptions.get(p))
        .and_then(|s| s.period_type.as_deref());
    match period {
        Some(p) => normalize_period_type(entitlement, p),
        None => Ok(PeriodType::Normal),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize a raw subscriber payload into an [`EntitlementSnapshot`].
///
/// Every entitlement lands in `all_entitlements`; those with no expiry or an
/// expiry strictly after `now` are also active.
///
/// # Errors
/// Returns the first [`SnapshotAdapterError`] encountered, in identifier order.
pub fn normalize(
    raw: RawSubscriberResponse,
    now: DateTime<Utc>,
) -> Result<EntitlementSnapshot, SnapshotAdapterError> {
    let sub = raw.subscriber;
    let owner = sub.original_app_user_id.trim();
    if owner.is_empty() {
        return Err(SnapshotAdapterError::MissingOwnerId);
    }

    let mut snap = EntitlementSnapshot::empty(owner);

    for (key, raw_ent) in &sub.entitlements {
        let identifier = key.trim();
        if identifier.is_empty() {
            return Err(SnapshotAdapterError::EmptyEntitlementId);
        }

        let expires_at = match raw_ent.expires_date.as_deref() {
            Some(s) => Some(parse_ts(identifier, "expires_date", s)?),
            None => None,
        };
        if let Some(p) = raw_ent.purchase_date.as_deref() {
            // Validated but not carried: classification never reads it.
            parse_ts(identifier, "purchase_date", p)?;
        }
        let period_type = period_for(identifier, raw_ent, &sub.subscriptions)?;

        let ent = Entitlement::new(identifier, expires_at, period_type);
        let is_active = match expires_at {
            None => true,
            Some(exp) => exp > now,
        };
        if is_active {
            snap.insert_active(ent);
        } else {
            snap.insert_lapsed(ent);
        }
    }

    Ok(snap)
}

/// Deserialize a JSON string directly into an [`EntitlementSnapshot`].
pub fn normalize_json(
    json: &str,
    now: DateTime<Utc>,
) -> Result<EntitlementSnapshot, Box<dyn std::error::Error + Send + Sync>> {
    let raw: RawSubscriberResponse = serde_json::from_str(json)?;
    let snap = normalize(raw, now)?;
    Ok(snap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    const PAYLOAD: &str = r#"{
        "request_date": "2026-05-10T09:00:00Z",
        "subscriber": {
            "original_app_user_id": "$RCAnonymousID:abc",
            "entitlements": {
                "pro": {
                    "expires_date": "2026-06-09T09:00:00Z",
                    "product_identifier": "pro_monthly",
                    "purchase_date": "2026-05-09T09:00:00Z"
                },
                "legacy_premium": {
                    "expires_date": "2026-04-30T00:00:00Z",
                    "product_identifier": "premium_yearly",
                    "purchase_date": "2025-04-30T00:00:00Z"
                },
                "lifetime": {
                    "expires_date": null,
                    "product_identifier": "lifetime_unlock",
                    "purchase_date": "2024-01-01T00:00:00Z"
                }
            },
            "subscriptions": {
                "pro_monthly": { "period_type": "INTRO", "expires_date": "2026-06-09T09:00:00Z" },
                "premium_yearly": { "period_type": "normal", "expires_date": "2026-04-30T00:00:00Z" }
            }
        }
    }"#;

    #[test]
    fn splits_active_and_lapsed() {
        let snap = normalize_json(PAYLOAD, now()).unwrap();
        assert_eq!(snap.owner_id, "$RCAnonymousID:abc");
        assert!(snap.active_entitlements.contains_key("pro"));
        assert!(snap.active_entitlements.contains_key("lifetime"));
        assert!(!snap.active_entitlements.contains_key("legacy_premium"));
        assert_eq!(snap.all_entitlements.len(), 3);
        assert!(snap.is_consistent());
    }

    #[test]
    fn period_type_comes_from_product_subscription() {
        let snap = normalize_json(PAYLOAD, now()).unwrap();
        assert_eq!(snap.active_entitlements["pro"].period_type, PeriodType::Intro);
        // No subscription row for the lifetime product: defaults to normal.
        assert_eq!(
            snap.active_entitlements["lifetime"].period_type,
            PeriodType::Normal
        );
    }

    #[test]
    fn expiry_equal_to_now_is_lapsed() {
        let json = r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "pro":{"expires_date":"2026-05-10T09:00:00Z","product_identifier":null,"purchase_date":null}}}}"#;
        let snap = normalize_json(json, now()).unwrap();
        assert!(snap.active_entitlements.is_empty());
        assert_eq!(snap.all_entitlements.len(), 1);
    }

    #[test]
    fn expiry_is_truncated_to_microseconds() {
        let json = r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "pro":{"expires_date":"2026-06-09T09:00:00.123456789Z","product_identifier":null,"purchase_date":null}}}}"#;
        let snap = normalize_json(json, now()).unwrap();
        let exp = snap.active_entitlements["pro"].expires_at.unwrap();
        assert_eq!(exp.timestamp_subsec_nanos(), 123_456_000);
        let again = normalize_json(json, now()).unwrap();
        assert_eq!(again.active_entitlements["pro"].expires_at, Some(exp));
    }

    #[test]
    fn bad_timestamp_errors() {
        let json = r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "pro":{"expires_date":"next tuesday","product_identifier":null,"purchase_date":null}}}}"#;
        let raw: RawSubscriberResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            normalize(raw, now()),
            Err(SnapshotAdapterError::BadTimestamp {
                field: "expires_date",
                ..
            })
        ));
    }

    #[test]
    fn unknown_period_type_errors() {
        let json = r#"{"subscriber":{"original_app_user_id":"u1",
            "entitlements":{"pro":{"expires_date":null,"product_identifier":"p","purchase_date":null}},
            "subscriptions":{"p":{"period_type":"forever","expires_date":null}}}}"#;
        let raw: RawSubscriberResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            normalize(raw, now()),
            Err(SnapshotAdapterError::UnknownPeriodType { .. })
        ));
    }

    #[test]
    fn empty_owner_errors() {
        let json = r#"{"subscriber":{"original_app_user_id":"  "}}"#;
        let raw: RawSubscriberResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            normalize(raw, now()),
            Err(SnapshotAdapterError::MissingOwnerId)
        );
    }

    #[test]
    fn missing_maps_default_to_empty() {
        let json = r#"{"subscriber":{"original_app_user_id":"u1"}}"#;
        let snap = normalize_json(json, now()).unwrap();
        assert!(snap.all_entitlements.is_empty());
    }
}
