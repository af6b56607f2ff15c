//! subsync-schemas
//!
//! Shared domain types for the subscription entitlement reconciliation engine.
//! Plain data only: no IO, no clock reads, no business rules beyond the
//! invariants each constructor upholds.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Subscription status
// ---------------------------------------------------------------------------

/// Tier used for feature gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Free,
    Trial,
    Pro,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Pro => "pro",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(SubscriptionStatus::Free),
            "trial" => Ok(SubscriptionStatus::Trial),
            "pro" => Ok(SubscriptionStatus::Pro),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }

    /// Statuses whose expiry participates in record comparison.
    pub fn tracks_expiry(&self) -> bool {
        matches!(self, SubscriptionStatus::Pro | SubscriptionStatus::Expired)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted status string that is not one of the four tiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown subscription status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

// ---------------------------------------------------------------------------
// Entitlements
// ---------------------------------------------------------------------------

/// Billing period reported by the provider for an entitlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Normal,
    Intro,
    Trial,
}

/// One entitlement as reported by the billing provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub identifier: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub period_type: PeriodType,
}

impl Entitlement {
    pub fn new(
        identifier: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        period_type: PeriodType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            expires_at,
            period_type,
        }
    }
}

/// Ephemeral entitlement view fetched from the billing provider.
///
/// Both maps are keyed by entitlement identifier. `BTreeMap` keeps iteration
/// order stable so classification never depends on insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    /// Billing-side identity. May be a provisional anonymous id.
    pub owner_id: String,
    pub active_entitlements: BTreeMap<String, Entitlement>,
    /// Superset of `active_entitlements`, including lapsed ones.
    pub all_entitlements: BTreeMap<String, Entitlement>,
}

impl EntitlementSnapshot {
    pub fn empty(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            active_entitlements: BTreeMap::new(),
            all_entitlements: BTreeMap::new(),
        }
    }

    /// Insert an active entitlement. It is recorded in both maps.
    pub fn insert_active(&mut self, ent: Entitlement) {
        self.all_entitlements
            .insert(ent.identifier.clone(), ent.clone());
        self.active_entitlements.insert(ent.identifier.clone(), ent);
    }

    /// Insert a lapsed / historical entitlement (`all_entitlements` only).
    pub fn insert_lapsed(&mut self, ent: Entitlement) {
        self.active_entitlements.remove(&ent.identifier);
        self.all_entitlements.insert(ent.identifier.clone(), ent);
    }

    pub fn with_active(mut self, ent: Entitlement) -> Self {
        self.insert_active(ent);
        self
    }

    pub fn with_lapsed(mut self, ent: Entitlement) -> Self {
        self.insert_lapsed(ent);
        self
    }

    /// `true` when every active entitlement is also present in `all_entitlements`.
    pub fn is_consistent(&self) -> bool {
        self.active_entitlements
            .keys()
            .all(|k| self.all_entitlements.contains_key(k))
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Classifier output. `Free` never carries an expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionVerdict {
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionVerdict {
    pub fn free() -> Self {
        Self {
            status: SubscriptionStatus::Free,
            expires_at: None,
        }
    }

    /// Trial expiry is owned by the billing provider and never persisted here.
    pub fn trial() -> Self {
        Self {
            status: SubscriptionStatus::Trial,
            expires_at: None,
        }
    }

    /// `expires_at = None` means an active pro entitlement with unknown expiry.
    pub fn pro(expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SubscriptionStatus::Pro,
            expires_at,
        }
    }

    pub fn expired(expires_at: DateTime<Utc>) -> Self {
        Self {
            status: SubscriptionStatus::Expired,
            expires_at: Some(expires_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// One row of the subscription record store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Time of the last write performed by the engine.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Default record created on first read for a user.
    pub fn default_free(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            status: SubscriptionStatus::Free,
            expires_at: None,
            updated_at: now,
        }
    }

    /// `true` when writing `verdict` would not change anything observable.
    ///
    /// Expiry only participates for `pro` and `expired`; `free` and `trial`
    /// compare on status alone.
    pub fn matches(&self, verdict: &SubscriptionVerdict) -> bool {
        if self.status != verdict.status {
            return false;
        }
        if verdict.status.tracks_expiry() {
            return self.expires_at == verdict.expires_at;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Change bus payloads
// ---------------------------------------------------------------------------

/// Change bus topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "subscriptionChanged")]
    SubscriptionChanged,
    #[serde(rename = "cacheCleared")]
    CacheCleared,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SubscriptionChanged => "subscriptionChanged",
            Topic::CacheCleared => "cacheCleared",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChanged {
    pub user_id: String,
    pub old_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCleared {
    pub user_id: String,
}

/// Payload delivered to bus subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum BusEvent {
    #[serde(rename = "subscriptionChanged")]
    SubscriptionChanged(SubscriptionChanged),
    #[serde(rename = "cacheCleared")]
    CacheCleared(CacheCleared),
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::SubscriptionChanged(_) => Topic::SubscriptionChanged,
            BusEvent::CacheCleared(_) => Topic::CacheCleared,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            BusEvent::SubscriptionChanged(p) => &p.user_id,
            BusEvent::CacheCleared(p) => &p.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(SubscriptionStatus::parse("PRO"), Ok(SubscriptionStatus::Pro));
        assert_eq!(
            SubscriptionStatus::parse(" expired "),
            Ok(SubscriptionStatus::Expired)
        );
        assert!(SubscriptionStatus::parse("gold").is_err());
    }

    #[test]
    fn insert_lapsed_removes_from_active() {
        let ent = Entitlement::new("pro", Some(t0()), PeriodType::Normal);
        let snap = EntitlementSnapshot::empty("u1")
            .with_active(ent.clone())
            .with_lapsed(ent);
        assert!(snap.active_entitlements.is_empty());
        assert_eq!(snap.all_entitlements.len(), 1);
        assert!(snap.is_consistent());
    }

    #[test]
    fn record_matches_ignores_expiry_for_trial() {
        let mut rec = SubscriptionRecord::default_free("u1", t0());
        rec.status = SubscriptionStatus::Trial;
        rec.expires_at = Some(t0());
        assert!(rec.matches(&SubscriptionVerdict::trial()));
    }

    #[test]
    fn record_matches_compares_expiry_for_pro() {
        let mut rec = SubscriptionRecord::default_free("u1", t0());
        rec.status = SubscriptionStatus::Pro;
        rec.expires_at = Some(t0());
        assert!(rec.matches(&SubscriptionVerdict::pro(Some(t0()))));
        assert!(!rec.matches(&SubscriptionVerdict::pro(Some(t0() + Duration::days(30)))));
    }

    #[test]
    fn bus_event_serializes_with_topic_tag() {
        let ev = BusEvent::CacheCleared(CacheCleared {
            user_id: "u1".to_string(),
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["topic"], "cacheCleared");
        assert_eq!(v["payload"]["user_id"], "u1");
    }
}
