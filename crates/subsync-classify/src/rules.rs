//! Individual classification rules.
//!
//! Each rule is a standalone pure function so it can be tested in isolation
//! and so new product identifiers only touch [`ClassifierRules`], never the
//! orchestration in `engine.rs`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use subsync_schemas::{Entitlement, PeriodType};

/// An active entitlement expiring within this many days counts as a trial.
pub const DEFAULT_TRIAL_WINDOW_DAYS: i64 = 7;

/// A lapsed pro entitlement inside this many days classifies as `expired`.
pub const DEFAULT_EXPIRED_LOOKBACK_DAYS: i64 = 30;

/// Tunable inputs of the classifier.
///
/// Identifier matching is ASCII case-insensitive throughout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierRules {
    pub trial_window: Duration,
    pub expired_lookback: Duration,
    /// Substrings that mark an identifier as a trial / intro offer.
    pub trial_markers: Vec<String>,
    /// Exact identifiers, highest priority first. Product aliases go here.
    pub pro_identifiers: Vec<String>,
    /// Fallback substrings, consulted only when no exact identifier matched.
    pub pro_substrings: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            trial_window: Duration::days(DEFAULT_TRIAL_WINDOW_DAYS),
            expired_lookback: Duration::days(DEFAULT_EXPIRED_LOOKBACK_DAYS),
            trial_markers: vec!["trial".to_string(), "intro".to_string()],
            pro_identifiers: vec!["pro".to_string(), "premium".to_string()],
            pro_substrings: vec!["pro".to_string(), "premium".to_string()],
        }
    }
}

impl ClassifierRules {
    /// Append a product-specific alias to the exact-match list (lowest priority).
    pub fn with_pro_alias(mut self, alias: impl Into<String>) -> Self {
        self.pro_identifiers.push(alias.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Trial rule
// ---------------------------------------------------------------------------

/// Why an active entitlement was judged to be a trial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrialSignal {
    /// Identifier contains one of the trial markers.
    IdentifierMarker(String),
    /// Provider reports an introductory period.
    IntroPeriod,
    /// Expires no later than `now + trial_window` (inclusive).
    ExpiresWithinWindow,
}

/// Evaluate the trial rule for one active entitlement.
///
/// Signals are checked in a fixed order so the reported reason is stable.
pub fn trial_signal(
    ent: &Entitlement,
    now: DateTime<Utc>,
    rules: &ClassifierRules,
) -> Option<TrialSignal> {
    let id = ent.identifier.to_ascii_lowercase();
    for marker in &rules.trial_markers {
        if id.contains(&marker.to_ascii_lowercase()) {
            return Some(TrialSignal::IdentifierMarker(marker.clone()));
        }
    }

    if ent.period_type == PeriodType::Intro {
        return Some(TrialSignal::IntroPeriod);
    }

    if let Some(exp) = ent.expires_at {
        if exp - now <= rules.trial_window {
            return Some(TrialSignal::ExpiresWithinWindow);
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Pro rule
// ---------------------------------------------------------------------------

/// `true` if `identifier` matches an exact pro identifier or contains a pro substring.
pub fn is_pro_like(identifier: &str, rules: &ClassifierRules) -> bool {
    let id = identifier.to_ascii_lowercase();
    rules
        .pro_identifiers
        .iter()
        .any(|p| p.eq_ignore_ascii_case(&id))
        || rules
            .pro_substrings
            .iter()
            .any(|s| id.contains(&s.to_ascii_lowercase()))
}

/// All pro-like entitlements of `ents`, in resolution priority order.
///
/// 1. Exact matches, in the order of `rules.pro_identifiers`.
/// 2. Substring matches, in identifier (map key) order.
///
/// Each entitlement appears at most once.
pub fn pro_like_in_priority_order<'a>(
    ents: &'a BTreeMap<String, Entitlement>,
    rules: &ClassifierRules,
) -> Vec<&'a Entitlement> {
    let mut out: Vec<&'a Entitlement> = Vec::new();

    for wanted in &rules.pro_identifiers {
        for ent in ents.values() {
            if ent.identifier.eq_ignore_ascii_case(wanted)
                && !out.iter().any(|e| e.identifier == ent.identifier)
            {
                out.push(ent);
            }
        }
    }

    for ent in ents.values() {
        if out.iter().any(|e| e.identifier == ent.identifier) {
            continue;
        }
        let id = ent.identifier.to_ascii_lowercase();
        if rules
            .pro_substrings
            .iter()
            .any(|s| id.contains(&s.to_ascii_lowercase()))
        {
            out.push(ent);
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Expired rule
// ---------------------------------------------------------------------------

/// First pro-like entitlement (priority order) that lapsed inside the lookback.
///
/// Window is `now - lookback <= expires_at <= now`. Entitlements without an
/// expiry never qualify.
pub fn recently_expired<'a>(
    all: &'a BTreeMap<String, Entitlement>,
    now: DateTime<Utc>,
    rules: &ClassifierRules,
) -> Option<&'a Entitlement> {
    let floor = now - rules.expired_lookback;
    pro_like_in_priority_order(all, rules)
        .into_iter()
        .find(|ent| match ent.expires_at {
            Some(exp) => floor <= exp && exp <= now,
            None => false,
        })
}
