use chrono::{DateTime, Utc};
use subsync_schemas::{EntitlementSnapshot, SubscriptionVerdict};

use crate::rules::{pro_like_in_priority_order, recently_expired, trial_signal, ClassifierRules};
use crate::TrialSignal;

/// Which rule produced the verdict. Carried for logging and audit only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchedRule {
    Trial {
        entitlement: String,
        signal: TrialSignal,
    },
    ActivePro {
        entitlement: String,
    },
    RecentlyExpired {
        entitlement: String,
    },
    /// Active entitlements exist but none is a trial or pro-like.
    NoProEntitlement,
    /// No active entitlement and nothing lapsed inside the lookback.
    NoEntitlement,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub verdict: SubscriptionVerdict,
    pub rule: MatchedRule,
}

/// Classify a billing snapshot at time `now`.
///
/// Order of evaluation:
/// 1. Any active entitlement with a trial signal → `trial` (no expiry).
/// 2. First active pro-like entitlement by priority → `pro` with its expiry
///    (unknown expiry stays `None`).
/// 3. With no active entitlements, first pro-like entitlement that lapsed
///    inside the lookback → `expired`.
/// 4. Otherwise `free`.
pub fn classify(
    snapshot: &EntitlementSnapshot,
    now: DateTime<Utc>,
    rules: &ClassifierRules,
) -> Classification {
    let active = &snapshot.active_entitlements;

    if !active.is_empty() {
        // Map order makes "first qualifying" stable across calls.
        for ent in active.values() {
            if let Some(signal) = trial_signal(ent, now, rules) {
                return Classification {
                    verdict: SubscriptionVerdict::trial(),
                    rule: MatchedRule::Trial {
                        entitlement: ent.identifier.clone(),
                        signal,
                    },
                };
            }
        }

        if let Some(ent) = pro_like_in_priority_order(active, rules).first() {
            return Classification {
                verdict: SubscriptionVerdict::pro(ent.expires_at),
                rule: MatchedRule::ActivePro {
                    entitlement: ent.identifier.clone(),
                },
            };
        }

        return Classification {
            verdict: SubscriptionVerdict::free(),
            rule: MatchedRule::NoProEntitlement,
        };
    }

    if let Some(ent) = recently_expired(&snapshot.all_entitlements, now, rules) {
        if let Some(exp) = ent.expires_at {
            return Classification {
                verdict: SubscriptionVerdict::expired(exp),
                rule: MatchedRule::RecentlyExpired {
                    entitlement: ent.identifier.clone(),
                },
            };
        }
    }

    Classification {
        verdict: SubscriptionVerdict::free(),
        rule: MatchedRule::NoEntitlement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use subsync_schemas::{Entitlement, PeriodType, SubscriptionStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn pro_with_unknown_expiry_stays_pro() {
        let snap = EntitlementSnapshot::empty("u1").with_active(Entitlement::new(
            "pro",
            None,
            PeriodType::Normal,
        ));
        let c = classify(&snap, now(), &ClassifierRules::default());
        assert_eq!(c.verdict, SubscriptionVerdict::pro(None));
    }

    #[test]
    fn trial_on_any_entitlement_overrides_pro() {
        let snap = EntitlementSnapshot::empty("u1")
            .with_active(Entitlement::new(
                "pro",
                Some(now() + Duration::days(90)),
                PeriodType::Normal,
            ))
            .with_active(Entitlement::new(
                "zz_intro_bonus",
                Some(now() + Duration::days(90)),
                PeriodType::Normal,
            ));
        let c = classify(&snap, now(), &ClassifierRules::default());
        assert_eq!(c.verdict.status, SubscriptionStatus::Trial);
        assert_eq!(c.verdict.expires_at, None);
    }

    #[test]
    fn active_non_pro_entitlement_is_free() {
        let snap = EntitlementSnapshot::empty("u1").with_active(Entitlement::new(
            "stickers",
            Some(now() + Duration::days(90)),
            PeriodType::Normal,
        ));
        let c = classify(&snap, now(), &ClassifierRules::default());
        assert_eq!(c.verdict, SubscriptionVerdict::free());
        assert_eq!(c.rule, MatchedRule::NoProEntitlement);
    }

    #[test]
    fn active_entitlements_suppress_expired_lookback() {
        let snap = EntitlementSnapshot::empty("u1")
            .with_lapsed(Entitlement::new(
                "pro",
                Some(now() - Duration::days(3)),
                PeriodType::Normal,
            ))
            .with_active(Entitlement::new(
                "stickers",
                Some(now() + Duration::days(90)),
                PeriodType::Normal,
            ));
        let c = classify(&snap, now(), &ClassifierRules::default());
        assert_eq!(c.verdict, SubscriptionVerdict::free());
    }

    #[test]
    fn classification_is_stable_across_calls() {
        let snap = EntitlementSnapshot::empty("u1")
            .with_active(Entitlement::new(
                "premium",
                Some(now() + Duration::days(50)),
                PeriodType::Normal,
            ))
            .with_active(Entitlement::new(
                "pro",
                Some(now() + Duration::days(40)),
                PeriodType::Normal,
            ));
        let rules = ClassifierRules::default();
        let first = classify(&snap, now(), &rules);
        for _ in 0..10 {
            assert_eq!(classify(&snap, now(), &rules), first);
        }
        assert_eq!(
            first.verdict,
            SubscriptionVerdict::pro(Some(now() + Duration::days(40)))
        );
    }
}
