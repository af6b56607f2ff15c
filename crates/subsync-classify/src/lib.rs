//! subsync-classify
//!
//! Entitlement classification: billing provider snapshot in, subscription
//! verdict out.
//!
//! - Trial markers take precedence over pro entitlements.
//! - Pro-like matches are resolved in a fixed priority order (exact
//!   identifiers first, then substring matches in identifier order).
//! - Lapsed pro entitlements count as `expired` only inside the lookback window.
//!
//! Deterministic, pure logic. No IO. The caller supplies `now`.

mod engine;
mod rules;
pub mod snapshot_adapter;
pub mod webhook;

pub use engine::{classify, Classification, MatchedRule};
pub use rules::{
    is_pro_like, pro_like_in_priority_order, recently_expired, trial_signal, ClassifierRules,
    TrialSignal, DEFAULT_EXPIRED_LOOKBACK_DAYS, DEFAULT_TRIAL_WINDOW_DAYS,
};
