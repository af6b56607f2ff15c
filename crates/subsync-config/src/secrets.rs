//! Runtime secret resolution.
//!
//! Config stores only env var NAMES. Callers resolve once at startup and pass
//! the result into constructors. Error messages name the variable, never the
//! value, and `Debug` redacts.

use anyhow::{bail, Result};

use crate::EngineConfig;

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub billing_api_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "billing_api_key",
                &self.billing_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl ResolvedSecrets {
    /// The billing key, or an error naming where it should have come from.
    pub fn require_billing_api_key(&self, cfg: &EngineConfig) -> Result<&str> {
        match (&self.billing_api_key, &cfg.billing_api_key_env) {
            (Some(k), _) => Ok(k.as_str()),
            (None, Some(var)) => bail!("SECRET_MISSING env var '{var}' is unset or empty"),
            (None, None) => bail!("SECRET_MISSING config key /billing/api_key_env is not set"),
        }
    }
}

/// Resolve every secret named in `cfg` through `lookup`.
///
/// `lookup` is normally `|name| std::env::var(name).ok()`; tests pass a map.
/// Missing variables resolve to `None`; callers decide which are required.
pub fn resolve_secrets<F>(cfg: &EngineConfig, lookup: F) -> ResolvedSecrets
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &Option<String>| {
        name.as_deref()
            .and_then(&lookup)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    ResolvedSecrets {
        billing_api_key: get(&cfg.billing_api_key_env),
        webhook_secret: get(&cfg.webhook_secret_env),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg() -> EngineConfig {
        EngineConfig {
            billing_api_key_env: Some("BILLING_KEY".to_string()),
            webhook_secret_env: Some("HOOK_SECRET".to_string()),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn resolves_named_vars_and_redacts_debug() {
        let env: HashMap<&str, &str> =
            [("BILLING_KEY", "k-123"), ("HOOK_SECRET", "  s-456 ")].into();
        let s = resolve_secrets(&cfg(), |n| env.get(n).map(|v| v.to_string()));
        assert_eq!(s.billing_api_key.as_deref(), Some("k-123"));
        assert_eq!(s.webhook_secret.as_deref(), Some("s-456"));
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("k-123"));
        assert!(dbg.contains("<REDACTED>"));
    }

    #[test]
    fn empty_value_is_missing_and_error_names_var() {
        let s = resolve_secrets(&cfg(), |_| Some("   ".to_string()));
        assert!(s.billing_api_key.is_none());
        let err = s.require_billing_api_key(&cfg()).unwrap_err().to_string();
        assert!(err.contains("BILLING_KEY"));
    }
}
