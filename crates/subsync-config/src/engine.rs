use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;
use subsync_classify::{ClassifierRules, DEFAULT_EXPIRED_LOOKBACK_DAYS, DEFAULT_TRIAL_WINDOW_DAYS};

pub const DEFAULT_DATABASE_URL_ENV: &str = "SUBSYNC_DATABASE_URL";

const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RESTART_DELAY_MS: u64 = 1_000;

/// Typed engine settings read from the merged config document.
///
/// Every key is optional. Unknown keys are ignored; a present key with the
/// wrong type is an error naming its JSON pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub fetch_timeout: Duration,
    pub restart_delay: Duration,
    pub trial_window_days: i64,
    pub expired_lookback_days: i64,
    pub pro_identifiers: Vec<String>,
    pub pro_substrings: Vec<String>,
    pub trial_markers: Vec<String>,
    pub billing_base_url: Option<String>,
    /// Name of the env var holding the billing API key.
    pub billing_api_key_env: Option<String>,
    /// Name of the env var holding the webhook bearer secret.
    pub webhook_secret_env: Option<String>,
    pub database_url_env: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let rules = ClassifierRules::default();
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            restart_delay: Duration::from_millis(DEFAULT_RESTART_DELAY_MS),
            trial_window_days: DEFAULT_TRIAL_WINDOW_DAYS,
            expired_lookback_days: DEFAULT_EXPIRED_LOOKBACK_DAYS,
            pro_identifiers: rules.pro_identifiers,
            pro_substrings: rules.pro_substrings,
            trial_markers: rules.trial_markers,
            billing_base_url: None,
            billing_api_key_env: None,
            webhook_secret_env: None,
            database_url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let d = Self::default();
        let trial_window_days = read_i64(v, "/classifier/trial_window_days")?
            .unwrap_or(d.trial_window_days);
        let expired_lookback_days = read_i64(v, "/classifier/expired_lookback_days")?
            .unwrap_or(d.expired_lookback_days);
        if trial_window_days < 0 {
            bail!("CONFIG_INVALID pointer=/classifier/trial_window_days must be >= 0");
        }
        if expired_lookback_days < 0 {
            bail!("CONFIG_INVALID pointer=/classifier/expired_lookback_days must be >= 0");
        }

        Ok(Self {
            debounce: read_millis(v, "/reconcile/debounce_ms")?.unwrap_or(d.debounce),
            fetch_timeout: read_millis(v, "/reconcile/fetch_timeout_ms")?
                .unwrap_or(d.fetch_timeout),
            restart_delay: read_millis(v, "/restart/delay_ms")?.unwrap_or(d.restart_delay),
            trial_window_days,
            expired_lookback_days,
            pro_identifiers: read_string_list(v, "/classifier/pro_identifiers")?
                .unwrap_or(d.pro_identifiers),
            pro_substrings: read_string_list(v, "/classifier/pro_substrings")?
                .unwrap_or(d.pro_substrings),
            trial_markers: read_string_list(v, "/classifier/trial_markers")?
                .unwrap_or(d.trial_markers),
            billing_base_url: read_string(v, "/billing/base_url")?,
            billing_api_key_env: read_string(v, "/billing/api_key_env")?,
            webhook_secret_env: read_string(v, "/webhook/secret_env")?,
            database_url_env: read_string(v, "/database/url_env")?
                .unwrap_or(d.database_url_env),
        })
    }

    pub fn classifier_rules(&self) -> ClassifierRules {
        ClassifierRules {
            trial_window: chrono::Duration::days(self.trial_window_days),
            expired_lookback: chrono::Duration::days(self.expired_lookback_days),
            trial_markers: self.trial_markers.clone(),
            pro_identifiers: self.pro_identifiers.clone(),
            pro_substrings: self.pro_substrings.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pointer readers: absent or null → Ok(None), wrong type → Err.
// ---------------------------------------------------------------------------

fn present<'a>(v: &'a Value, ptr: &str) -> Option<&'a Value> {
    v.pointer(ptr).filter(|x| !x.is_null())
}

fn read_i64(v: &Value, ptr: &str) -> Result<Option<i64>> {
    match present(v, ptr) {
        None => Ok(None),
        Some(x) => match x.as_i64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_TYPE_ERROR pointer={ptr} expected integer"),
        },
    }
}

fn read_millis(v: &Value, ptr: &str) -> Result<Option<Duration>> {
    match present(v, ptr) {
        None => Ok(None),
        Some(x) => match x.as_u64() {
            Some(ms) => Ok(Some(Duration::from_millis(ms))),
            None => bail!("CONFIG_TYPE_ERROR pointer={ptr} expected non-negative integer (ms)"),
        },
    }
}

fn read_string(v: &Value, ptr: &str) -> Result<Option<String>> {
    match present(v, ptr) {
        None => Ok(None),
        Some(x) => match x.as_str() {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Ok(Some(s.trim().to_string())),
            None => bail!("CONFIG_TYPE_ERROR pointer={ptr} expected string"),
        },
    }
}

fn read_string_list(v: &Value, ptr: &str) -> Result<Option<Vec<String>>> {
    let Some(x) = present(v, ptr) else {
        return Ok(None);
    };
    let Some(arr) = x.as_array() else {
        bail!("CONFIG_TYPE_ERROR pointer={ptr} expected list of strings");
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        match item.as_str() {
            Some(s) => out.push(s.trim().to_string()),
            None => bail!("CONFIG_TYPE_ERROR pointer={ptr}/{i} expected string"),
        }
    }
    Ok(Some(out))
}
