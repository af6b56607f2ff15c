//! subsync-config
//!
//! Layered YAML configuration. Documents are merged in order (later wins,
//! objects merge deeply), converted to JSON, checked for secret-looking
//! literals, and hashed over their canonical JSON form so a running engine can
//! report exactly which configuration it was started with.
//!
//! Typed settings live in [`EngineConfig`]; env-var secrets in [`secrets`].

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod engine;
pub mod secrets;

pub use engine::{EngineConfig, DEFAULT_DATABASE_URL_ENV};
pub use secrets::{resolve_secrets, ResolvedSecrets};

/// If any leaf string value in the merged config starts with one of these we
/// abort with CONFIG_SECRET_DETECTED. Config stores env var NAMES only.
const SECRET_PREFIXES: &[&str] = &[
    "sk_",        // billing provider secret key
    "sk-",        // generic API keys
    "appl_",      // billing provider public SDK key (still not config material)
    "goog_",
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "xoxb-",      // Slack bot token
    "postgres://",
    "postgresql://",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn engine(&self) -> Result<EngineConfig> {
        EngineConfig::from_json(&self.config_json)
    }
}

/// Read each path in order and merge it over the previous layers.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("config layer unreadable: {p}")))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Merge YAML documents in order. No documents yields an empty object,
/// which [`EngineConfig`] reads as all defaults.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {layer} is not valid yaml"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("config layer {layer} has no JSON form"))?;
        // empty document
        if !doc.is_null() {
            merge_into(&mut merged, doc);
        }
    }

    if let Some(leaf) = find_secret_leaf(&merged, String::new()) {
        bail!("CONFIG_SECRET_DETECTED leaf={leaf} value=REDACTED");
    }

    // serde_json::Map is key-ordered, so compact output is canonical.
    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, val) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_into(slot, val),
                    None => {
                        base_map.insert(key, val);
                    }
                }
            }
        }
        (slot, val) => *slot = val,
    }
}

/// JSON pointer of the first string leaf that looks like a credential.
fn find_secret_leaf(v: &Value, at: String) -> Option<String> {
    match v {
        Value::String(s) if looks_like_secret(s) => Some(if at.is_empty() { "/".into() } else { at }),
        Value::Object(map) => map.iter().find_map(|(k, child)| {
            let token = k.replace('~', "~0").replace('/', "~1");
            find_secret_leaf(child, format!("{at}/{token}"))
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| find_secret_leaf(child, format!("{at}/{i}"))),
        _ => None,
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
