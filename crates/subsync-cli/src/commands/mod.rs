//! Command handler modules for subsync-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod classify;
pub mod reconcile;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use subsync_config::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config, or built-in defaults when no path is given.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return load_layered_yaml_from_strings(&[]);
    }
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    load_layered_yaml(&refs)
}

/// Parse `--now` (RFC 3339), defaulting to the wall clock.
pub fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>> {
    match now {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("invalid --now '{raw}', expected RFC 3339")),
    }
}

/// Read a UTF-8 JSON file, tolerating a leading BOM.
pub fn read_json_file(path: &str) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read failed: {path}"))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = String::from_utf8(bytes.to_vec()).with_context(|| format!("{path} must be UTF-8 text"))?;
    Ok(raw.trim().to_string())
}
