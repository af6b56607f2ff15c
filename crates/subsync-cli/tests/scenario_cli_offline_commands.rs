//! Offline CLI commands: no database, no network.

use std::io::Write;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn repo_root() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .canonicalize()
        .expect("repo root")
}

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write");
    f
}

#[test]
fn classify_reports_active_pro_with_expiry() {
    let snap = write_temp(
        r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "premium":{"expires_date":"2026-07-01T00:00:00Z","product_identifier":"premium_annual"}
        },"subscriptions":{"premium_annual":{"period_type":"normal"}}}}"#,
    );

    Command::cargo_bin("subsync")
        .expect("binary")
        .args(["classify", "--now", "2026-05-10T09:00:00Z", "--snapshot"])
        .arg(snap.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "pro""#))
        .stdout(predicate::str::contains(r#""rule": "active_pro""#))
        .stdout(predicate::str::contains("2026-07-01T00:00:00Z"));
}

#[test]
fn classify_trial_period_wins_over_pro() {
    let snap = write_temp(
        r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "pro":{"expires_date":"2026-08-01T00:00:00Z","product_identifier":"pro_monthly"}
        },"subscriptions":{"pro_monthly":{"period_type":"intro"}}}}"#,
    );

    Command::cargo_bin("subsync")
        .expect("binary")
        .args(["classify", "--now", "2026-05-10T09:00:00Z", "--snapshot"])
        .arg(snap.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "trial""#));
}

#[test]
fn classify_rejects_bad_timestamp() {
    let snap = write_temp(
        r#"{"subscriber":{"original_app_user_id":"u1","entitlements":{
            "pro":{"expires_date":"next tuesday"}
        }}}"#,
    );

    Command::cargo_bin("subsync")
        .expect("binary")
        .args(["classify", "--snapshot"])
        .arg(snap.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("expires_date"));
}

#[test]
fn config_hash_is_stable_for_repo_layers() {
    let root = repo_root();
    let base = root.join("config/defaults/base.yaml");
    let dev = root.join("config/env/dev.yaml");

    let run = || {
        let out = Command::cargo_bin("subsync")
            .expect("binary")
            .arg("config-hash")
            .arg(&base)
            .arg(&dev)
            .output()
            .expect("run");
        assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8(out.stdout).expect("utf8")
    };

    let first = run();
    assert!(first.starts_with("config_hash="));
    assert!(first.contains(r#""debounce_ms":500"#));
    assert_eq!(first, run());
}

#[test]
fn config_hash_refuses_secret_literals() {
    let leaked = write_temp("billing:\n  api_key: \"sk_live_abcdef\"\n");

    Command::cargo_bin("subsync")
        .expect("binary")
        .arg("config-hash")
        .arg(leaked.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("sk_live_abcdef").not());
}

#[test]
fn webhook_command_shows_disposition() {
    let hook = write_temp(r#"{"event":{"type":"INVOICE_ISSUANCE","app_user_id":"u1"}}"#);

    Command::cargo_bin("subsync")
        .expect("binary")
        .args(["webhook", "--payload-file"])
        .arg(hook.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""action": "ignore""#));
}
