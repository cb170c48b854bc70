//! CLI integration tests for the Sigil command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Config discovery and display
//! - Commands that talk to an authorization server, against a mock one

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the sigil binary, isolated from the real user config.
fn sigil(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sigil").unwrap();
    cmd.env("SIGIL_CONFIG_DIR", config_dir)
        .env_remove("SIGIL_CONFIG")
        .env_remove("SIGIL_CLIENT_SECRET")
        .current_dir(config_dir);
    cmd
}

fn write_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
    let path = dir.join("sigil-test.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[server]
base_url = "{base_url}"

[client]
id = "client123"
secret = "supersecret"
redirect_uri = "http://localhost:8765/callback"

[http]
timeout_secs = 2
"#
        ),
    )
    .unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sigil"))
        .stdout(predicate::str::contains("PKCE"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sigil"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("keys"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_global_flags_accepted() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["--verbose", "--json", "--config", "x.toml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_fetch_help() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["fetch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--callback"))
        .stdout(predicate::str::contains("<URL>"));
}

#[test]
fn test_fetch_requires_url() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path()).arg("fetch").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_without_files() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"))
        .stdout(predicate::str::contains("No config files found"));
}

#[test]
fn test_config_show_masks_secret() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://auth-server.com");
    sigil(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client123"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("supersecret").not());
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://auth-server.com");
    let output = sigil(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["client"]["id"], "client123");
    assert_eq!(value["client_secret"], "config file (plaintext)");
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["--config", "/nonexistent/sigil.toml", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_config_init_local() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["config", "init", "--local"])
        .assert()
        .success();
    assert!(dir.path().join("sigil.toml").is_file());

    sigil(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 config file(s) loaded"));
}

#[test]
fn test_config_path_json_names_layers() {
    let dir = TempDir::new().unwrap();
    let output = sigil(dir.path())
        .args(["--json", "config", "path"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let sources: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(sources[0]["layer"], "user");
    assert_eq!(sources[1]["layer"], "project");
    assert_eq!(sources[1]["loaded"], false);
}

#[test]
fn test_login_requires_client_config() {
    let dir = TempDir::new().unwrap();
    sigil(dir.path())
        .args(["login", "--callback", "code#state"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required field"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Server Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_keys_lists_signing_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "keys": [
                {"kty": "OKP", "crv": "Ed25519", "x": "5hNYcONcdbQc3szFThjdwwgZepTVjDZPnqpQxMFci70", "kid": "k1", "alg": "EdDSA"},
                {"kty": "oct", "k": "c2VjcmV0", "kid": "hmac", "alg": "HS256"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let mut cmd = sigil(dir.path());
    cmd.arg("--config").arg(&config).arg("keys");

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("k1"))
            .stdout(predicate::str::contains("EdDSA"))
            .stdout(predicate::str::contains("hmac").not());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_keys_reports_unavailable_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let mut cmd = sigil(dir.path());
    cmd.arg("--config").arg(&config).arg("keys");

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .failure()
            .stderr(predicate::str::contains("Failed to fetch keys"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_rejects_forged_state_without_calling_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let mut cmd = sigil(dir.path());
    cmd.arg("--config").arg(&config).args([
        "login",
        "--no-browser",
        "--callback",
        "http://localhost:8765/callback?code=abc&state=forged",
    ]);

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .failure()
            .stderr(predicate::str::contains("state does not match"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_surfaces_authorization_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server.uri());
    let mut cmd = sigil(dir.path());
    cmd.arg("--config").arg(&config).args([
        "login",
        "--no-browser",
        "--callback",
        "http://localhost:8765/callback?error=access_denied&error_description=denied",
    ]);

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .failure()
            .stderr(predicate::str::contains("access_denied"));
    })
    .await
    .unwrap();
}
