//! Integration tests for the jh-auth CLI
//!
//! Every test points the binary at its own config with a file token store
//! and an unreachable backend, so nothing touches the real keyring.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
    token_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let token_path = temp_dir.path().join("token");

        let config_content = format!(
            r#"
[api]
base_url = "http://127.0.0.1:9"
timeout = "2s"

[token]
storage = "file"
path = "{}"
"#,
            token_path.to_string_lossy().replace('\\', "\\\\")
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
            token_path,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("jh-auth").unwrap();
        cmd.env("JOBHIVE_CONFIG", &self.config_path);
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_status_without_token() {
    let env = TestEnv::new();

    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_status_json() {
    let env = TestEnv::new();

    env.cmd()
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""authenticated": false"#));
}

#[test]
fn test_status_with_unreachable_backend_clears_token() {
    let env = TestEnv::new();
    fs::write(&env.token_path, "stale-token").unwrap();

    env.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));

    assert!(!env.token_path.exists());
}

#[test]
fn test_logout_removes_token() {
    let env = TestEnv::new();
    fs::write(&env.token_path, "tok").unwrap();

    env.cmd()
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!env.token_path.exists());
}

#[test]
fn test_login_empty_password_is_invalid_input() {
    let env = TestEnv::new();

    env.cmd()
        .args(["login", "--email", "ada@example.com", "--stdin"])
        .write_stdin("\n")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("password must not be empty"));
}

#[test]
fn test_login_rejects_unknown_user_type() {
    let env = TestEnv::new();

    env.cmd()
        .args(["login", "--email", "ada@example.com", "--user-type", "admin", "--stdin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid user type"));
}

#[test]
fn test_login_with_unreachable_backend_fails() {
    let env = TestEnv::new();

    env.cmd()
        .args(["login", "--email", "ada@example.com", "--stdin"])
        .write_stdin("hunter2\n")
        .assert()
        .code(1);

    assert!(!env.token_path.exists());
}
