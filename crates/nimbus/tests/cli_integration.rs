//! CLI integration tests for the Nimbus command-line interface.
//!
//! Each test runs the real binary with `NIMBUS_CONFIG_DIR` pointing at a
//! scratch directory. Commands that talk to the weather server spawn
//! `nimbus serve` as a child; lookups hit a wiremock provider.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the nimbus binary, isolated from any real config.
fn nimbus(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nimbus").unwrap();
    cmd.current_dir(dir)
        .env("NIMBUS_CONFIG_DIR", dir)
        .env_remove("NIMBUS_PROJECT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, contents: &str) {
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

async fn provider_stub() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Santa+Clara%2C+CA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current_condition": [{
                "temp_C": "20",
                "FeelsLikeC": "19",
                "humidity": "50",
                "weatherDesc": [{"value": "Clear"}],
                "windspeedKmph": "10",
                "visibility": "16"
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Nonexistent+City"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    server
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nimbus"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus"));
}

#[test]
fn test_call_requires_query() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .arg("call")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<QUERY>"));
}

#[test]
fn test_serve_rejects_unknown_framing() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .args(["serve", "--framing", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown framing"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_shows_defaults() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("handshake_timeout_secs = 10"))
        .stdout(predicate::str::contains("request_timeout_secs = 15"))
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_config_project_overrides_user() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "[session]\nrequest_timeout_secs = 20\n");
    std::fs::write(
        dir.path().join("nimbus.toml"),
        "[session]\nrequest_timeout_secs = 25\n",
    )
    .unwrap();

    nimbus(dir.path())
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"request_timeout_secs\": 25"));
}

#[test]
fn test_config_path_honours_env() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_malformed_config_is_a_warning() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "not valid toml {{{{");

    nimbus(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: Failed to load"));
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_tools_lists_weather_tool() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("get_us_weather"))
        .stdout(predicate::str::contains("input: city_query"));
}

#[test]
fn test_tools_json() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .args(["tools", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mcp:us-weather:get_us_weather\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_returns_weather() {
    let provider = provider_stub().await;
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        &format!("[weather]\nbase_url = \"{}\"\ntimeout_secs = 5\n", provider.uri()),
    );

    nimbus(dir.path())
        .args(["call", "Santa Clara, CA"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Santa Clara, CA: Clear"))
        .stdout(predicate::str::contains("20.0 °C / 68.0 °F"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_json_output() {
    let provider = provider_stub().await;
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        &format!("[weather]\nbase_url = \"{}\"\n", provider.uri()),
    );

    nimbus(dir.path())
        .args(["call", "--json", "Santa Clara, CA"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"wind_speed_ms\": 2.8"))
        .stdout(predicate::str::contains("\"source\": \"US Weather MCP\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_unknown_city_fails() {
    let provider = provider_stub().await;
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        &format!("[weather]\nbase_url = \"{}\"\n", provider.uri()),
    );

    nimbus(dir.path())
        .args(["call", "Nonexistent City"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unable to find city: Nonexistent City"));
}

#[test]
fn test_call_unknown_tool_fails() {
    let dir = TempDir::new().unwrap();
    nimbus(dir.path())
        .args(["call", "Boston", "--tool", "get_forecast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no tool 'get_forecast'"));
}

#[test]
fn test_bad_server_command_fails() {
    let dir = TempDir::new().unwrap();
    write_config(
        dir.path(),
        "[server]\ncommand = \"/nonexistent/nimbus-server\"\n",
    );

    nimbus(dir.path())
        .arg("tools")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to connect"));
}
