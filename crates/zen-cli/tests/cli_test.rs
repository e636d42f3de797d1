//! Integration tests for the `zenbridge` CLI binary.
//!
//! Argument parsing, config handling, and one-shot commands against a
//! loopback mock controller. No real lighting hardware involved.
#![allow(clippy::unwrap_used)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `zenbridge` binary with env isolation.
///
/// Clears `ZEN_*` variables, runs in an empty directory, and points the
/// platform config directory at a nonexistent path.
fn zen_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("zenbridge");
    cmd.current_dir(dir)
        .env("HOME", "/tmp/zenbridge-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/zenbridge-cli-test-nonexistent")
        .env_remove("ZEN_CONFIG")
        .env_remove("ZEN_POLL_INTERVAL")
        .env_remove("ZEN_SETTLE_DELAY_MS")
        .env_remove("ZEN_MQTT__DISCOVERY_PREFIX")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Write `config.yaml` into a fresh directory.
fn config_dir(yaml: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
    dir
}

fn empty_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Mock controller ─────────────────────────────────────────────────

const HELLO_LEN: usize = 1 + b"TPI_ADVANCED_HELLO".len();

/// Loopback controller with device 7 switched on and device 12 at level 80.
fn spawn_mock() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            std::thread::spawn(move || serve(stream));
        }
    });
    port
}

fn serve(mut stream: TcpStream) {
    let mut hello = [0u8; HELLO_LEN];
    if stream.read_exact(&mut hello).is_err() || hello[0] != 0x90 {
        return;
    }
    let mut devices = vec![(7u32, 0x03u8, 1u8), (12, 0x04, 80)];

    loop {
        let mut cmd = [0u8; 1];
        if stream.read_exact(&mut cmd).is_err() {
            return;
        }
        let reply: Vec<u8> = match cmd[0] {
            0x01 => devices
                .iter()
                .flat_map(|&(id, kind, value)| report(kind, id, value))
                .collect(),
            0x02 => {
                let mut body = [0u8; 5];
                if stream.read_exact(&mut body).is_err() {
                    return;
                }
                let id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let kind = if body[4] > 1 { 0x04 } else { 0x03 };
                devices.retain(|d| d.0 != id);
                devices.push((id, kind, body[4]));
                report(kind, id, body[4])
            }
            0x03 => {
                let mut body = [0u8; 4];
                if stream.read_exact(&mut body).is_err() {
                    return;
                }
                let id = u32::from_be_bytes(body);
                devices
                    .iter()
                    .filter(|d| d.0 == id)
                    .flat_map(|&(id, kind, value)| report(kind, id, value))
                    .collect()
            }
            _ => return,
        };
        if !reply.is_empty() && stream.write_all(&reply).is_err() {
            return;
        }
    }
}

fn report(kind: u8, id: u32, value: u8) -> Vec<u8> {
    let mut bytes = vec![kind];
    bytes.extend_from_slice(&id.to_be_bytes());
    bytes.push(value);
    bytes
}

fn mock_config(port: u16) -> String {
    format!(
        "controllers:\n  - host: 127.0.0.1\n    port: {port}\n    name: lobby\nsettle_delay_ms: 200\n"
    )
}

/// A loopback port with nothing listening.
fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = empty_dir();
    let output = zen_cmd(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = empty_dir();
    zen_cmd(dir.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("message bus")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("state"))
            .and(predicate::str::contains("set")),
    );
}

#[test]
fn test_run_help_says_broker_settings_are_ignored() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("MQTT")
                .and(predicate::str::contains("discovery_prefix"))
                .and(predicate::str::contains("ignored")),
        );
}

#[test]
fn test_version_flag() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("zenbridge"));
}

#[test]
fn test_completions() {
    let dir = empty_dir();
    for shell in ["bash", "zsh", "fish"] {
        zen_cmd(dir.path())
            .args(["completions", shell])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_invalid_subcommand() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .arg("frobnicate")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_output_format() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .args(["--output", "xml", "config", "show"])
        .assert()
        .failure()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_redacts_password() {
    let dir = config_dir(
        "mqtt:\n  user: bridge\n  password: hunter2\nzencontrol:\n  - host: 10.0.0.5\n",
    );
    zen_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********")
                .and(predicate::str::contains("10.0.0.5"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_show_json() {
    let dir = config_dir("polling_interval: 3\n");
    let output = zen_cmd(dir.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["poll_interval"], 3);
    assert_eq!(json["mqtt"]["discovery_prefix"], "homeassistant");
}

#[test]
fn test_env_overrides_file() {
    let dir = config_dir("poll_interval: 3\n");
    let output = zen_cmd(dir.path())
        .env("ZEN_POLL_INTERVAL", "42")
        .env("ZEN_MQTT__DISCOVERY_PREFIX", "bus")
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["poll_interval"], 42);
    assert_eq!(json["mqtt"]["discovery_prefix"], "bus");
}

#[test]
fn test_config_path_explicit() {
    let dir = config_dir("{}\n");
    let path = dir.path().join("config.yaml");
    zen_cmd(dir.path())
        .args(["-o", "plain", "config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(path.display().to_string()));
}

#[test]
fn test_config_check_ok() {
    let dir = config_dir("controllers:\n  - host: 10.0.0.5\n    name: lobby\n");
    zen_cmd(dir.path())
        .args(["-o", "plain", "config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lobby ok"));
}

#[test]
fn test_config_check_reports_bad_entries() {
    let dir = config_dir(
        "controllers:\n  - host: 10.0.0.5\n    mac: nope\n  - host: 10.0.0.6\n    name: a\n  - host: 10.0.0.7\n    name: a\n",
    );
    zen_cmd(dir.path())
        .args(["-o", "plain", "config", "check"])
        .assert()
        .failure()
        .code(9)
        .stdout(
            predicate::str::contains("not a MAC address")
                .and(predicate::str::contains("duplicate controller id")),
        );
}

#[test]
fn test_missing_explicit_config() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .args(["--config", "/nonexistent/zenbridge.yaml", "config", "show"])
        .assert()
        .failure()
        .code(9);
}

#[test]
fn test_run_without_controllers() {
    let dir = empty_dir();
    zen_cmd(dir.path())
        .args(["run", "--duration", "1"])
        .assert()
        .failure()
        .code(9)
        .stderr(predicate::str::contains("No controllers configured"));
}

// ── One-shot commands against a mock controller ─────────────────────

#[test]
fn test_state_lists_devices() {
    let dir = config_dir(&mock_config(spawn_mock()));
    let output = zen_cmd(dir.path())
        .args(["-o", "json", "state"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["controller"], "lobby");
    assert_eq!(rows[0]["id"], 7);
    assert_eq!(rows[0]["state"]["kind"], "on_off");
    assert_eq!(rows[0]["state"]["value"], true);
    assert_eq!(rows[1]["id"], 12);
    assert_eq!(rows[1]["state"]["value"], 80);
}

#[test]
fn test_state_single_device_plain() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["-o", "plain", "state", "--device", "12"])
        .assert()
        .success()
        .stdout(predicate::str::diff("lobby 12 80\n"));
}

#[test]
fn test_state_unknown_device() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["state", "--device", "99"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_state_unknown_controller() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["state", "--controller", "attic"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_state_unreachable_controller() {
    let dir = config_dir(&mock_config(dead_port()));
    zen_cmd(dir.path())
        .arg("state")
        .assert()
        .failure()
        .code(7);
}

#[test]
fn test_set_reports_new_state() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["-o", "plain", "set", "lobby", "7", "off"])
        .assert()
        .success()
        .stdout(predicate::str::diff("off\n"));
}

#[test]
fn test_set_rejects_bad_state() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["set", "lobby", "7", "300"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_refresh_writes_json_lines() {
    let dir = config_dir(&mock_config(spawn_mock()));
    let output = zen_cmd(dir.path()).arg("refresh").output().unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["topic"], "homeassistant/zencontrol/7/state");
    assert_eq!(lines[0]["payload"], "on");
    assert_eq!(lines[1]["topic"], "homeassistant/zencontrol/12/state");
    assert_eq!(lines[1]["payload"], "80");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lobby: published 2"), "{stderr}");
}

#[test]
fn test_run_for_a_fixed_duration() {
    let dir = config_dir(&mock_config(spawn_mock()));
    zen_cmd(dir.path())
        .args(["run", "--publisher", "json-lines", "--duration", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("homeassistant/zencontrol/7/state"))
        .stderr(predicate::str::contains("bridging 1 controller(s)"));
}
