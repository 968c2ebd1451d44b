//! End-to-end tests driving the `wl` binary against a temporary database.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn wl_binary() -> String {
    env!("CARGO_BIN_EXE_wl").to_string()
}

/// Runs `wl` with an isolated home and database.
fn wl(temp: &Path, args: &[&str]) -> Output {
    Command::new(wl_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("config"))
        .env("WL_DATABASE_PATH", temp.join("data/wl.db"))
        .env("WL_DAY_ZONE", "utc")
        .env_remove("WL_BACKEND")
        .env_remove("WL_OWNER")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run wl")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "wl should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn created_id(output: &Output) -> String {
    let line = stdout_of(output);
    let rest = line
        .strip_prefix("Created task ")
        .expect("add prints the new ID");
    rest.split(':').next().unwrap().to_string()
}

#[test]
fn test_add_start_switch_stop_summary() {
    let temp = TempDir::new().unwrap();

    let report = created_id(&wl(temp.path(), &["add", "Write report", "--priority", "high"]));
    let budget = created_id(&wl(temp.path(), &["add", "Review budget"]));

    stdout_of(&wl(temp.path(), &["start", &report]));
    let switched = stdout_of(&wl(temp.path(), &["start", &budget[..8]]));
    assert!(switched.contains("Stopped Write report"));
    assert!(switched.contains("Started Review budget"));

    let status = stdout_of(&wl(temp.path(), &["status"]));
    assert!(status.starts_with("Working on Review budget"));

    stdout_of(&wl(temp.path(), &["stop"]));
    let idle = stdout_of(&wl(temp.path(), &["status"]));
    assert_eq!(idle, "Not working on anything.\n");

    let listed: serde_json::Value =
        serde_json::from_str(&stdout_of(&wl(temp.path(), &["list", "--json"]))).unwrap();
    let tasks = listed.as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t["isActive"] == false));
    assert!(tasks.iter().all(|t| t["status"] == "in_progress"));

    let summary: serde_json::Value = serde_json::from_str(&stdout_of(&wl(
        temp.path(),
        &["summary", "--from", "1 hour ago", "--json"],
    )))
    .unwrap();
    assert_eq!(summary["range"], "custom");
    let by_task = summary["byTask"].as_array().unwrap();
    let task_total: i64 = by_task
        .iter()
        .map(|t| t["totalSeconds"].as_i64().unwrap())
        .sum();
    let day_total: i64 = summary["days"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["seconds"].as_i64().unwrap())
        .sum();
    assert_eq!(summary["totalSeconds"].as_i64().unwrap(), task_total);
    assert_eq!(task_total, day_total);
}

#[test]
fn test_complete_marks_done_and_counts() {
    let temp = TempDir::new().unwrap();
    let id = created_id(&wl(temp.path(), &["add", "Ship it"]));

    stdout_of(&wl(temp.path(), &["start", &id]));
    let completed = stdout_of(&wl(temp.path(), &["complete", &id]));
    assert!(completed.starts_with("Completed Ship it."));
    assert_eq!(
        stdout_of(&wl(temp.path(), &["status"])),
        "Not working on anything.\n"
    );

    let summary: serde_json::Value = serde_json::from_str(&stdout_of(&wl(
        temp.path(),
        &["summary", "--range", "today", "--json"],
    )))
    .unwrap();
    assert_eq!(summary["completedCount"], 1);

    let done = stdout_of(&wl(temp.path(), &["list", "--status", "done"]));
    assert!(done.contains("Ship it"));
}

#[test]
fn test_owners_are_isolated() {
    let temp = TempDir::new().unwrap();
    let id = created_id(&wl(temp.path(), &["add", "Private", "--owner", "alice"]));

    let output = wl(temp.path(), &["start", &id, "--owner", "bob"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));

    let bobs = stdout_of(&wl(temp.path(), &["list", "--owner", "bob"]));
    assert_eq!(bobs, "No tasks.\n");
}

#[test]
fn test_blank_owner_is_rejected() {
    let temp = TempDir::new().unwrap();
    let output = wl(temp.path(), &["list", "--owner", "  "]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unauthorized"));
}

#[test]
fn test_remote_backend_requires_url() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(wl_binary())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("WL_BACKEND", "remote")
        .env_remove("WL_REMOTE__URL")
        .arg("list")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("remote.url"));
}
