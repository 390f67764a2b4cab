#![cfg(unix)]

use assert_cmd::Command;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

fn agent(home: &TempDir) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("exec-agent")?;
    cmd.env("HOME", home.path()).env_remove("RUST_LOG");
    Ok(cmd)
}

fn json_lines(stdout: &[u8]) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let mut values = Vec::new();
    for line in std::str::from_utf8(stdout)?.lines() {
        values.push(serde_json::from_str(line)?);
    }
    Ok(values)
}

#[test]
fn run_streams_lifecycle_events() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    let logs = TempDir::new()?;

    let output = agent(&home)?
        .arg("run")
        .arg("--logs-dir")
        .arg(logs.path())
        .arg("--shell")
        .arg("/bin/sh")
        .arg("--name")
        .arg("greeting")
        .arg("--")
        .arg("echo")
        .arg("hello")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output)?;
    let types: Vec<&str> = events
        .iter()
        .filter_map(|event| event["type"].as_str())
        .collect();
    assert_eq!(types, vec!["process_started", "process_stdout", "process_died"]);
    assert_eq!(events[0]["name"], "greeting");
    assert_eq!(events[1]["text"], "hello");
    assert_eq!(events[2]["exitCode"], 0);
    Ok(())
}

#[test]
fn run_propagates_exit_code() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    agent(&home)?
        .args(["run", "--shell", "/bin/sh", "--", "exit 4"])
        .assert()
        .code(4)
        .stdout(contains("\"exitCode\":4"));
    Ok(())
}

#[test]
fn run_mask_limits_printed_events() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    let output = agent(&home)?
        .args([
            "run",
            "--shell",
            "/bin/sh",
            "--mask",
            "stderr",
            "--",
            "echo out; echo err 1>&2",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output)?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "process_stderr");
    assert_eq!(events[0]["text"], "err");
    Ok(())
}

#[test]
fn run_rejects_unknown_mask() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    agent(&home)?
        .args(["run", "--mask", "stdin", "--", "true"])
        .assert()
        .failure()
        .stderr(contains("unknown event type 'stdin'"));
    Ok(())
}

#[test]
fn logs_reads_what_run_persisted() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    let logs = TempDir::new()?;

    agent(&home)?
        .arg("run")
        .arg("--logs-dir")
        .arg(logs.path())
        .args(["--shell", "/bin/sh", "--", "printf 'a\\nb\\n'"])
        .assert()
        .success();

    let output = agent(&home)?
        .arg("logs")
        .arg("--logs-dir")
        .arg(logs.path())
        .args(["--pid", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let messages = json_lines(&output)?;
    let texts: Vec<&str> = messages
        .iter()
        .filter_map(|message| message["text"].as_str())
        .collect();
    assert_eq!(texts, vec!["a", "b"]);
    assert!(messages.iter().all(|message| message["kind"] == "STDOUT"));
    Ok(())
}

#[test]
fn logs_requires_a_logs_dir() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    agent(&home)?
        .args(["logs", "--pid", "1"])
        .assert()
        .failure()
        .stderr(contains("no logs directory configured"));
    Ok(())
}

#[test]
fn clean_logs_discards_history() -> Result<(), Box<dyn std::error::Error>> {
    let home = TempDir::new()?;
    let logs = TempDir::new()?;
    let stale = logs.path().join("stale");
    std::fs::write(&stale, "old")?;

    agent(&home)?
        .arg("run")
        .arg("--logs-dir")
        .arg(logs.path())
        .args(["--clean-logs", "--shell", "/bin/sh", "--", "true"])
        .assert()
        .success();

    assert!(!stale.exists());
    assert!(logs.path().join("1").join("pid-1").exists());
    Ok(())
}
