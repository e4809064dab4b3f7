use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Short startup so the simulated machine settles quickly
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[timing]
startup_ms = 100

[runner]
snapshot_poll_ms = 50
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn ventctl(dir: &tempfile::TempDir) -> Command {
    let cfg = write_valid_config(dir);
    let mut cmd = Command::cargo_bin("ventctl").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--settings")
        .arg(dir.path().join("settings.toml"));
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["phases"], 0, "ST_PEEP_PAUSE", "stdout")]
#[case(&["self-check"], 0, "ok", "stdout")]
#[case(&["show"], 0, "bpm 8", "stdout")]
#[case(&["set", "bpm", "60"], 1, "outside the allowed range", "stderr")]
#[case(&["set"], 2, "required", "stderr")]
#[case(&["fault", "9"], 1, "unknown fault code", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let mut cmd = ventctl(&dir);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn bad_toml_config_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[timing]\nstartup_ms = \"soon\"\n").unwrap();

    Command::cargo_bin("ventctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("phases")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid TOML"));
}

#[rstest]
fn invalid_config_value_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[timing]\ncontrol_period_us = 0\n").unwrap();

    Command::cargo_bin("ventctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("phases")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("control_period_us"));
}

#[rstest]
fn set_persists_for_show() {
    let dir = tempdir().unwrap();
    ventctl(&dir)
        .args(["set", "bpm", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bpm 12"));

    let out = ventctl(&dir).args(["--json", "show"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["respiration_rate"], 12);
}

#[rstest]
fn infeasible_plateau_is_not_stored() {
    let dir = tempdir().unwrap();
    ventctl(&dir).args(["set", "bpm", "30"]).assert().success();
    // 30 bpm at 1:4 leaves 0.4 s of inspiration; a 300 ms plateau still fits
    ventctl(&dir).args(["set", "ie-e", "4"]).assert().success();
    ventctl(&dir)
        .args(["set", "plateau", "300"])
        .assert()
        .success();
    ventctl(&dir)
        .args(["set", "ie-i", "0.5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("plateau"));

    let out = ventctl(&dir).args(["--json", "show"]).output().unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["ie_ratio_left"], 1.0);
}

#[rstest]
fn simulate_reports_breaths_as_json() {
    let dir = tempdir().unwrap();
    let out = ventctl(&dir)
        .args(["--json", "simulate", "--seconds", "10"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(v["breaths"].as_u64().unwrap() >= 1, "{v}");
    assert!(v["snapshot"]["phase"].as_str().unwrap().starts_with("ST_"));
}

#[rstest]
fn simulate_writes_a_trace() {
    let dir = tempdir().unwrap();
    let trace = dir.path().join("trace.csv");
    ventctl(&dir)
        .args(["simulate", "--seconds", "2", "--trace"])
        .arg(&trace)
        .assert()
        .success();

    let text = fs::read_to_string(&trace).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("uptime_ms,phase,cycle"));
    assert!(lines.count() >= 2);
}

#[rstest]
fn forced_fault_lands_in_fault_phase() {
    let dir = tempdir().unwrap();
    let out = ventctl(&dir)
        .args(["--json", "fault", "1"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["phase"], "ST_FAULT");
    assert_eq!(v["fault"], 1);
}

#[rstest]
fn short_run_exits_cleanly() {
    let dir = tempdir().unwrap();
    ventctl(&dir)
        .args(["run", "--seconds", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phase"));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let out = ventctl(&dir)
        .args(["--json", "set", "vt", "5000"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let line = String::from_utf8_lossy(&out.stderr);
    let last = line.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["reason"], "Error");
    assert!(v["message"].as_str().unwrap().contains("outside"));
}
