#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bgperf(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bgperf").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

const GOOD_SCRIPT: &str = r#"
script:
  - action: {type: wait_convergent, cpu_below: 10, routes: 1000, confidence: 5}
  - action: {type: interrupt_peers, peers: [10.10.0.3], duration: 30, recovery: 10}
  - action: {type: sleep, duration: 60}
"#;

// ---------------------------------------------------------------------------
// bgperf --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    bgperf(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bench"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("doctor"));
}

// ---------------------------------------------------------------------------
// bgperf validate
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_good_script() {
    let dir = TempDir::new().unwrap();
    let script = write(&dir, "script.yaml", GOOD_SCRIPT);
    bgperf(&dir)
        .args(["validate", &script])
        .assert()
        .success()
        .stdout(predicate::str::contains("wait_convergent"))
        .stdout(predicate::str::contains("interrupt_peers"))
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn validate_rejects_unknown_action() {
    let dir = TempDir::new().unwrap();
    let script = write(
        &dir,
        "script.yaml",
        "script:\n  - action: {type: sleep, duration: 1}\n  - action: {type: bogus}\n",
    );
    bgperf(&dir)
        .args(["validate", &script])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unrecognized action type 'bogus'"));
}

#[test]
fn validate_json_reports_each_entry() {
    let dir = TempDir::new().unwrap();
    let script = write(
        &dir,
        "script.yaml",
        "script:\n  - action: {type: sleep, duration: 1}\n  - action: {type: sleep}\n",
    );
    let output = bgperf(&dir)
        .args(["validate", "--json", &script])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["ok"], true);
    assert_eq!(reports[1]["ok"], false);
    assert!(reports[1]["error"].as_str().unwrap().contains("sleep"));
}

#[test]
fn validate_empty_script_succeeds() {
    let dir = TempDir::new().unwrap();
    let script = write(&dir, "script.yaml", "script: []\n");
    bgperf(&dir)
        .args(["validate", &script])
        .assert()
        .success()
        .stdout(predicate::str::contains("script is empty"));
}

#[test]
fn validate_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    bgperf(&dir)
        .args(["validate", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load nope.yaml"));
}

// ---------------------------------------------------------------------------
// bgperf bench (setup errors only; a real run needs docker)
// ---------------------------------------------------------------------------

#[test]
fn bench_missing_scenario_fails_before_running() {
    let dir = TempDir::new().unwrap();
    bgperf(&dir)
        .args(["bench", "-f", "missing.yaml", "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to load scenario"));
}

#[test]
fn bench_rejects_local_target_without_container() {
    let dir = TempDir::new().unwrap();
    let scenario = write(
        &dir,
        "scenario.yaml",
        "target: {as: 1000, local-address: 10.10.0.1/16}\n",
    );
    bgperf(&dir)
        .args(["bench", "-f", &scenario, "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("target.container"));
    assert!(!dir.path().join("bgperf/scenario.yaml").exists());
}

#[test]
fn bench_rejects_unreadable_script_override() {
    let dir = TempDir::new().unwrap();
    let scenario = write(
        &dir,
        "scenario.yaml",
        "target: {as: 1000, local-address: 10.10.0.1/16, remote: 'true'}\n",
    );
    bgperf(&dir)
        .args(["bench", "-f", &scenario, "-s", "missing-script.yaml", "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load script"));
}
