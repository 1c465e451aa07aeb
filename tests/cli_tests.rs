mod support;

use std::process::Stdio;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use chrono::Utc;
use predicates::prelude::*;
use runall::application::StatusSnapshot;
use runall::domain::ServiceState;
use runall::infrastructure::status_file::StatusFile;

use support::{write_file, MINIMAL_TOML};

fn runall() -> Command {
    let mut cmd = Command::cargo_bin("runall").expect("binary built");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn config_init_then_validate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runall.toml");

    runall()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    runall()
        .arg("-c")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config file is valid"))
        .stdout(predicate::str::contains("api, ui"));

    runall()
        .args(["config", "init"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_config_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let toml = MINIMAL_TOML.replace(r#"["api", "ui"]"#, r#"["api", "ui", "db"]"#);
    let path = write_file(dir.path(), "runall.toml", &toml);

    runall()
        .arg("-c")
        .arg(&path)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown service 'db'"));
}

#[test]
fn config_show_json_lists_services() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "runall.toml", MINIMAL_TOML);

    let output = runall()
        .arg("--json")
        .arg("-c")
        .arg(&path)
        .args(["config", "show"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["launch_order"], serde_json::json!(["api", "ui"]));
    assert_eq!(value["services"]["api"]["executable"], "true");
}

#[test]
fn config_show_names_broadcast_targets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "runall.toml", MINIMAL_TOML);

    runall()
        .arg("-c")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:8000/health"))
        .stdout(predicate::str::contains("Broadcast"))
        .stdout(predicate::str::contains("not a target"));
}

#[test]
fn status_without_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");

    runall()
        .arg("status")
        .arg("--status-file")
        .arg(&status)
        .assert()
        .success()
        .stdout(predicate::str::contains("No supervisor running"));

    runall()
        .args(["--json", "status", "--status-file"])
        .arg(&status)
        .assert()
        .success()
        .stdout(predicate::str::contains("not_running"));
}

#[test]
fn stale_status_file_is_reported_and_cleared_by_stop() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let stale = StatusFile {
        version: "1".into(),
        pid: 999_999_999,
        started_at: Utc::now(),
        config_path: None,
        snapshot: StatusSnapshot::default(),
        updated_at: Utc::now(),
    };
    std::fs::write(&status, serde_json::to_string(&stale).unwrap()).unwrap();

    runall()
        .args(["--json", "status", "--status-file"])
        .arg(&status)
        .assert()
        .success()
        .stdout(predicate::str::contains("stale"));

    runall()
        .args(["stop", "--status-file"])
        .arg(&status)
        .assert()
        .success();
    assert!(!status.exists());
}

#[test]
fn stop_fails_when_the_supervisor_outlives_the_wait() {
    let dir = tempfile::tempdir().unwrap();
    let status = dir.path().join("status.json");
    let mut stubborn = std::process::Command::new("sh")
        .args(["-c", "trap '' TERM; sleep 30"])
        .spawn()
        .expect("spawn sh");
    // Let the shell install its trap.
    std::thread::sleep(Duration::from_millis(300));

    let file = StatusFile {
        version: "1".into(),
        pid: stubborn.id(),
        started_at: Utc::now(),
        config_path: None,
        snapshot: StatusSnapshot::default(),
        updated_at: Utc::now(),
    };
    std::fs::write(&status, serde_json::to_string(&file).unwrap()).unwrap();

    let assert = runall()
        .args(["stop", "--wait", "1", "--status-file"])
        .arg(&status)
        .assert();

    let _ = stubborn.kill();
    let _ = stubborn.wait();
    assert
        .failure()
        .stderr(predicate::str::contains("still running"));
}

#[test]
fn broadcast_requires_a_running_supervisor() {
    let dir = tempfile::tempdir().unwrap();

    runall()
        .args(["broadcast", "/reload", "-X", "POST", "--status-file"])
        .arg(dir.path().join("status.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no running supervisor"));
}

#[test]
fn broadcast_rejects_a_malformed_body() {
    let dir = tempfile::tempdir().unwrap();

    runall()
        .args(["broadcast", "-b", "{not json", "--status-file"])
        .arg(dir.path().join("status.json"))
        .assert()
        .failure();
}

#[test]
fn run_then_stop() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(
        dir.path(),
        "runall.toml",
        r#"
launch_order = ["sleeper"]

[services.sleeper]
executable = "sleep"
args = ["30"]

[monitor]
enabled = false
"#,
    );
    let status = dir.path().join("status.json");

    let mut supervisor = std::process::Command::new(env!("CARGO_BIN_EXE_runall"))
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg("--status-file")
        .arg(&status)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn runall run");

    let deadline = Instant::now() + Duration::from_secs(15);
    let pid = loop {
        let healthy = StatusFile::read(&status)
            .ok()
            .flatten()
            .and_then(|file| {
                let sleeper = file.snapshot.get("sleeper")?;
                (sleeper.state == ServiceState::Healthy).then_some(sleeper.pid)
            })
            .flatten();
        if let Some(pid) = healthy {
            break pid;
        }
        if Instant::now() > deadline {
            let _ = supervisor.kill();
            panic!("supervisor never reported a healthy service");
        }
        std::thread::sleep(Duration::from_millis(100));
    };

    runall()
        .args(["stop", "--wait", "10", "--status-file"])
        .arg(&status)
        .assert()
        .success();

    let exit = supervisor.wait().unwrap();
    assert!(exit.success(), "supervisor exited with {exit}");
    assert!(!status.exists());
    assert!(!runall::adapter::outbound::process::pid_alive(pid));
}
