//! End-to-end tests driving the `monitor` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysmon::daemon::{read_pid, PidFile, PidLock};

const ENV_VARS: [&str; 4] = ["SYSMON_INTERVAL", "SYSMON_LOG", "SYSMON_PIDFILE", "SYSMON_CONFIG"];

fn monitor() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_monitor"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.stdin(Stdio::null());
    cmd
}

struct Paths {
    config: PathBuf,
    log: PathBuf,
    pid: PathBuf,
    daemon_log: PathBuf,
}

fn write_config(dir: &Path, interval: u64) -> Paths {
    let paths = Paths {
        config: dir.join("monitor.yaml"),
        log: dir.join("metrics.jsonl"),
        pid: dir.join("monitor.pid"),
        daemon_log: dir.join("monitor.log"),
    };
    fs::write(
        &paths.config,
        format!(
            "interval_seconds: {}\nlog_path: {}\npid_file: {}\ndaemon_log: {}\nfilesystems: false\n",
            interval,
            paths.log.display(),
            paths.pid.display(),
            paths.daemon_log.display()
        ),
    )
    .unwrap();
    paths
}

fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    condition()
}

fn have_proc() -> bool {
    Path::new("/proc/stat").exists() && Path::new("/proc/net/dev").exists()
}

#[test]
fn test_invalid_interval_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 5);

    let status = monitor()
        .args(["check", "--interval", "0", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let status = monitor()
        .args(["start", "--foreground", "--interval", "0", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!paths.pid.exists());
}

#[test]
fn test_missing_config_file_exits_with_config_error() {
    let status = monitor()
        .args(["start", "--config", "/nonexistent/monitor.yaml"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_stop_without_daemon_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let status = monitor()
        .args(["stop", "--no-config", "--pidfile"])
        .arg(dir.path().join("none.pid"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_reload_without_daemon_is_pid_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let status = monitor()
        .args(["reload", "--no-config", "--pidfile"])
        .arg(dir.path().join("none.pid"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

fn hold_lock(path: &Path) -> PidFile {
    match PidFile::acquire(path).unwrap() {
        PidLock::Acquired(p) => p,
        other => panic!("expected lock, got {:?}", other),
    }
}

#[test]
fn test_second_start_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 1);

    // Stand in for a running instance: the lock holder records its own pid
    let held = hold_lock(&paths.pid);

    let status = monitor()
        .args(["start", "--foreground", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(!paths.log.exists(), "no sampling may happen");
    assert_eq!(
        read_pid(&paths.pid).unwrap(),
        Some(std::process::id() as i32)
    );

    held.release();
}

#[test]
fn test_second_start_while_first_is_starting_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 1);

    // The first instance holds the lock but has not published its pid yet
    let mut held = hold_lock(&paths.pid);
    held.write_pid(999_999).unwrap();
    let publisher = {
        let pid_path = paths.pid.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            fs::write(&pid_path, format!("{}\n", std::process::id())).unwrap();
        })
    };

    let status = monitor()
        .args(["start", "--foreground", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    publisher.join().unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(!paths.log.exists(), "no sampling may happen");

    held.release();
}

#[test]
fn test_locked_pid_file_without_owner_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 1);

    let held = hold_lock(&paths.pid);
    fs::write(&paths.pid, "").unwrap();

    let status = monitor()
        .args(["start", "--foreground", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));

    held.release();
}

#[test]
fn test_stop_leaves_pid_from_unlocked_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let pid_path = dir.path().join("monitor.pid");

    // A crashed daemon left its PID file behind and the pid was reused
    let mut bystander = Command::new("sleep").arg("30").spawn().unwrap();
    fs::write(&pid_path, format!("{}\n", bystander.id())).unwrap();

    for command in ["stop", "reload"] {
        let status = monitor()
            .args([command, "--no-config", "--pidfile"])
            .arg(&pid_path)
            .status()
            .unwrap();
        assert_eq!(status.code(), Some(3), "{}", command);
    }

    thread::sleep(Duration::from_millis(200));
    assert!(
        bystander.try_wait().unwrap().is_none(),
        "unrelated process was signalled"
    );
    bystander.kill().unwrap();
    bystander.wait().unwrap();
}

#[test]
fn test_foreground_run_stops_on_sigterm() {
    if !have_proc() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 1);

    let mut child = monitor()
        .args(["start", "--foreground", "--config"])
        .arg(&paths.config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let pid = child.id() as i32;
    assert!(
        wait_for(Duration::from_secs(5), || read_pid(&paths.pid)
            .ok()
            .flatten()
            == Some(pid)),
        "PID file never written"
    );
    assert!(
        wait_for(Duration::from_secs(10), || fs::read_to_string(&paths.log)
            .map(|s| s.lines().count() >= 1)
            .unwrap_or(false)),
        "no record emitted"
    );

    kill(Pid::from_raw(pid), Signal::SIGTERM).unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(!paths.pid.exists(), "PID file must be removed on stop");

    let content = fs::read_to_string(&paths.log).unwrap();
    for line in content.lines() {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        for key in ["timestamp", "cpu", "memory", "disks", "networks"] {
            assert!(record.get(key).is_some(), "missing {}", key);
        }
    }
}

#[test]
fn test_detached_daemon_start_and_stop() {
    if !have_proc() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let paths = write_config(dir.path(), 1);

    let status = monitor()
        .args(["start", "--config"])
        .arg(&paths.config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    // `start` only returns once the daemon has published its pid
    let pid = read_pid(&paths.pid)
        .unwrap()
        .expect("PID file written before start returned");
    assert_ne!(pid as u32, std::process::id());
    assert!(sysmon::daemon::process_alive(pid));

    let status = monitor()
        .args(["stop", "--wait", "10", "--config"])
        .arg(&paths.config)
        .status()
        .unwrap();
    if status.code() != Some(0) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
    assert_eq!(status.code(), Some(0));
    assert!(wait_for(Duration::from_secs(2), || !paths.pid.exists()));

    let diagnostics = fs::read_to_string(&paths.daemon_log).unwrap();
    assert!(diagnostics.contains("RUNNING"));
    assert!(diagnostics.contains("STOPPED"));
}

#[test]
fn test_once_prints_one_record() {
    if !have_proc() {
        return;
    }
    let output = monitor()
        .args(["once", "--no-config", "--samples", "2", "--interval", "1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    let cpu = record["cpu"]["utilization_percent"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&cpu));
}

#[test]
fn test_config_command_prints_defaults() {
    let output = monitor()
        .args(["config", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["interval_seconds"], 5);
    assert_eq!(config["max_consecutive_failures"], 3);
}
