//! Integration tests for the tunnel supervisor, using shell scripts in
//! place of the SSH client.

#![cfg(unix)]

use companion_agent::config::TunnelConfig;
use companion_agent::tunnel::{
    BrowserPresenter, Readiness, RetryPolicy, SupervisorSettings, TunnelEvent, TunnelState,
    TunnelSupervisor,
};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct Scripts {
    _dir: tempfile::TempDir,
    /// Writes its pid to the file named by its last argument (the host),
    /// then stays up until killed
    hold: PathBuf,
    /// Exits immediately with an SSH-like error
    refuse: PathBuf,
    /// Runs for a second, then exits cleanly
    brief: PathBuf,
}

/// All scripts are written once, before any test spawns a process, so no
/// child can inherit a script's open write handle.
fn scripts() -> &'static Scripts {
    static SCRIPTS: OnceLock<Scripts> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let hold = write_script(
            dir.path(),
            "hold",
            "for last; do :; done\necho $$ > \"$last.tmp\"\nmv \"$last.tmp\" \"$last\"\nexec sleep 30",
        );
        let refuse = write_script(
            dir.path(),
            "refuse",
            "echo 'ssh: connect to host nowhere port 22: Connection refused' >&2\nexit 255",
        );
        let brief = write_script(dir.path(), "brief", "sleep 1\nexit 0");
        Scripts {
            _dir: dir,
            hold,
            refuse,
            brief,
        }
    })
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A port nothing listens on once the listener is gone.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config whose host doubles as the pid file of the `hold` script.
fn pid_config(pid_file: &Path, port: u16) -> TunnelConfig {
    TunnelConfig::new(pid_file.to_string_lossy()).with_local_port(port)
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn wait_for_pid(path: &Path) -> u32 {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(pid) = read_pid(path) {
            return pid;
        }
        assert!(Instant::now() < deadline, "no pid in {}", path.display());
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn is_alive(pid: u32) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Whether the OS process is gone (killed and reaped) within `WAIT`.
fn process_gone(pid: u32) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn settings(program: &Path, readiness: Readiness) -> SupervisorSettings {
    SupervisorSettings {
        program: program.to_path_buf(),
        readiness,
        retry: RetryPolicy::manual(),
        liveness_interval: Duration::from_millis(100),
    }
}

fn quick_settle() -> Readiness {
    Readiness::Settle(Duration::from_millis(200))
}

#[test]
fn test_port_open_reaches_ready_and_presents_url() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("hold.pid");
    let port = free_port();

    let readiness = Readiness::PortOpen {
        interval: Duration::from_millis(50),
        timeout: WAIT,
    };
    let supervisor = TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.hold, readiness));
    supervisor.connect(&pid_config(&pid_file, port)).unwrap();
    assert_eq!(supervisor.state(), TunnelState::Connecting);

    // Stand in for the forward ssh would open, only once the process runs.
    let pid = wait_for_pid(&pid_file);
    let _forward = TcpListener::bind(("127.0.0.1", port)).unwrap();

    let mut presenter = BrowserPresenter::new(false);
    let mut delivered = Vec::new();
    let deadline = Instant::now() + WAIT;
    while presenter.attached_url().is_none() && Instant::now() < deadline {
        delivered.extend(supervisor.pump(&mut presenter));
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(
        delivered,
        vec![
            TunnelEvent::Connecting { attempt: 1 },
            TunnelEvent::Ready { local_port: port },
        ]
    );
    let expected_url = format!("http://127.0.0.1:{port}/");
    assert_eq!(presenter.attached_url(), Some(expected_url.as_str()));
    assert_eq!(supervisor.state(), TunnelState::Ready);
    assert!(supervisor.has_process());
    assert!(is_alive(pid));

    supervisor.teardown();
    assert_eq!(supervisor.state(), TunnelState::Idle);
    assert!(!supervisor.has_process());
    assert!(process_gone(pid), "pid {pid} survived teardown");
}

#[test]
fn test_busy_port_fails_without_spawning() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("hold.pid");
    // Some other program already serves the local port.
    let foreign = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = foreign.local_addr().unwrap().port();

    let readiness = Readiness::PortOpen {
        interval: Duration::from_millis(50),
        timeout: WAIT,
    };
    let supervisor = TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.hold, readiness));
    supervisor.connect(&pid_config(&pid_file, port)).unwrap();

    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    match supervisor.next_event(WAIT) {
        Some(TunnelEvent::Failed { reason }) => {
            assert!(reason.contains("in use"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(supervisor.state(), TunnelState::Failed(_)));
    assert!(!supervisor.has_process());

    std::thread::sleep(Duration::from_millis(200));
    assert!(!pid_file.exists());
}

#[test]
fn test_early_exit_reports_stderr() {
    let scripts = scripts();
    let rt = runtime();
    let supervisor = TunnelSupervisor::new(
        rt.handle().clone(),
        settings(&scripts.refuse, Readiness::settle()),
    );

    supervisor
        .connect(&TunnelConfig::new("me@nowhere").with_local_port(free_port()))
        .unwrap();
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    match supervisor.next_event(WAIT) {
        Some(TunnelEvent::Failed { reason }) => {
            assert!(reason.contains("Connection refused"), "{reason}");
            assert!(reason.contains("255"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(supervisor.state(), TunnelState::Failed(_)));
    assert!(!supervisor.has_process());
}

#[test]
fn test_port_open_timeout_fails_and_kills_process() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("hold.pid");

    let readiness = Readiness::PortOpen {
        interval: Duration::from_millis(50),
        timeout: Duration::from_millis(300),
    };
    let supervisor = TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.hold, readiness));
    supervisor.connect(&pid_config(&pid_file, free_port())).unwrap();

    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    match supervisor.next_event(WAIT) {
        Some(TunnelEvent::Failed { reason }) => {
            assert!(reason.contains("not ready"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!supervisor.has_process());

    // The kill may land before the script got to write its pid.
    if let Some(pid) = read_pid(&pid_file) {
        assert!(process_gone(pid), "pid {pid} survived the failed attempt");
    }
}

#[test]
fn test_teardown_wins_against_pending_connect() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("hold.pid");
    let supervisor = TunnelSupervisor::new(
        rt.handle().clone(),
        settings(&scripts.hold, Readiness::Settle(Duration::from_millis(300))),
    );

    supervisor.connect(&pid_config(&pid_file, free_port())).unwrap();
    supervisor.teardown();

    assert!(supervisor.next_event(Duration::from_millis(800)).is_none());
    assert_eq!(supervisor.state(), TunnelState::Idle);
    assert!(!supervisor.has_process());

    // The attempt may or may not have spawned before the teardown.
    if let Some(pid) = read_pid(&pid_file) {
        assert!(process_gone(pid), "pid {pid} outlived the teardown");
    }

    supervisor.teardown();
    assert_eq!(supervisor.state(), TunnelState::Idle);
}

#[test]
fn test_reconnect_replaces_session() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let first_pid_file = dir.path().join("first.pid");
    let second_pid_file = dir.path().join("second.pid");
    let port = free_port();
    let supervisor =
        TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.hold, quick_settle()));

    supervisor.connect(&pid_config(&first_pid_file, port)).unwrap();
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Ready { local_port: port })
    );
    let first = wait_for_pid(&first_pid_file);

    supervisor.connect(&pid_config(&second_pid_file, port)).unwrap();
    assert_eq!(supervisor.state(), TunnelState::Connecting);
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Ready { local_port: port })
    );
    assert!(supervisor.has_process());

    // The replacement only spawns once the first process has exited.
    let second = wait_for_pid(&second_pid_file);
    assert_ne!(first, second);
    assert!(!is_alive(first), "pid {first} overlapped its replacement");
    assert!(is_alive(second));

    // The first session's process was killed without a Closed event.
    assert!(supervisor.next_event(Duration::from_millis(400)).is_none());
    assert_eq!(supervisor.state(), TunnelState::Ready);

    supervisor.teardown();
    assert!(process_gone(second));
}

#[test]
fn test_process_exit_after_ready_closes() {
    let scripts = scripts();
    let rt = runtime();
    let port = free_port();
    let supervisor =
        TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.brief, quick_settle()));

    supervisor
        .connect(&TunnelConfig::new("me@host").with_local_port(port))
        .unwrap();
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Ready { local_port: port })
    );
    match supervisor.next_event(WAIT) {
        Some(TunnelEvent::Closed { reason }) => {
            assert!(reason.contains("exited"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(supervisor.state(), TunnelState::Idle);
    assert!(!supervisor.has_process());
}

#[test]
fn test_retry_policy_and_manual_retry() {
    let scripts = scripts();
    let rt = runtime();
    let mut settings = settings(&scripts.refuse, Readiness::settle());
    settings.retry = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(50),
    };
    let supervisor = TunnelSupervisor::new(rt.handle().clone(), settings);
    let config = TunnelConfig::new("me@nowhere").with_local_port(free_port());

    supervisor.connect(&config).unwrap();
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 2 })
    );
    assert!(matches!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Failed { .. })
    ));

    // A failed session accepts the same config again.
    supervisor.connect(&config).unwrap();
    assert_eq!(supervisor.state(), TunnelState::Connecting);
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
}

#[test]
fn test_drop_tears_down() {
    let scripts = scripts();
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("hold.pid");
    let port = free_port();
    let supervisor =
        TunnelSupervisor::new(rt.handle().clone(), settings(&scripts.hold, quick_settle()));

    supervisor.connect(&pid_config(&pid_file, port)).unwrap();
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Connecting { attempt: 1 })
    );
    assert_eq!(
        supervisor.next_event(WAIT),
        Some(TunnelEvent::Ready { local_port: port })
    );
    let pid = wait_for_pid(&pid_file);
    assert!(is_alive(pid));

    drop(supervisor);
    assert!(process_gone(pid), "pid {pid} survived the drop");
}
