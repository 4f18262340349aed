//! Execution integration tests.
//!
//! These tests spawn real processes and verify capture, classification,
//! tee delivery, and cleanup guarantees.

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cmdexec::{Command, Destroyed, ExecError, LineSink, ProcessState};

fn command(args: &[&str]) -> Command {
    Command::builder().args(args).build().unwrap()
}

/// Whether a process with this pid still exists (zombies excluded once reaped).
fn is_running(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence and permission.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Run `sleep 10` under a shell that first records its pid in `dir`.
fn pid_recording_sleep(dir: &std::path::Path) -> (Command, std::path::PathBuf) {
    let pidfile = dir.join("pid");
    let script = format!("echo $$ > '{}'; exec sleep 10", pidfile.display());
    (command(&["sh", "-c", &script]), pidfile)
}

fn read_pid(pidfile: &std::path::Path) -> u32 {
    std::fs::read_to_string(pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

/// Log writer that keeps everything written to it.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    /// Messages logged on the native-output target, in order.
    fn native_lines(&self) -> Vec<String> {
        let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        text.lines()
            .filter_map(|line| line.split_once("cmdexec::native: "))
            .map(|(_, message)| message.to_string())
            .collect()
    }
}

fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, logs)
}

/// Sink that records lines and the moment each arrived.
#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(String, Instant)>>,
}

impl LineSink for RecordingSink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .unwrap()
            .push((line.to_string(), Instant::now()));
        Ok(())
    }
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(line, _)| line.clone())
            .collect()
    }
}

// ============================================================================
// Synchronous execution
// ============================================================================

#[test]
fn test_simple_success() {
    let lines = command(&["echo", "hello"]).execute().unwrap();
    assert_eq!(lines, vec!["hello"]);
}

#[test]
fn test_non_zero_without_permit() {
    let err = command(&["sh", "-c", "exit 3"]).execute().unwrap_err();

    match err {
        ExecError::CommandFailed(failure) => {
            assert_eq!(failure.args, vec!["sh", "-c", "exit 3"]);
            assert!(failure.output.is_empty());
            assert_eq!(failure.exit_code, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_non_zero_with_permit() {
    let lines = Command::builder()
        .args(["sh", "-c", "exit 3"])
        .permit_non_zero_exit(true)
        .execute()
        .unwrap();
    assert!(lines.is_empty());
}

#[test]
fn test_failure_keeps_output() {
    let err = command(&["sh", "-c", "echo one; echo two >&2; exit 1"])
        .execute()
        .unwrap_err();

    assert!(err.is_command_failed());
    assert_eq!(err.output().unwrap(), ["one", "two"]);
}

#[test]
fn test_output_completeness() {
    let lines = command(&["sh", "-c", "i=0; while [ $i -lt 500 ]; do echo line$i; i=$((i+1)); done"])
        .execute()
        .unwrap();

    assert_eq!(lines.len(), 500);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line, &format!("line{i}"));
    }
}

#[test]
fn test_output_without_trailing_newline() {
    let lines = command(&["printf", "a\nb"]).execute().unwrap();
    assert_eq!(lines, vec!["a", "b"]);
}

#[test]
fn test_env_and_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let lines = Command::builder()
        .args(["sh", "-c", "echo $GREETING; pwd"])
        .env("GREETING", "hi")
        .working_dir(dir.path())
        .execute()
        .unwrap();

    assert_eq!(lines[0], "hi");
    let reported = std::fs::canonicalize(&lines[1]).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
}

#[test]
fn test_env_inherited_and_overridden() {
    let lines = Command::builder()
        .args(["sh", "-c", "echo $PATH"])
        .env("PATH", "/custom/bin:/usr/bin:/bin")
        .execute()
        .unwrap();
    assert_eq!(lines, vec!["/custom/bin:/usr/bin:/bin"]);

    let inherited = command(&["sh", "-c", "echo ${HOME:-unset}"]).execute().unwrap();
    assert_eq!(inherited.len(), 1);
}

#[test]
fn test_launch_failure() {
    let err = command(&["/definitely/not/a/real/program"])
        .execute()
        .unwrap_err();

    match err {
        ExecError::Execution { source, .. } => {
            assert!(matches!(*source, ExecError::Launch { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_command_reusable() {
    let cmd = command(&["echo", "again"]);
    assert_eq!(cmd.execute().unwrap(), vec!["again"]);
    assert_eq!(cmd.execute().unwrap(), vec!["again"]);
}

#[test]
fn test_gather_result_reports_exit_code() {
    let process = command(&["sh", "-c", "echo x; exit 7"]).start().unwrap();
    let result = process.gather_result().unwrap();

    assert_eq!(result.lines, vec!["x"]);
    assert_eq!(result.exit_code, 7);
    assert!(result.failed());
    assert_eq!(process.state(), ProcessState::Terminated);
}

// ============================================================================
// Tee and native output
// ============================================================================

#[test]
fn test_tee_observation() {
    let sink = Arc::new(RecordingSink::default());
    let lines = Command::builder()
        .args(["printf", "a\nb\n"])
        .tee(sink.clone())
        .execute()
        .unwrap();

    assert_eq!(sink.lines(), vec!["a", "b"]);
    assert_eq!(sink.lines(), lines);
}

#[test]
fn test_tee_is_live() {
    let sink = Arc::new(RecordingSink::default());
    let process = Command::builder()
        .args(["sh", "-c", "echo early; sleep 0.5; echo late"])
        .tee(sink.clone())
        .build()
        .unwrap()
        .start()
        .unwrap();

    let gather_started = Instant::now();
    process.gather_output().unwrap();
    let gather_finished = Instant::now();

    let recorded = sink.lines.lock().unwrap().clone();
    assert_eq!(recorded.len(), 2);
    // The first line arrived well before the command finished.
    assert!(recorded[0].1 < gather_finished - Duration::from_millis(250));
    assert!(recorded[0].1 >= gather_started);
}

#[test]
fn test_tee_fidelity_on_failure() {
    let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
    let err = Command::builder()
        .args(["sh", "-c", "echo one; echo two; exit 2"])
        .tee(sink.clone())
        .execute()
        .unwrap_err();

    let teed = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
    let teed: Vec<&str> = teed.lines().collect();
    assert_eq!(teed, err.output().unwrap());
}

#[test]
fn test_native_output_does_not_change_result() {
    let lines = Command::builder()
        .args(["echo", "mirrored"])
        .native_output(true)
        .execute()
        .unwrap();
    assert_eq!(lines, vec!["mirrored"]);
}

#[test]
fn test_native_output_reaches_log_target() {
    let cmd = Command::builder()
        .args(["sh", "-c", "echo first; echo second >&2; echo third"])
        .native_output(true)
        .build()
        .unwrap();

    let (lines, logs) = capture_logs(|| cmd.execute().unwrap());

    assert_eq!(lines, vec!["first", "second", "third"]);
    assert_eq!(logs.native_lines(), lines);
}

#[test]
fn test_native_output_off_logs_nothing() {
    let cmd = command(&["echo", "quiet"]);
    let (lines, logs) = capture_logs(|| cmd.execute().unwrap());

    assert_eq!(lines, vec!["quiet"]);
    assert!(logs.native_lines().is_empty());
}

// ============================================================================
// Timeouts, background execution, destroy
// ============================================================================

#[test]
fn test_timeout_destroys_process() {
    let cmd = command(&["sleep", "10"]);
    let started = Instant::now();
    let err = cmd.execute_with_timeout(Duration::from_secs(1)).unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_timeout_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let (cmd, pidfile) = pid_recording_sleep(dir.path());

    let err = cmd.execute_with_timeout(Duration::from_secs(1)).unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(!is_running(read_pid(&pidfile)));
}

#[test]
fn test_destroy_leaves_no_process_running() {
    let cmd = command(&["sleep", "10"]);
    let pending = cmd.execute_later().unwrap();
    while pending.process().pid().is_none() {
        std::thread::sleep(Duration::from_millis(5));
    }
    let pid = pending.process().pid().unwrap();
    assert!(is_running(pid));

    assert!(matches!(pending.destroy(), Destroyed::Killed { .. }));
    assert!(!is_running(pid));
    assert!(pending.wait().unwrap_err().is_command_failed());
}

#[test]
fn test_completes_within_deadline() {
    let lines = command(&["echo", "quick"])
        .execute_with_timeout(Duration::from_secs(10))
        .unwrap();
    assert_eq!(lines, vec!["quick"]);
}

#[test]
fn test_failure_within_deadline_propagates() {
    let err = command(&["sh", "-c", "echo bad; exit 4"])
        .execute_with_timeout(Duration::from_secs(10))
        .unwrap_err();

    match err {
        ExecError::CommandFailed(failure) => {
            assert_eq!(failure.exit_code, 4);
            assert_eq!(failure.output, vec!["bad"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_execute_later_isolated_workers() {
    let slow = command(&["sleep", "10"]).execute_later().unwrap();
    let fast = command(&["echo", "independent"]).execute_later().unwrap();

    assert_eq!(fast.wait().unwrap(), vec!["independent"]);
    assert!(!slow.is_finished());
    slow.destroy();
    assert!(slow.wait().is_err());
}

#[test]
fn test_destroy_idempotent() {
    let cmd = command(&["sleep", "10"]);
    let never_started = cmd.process();
    assert_eq!(never_started.destroy(), Destroyed::NotStarted);

    let process = cmd.start().unwrap();
    assert!(matches!(process.destroy(), Destroyed::Killed { .. }));
    assert_eq!(process.destroy(), Destroyed::AlreadyTerminated);
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[test]
fn test_length_guard_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");

    let result = Command::builder()
        .arg("touch")
        .path_arg(&marker)
        .max_length(8)
        .execute();

    assert!(matches!(result, Err(ExecError::TooLong { .. })));
    assert!(!marker.exists());
}

// ============================================================================
// Async execution
// ============================================================================

#[tokio::test]
async fn test_async_success() {
    let lines = command(&["echo", "async"]).execute_async(None).await.unwrap();
    assert_eq!(lines, vec!["async"]);
}

#[tokio::test]
async fn test_async_timeout() {
    let started = Instant::now();
    let err = command(&["sleep", "10"])
        .execute_async(Some(Duration::from_millis(300)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_async_timeout_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let (cmd, pidfile) = pid_recording_sleep(dir.path());

    let err = cmd
        .execute_async(Some(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(!is_running(read_pid(&pidfile)));
}

#[tokio::test]
async fn test_async_dropped_future_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let (cmd, pidfile) = pid_recording_sleep(dir.path());

    let cancelled = tokio::time::timeout(Duration::from_millis(500), cmd.execute_async(None)).await;
    assert!(cancelled.is_err());

    let pid = read_pid(&pidfile);
    assert!(!is_running(pid), "pid {pid} survived the dropped future");
}

#[tokio::test]
async fn test_async_tee_channel() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let lines = Command::builder()
        .args(["printf", "x\ny\n"])
        .tee(Arc::new(tx))
        .build()
        .unwrap()
        .execute_async(Some(Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(rx.recv().await.as_deref(), Some("x"));
    assert_eq!(rx.recv().await.as_deref(), Some("y"));
    assert_eq!(lines, vec!["x", "y"]);
}
