//! Contract Tests for the Shell Command Runner
//!
//! These tests verify the `CommandRunner` contract against real processes:
//! capture, exit codes, deadlines, streaming, and that nothing a command
//! starts outlives it.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use modbar::error::Error;
use modbar::process::{CommandRunner, ShellRunner};
use tempfile::tempdir;

/// Whether a pid exists and is not a zombie
fn process_running(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rfind(')')
            .and_then(|end| stat[end + 2..].chars().next())
            .is_some_and(|state| state != 'Z'),
        Err(_) => false,
    }
}

async fn eventually_gone(pid: i32) -> bool {
    for _ in 0..100 {
        if !process_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn read_pid(path: &Path) -> i32 {
    fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

#[tokio::test]
async fn test_captures_stdout_only() {
    let runner = ShellRunner::new();
    let output = runner
        .run_once("echo out; echo err >&2", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(output.stdout, "out\n");
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let runner = ShellRunner::new();
    match runner.run_once("exit 42", Duration::from_secs(5)).await {
        Err(Error::CommandFailed { code, .. }) => assert_eq!(code, Some(42)),
        other => panic!("expected CommandFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shell_features_are_available() {
    let runner = ShellRunner::new();
    let output = runner
        .run_once("printf 'a b c' | wc -w | tr -d ' '", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(output.stdout.trim(), "3");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_whole_group() {
    let dir = tempdir().unwrap();
    let pid_file = dir.path().join("child.pid");
    let command = format!(
        "sleep 1000 & echo $! > {}; wait",
        pid_file.display()
    );

    let runner = ShellRunner::new();
    let started = Instant::now();
    let result = runner.run_once(&command, Duration::from_millis(300)).await;
    assert!(matches!(result, Err(Error::CommandTimeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));

    let grandchild = read_pid(&pid_file);
    assert!(eventually_gone(grandchild).await);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_background_children_do_not_outlive_success() {
    let runner = ShellRunner::new();
    let output = runner
        .run_once("sleep 1000 >/dev/null 2>&1 & echo $!", Duration::from_secs(5))
        .await
        .unwrap();
    let pid: i32 = output.stdout.trim().parse().unwrap();
    assert!(eventually_gone(pid).await);
}

#[tokio::test]
async fn test_streaming_yields_lines_then_exit_code() {
    let runner = ShellRunner::new();
    let mut stream = runner
        .run_streaming("for i in 1 2 3; do echo line$i; done; exit 4")
        .await
        .unwrap();
    assert!(stream.pid().is_some());

    let lines: Vec<String> = (&mut stream).collect().await;
    assert_eq!(lines, vec!["line1", "line2", "line3"]);
    assert_eq!(stream.exit_status().await, Some(4));
}

#[tokio::test]
async fn test_streaming_delivers_lines_as_flushed() {
    let runner = ShellRunner::new();
    let mut stream = runner
        .run_streaming("echo first; sleep 1000")
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next_line())
        .await
        .unwrap();
    assert_eq!(first.as_deref(), Some("first"));

    stream.terminate(Duration::from_millis(500)).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropping_stream_kills_group() {
    let runner = ShellRunner::new();
    let mut stream = runner.run_streaming("echo $$; sleep 1000").await.unwrap();
    let pid: i32 = stream.next_line().await.unwrap().parse().unwrap();
    assert!(process_running(pid));

    drop(stream);
    assert!(eventually_gone(pid).await);
}

#[tokio::test]
async fn test_spawn_failure_and_empty_command() {
    let runner = ShellRunner::new().with_shell("/nonexistent/shell");
    assert!(matches!(
        runner.run_once("true", Duration::from_secs(1)).await,
        Err(Error::CommandSpawnFailed { .. })
    ));
    assert!(matches!(
        runner.run_streaming("true").await,
        Err(Error::CommandSpawnFailed { .. })
    ));

    let runner = ShellRunner::new();
    assert!(matches!(
        runner.run_once("  ", Duration::from_secs(1)).await,
        Err(Error::EmptyCommand)
    ));
}
