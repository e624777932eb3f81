#![cfg(unix)]

use std::error::Error;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use procrun::reaper::INTERRUPTED_EXIT_CODE;
use procrun_test_utils::{init_tracing, process_alive, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn read_pid(path: &Path) -> Option<u32> {
    for _ in 0..250 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return Some(pid);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

/// A killed child may linger as a zombie until its new parent reaps it.
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| stat.rsplit_once(')').map(|(_, rest)| rest.trim_start().starts_with('Z')))
        .unwrap_or(false)
}

async fn gone(pid: u32) -> bool {
    for _ in 0..100 {
        if !process_alive(pid) || is_zombie(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// SIGINT to the `procrun` binary kills the supervised child and exits 130.
#[tokio::test]
async fn sigint_sweeps_child_and_exits_130() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let pid_file = dir.path().join("child.pid");
    let script = format!("echo $$ > '{}'; exec sleep 60", pid_file.display());

    let mut procrun = Command::new(env!("CARGO_BIN_EXE_procrun"))
        .args(["--", "/bin/sh", "-c", &script])
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let child = read_pid(&pid_file).await.ok_or("child never wrote its pid")?;
    // Let the signal listener come up before interrupting.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let procrun_pid = procrun.id().ok_or("procrun already exited")?;
    let sent = std::process::Command::new("kill")
        .args(["-INT", &procrun_pid.to_string()])
        .status()?;
    assert!(sent.success());

    let status = with_timeout(procrun.wait()).await?;
    assert_eq!(status.code(), Some(INTERRUPTED_EXIT_CODE));
    assert!(gone(child).await, "child {child} survived the sweep");
    Ok(())
}
