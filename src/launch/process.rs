// src/launch/process.rs

//! Handle to a running child process.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::errors::{ExecError, Result};
use crate::types::ExitStatus;

#[derive(Debug, Default)]
struct KillSignal {
    notify: Notify,
    requested: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Cloneable kill switch for a [`ProcessHandle`].
///
/// Requests are served by whoever is currently awaiting
/// [`ProcessHandle::wait`]; a request made before anyone waits is remembered.
#[derive(Debug, Clone)]
pub struct ProcessKiller {
    signal: Arc<KillSignal>,
}

impl ProcessKiller {
    /// A kill switch not connected to any process.
    #[cfg(test)]
    pub(crate) fn unattached() -> Self {
        Self {
            signal: Arc::new(KillSignal::default()),
        }
    }

    pub fn kill(&self) {
        self.signal.requested.store(true, Ordering::SeqCst);
        self.signal.notify.notify_one();
    }

    pub fn kill_requested(&self) -> bool {
        self.signal.requested.load(Ordering::SeqCst)
    }

    /// Error reported by the OS when the kill was attempted, if any.
    pub fn last_error(&self) -> Option<String> {
        self.signal
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// A spawned child with its standard streams.
///
/// Created by a launcher, consumed by the orchestrator. Dropping the handle
/// kills the child unless it was launched detached. When the child leads its
/// own process group, kills reach the whole group so grandchildren holding
/// the output pipes die with it.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    group_leader: bool,
    signal: Arc<KillSignal>,
}

impl ProcessHandle {
    pub(crate) fn new(child: Child, group_leader: bool) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            group_leader,
            signal: Arc::new(KillSignal::default()),
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller {
            signal: Arc::clone(&self.signal),
        }
    }

    /// Forcibly terminate the child without waiting for it.
    pub fn kill(&mut self) {
        // The child is not reaped yet, so its pid still names its group.
        if let (true, Some(pid)) = (self.group_leader, self.pid) {
            if let Err(e) = kill_group_by_pid(pid) {
                debug!(pid, error = %e, "process group kill failed");
            }
        }
        if let Err(e) = self.child.start_kill() {
            if e.kind() == io::ErrorKind::InvalidInput {
                debug!(pid = ?self.pid, "kill requested for a process that already exited");
                return;
            }
            warn!(pid = ?self.pid, error = %e, "failed to kill child process");
            *self
                .signal
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(e.to_string());
        }
    }

    /// Wait for the child to exit, serving kill requests meanwhile.
    ///
    /// Cancel-safe: dropping the future leaves the handle usable.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        loop {
            tokio::select! {
                status = self.child.wait() => {
                    return status
                        .map(ExitStatus::from)
                        .map_err(|source| ExecError::Wait { source });
                }
                _ = self.signal.notify.notified() => self.kill(),
            }
        }
    }
}

/// Forcibly terminate a process by pid.
///
/// Used where no [`ProcessHandle`] is reachable, e.g. the shutdown sweep.
#[cfg(unix)]
pub fn kill_by_pid(pid: u32) -> io::Result<()> {
    use rustix::process::{Pid, Signal, kill_process};

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let pid = Pid::from_raw(raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))?;
    kill_process(pid, Signal::KILL).map_err(io::Error::from)
}

/// Forcibly terminate the process group led by `pid`, falling back to the
/// single process when `pid` leads no group.
#[cfg(unix)]
pub fn kill_group_by_pid(pid: u32) -> io::Result<()> {
    use rustix::process::{Pid, Signal, kill_process_group};

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let group = Pid::from_raw(raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))?;
    match kill_process_group(group, Signal::KILL) {
        Ok(()) => Ok(()),
        Err(rustix::io::Errno::SRCH) => kill_by_pid(pid),
        Err(e) => Err(io::Error::from(e)),
    }
}

/// Process groups are a unix notion; elsewhere this kills the single process.
#[cfg(not(unix))]
pub fn kill_group_by_pid(pid: u32) -> io::Result<()> {
    kill_by_pid(pid)
}

#[cfg(windows)]
pub fn kill_by_pid(pid: u32) -> io::Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};

    // SAFETY: the handle is checked for null and closed exactly once.
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let result = if TerminateProcess(handle, 1) == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        };
        CloseHandle(handle);
        result
    }
}

#[cfg(not(any(unix, windows)))]
pub fn kill_by_pid(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "forced termination is not supported on this platform",
    ))
}
