// src/reaper.rs

//! Process-wide registry of running children.
//!
//! Every child started by [`Execute`](crate::execute::Execute) is registered
//! right after spawn and unregistered when its [`Registration`] guard drops,
//! which happens on every exit path. If the host is interrupted while
//! children are still registered, [`ProcessReaper::sweep`] force-kills them so
//! they are not left orphaned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::{debug, info, warn};

use crate::launch::kill_group_by_pid;

/// Exit code used when the shutdown hook terminates the host.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug)]
struct Entry {
    pid: u32,
    label: String,
}

#[derive(Debug, Default)]
pub struct ProcessReaper {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
    hook_installed: AtomicBool,
}

static GLOBAL: OnceLock<ProcessReaper> = OnceLock::new();

impl ProcessReaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole host process.
    pub fn global() -> &'static ProcessReaper {
        GLOBAL.get_or_init(ProcessReaper::new)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track `pid` until the returned guard is dropped.
    pub fn register(&self, pid: u32, label: impl Into<String>) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        debug!(pid, %label, "registered child with reaper");
        self.entries().insert(id, Entry { pid, label });
        Registration { reaper: self, id }
    }

    fn unregister(&self, id: u64) {
        if let Some(entry) = self.entries().remove(&id) {
            debug!(pid = entry.pid, "unregistered child from reaper");
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.entries().values().map(|e| e.pid).collect()
    }

    /// Kill every registered child along with its process group. Errors are
    /// logged and otherwise ignored.
    ///
    /// Returns the number of children successfully signalled.
    pub fn sweep(&self) -> usize {
        let drained: Vec<Entry> = self.entries().drain().map(|(_, e)| e).collect();
        let mut killed = 0;
        for entry in drained {
            match kill_group_by_pid(entry.pid) {
                Ok(()) => {
                    info!(pid = entry.pid, cmd = %entry.label, "killed orphaned child");
                    killed += 1;
                }
                Err(e) => {
                    warn!(pid = entry.pid, cmd = %entry.label, error = %e, "failed to kill child during shutdown");
                }
            }
        }
        killed
    }

    /// Sweep the registry and exit with code 130 on Ctrl-C.
    ///
    /// Installs at most one listener per reaper. Must be called from within a
    /// Tokio runtime.
    pub fn install_shutdown_hook(&'static self) {
        if self.hook_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C; shutdown sweep disabled");
                return;
            }
            let count = self.len();
            info!(count, "interrupted; killing running children");
            self.sweep();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        });
    }
}

/// Keeps a child registered with a [`ProcessReaper`] while alive.
#[derive(Debug)]
#[must_use = "the child is unregistered as soon as the registration drops"]
pub struct Registration<'a> {
    reaper: &'a ProcessReaper,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.reaper.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_guard_unregisters_on_drop() {
        let reaper = ProcessReaper::new();
        let a = reaper.register(101, "a");
        let b = reaper.register(102, "b");
        assert_eq!(reaper.len(), 2);

        drop(a);
        assert_eq!(reaper.pids(), vec![102]);
        drop(b);
        assert!(reaper.is_empty());
    }

    #[test]
    fn unwinding_still_unregisters() {
        let reaper = ProcessReaper::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = reaper.register(7, "panicky");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(reaper.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sweep_kills_registered_children() {
        let reaper = ProcessReaper::new();
        let mut child = tokio::process::Command::new("sleep")
            .arg("60")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let guard = reaper.register(pid, "sleep 60");

        assert_eq!(reaper.sweep(), 1);
        assert!(reaper.is_empty());

        let status = child.wait().await.unwrap();
        assert!(!status.success());
        drop(guard);
    }
}
