// src/watchdog.rs

//! Deadline enforcement for a running child.
//!
//! ```text
//! Idle --start--> Armed --deadline--> Fired    (child killed)
//!                   \----stop------> Stopped  (no kill)
//! ```
//!
//! `Fired` and `Stopped` are terminal; a watchdog guards one process once.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{ExecError, Result};
use crate::launch::ProcessKiller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Armed,
    Fired,
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<WatchdogState>,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Kills the watched process if it outlives `timeout`.
#[derive(Debug)]
pub struct ProcessWatchdog {
    timeout: Duration,
    shared: Arc<Shared>,
    killer: Option<ProcessKiller>,
    cancel: Option<oneshot::Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ProcessWatchdog {
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ExecError::InvalidTimeout(
                "watchdog timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(WatchdogState::Idle),
                failure: Mutex::new(None),
            }),
            killer: None,
            cancel: None,
            timer: None,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> WatchdogState {
        *self.shared.state()
    }

    /// Arm the timer against the process behind `killer`.
    ///
    /// Must be called from within a Tokio runtime. Has no effect unless the
    /// watchdog is idle.
    pub fn start(&mut self, killer: ProcessKiller) {
        {
            let mut state = self.shared.state();
            if *state != WatchdogState::Idle {
                warn!(state = ?*state, "watchdog already used; not re-arming");
                return;
            }
            *state = WatchdogState::Armed;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let timeout = self.timeout;
        let task_killer = killer.clone();

        self.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    let fire = {
                        let mut state = shared.state();
                        let armed = *state == WatchdogState::Armed;
                        if armed {
                            *state = WatchdogState::Fired;
                        }
                        armed
                    };
                    if fire {
                        warn!(?timeout, "process exceeded its timeout; killing it");
                        task_killer.kill();
                    }
                }
                _ = cancel_rx => {
                    debug!("watchdog cancelled before deadline");
                }
            }
        }));
        self.killer = Some(killer);
        self.cancel = Some(cancel_tx);
    }

    /// Disarm after the process exited. Waits for the timer task to finish.
    pub async fn stop(&mut self) {
        {
            let mut state = self.shared.state();
            if *state == WatchdogState::Armed {
                *state = WatchdogState::Stopped;
            }
        }

        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(timer) = self.timer.take() {
            if let Err(e) = timer.await {
                *self.shared.failure.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(format!("watchdog timer failed: {e}"));
            }
        }
    }

    /// Surface any failure that happened on the timer task.
    pub fn check_exception(&self) -> Result<()> {
        if let Some(msg) = self
            .shared
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(ExecError::Other(anyhow!(msg)));
        }
        if self.killed_process() {
            if let Some(msg) = self.killer.as_ref().and_then(ProcessKiller::last_error) {
                return Err(ExecError::Other(anyhow!(
                    "watchdog failed to kill process: {msg}"
                )));
            }
        }
        Ok(())
    }

    /// True only when this watchdog fired and killed the process.
    pub fn killed_process(&self) -> bool {
        self.state() == WatchdogState::Fired
    }
}

impl Drop for ProcessWatchdog {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
