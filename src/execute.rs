// src/execute.rs

//! The `Execute` orchestrator: runs one external command to completion.
//!
//! Order of operations in [`Execute::execute`]:
//!
//! 1. resolve the child's environment from the [`EnvMode`];
//! 2. pick the launcher (native, or shell-wrapped when preferred);
//! 3. spawn, then register the child with the [`ProcessReaper`];
//! 4. hand the three standard streams to the stream handler and start it;
//! 5. arm the watchdog, if any;
//! 6. wait for exit; watchdog and interrupts kill through the process's
//!    kill switch;
//! 7. stop the watchdog, unregister, stop the stream handler (drains output);
//! 8. report the exit status.
//!
//! A failing exit status is data, not an error. See
//! [`ExecTask`](crate::task::ExecTask) for the checked variant.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::env::{EnvMode, Environment};
use crate::errors::{ExecError, Result};
use crate::launch::{LaunchRequest, LauncherSet, ProcessHandle, ProcessKiller, StdioMode};
use crate::logging::{LogCallback, tracing_callback};
use crate::reaper::ProcessReaper;
use crate::stream::{ExecuteStreamHandler, PumpStreamHandler};
use crate::types::{CommandLine, ExitStatus, FailureRule, Severity};
use crate::watchdog::ProcessWatchdog;

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    killer: ProcessKiller,
    interrupted: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct InterruptSignal {
    active: Mutex<Vec<ActiveRun>>,
    next_id: AtomicU64,
}

impl InterruptSignal {
    fn active(&self) -> MutexGuard<'_, Vec<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the running child reachable by `interrupt` until the guard drops.
    fn enter(&self, killer: ProcessKiller) -> ActiveGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let interrupted = Arc::new(AtomicBool::new(false));
        self.active().push(ActiveRun {
            id,
            killer,
            interrupted: Arc::clone(&interrupted),
        });
        ActiveGuard {
            signal: self,
            id,
            interrupted,
        }
    }
}

struct ActiveGuard<'a> {
    signal: &'a InterruptSignal,
    id: u64,
    interrupted: Arc<AtomicBool>,
}

impl ActiveGuard<'_> {
    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.signal.active().retain(|run| run.id != self.id);
    }
}

/// Cloneable handle that aborts running [`Execute::execute`] calls.
///
/// Every child currently running under this interrupter is killed; each
/// `execute()` still returns its final status. An interrupt with nothing
/// running is a no-op and does not affect later runs.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    signal: Arc<InterruptSignal>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        let active = self.signal.active();
        if active.is_empty() {
            debug!("interrupt requested with nothing running");
        }
        for run in active.iter() {
            run.interrupted.store(true, Ordering::SeqCst);
            run.killer.kill();
        }
    }
}

pub struct Execute {
    command: CommandLine,
    env: EnvMode,
    working_dir: Option<PathBuf>,
    stream_handler: Box<dyn ExecuteStreamHandler>,
    watchdog: Option<ProcessWatchdog>,
    launchers: Arc<LauncherSet>,
    prefer_shell: bool,
    failure_rule: FailureRule,
    log: LogCallback,
    reaper: &'static ProcessReaper,
    interrupt: Arc<InterruptSignal>,
    interrupted: bool,
}

impl Execute {
    /// Defaults: inherited environment, parent's directory, output relayed
    /// to this process's stdout/stderr, no timeout, host launchers.
    pub fn new(command: CommandLine) -> Self {
        let launchers = LauncherSet::shared_host();
        Self {
            command,
            env: EnvMode::Inherit,
            working_dir: None,
            stream_handler: Box::new(PumpStreamHandler::inherit()),
            watchdog: None,
            failure_rule: launchers.platform().failure_rule(),
            launchers,
            prefer_shell: false,
            log: tracing_callback(),
            reaper: ProcessReaper::global(),
            interrupt: Arc::new(InterruptSignal::default()),
            interrupted: false,
        }
    }

    /// Use a specific launcher registry. Also adopts its platform's failure rule.
    pub fn with_launchers(mut self, launchers: Arc<LauncherSet>) -> Self {
        self.failure_rule = launchers.platform().failure_rule();
        self.launchers = launchers;
        self
    }

    pub fn with_stream_handler(mut self, handler: Box<dyn ExecuteStreamHandler>) -> Self {
        self.stream_handler = handler;
        self
    }

    pub fn with_env_mode(mut self, env: EnvMode) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_watchdog(mut self, watchdog: ProcessWatchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Shorthand for a fresh [`ProcessWatchdog`] with `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Ok(self.with_watchdog(ProcessWatchdog::new(timeout)?))
    }

    /// Route the command through the platform's shell launcher.
    pub fn prefer_shell(mut self, prefer: bool) -> Self {
        self.prefer_shell = prefer;
        self
    }

    pub fn with_failure_rule(mut self, rule: FailureRule) -> Self {
        self.failure_rule = rule;
        self
    }

    pub fn with_log_callback(mut self, log: LogCallback) -> Self {
        self.log = log;
        self
    }

    /// Register children with `reaper` instead of the process-wide one.
    pub fn with_reaper(mut self, reaper: &'static ProcessReaper) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn env_mode(&self) -> &EnvMode {
        &self.env
    }

    pub fn launchers(&self) -> &LauncherSet {
        &self.launchers
    }

    pub fn prefers_shell(&self) -> bool {
        self.prefer_shell
    }

    /// Share an existing interrupter instead of this run's own.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupt = interrupter.signal;
        self
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            signal: Arc::clone(&self.interrupt),
        }
    }

    /// Whether the last run was cut short by an [`Interrupter`].
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// True only if a watchdog was configured and it killed the child.
    pub fn killed_process(&self) -> bool {
        self.watchdog
            .as_ref()
            .is_some_and(ProcessWatchdog::killed_process)
    }

    pub fn is_failure(&self, status: ExitStatus) -> bool {
        self.failure_rule.is_failure(status)
    }

    pub fn failure_rule(&self) -> FailureRule {
        self.failure_rule
    }

    /// Run the command and wait for it to exit.
    pub async fn execute(&mut self) -> Result<ExitStatus> {
        self.interrupted = false;
        let req = self.request(StdioMode::Piped);
        let launchers = Arc::clone(&self.launchers);
        let launcher = launchers.select(self.prefer_shell);
        self.trace_command(&req);

        // Nothing to clean up if this fails.
        let mut process = launcher.launch(req)?;

        let label = self.command.describe();
        let reaper: &'static ProcessReaper = self.reaper;
        let registration = process.id().map(|pid| reaper.register(pid, label.clone()));
        let interrupt = Arc::clone(&self.interrupt);
        let active = interrupt.enter(process.killer());

        if let Err(e) = self.wire_streams(&mut process) {
            warn!(cmd = %label, error = %e, "stream wiring failed; killing child");
            process.kill();
            if let Err(wait_err) = process.wait().await {
                debug!(error = %wait_err, "wait after failed wiring also failed");
            }
            return Err(e);
        }

        self.stream_handler.start();

        if let Some(dog) = self.watchdog.as_mut() {
            dog.start(process.killer());
        }

        let waited = process.wait().await;
        self.interrupted = active.interrupted();
        drop(active);
        if self.interrupted {
            warn!(cmd = %label, "execution interrupted; child killed");
        }

        if let Some(dog) = self.watchdog.as_mut() {
            dog.stop().await;
        }
        drop(registration);
        self.stream_handler.stop().await;

        if let Some(dog) = self.watchdog.as_ref() {
            dog.check_exception()?;
        }

        let status = waited?;
        info!(cmd = %label, %status, killed = self.killed_process(), "process exited");
        (self.log)(Severity::Verbose, &format!("Process exited with {status}"));
        Ok(status)
    }

    /// Start the command detached and return its pid without waiting.
    ///
    /// The child gets null stdio, is not registered with the reaper and is
    /// not killed when this `Execute` goes away. Stream handler and watchdog
    /// are not used.
    pub fn spawn(&self) -> Result<u32> {
        let req = self.request(StdioMode::Detached);
        let launcher = self.launchers.select(self.prefer_shell);
        self.trace_command(&req);

        let process = launcher.launch(req)?;
        let pid = process.id().ok_or_else(|| {
            ExecError::Other(anyhow!(
                "detached process `{}` exited before its pid was known",
                self.command.describe()
            ))
        })?;
        info!(pid, cmd = %self.command.describe(), "spawned detached process");
        Ok(pid)
    }

    fn request(&self, stdio: StdioMode) -> LaunchRequest {
        let mut req = LaunchRequest::new(self.command.clone());
        req.env = self.env.resolve(Environment::inherited);
        req.dir = self.working_dir.clone();
        req.stdio = stdio;
        req
    }

    fn trace_command(&self, req: &LaunchRequest) {
        let line = self.command.describe();
        debug!(
            cmd = %line,
            dir = ?req.dir,
            env_mode = env_mode_name(&self.env),
            prefer_shell = self.prefer_shell,
            "about to execute"
        );

        (self.log)(Severity::Verbose, &format!("Executing {line}"));
        if let Some(dir) = &req.dir {
            (self.log)(Severity::Verbose, &format!("Working directory: {}", dir.display()));
        }
        if let Some(env) = &req.env {
            (self.log)(Severity::Debug, "Environment:");
            for (key, value) in env.iter() {
                (self.log)(Severity::Debug, &format!("  {key}={value}"));
            }
        }
    }

    fn wire_streams(&mut self, process: &mut ProcessHandle) -> Result<()> {
        let stdin = process.take_stdin().ok_or_else(|| not_piped("stdin"))?;
        self.stream_handler
            .attach_stdin(Box::new(stdin))
            .map_err(|source| ExecError::StreamWire {
                stream: "stdin",
                source,
            })?;

        let stdout = process.take_stdout().ok_or_else(|| not_piped("stdout"))?;
        self.stream_handler
            .attach_stdout(Box::new(stdout))
            .map_err(|source| ExecError::StreamWire {
                stream: "stdout",
                source,
            })?;

        let stderr = process.take_stderr().ok_or_else(|| not_piped("stderr"))?;
        self.stream_handler
            .attach_stderr(Box::new(stderr))
            .map_err(|source| ExecError::StreamWire {
                stream: "stderr",
                source,
            })?;
        Ok(())
    }
}

fn not_piped(stream: &'static str) -> ExecError {
    ExecError::StreamWire {
        stream,
        source: io::Error::new(io::ErrorKind::BrokenPipe, "stream was not piped"),
    }
}

fn env_mode_name(mode: &EnvMode) -> &'static str {
    match mode {
        EnvMode::Inherit => "inherit",
        EnvMode::Merge(_) => "merge",
        EnvMode::Replace(_) => "replace",
    }
}

/// Spawn without any orchestration: no stream handling, no reaper, no
/// watchdog. The caller owns the returned handle.
pub fn launch(
    launchers: &LauncherSet,
    req: LaunchRequest,
    prefer_shell: bool,
) -> Result<ProcessHandle> {
    launchers.select(prefer_shell).launch(req)
}
