// src/task.rs

//! Checked execution: run a command and turn a failing exit into an error.
//!
//! [`ExecTask`] is the layer a build tool or the `procrun` binary talks to.
//! It resolves the executable, picks a stream handler from an
//! [`OutputTarget`], runs an [`Execute`] and reports the result.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::env::{EnvMode, Environment};
use crate::errors::{ExecError, Result};
use crate::execute::{Execute, Interrupter};
use crate::launch::LauncherSet;
use crate::logging::{LogCallback, tracing_callback};
use crate::stream::{
    ExecuteStreamHandler, FileStreamHandler, LineLogWriter, PumpStreamHandler, SharedBuffer,
};
use crate::types::{CommandLine, ExitStatus, Severity};

/// Where the child's output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Relay to this process's stdout/stderr.
    #[default]
    Inherit,
    /// Forward line by line to the log callback.
    Log { stdout: Severity, stderr: Severity },
    /// Write to files; stderr shares `path` unless `error_path` is given.
    File {
        path: PathBuf,
        error_path: Option<PathBuf>,
        append: bool,
    },
    /// Keep stdout in memory for [`TaskReport::output`]; stderr is logged.
    Capture,
}

/// Outcome of a checked run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub status: ExitStatus,
    /// Captured stdout, with [`OutputTarget::Capture`].
    pub output: Option<String>,
    /// The watchdog killed the child.
    pub killed: bool,
    /// The run was cut short by an [`Interrupter`].
    pub interrupted: bool,
    /// The failure rule classifies `status` as a failure.
    pub failed: bool,
}

pub struct ExecTask {
    command: CommandLine,
    dir: Option<PathBuf>,
    env: EnvMode,
    timeout: Option<Duration>,
    fail_on_error: bool,
    search_path: bool,
    prefer_shell: bool,
    output: OutputTarget,
    input: Option<Vec<u8>>,
    launchers: Arc<LauncherSet>,
    log: LogCallback,
    interrupter: Option<Interrupter>,
}

impl ExecTask {
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            dir: None,
            env: EnvMode::Inherit,
            timeout: None,
            fail_on_error: true,
            search_path: true,
            prefer_shell: false,
            output: OutputTarget::Inherit,
            input: None,
            launchers: LauncherSet::shared_host(),
            log: tracing_callback(),
            interrupter: None,
        }
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: EnvMode) -> Self {
        self.env = env;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fail_on_error(mut self, fail: bool) -> Self {
        self.fail_on_error = fail;
        self
    }

    pub fn search_path(mut self, search: bool) -> Self {
        self.search_path = search;
        self
    }

    pub fn prefer_shell(mut self, prefer: bool) -> Self {
        self.prefer_shell = prefer;
        self
    }

    pub fn output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    /// Bytes fed to the child's stdin before it is closed.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn launchers(mut self, launchers: Arc<LauncherSet>) -> Self {
        self.launchers = launchers;
        self
    }

    pub fn log_callback(mut self, log: LogCallback) -> Self {
        self.log = log;
        self
    }

    /// Let `interrupter`'s holder cut the run short.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = Some(interrupter);
        self
    }

    /// The command line after executable resolution.
    pub fn resolved_command(&self) -> CommandLine {
        let path_var = match &self.env {
            EnvMode::Merge(env) | EnvMode::Replace(env) => env.get("PATH").map(str::to_string),
            EnvMode::Inherit => None,
        };
        let path_var = path_var
            .map(std::ffi::OsString::from)
            .or_else(|| std::env::var_os("PATH"));

        let program = resolve_executable(
            self.command.program(),
            self.dir.as_deref(),
            self.search_path,
            path_var.as_deref(),
        );
        self.command.with_program(program)
    }

    /// The orchestrator this task would run, with its stream handler.
    pub fn build(&self) -> Result<(Execute, Option<SharedBuffer>)> {
        let (handler, captured) = self.stream_handler()?;

        let mut exe = Execute::new(self.resolved_command())
            .with_launchers(Arc::clone(&self.launchers))
            .with_env_mode(self.env.clone())
            .prefer_shell(self.prefer_shell)
            .with_log_callback(Arc::clone(&self.log))
            .with_stream_handler(handler);
        if let Some(dir) = &self.dir {
            exe = exe.with_working_dir(dir.clone());
        }
        if let Some(timeout) = self.timeout {
            exe = exe.with_timeout(timeout)?;
        }
        if let Some(interrupter) = &self.interrupter {
            exe = exe.with_interrupter(interrupter.clone());
        }
        Ok((exe, captured))
    }

    /// Run to completion.
    ///
    /// With `fail_on_error`, a watchdog kill becomes [`ExecError::TimedOut`]
    /// and a failing status becomes [`ExecError::CommandFailed`].
    pub async fn run(&self) -> Result<TaskReport> {
        let (mut exe, captured) = self.build()?;
        let rendered = exe.command().describe();

        let status = match exe.execute().await {
            Err(ExecError::Spawn { command, source })
                if source.kind() == std::io::ErrorKind::NotFound
                    && self.dir.as_ref().is_none_or(|d| d.is_dir()) =>
            {
                debug!(%command, error = %source, "spawn reported missing executable");
                return Err(ExecError::ExecutableNotFound(command));
            }
            other => other?,
        };

        let killed = exe.killed_process();
        let failed = exe.is_failure(status);
        let report = TaskReport {
            status,
            output: captured.map(|buf| buf.to_string_lossy()),
            killed,
            interrupted: exe.was_interrupted(),
            failed,
        };

        if killed {
            (self.log)(Severity::Warn, "Timeout: killed the sub-process");
        }
        if self.fail_on_error {
            if let (true, Some(timeout)) = (killed, self.timeout) {
                return Err(ExecError::TimedOut {
                    command: rendered,
                    timeout,
                });
            }
            if failed {
                return Err(ExecError::CommandFailed {
                    command: rendered,
                    status,
                });
            }
        } else if failed {
            (self.log)(Severity::Error, &format!("Result: {status}"));
        }

        info!(cmd = %rendered, %status, "task finished");
        Ok(report)
    }

    /// Start detached and return the pid.
    pub fn spawn(&self) -> Result<u32> {
        let (exe, _) = self.build()?;
        exe.spawn()
    }

    fn stream_handler(&self) -> Result<(Box<dyn ExecuteStreamHandler>, Option<SharedBuffer>)> {
        let input = self
            .input
            .clone()
            .map(|bytes| -> crate::stream::ByteSource { Box::new(std::io::Cursor::new(bytes)) });

        let mut captured = None;
        let handler: Box<dyn ExecuteStreamHandler> = match &self.output {
            OutputTarget::Inherit => {
                Box::new(with_optional_input(PumpStreamHandler::inherit(), input))
            }
            OutputTarget::Log { stdout, stderr } => Box::new(with_optional_input(
                PumpStreamHandler::to_log(Arc::clone(&self.log), *stdout, *stderr),
                input,
            )),
            OutputTarget::Capture => {
                let buffer = SharedBuffer::new();
                captured = Some(buffer.clone());
                let stderr = LineLogWriter::new(Arc::clone(&self.log), Severity::Warn);
                Box::new(with_optional_input(
                    PumpStreamHandler::new(Box::new(buffer), Box::new(stderr)),
                    input,
                ))
            }
            OutputTarget::File {
                path,
                error_path,
                append,
            } => {
                let base = match &self.dir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir()?,
                };
                let mut handler = FileStreamHandler::new(base, path.clone()).append(*append);
                if let Some(err) = error_path {
                    handler = handler.with_error_file(err.clone());
                }
                if let Some(input) = input {
                    handler = handler.with_input(input);
                }
                Box::new(handler)
            }
        };
        Ok((handler, captured))
    }
}

fn with_optional_input(
    handler: PumpStreamHandler,
    input: Option<crate::stream::ByteSource>,
) -> PumpStreamHandler {
    match input {
        Some(input) => handler.with_input(input),
        None => handler,
    }
}

/// Find the file `program` refers to.
///
/// Tried in order: `program` itself when it names an existing file, the
/// working directory, then every entry of `path_var` when `search_path` is
/// set. On Windows each candidate is also tried with the `PATHEXT`
/// extensions. When nothing matches, `program` is returned unchanged and the
/// spawn primitive gets the final say.
pub fn resolve_executable(
    program: &str,
    dir: Option<&Path>,
    search_path: bool,
    path_var: Option<&OsStr>,
) -> String {
    let given = Path::new(program);
    if given.is_absolute() {
        return program.to_string();
    }

    if let Some(dir) = dir {
        if let Some(found) = find_with_extensions(&dir.join(given)) {
            debug!(program, found = %found.display(), "resolved executable in working directory");
            return found.to_string_lossy().into_owned();
        }
    }

    let bare_name = given.components().count() == 1;
    if search_path && bare_name {
        if let Some(path_var) = path_var {
            for entry in std::env::split_paths(path_var) {
                if entry.as_os_str().is_empty() {
                    continue;
                }
                if let Some(found) = find_with_extensions(&entry.join(given)) {
                    debug!(program, found = %found.display(), "resolved executable on PATH");
                    return found.to_string_lossy().into_owned();
                }
            }
        }
        warn!(program, "executable not found on PATH; leaving it to the OS");
    }

    program.to_string()
}

fn find_with_extensions(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    if cfg!(windows) {
        let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
        for ext in exts.split(';').filter(|e| !e.is_empty()) {
            let mut name = candidate.as_os_str().to_owned();
            name.push(ext);
            let with_ext = PathBuf::from(name);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
    }
    None
}

/// Environment overrides from `KEY=VALUE` strings.
pub fn overrides_from_assignments<I, S>(assignments: I) -> Result<Environment>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut env = Environment::new();
    for a in assignments {
        let (key, value) = crate::env::parse_assignment(a.as_ref())?;
        env.set(key, value);
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    #[test]
    fn absolute_program_is_kept() {
        assert_eq!(resolve_executable("/bin/sh", None, true, None), "/bin/sh");
    }

    #[test]
    fn finds_program_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tool"), "").unwrap();

        let found = resolve_executable("tool", Some(dir.path()), false, None);
        assert_eq!(PathBuf::from(found), dir.path().join("tool"));
    }

    #[test]
    fn searches_path_entries_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("tool"), "").unwrap();

        let path_var =
            std::env::join_paths([first.path(), second.path()]).unwrap_or_else(|_| OsString::new());
        let found = resolve_executable("tool", None, true, Some(&path_var));
        assert_eq!(PathBuf::from(found), second.path().join("tool"));
    }

    #[test]
    fn path_search_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tool"), "").unwrap();
        let path_var = OsString::from(dir.path());
        assert_eq!(resolve_executable("tool", None, false, Some(&path_var)), "tool");
    }

    #[test]
    fn unknown_program_is_left_alone() {
        let path_var = OsString::from("/definitely/not/here");
        assert_eq!(
            resolve_executable("no-such-tool", None, true, Some(&path_var)),
            "no-such-tool"
        );
    }

    #[test]
    fn assignments_become_overrides() {
        let env = overrides_from_assignments(["A=1", "B=x=y"]).unwrap();
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("x=y"));
        assert!(overrides_from_assignments(["novalue"]).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error_when_checked() {
        let task = ExecTask::new(CommandLine::new(["/bin/sh", "-c", "exit 4"]).unwrap())
            .output(OutputTarget::Capture);
        let err = task.run().await.unwrap_err();
        match err {
            ExecError::CommandFailed { command, status } => {
                assert_eq!(status, ExitStatus::Code(4));
                assert!(command.starts_with("/bin/sh"), "{command}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unchecked_run_reports_status_and_output() {
        let task = ExecTask::new(CommandLine::new(["/bin/sh", "-c", "echo hi; exit 2"]).unwrap())
            .fail_on_error(false)
            .output(OutputTarget::Capture);
        let report = task.run().await.unwrap();
        assert_eq!(report.status, ExitStatus::Code(2));
        assert!(report.failed);
        assert!(!report.killed);
        assert_eq!(report.output.as_deref(), Some("hi\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn input_reaches_child_stdin() {
        let task = ExecTask::new(CommandLine::new(["cat"]).unwrap())
            .input("fed through stdin")
            .output(OutputTarget::Capture);
        let report = task.run().await.unwrap();
        assert_eq!(report.output.as_deref(), Some("fed through stdin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_an_error_when_checked() {
        let task = ExecTask::new(CommandLine::new(["sleep", "60"]).unwrap())
            .timeout(Some(Duration::from_millis(200)))
            .output(OutputTarget::Capture);
        let err = task.run().await.unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_program_is_reported_by_name() {
        let task = ExecTask::new(CommandLine::new(["procrun-no-such-program"]).unwrap())
            .output(OutputTarget::Capture);
        let err = task.run().await.unwrap_err();
        assert!(matches!(err, ExecError::ExecutableNotFound(_)), "{err:?}");
    }
}
