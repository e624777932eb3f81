// src/launch/mod.rs

//! Turning a command description into a running process.
//!
//! - [`spawn`] holds the native spawn primitive.
//! - [`wrappers`] holds pure request rewrites (shell `cd`, helper script,
//!   argument quoting).
//! - [`CommandLauncher`] composes those rewrites in front of the native spawn.
//! - [`LauncherSet`] is the per-platform registry: one launcher used by
//!   default and one used when the caller prefers going through a shell. It
//!   is built once and shared by every [`Execute`](crate::execute::Execute).

pub mod process;
pub mod spawn;
pub mod wrappers;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::env::Environment;
use crate::errors::{ExecError, Result};
use crate::platform::Platform;
use crate::types::CommandLine;

pub use process::{ProcessHandle, ProcessKiller, kill_by_pid, kill_group_by_pid};
pub use spawn::spawn_native;
pub use wrappers::ShellFlavor;

/// Name of the directory-changing helper script, relative to the install root.
pub const HELPER_SCRIPT: &str = "bin/procrun-cd";
/// DCL variant of the helper script.
pub const HELPER_SCRIPT_VMS: &str = "bin/procrun-cd.com";

/// How the child's standard streams are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// All three streams are pipes; the child dies with its handle.
    #[default]
    Piped,
    /// All three streams are null; the child outlives its handle.
    Detached,
}

/// Everything a launcher needs to start one process.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub command: CommandLine,
    /// Complete environment for the child; `None` inherits the parent's.
    pub env: Option<Environment>,
    pub dir: Option<PathBuf>,
    pub stdio: StdioMode,
    /// Pass the last argument through without any quoting (Windows only).
    pub verbatim_last_arg: bool,
}

impl LaunchRequest {
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            env: None,
            dir: None,
            stdio: StdioMode::Piped,
            verbatim_last_arg: false,
        }
    }
}

/// One composable launcher stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStep {
    /// Let a shell builtin change directory before running the command.
    ShellDirectoryChange(ShellFlavor),
    /// Let a helper script change directory. `script` is `None` when no
    /// install root is known, in which case directory requests fail.
    ScriptIndirection {
        interpreter: Option<String>,
        script: Option<PathBuf>,
    },
}

impl LaunchStep {
    fn apply(&self, req: LaunchRequest) -> Result<LaunchRequest> {
        match self {
            LaunchStep::ShellDirectoryChange(flavor) => wrappers::wrap_with_shell_cd(req, *flavor),
            LaunchStep::ScriptIndirection {
                interpreter,
                script,
            } => {
                let Some(dir) = req.dir.clone() else {
                    return Ok(req);
                };
                let script = script
                    .as_ref()
                    .ok_or(ExecError::NoDirectoryStrategy { dir })?;
                if !script.is_file() {
                    return Err(ExecError::HelperScriptMissing {
                        path: script.clone(),
                    });
                }
                wrappers::wrap_with_script(req, interpreter.as_deref(), script)
            }
        }
    }
}

/// A native spawn preceded by zero or more request rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLauncher {
    name: &'static str,
    steps: Vec<LaunchStep>,
}

impl CommandLauncher {
    pub fn native() -> Self {
        Self {
            name: "native",
            steps: Vec::new(),
        }
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: LaunchStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steps(&self) -> &[LaunchStep] {
        &self.steps
    }

    /// Apply every rewrite, yielding the request the native spawn will see.
    pub fn prepare(&self, req: LaunchRequest) -> Result<LaunchRequest> {
        self.steps.iter().try_fold(req, |req, step| step.apply(req))
    }

    pub fn launch(&self, req: LaunchRequest) -> Result<ProcessHandle> {
        let prepared = self.prepare(req)?;
        debug!(
            launcher = self.name,
            cmd = %prepared.command,
            dir = ?prepared.dir,
            "launching"
        );
        spawn_native(&prepared)
    }
}

/// Host facts and configuration that shape launcher selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Root under which the helper scripts live (`<root>/bin/...`).
    pub install_root: Option<PathBuf>,
    /// On Unix-like hosts, change directory via the helper script rather
    /// than a `/bin/sh` builtin when going through the shell launcher.
    pub use_helper_script: bool,
    /// Whether the spawn primitive can set a working directory by itself.
    pub native_working_dir: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            install_root: None,
            use_helper_script: false,
            native_working_dir: true,
        }
    }
}

/// Launchers chosen for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSet {
    platform: Platform,
    native: CommandLauncher,
    shell: CommandLauncher,
}

impl LauncherSet {
    /// Launchers for this host with default settings.
    pub fn host() -> Self {
        Self::for_platform(Platform::current(), &LaunchSettings::default())
    }

    /// [`host`](Self::host), selected once per process and shared.
    pub fn shared_host() -> Arc<LauncherSet> {
        static HOST: OnceLock<Arc<LauncherSet>> = OnceLock::new();
        Arc::clone(HOST.get_or_init(|| Arc::new(LauncherSet::host())))
    }

    pub fn for_platform(platform: Platform, settings: &LaunchSettings) -> Self {
        let shell = shell_launcher(platform, settings);
        let native = if settings.native_working_dir {
            CommandLauncher::native()
        } else {
            shell.clone()
        };
        debug!(
            %platform,
            native = native.name(),
            shell = shell.name(),
            "selected command launchers"
        );
        Self {
            platform,
            native,
            shell,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn native(&self) -> &CommandLauncher {
        &self.native
    }

    pub fn shell(&self) -> &CommandLauncher {
        &self.shell
    }

    pub fn select(&self, prefer_shell: bool) -> &CommandLauncher {
        if prefer_shell { &self.shell } else { &self.native }
    }
}

fn shell_launcher(platform: Platform, settings: &LaunchSettings) -> CommandLauncher {
    let helper = |rel: &str| settings.install_root.as_ref().map(|root| root.join(rel));

    match platform {
        Platform::Windows => CommandLauncher::named("windows-cmd")
            .with_step(LaunchStep::ShellDirectoryChange(ShellFlavor::Cmd)),
        Platform::Os2 => CommandLauncher::named("os2-cmd")
            .with_step(LaunchStep::ShellDirectoryChange(ShellFlavor::Os2Cmd)),
        Platform::OpenVms => CommandLauncher::named("vms-script").with_step(
            LaunchStep::ScriptIndirection {
                interpreter: None,
                script: helper(HELPER_SCRIPT_VMS),
            },
        ),
        Platform::ZOs | Platform::Os400 => CommandLauncher::named("script").with_step(
            LaunchStep::ScriptIndirection {
                interpreter: Some("sh".to_string()),
                script: helper(HELPER_SCRIPT),
            },
        ),
        Platform::Unix if settings.use_helper_script => CommandLauncher::named("script")
            .with_step(LaunchStep::ScriptIndirection {
                interpreter: Some("sh".to_string()),
                script: helper(HELPER_SCRIPT),
            }),
        Platform::Unix => CommandLauncher::named("posix-sh")
            .with_step(LaunchStep::ShellDirectoryChange(ShellFlavor::Posix)),
    }
}
