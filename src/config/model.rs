// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::{EnvMode, Environment};
use crate::launch::{LaunchSettings, LauncherSet};
use crate::platform::Platform;
use crate::task::OutputTarget;
use crate::types::Severity;

/// Configuration exactly as written in `procrun.toml`.
///
/// ```toml
/// [exec]
/// install_root = "/opt/procrun"
/// prefer_shell = false
/// timeout = "30s"
/// fail_on_error = true
///
/// [output]
/// mode = "log"
/// stdout_level = "info"
/// stderr_level = "warn"
///
/// [env]
/// LANG = "C"
/// ```
///
/// Every section is optional. Turn it into a [`ConfigFile`] with `try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub exec: ExecSection,

    #[serde(default)]
    pub output: OutputSection,

    /// Environment overrides, merged into the inherited environment unless
    /// `exec.new_environment` is set.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[exec]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecSection {
    /// Directory holding `bin/procrun-cd` (and the DCL variant).
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    /// Override platform detection (`unix`, `windows`, `os2`, `openvms`,
    /// `zos`, `os400`).
    #[serde(default)]
    pub platform: Option<Platform>,

    #[serde(default)]
    pub prefer_shell: bool,

    /// On Unix, change directory through the helper script instead of
    /// `/bin/sh -c 'cd ...'` when the shell launcher is used.
    #[serde(default)]
    pub use_helper_script: bool,

    /// Duration string such as `"250ms"`, `"3s"`, `"1m"`, `"2h"`.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default = "default_true")]
    pub fail_on_error: bool,

    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Start the child with only the `[env]` variables.
    #[serde(default)]
    pub new_environment: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            install_root: None,
            platform: None,
            prefer_shell: false,
            use_helper_script: false,
            timeout: None,
            fail_on_error: true,
            search_path: true,
            new_environment: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Inherit,
    Log,
    File,
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default)]
    pub mode: OutputMode,

    #[serde(default = "default_stdout_level")]
    pub stdout_level: Severity,

    #[serde(default = "default_stderr_level")]
    pub stderr_level: Severity,

    /// Output file for `mode = "file"`, relative to the working directory.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Separate file for stderr; defaults to `file`.
    #[serde(default)]
    pub error_file: Option<PathBuf>,

    #[serde(default)]
    pub append: bool,
}

fn default_stdout_level() -> Severity {
    Severity::Info
}

fn default_stderr_level() -> Severity {
    Severity::Warn
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            mode: OutputMode::Inherit,
            stdout_level: default_stdout_level(),
            stderr_level: default_stderr_level(),
            file: None,
            error_file: None,
            append: false,
        }
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub exec: ExecConfig,
    pub output: OutputTarget,
    /// Overrides from `[env]`.
    pub env: Environment,
}

/// `[exec]` after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub platform: Platform,
    pub launch: LaunchSettings,
    pub prefer_shell: bool,
    pub timeout: Option<Duration>,
    pub fail_on_error: bool,
    pub search_path: bool,
    pub new_environment: bool,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(exec: ExecConfig, output: OutputTarget, env: Environment) -> Self {
        Self { exec, output, env }
    }

    /// How the child's environment relates to ours.
    pub fn env_mode(&self) -> EnvMode {
        if self.exec.new_environment {
            EnvMode::Replace(self.env.clone())
        } else if self.env.is_empty() {
            EnvMode::Inherit
        } else {
            EnvMode::Merge(self.env.clone())
        }
    }

    /// Launchers for the configured platform, selected once.
    pub fn launchers(&self) -> LauncherSet {
        LauncherSet::for_platform(self.exec.platform, &self.exec.launch)
    }
}
