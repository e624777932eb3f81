// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! A non-zero exit code is *not* an error at this level; it is reported as an
//! [`ExitStatus`](crate::types::ExitStatus). Only [`ExecTask`](crate::task::ExecTask)
//! turns a failing status into [`ExecError::CommandFailed`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ExitStatus;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command line must contain at least a program name")]
    EmptyCommand,

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wire child {stream}: {source}")]
    StreamWire {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for child process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    #[error("no launch strategy can change into working directory {dir:?}")]
    NoDirectoryStrategy { dir: PathBuf },

    #[error("helper script not found at {path:?}")]
    HelperScriptMissing { path: PathBuf },

    #[error("cannot quote argument: {0}")]
    Quoting(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("`{command}` failed with {status}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("`{command}` timed out after {timeout:?} and was killed")]
    TimedOut { command: String, timeout: Duration },

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
