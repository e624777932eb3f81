// src/types.rs

//! Small value types shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{ExecError, Result};
use crate::launch::wrappers::quote_argument;

/// Program name followed by its arguments.
///
/// Never empty; the first element is the program to invoke. A `CommandLine`
/// is immutable once built, launchers produce new ones when they wrap it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    parts: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        match parts.first() {
            Some(program) if !program.is_empty() => Ok(Self { parts }),
            _ => Err(ExecError::EmptyCommand),
        }
    }

    pub fn program(&self) -> &str {
        &self.parts[0]
    }

    pub fn args(&self) -> &[String] {
        &self.parts[1..]
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Same arguments, different program.
    pub fn with_program(&self, program: impl Into<String>) -> Self {
        let mut parts = self.parts.clone();
        parts[0] = program.into();
        Self { parts }
    }

    /// Prepend `prefix` in front of the current command line.
    pub fn prefixed<I, S>(&self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts: Vec<String> = prefix.into_iter().map(Into::into).collect();
        parts.extend(self.parts.iter().cloned());
        Self { parts }
    }

    /// Render for diagnostics, quoting arguments the way a shell would need.
    ///
    /// Arguments that cannot be quoted are rendered verbatim.
    pub fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|p| quote_argument(p).unwrap_or_else(|_| p.clone()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Exit status of a child process.
///
/// `Unknown` is used when the process could not be waited on, or terminated
/// in a way that yields no code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Unknown,
}

impl ExitStatus {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(c) => Some(*c),
            ExitStatus::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ExitStatus::Unknown)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Code(code);
        }

        // Killed by a signal: report it the way shells do.
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitStatus::Code(128 + sig);
            }
        }

        ExitStatus::Unknown
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(c) => write!(f, "exit code {c}"),
            ExitStatus::Unknown => f.write_str("unknown exit status"),
        }
    }
}

/// Rule deciding whether an exit code means failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureRule {
    /// 0 is success, anything else is failure.
    #[default]
    NonZero,
    /// Even codes are failures, odd codes are success (OpenVMS convention).
    EvenCodeFails,
}

impl FailureRule {
    pub fn is_failure_code(self, code: i32) -> bool {
        match self {
            FailureRule::NonZero => code != 0,
            FailureRule::EvenCodeFails => code % 2 == 0,
        }
    }

    /// An unknown status always counts as failure.
    pub fn is_failure(self, status: ExitStatus) -> bool {
        match status {
            ExitStatus::Code(code) => self.is_failure_code(code),
            ExitStatus::Unknown => true,
        }
    }
}

/// Severity used by the logging callback and the log stream handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warn" | "warning" => Ok(Severity::Warn),
            "info" => Ok(Severity::Info),
            "verbose" => Ok(Severity::Verbose),
            "debug" => Ok(Severity::Debug),
            other => Err(format!(
                "invalid severity: {other} (expected error, warn, info, verbose or debug)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandLine::new(Vec::<String>::new()),
            Err(ExecError::EmptyCommand)
        ));
        assert!(matches!(CommandLine::new([""]), Err(ExecError::EmptyCommand)));
    }

    #[test]
    fn describe_quotes_arguments_with_spaces() {
        let cmd = CommandLine::new(["echo", "hello world", "plain"]).unwrap();
        assert_eq!(cmd.describe(), "echo \"hello world\" plain");
        assert_eq!(cmd.program(), "echo");
        assert_eq!(cmd.args(), &["hello world".to_string(), "plain".to_string()]);
    }

    #[test]
    fn default_rule_fails_on_nonzero() {
        let rule = FailureRule::NonZero;
        assert!(!rule.is_failure_code(0));
        assert!(rule.is_failure_code(1));
        assert!(rule.is_failure_code(-1));
        assert!(rule.is_failure_code(255));
    }

    #[test]
    fn even_code_rule_fails_on_even_codes() {
        let rule = FailureRule::EvenCodeFails;
        assert!(!rule.is_failure_code(1));
        assert!(!rule.is_failure_code(3));
        assert!(rule.is_failure_code(0));
        assert!(rule.is_failure_code(2));
        assert!(rule.is_failure_code(44));
    }

    #[test]
    fn unknown_status_is_always_failure() {
        assert!(FailureRule::NonZero.is_failure(ExitStatus::Unknown));
        assert!(FailureRule::EvenCodeFails.is_failure(ExitStatus::Unknown));
        assert!(!FailureRule::NonZero.is_failure(ExitStatus::Code(0)));
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("WARNING".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!(" verbose ".parse::<Severity>(), Ok(Severity::Verbose));
        assert!("loud".parse::<Severity>().is_err());
    }
}
