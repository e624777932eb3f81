// src/platform.rs

//! Host platform detection.
//!
//! The platform is decided at compile time and never re-evaluated; everything
//! that differs per OS family (launch strategy, failure rule, probe command,
//! environment key casing) hangs off [`Platform`] so callers never branch on
//! `cfg!` themselves.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::types::FailureRule;

/// OS family, as far as process launching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    Windows,
    Os2,
    #[serde(rename = "openvms")]
    OpenVms,
    #[serde(rename = "zos")]
    ZOs,
    Os400,
}

/// Character set the environment probe's output is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEncoding {
    Utf8,
    /// IBM-1047, the z/OS Unix System Services code page.
    Ebcdic1047,
    /// IBM-500, used by OS/400 jobs.
    Ebcdic500,
}

impl Platform {
    #[cfg(windows)]
    pub const fn current() -> Self {
        Platform::Windows
    }

    #[cfg(not(windows))]
    pub const fn current() -> Self {
        Platform::Unix
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Unix => "unix",
            Platform::Windows => "windows",
            Platform::Os2 => "os2",
            Platform::OpenVms => "openvms",
            Platform::ZOs => "zos",
            Platform::Os400 => "os400",
        }
    }

    pub const fn failure_rule(&self) -> FailureRule {
        match self {
            Platform::OpenVms => FailureRule::EvenCodeFails,
            _ => FailureRule::NonZero,
        }
    }

    /// Whether environment variable names compare case-insensitively.
    pub const fn env_keys_case_insensitive(&self) -> bool {
        matches!(self, Platform::Windows | Platform::Os2 | Platform::OpenVms)
    }

    pub const fn probe_encoding(&self) -> ProbeEncoding {
        match self {
            Platform::ZOs => ProbeEncoding::Ebcdic1047,
            Platform::Os400 => ProbeEncoding::Ebcdic500,
            _ => ProbeEncoding::Utf8,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unix" | "linux" | "macos" | "darwin" => Ok(Platform::Unix),
            "windows" | "win32" => Ok(Platform::Windows),
            "os2" | "os/2" => Ok(Platform::Os2),
            "openvms" | "vms" => Ok(Platform::OpenVms),
            "zos" | "z/os" => Ok(Platform::ZOs),
            "os400" | "os/400" => Ok(Platform::Os400),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_openvms_uses_even_code_rule() {
        assert_eq!(Platform::OpenVms.failure_rule(), FailureRule::EvenCodeFails);
        for p in [Platform::Unix, Platform::Windows, Platform::Os2, Platform::ZOs] {
            assert_eq!(p.failure_rule(), FailureRule::NonZero, "{p}");
        }
    }

    #[test]
    fn current_platform_matches_target() {
        if cfg!(windows) {
            assert_eq!(Platform::current(), Platform::Windows);
        } else {
            assert_eq!(Platform::current(), Platform::Unix);
        }
    }

    #[test]
    fn legacy_platforms_use_ebcdic_probe_output() {
        assert_eq!(Platform::ZOs.probe_encoding(), ProbeEncoding::Ebcdic1047);
        assert_eq!(Platform::Os400.probe_encoding(), ProbeEncoding::Ebcdic500);
        assert_eq!(Platform::Unix.probe_encoding(), ProbeEncoding::Utf8);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("VMS".parse::<Platform>(), Ok(Platform::OpenVms));
        assert_eq!("z/OS".parse::<Platform>(), Ok(Platform::ZOs));
        assert!("beos".parse::<Platform>().is_err());
    }
}
