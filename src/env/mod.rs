// src/env/mod.rs

//! Child-process environment composition.
//!
//! - [`Environment`] is a name → value map that knows whether the host
//!   compares variable names case-insensitively.
//! - [`EnvMode`] is the explicit three-way choice between inheriting the
//!   parent's environment untouched, merging overrides into it, or replacing
//!   it entirely.
//! - [`probe`] discovers the inherited environment by running a probe command.

pub mod encoding;
pub mod probe;

use std::collections::BTreeMap;

use crate::errors::{ExecError, Result};
use crate::platform::Platform;

pub use probe::{probe_environment, probe_with};

/// Environment variables for a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    case_insensitive: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Empty environment using the host's key casing rule.
    pub fn new() -> Self {
        Self::for_platform(Platform::current())
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self {
            vars: BTreeMap::new(),
            case_insensitive: platform.env_keys_case_insensitive(),
        }
    }

    /// Snapshot of this process's own environment.
    ///
    /// Names or values that are not valid Unicode are converted lossily.
    pub fn inherited() -> Self {
        let mut env = Self::new();
        for (k, v) in std::env::vars_os() {
            env.set(k.to_string_lossy(), v.to_string_lossy());
        }
        env
    }

    /// Set `key`, replacing any existing entry that names the same variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(existing) = self.existing_key(&key) {
            self.vars.remove(&existing);
        }
        self.vars.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let found = self.existing_key(key)?;
        self.vars.get(&found).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let found = self.existing_key(key)?;
        self.vars.remove(&found)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.existing_key(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply `overrides` on top of `self`; later values win.
    pub fn merge_from(&mut self, overrides: &Environment) {
        for (k, v) in overrides.iter() {
            self.set(k, v);
        }
    }

    /// `KEY=VALUE` strings, sorted by key.
    pub fn to_pairs(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    fn existing_key(&self, key: &str) -> Option<String> {
        if self.vars.contains_key(key) {
            return Some(key.to_string());
        }
        if !self.case_insensitive {
            return None;
        }
        self.vars
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

/// Split a `KEY=VALUE` assignment. The value may itself contain `=`.
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ExecError::ConfigError(format!(
            "invalid environment assignment '{s}' (expected KEY=VALUE)"
        ))),
    }
}

/// How the child's environment relates to the parent's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvMode {
    /// Child inherits the parent's environment unmodified.
    #[default]
    Inherit,
    /// Overrides are applied on top of the inherited environment.
    Merge(Environment),
    /// Child sees exactly this environment and nothing inherited.
    Replace(Environment),
}

impl EnvMode {
    /// Compute the full environment to hand to the launcher.
    ///
    /// `None` means "leave the spawned process's environment alone". The
    /// `inherited` closure is only called for [`EnvMode::Merge`].
    pub fn resolve(&self, inherited: impl FnOnce() -> Environment) -> Option<Environment> {
        match self {
            EnvMode::Inherit => None,
            EnvMode::Merge(overrides) => {
                let mut env = inherited();
                env.merge_from(overrides);
                Some(env)
            }
            EnvMode::Replace(env) => Some(env.clone()),
        }
    }
}
