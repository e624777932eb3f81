// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a configuration file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Read, deserialize and validate a configuration file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `explicit` if given (it must exist), else the default file if it
/// exists, else built-in defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        debug!(path = ?path, "loading configuration");
        return load_and_validate(path);
    }

    let default = default_config_path();
    if default.is_file() {
        debug!(path = ?default, "loading default configuration");
        return load_and_validate(default);
    }

    ConfigFile::try_from(RawConfigFile::default())
}

/// `procrun.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("procrun.toml")
}
