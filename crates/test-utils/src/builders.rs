#![allow(dead_code)]

use std::path::PathBuf;

use procrun::config::{ConfigFile, OutputMode, RawConfigFile};
use procrun::platform::Platform;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.config.exec.platform = Some(platform);
        self
    }

    pub fn install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.exec.install_root = Some(root.into());
        self
    }

    pub fn use_helper_script(mut self, val: bool) -> Self {
        self.config.exec.use_helper_script = val;
        self
    }

    pub fn timeout(mut self, duration: &str) -> Self {
        self.config.exec.timeout = Some(duration.to_string());
        self
    }

    pub fn new_environment(mut self, val: bool) -> Self {
        self.config.exec.new_environment = val;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn output_file(mut self, file: &str) -> Self {
        self.config.output.mode = OutputMode::File;
        self.config.output.file = Some(PathBuf::from(file));
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
