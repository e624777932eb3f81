// src/config/mod.rs

//! `procrun.toml` handling: raw serde model, loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, ExecConfig, ExecSection, OutputMode, OutputSection, RawConfigFile};
pub use validate::parse_duration;
