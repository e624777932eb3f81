// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, ExecConfig, OutputMode, RawConfigFile};
use crate::env::Environment;
use crate::errors::{ExecError, Result};
use crate::launch::LaunchSettings;
use crate::platform::Platform;
use crate::task::OutputTarget;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let exec = validate_exec(&raw)?;
        let output = validate_output(&raw)?;
        let env = validate_env(&raw, exec.platform)?;
        Ok(ConfigFile::new_unchecked(exec, output, env))
    }
}

fn validate_exec(cfg: &RawConfigFile) -> Result<ExecConfig> {
    let exec = &cfg.exec;

    let timeout = match exec.timeout.as_deref() {
        Some(s) => {
            let d = parse_duration(s)
                .map_err(|e| ExecError::ConfigError(format!("[exec].timeout: {e}")))?;
            if d.is_zero() {
                return Err(ExecError::ConfigError(
                    "[exec].timeout must be greater than zero".to_string(),
                ));
            }
            Some(d)
        }
        None => None,
    };

    if exec.use_helper_script && exec.install_root.is_none() {
        return Err(ExecError::ConfigError(
            "[exec].use_helper_script requires [exec].install_root".to_string(),
        ));
    }

    Ok(ExecConfig {
        platform: exec.platform.unwrap_or_else(Platform::current),
        launch: LaunchSettings {
            install_root: exec.install_root.clone(),
            use_helper_script: exec.use_helper_script,
            native_working_dir: true,
        },
        prefer_shell: exec.prefer_shell,
        timeout,
        fail_on_error: exec.fail_on_error,
        search_path: exec.search_path,
        new_environment: exec.new_environment,
    })
}

fn validate_output(cfg: &RawConfigFile) -> Result<OutputTarget> {
    let out = &cfg.output;
    Ok(match out.mode {
        OutputMode::Inherit => OutputTarget::Inherit,
        OutputMode::Log => OutputTarget::Log {
            stdout: out.stdout_level,
            stderr: out.stderr_level,
        },
        OutputMode::File => {
            let path = out.file.clone().ok_or_else(|| {
                ExecError::ConfigError("[output] mode = \"file\" requires `file`".to_string())
            })?;
            OutputTarget::File {
                path,
                error_path: out.error_file.clone(),
                append: out.append,
            }
        }
    })
}

fn validate_env(cfg: &RawConfigFile, platform: Platform) -> Result<Environment> {
    let mut env = Environment::for_platform(platform);
    for (key, value) in cfg.env.iter() {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ExecError::ConfigError(format!(
                "[env] has an invalid variable name '{key}'"
            )));
        }
        if value.contains('\0') {
            return Err(ExecError::ConfigError(format!(
                "[env].{key} contains a NUL byte"
            )));
        }
        env.set(key.clone(), value.clone());
    }
    Ok(env)
}

/// Parse `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::env::EnvMode;
    use crate::types::Severity;

    fn parse(toml_text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_text)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.exec.platform, Platform::current());
        assert!(cfg.exec.fail_on_error);
        assert!(cfg.exec.search_path);
        assert_eq!(cfg.exec.timeout, None);
        assert_eq!(cfg.output, OutputTarget::Inherit);
        assert_eq!(cfg.env_mode(), EnvMode::Inherit);
    }

    #[test]
    fn full_file_is_validated() {
        let cfg = parse(
            r#"
            [exec]
            install_root = "/opt/procrun"
            platform = "openvms"
            use_helper_script = true
            timeout = "3s"
            fail_on_error = false

            [output]
            mode = "log"
            stderr_level = "error"

            [env]
            LANG = "C"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.exec.platform, Platform::OpenVms);
        assert_eq!(cfg.exec.timeout, Some(Duration::from_secs(3)));
        assert_eq!(cfg.exec.launch.install_root, Some(PathBuf::from("/opt/procrun")));
        assert!(!cfg.exec.fail_on_error);
        assert_eq!(
            cfg.output,
            OutputTarget::Log {
                stdout: Severity::Info,
                stderr: Severity::Error
            }
        );
        assert!(matches!(cfg.env_mode(), EnvMode::Merge(env) if env.get("lang") == Some("C")));
        assert_eq!(cfg.launchers().shell().name(), "vms-script");
    }

    #[test]
    fn new_environment_replaces() {
        let cfg = parse("[exec]\nnew_environment = true\n").unwrap();
        assert!(matches!(cfg.env_mode(), EnvMode::Replace(env) if env.is_empty()));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = parse("[exec]\ntimeout = \"0s\"\n").unwrap_err();
        assert!(err.to_string().contains("greater than zero"), "{err}");
    }

    #[test]
    fn bad_timeout_unit_is_rejected() {
        assert!(parse("[exec]\ntimeout = \"5d\"\n").is_err());
    }

    #[test]
    fn helper_script_needs_install_root() {
        let err = parse("[exec]\nuse_helper_script = true\n").unwrap_err();
        assert!(err.to_string().contains("install_root"), "{err}");
    }

    #[test]
    fn file_mode_needs_file() {
        assert!(parse("[output]\nmode = \"file\"\n").is_err());
        let cfg = parse("[output]\nmode = \"file\"\nfile = \"build.log\"\nappend = true\n").unwrap();
        assert_eq!(
            cfg.output,
            OutputTarget::File {
                path: PathBuf::from("build.log"),
                error_path: None,
                append: true
            }
        );
    }

    #[test]
    fn invalid_env_name_is_rejected() {
        assert!(parse("[env]\n\"A=B\" = \"x\"\n").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse("[exec]\nshell = true\n").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("12").is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)),
            Ok(Duration::from_secs(u64::MAX))
        );
    }
}
