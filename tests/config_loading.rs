use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use procrun::config::{load_and_validate, load_or_default};
use procrun::env::EnvMode;
use procrun::errors::ExecError;
use procrun::platform::Platform;
use procrun::task::OutputTarget;
use procrun_test_utils::builders::ConfigFileBuilder;

#[test]
fn loads_a_full_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[exec]
platform = "windows"
prefer_shell = true
timeout = "2m"

[output]
mode = "file"
file = "build.log"
error_file = "build.err"

[env]
Path = "C:\\tools"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.exec.platform, Platform::Windows);
    assert!(cfg.exec.prefer_shell);
    assert_eq!(cfg.exec.timeout, Some(Duration::from_secs(120)));
    assert!(matches!(cfg.output, OutputTarget::File { ref error_path, .. } if error_path.is_some()));
    match cfg.env_mode() {
        EnvMode::Merge(env) => assert_eq!(env.get("PATH"), Some("C:\\tools")),
        other => panic!("expected merge, got {other:?}"),
    }
    assert_eq!(cfg.launchers().shell().name(), "windows-cmd");
}

#[test]
fn syntax_error_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[exec\nprefer_shell = true\n").unwrap();

    match load_and_validate(file.path()) {
        Err(ExecError::TomlError(_)) => {}
        other => panic!("expected TomlError, got {other:?}"),
    }
}

#[test]
fn explicit_missing_file_is_an_io_error() {
    match load_or_default(Some(std::path::Path::new("/definitely/not/procrun.toml"))) {
        Err(ExecError::IoError(_)) => {}
        other => panic!("expected IoError, got {other:?}"),
    }
}

#[test]
fn builder_defaults_validate() {
    let cfg = ConfigFileBuilder::new()
        .platform(Platform::Unix)
        .env("LANG", "C")
        .new_environment(true)
        .build();
    match cfg.env_mode() {
        EnvMode::Replace(env) => {
            assert_eq!(env.len(), 1);
            assert_eq!(env.get("LANG"), Some("C"));
        }
        other => panic!("expected replace, got {other:?}"),
    }
}

#[test]
fn helper_script_settings_reach_launchers() {
    let cfg = ConfigFileBuilder::new()
        .platform(Platform::Unix)
        .install_root("/opt/procrun")
        .use_helper_script(true)
        .build();
    assert_eq!(cfg.launchers().shell().name(), "script");
}

#[test]
fn invalid_builder_config_is_rejected() {
    let raw = ConfigFileBuilder::new().timeout("0ms").raw();
    assert!(matches!(
        procrun::config::ConfigFile::try_from(raw),
        Err(ExecError::ConfigError(_))
    ));
}
