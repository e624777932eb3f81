// src/env/probe.rs

//! Environment probe.
//!
//! Runs a platform-specific listing command (`env`, `cmd /c set`,
//! `show logical`) through the regular [`Execute`] pipeline, captures its
//! output in memory and parses it back into an [`Environment`].
//!
//! The first successful probe is cached for the lifetime of the process.
//! A failing or unparsable probe never errors out of [`probe_environment`];
//! it logs a warning and yields whatever could be parsed.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::env::Environment;
use crate::env::encoding::decode_probe_output;
use crate::errors::Result;
use crate::execute::Execute;
use crate::launch::LauncherSet;
use crate::platform::Platform;
use crate::stream::{PumpStreamHandler, SharedBuffer};
use crate::types::CommandLine;

static PROBED: OnceCell<Environment> = OnceCell::const_new();

/// Inherited environment as seen by a freshly spawned child, probed once.
pub async fn probe_environment() -> &'static Environment {
    PROBED
        .get_or_init(|| async {
            let platform = Platform::current();
            match probe_with(platform, LauncherSet::shared_host()).await {
                Ok(env) => env,
                Err(e) => {
                    warn!(error = %e, "environment probe failed; using empty environment");
                    Environment::for_platform(platform)
                }
            }
        })
        .await
}

/// Run the probe for `platform` without touching the process-wide cache.
pub async fn probe_with(platform: Platform, launchers: Arc<LauncherSet>) -> Result<Environment> {
    let command = probe_command(platform)?;
    debug!(cmd = %command, %platform, "probing inherited environment");

    let buffer = SharedBuffer::new();
    let handler = PumpStreamHandler::new(Box::new(buffer.clone()), Box::new(buffer.clone()));

    let mut exe = Execute::new(command)
        .with_launchers(launchers)
        .with_stream_handler(Box::new(handler));
    let status = exe.execute().await?;
    if exe.is_failure(status) {
        warn!(%status, "environment probe exited unsuccessfully; parsing partial output");
    }

    let text = decode_probe_output(&buffer.contents(), platform.probe_encoding());
    Ok(parse_probe_output(&text, platform))
}

/// The listing command for `platform`.
pub fn probe_command(platform: Platform) -> Result<CommandLine> {
    match platform {
        Platform::Windows | Platform::Os2 => CommandLine::new(["cmd", "/c", "set"]),
        Platform::OpenVms => CommandLine::new(["show", "logical"]),
        Platform::Os400 => CommandLine::new(["env"]),
        Platform::Unix | Platform::ZOs => {
            let program = ["/bin/env", "/usr/bin/env"]
                .into_iter()
                .find(|p| Path::new(p).is_file())
                .unwrap_or("env");
            CommandLine::new([program])
        }
    }
}

/// Parse probe output in the format `platform`'s listing command produces.
pub fn parse_probe_output(text: &str, platform: Platform) -> Environment {
    match platform {
        Platform::OpenVms => parse_vms_logicals(text),
        _ => parse_assignments(text, platform),
    }
}

/// Parse `NAME=value` lines.
///
/// Values may span several lines; a line without `=` continues the value of
/// the preceding variable.
fn parse_assignments(text: &str, platform: Platform) -> Environment {
    let mut env = Environment::for_platform(platform);
    let mut current: Option<(String, String)> = None;
    let mut skipped = 0usize;

    for line in text.lines() {
        match line.split_once('=') {
            Some((name, value)) => {
                if let Some((k, v)) = current.take() {
                    env.set(k, v);
                }
                if name.is_empty() {
                    skipped += 1;
                } else {
                    current = Some((name.to_string(), value.to_string()));
                }
            }
            None => match current.as_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(line);
                }
                None => skipped += 1,
            },
        }
    }
    if let Some((k, v)) = current {
        env.set(k, v);
    }

    if skipped > 0 {
        warn!(skipped, "ignored malformed lines in environment probe output");
    }
    env
}

/// Parse `SHOW LOGICAL` output.
///
/// ```text
/// (LNM$PROCESS_TABLE)
///
///   "SYS$LOGIN" = "DKA0:[USERS.ME]"
///   "SEARCHLIST" = "DKA0:[A]"
///         = "DKA0:[B]"
/// ```
///
/// Further equivalence names are joined with `,`. A logical already defined
/// by an earlier (higher precedence) table is not overwritten.
fn parse_vms_logicals(text: &str) -> Environment {
    let mut env = Environment::for_platform(Platform::OpenVms);

    let (Ok(name_re), Ok(more_re)) = (
        Regex::new(r#"^\s+"(?P<name>[^"]+)"\s*=\s*"(?P<value>[^"]*)""#),
        Regex::new(r#"^\s+=\s*"(?P<value>[^"]*)""#),
    ) else {
        warn!("could not compile logical name patterns; skipping probe output");
        return env;
    };

    // `None` while skipping a shadowed logical.
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        if let Some(caps) = more_re.captures(line) {
            if let Some((_, value)) = current.as_mut() {
                value.push(',');
                value.push_str(&caps["value"]);
            }
        } else if let Some(caps) = name_re.captures(line) {
            if let Some((k, v)) = current.take() {
                env.set(k, v);
            }
            let name = &caps["name"];
            if !env.contains_key(name) {
                current = Some((name.to_string(), caps["value"].to_string()));
            }
        }
    }
    if let Some((k, v)) = current {
        env.set(k, v);
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignments() {
        let env = parse_probe_output("HOME=/home/me\nSHELL=/bin/sh\nEMPTY=\n", Platform::Unix);
        assert_eq!(env.get("HOME"), Some("/home/me"));
        assert_eq!(env.get("SHELL"), Some("/bin/sh"));
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn value_may_contain_equals() {
        let env = parse_probe_output("OPTS=-Dx=y\n", Platform::Unix);
        assert_eq!(env.get("OPTS"), Some("-Dx=y"));
    }

    #[test]
    fn continuation_lines_extend_previous_value() {
        let text = "FUNC=() {  echo hi\n}\nNEXT=1\n";
        let env = parse_probe_output(text, Platform::Unix);
        assert_eq!(env.get("FUNC"), Some("() {  echo hi\n}"));
        assert_eq!(env.get("NEXT"), Some("1"));
    }

    #[test]
    fn garbage_before_first_assignment_is_skipped() {
        let env = parse_probe_output("garbage\n=C:=C:\\\nA=b\n", Platform::Windows);
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("a"), Some("b"));
    }

    #[test]
    fn empty_output_gives_empty_environment() {
        assert!(parse_probe_output("", Platform::Unix).is_empty());
    }

    #[test]
    fn parses_vms_logicals_with_search_lists() {
        let text = "\
(LNM$PROCESS_TABLE)

  \"SYS$LOGIN\" = \"DKA0:[USERS.ME]\"
  \"SEARCHLIST\" = \"DKA0:[A]\"
\t= \"DKA0:[B]\"
\t= \"DKA0:[C]\"

(LNM$JOB_81A2C0)

  \"SYS$LOGIN\" = \"DKA0:[SHADOWED]\"
  \"TT\" = \"TNA1:\"
";
        let env = parse_probe_output(text, Platform::OpenVms);
        assert_eq!(env.get("SYS$LOGIN"), Some("DKA0:[USERS.ME]"));
        assert_eq!(env.get("SEARCHLIST"), Some("DKA0:[A],DKA0:[B],DKA0:[C]"));
        assert_eq!(env.get("tt"), Some("TNA1:"));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn continuation_of_shadowed_logical_is_dropped() {
        let text = "  \"A\" = \"1\"\n  \"A\" = \"2\"\n\t= \"3\"\n";
        let env = parse_probe_output(text, Platform::OpenVms);
        assert_eq!(env.get("A"), Some("1"));
    }

    #[test]
    fn probe_commands_per_platform() {
        assert_eq!(
            probe_command(Platform::Windows).unwrap().parts(),
            &["cmd".to_string(), "/c".to_string(), "set".to_string()]
        );
        assert_eq!(
            probe_command(Platform::OpenVms).unwrap().describe(),
            "show logical"
        );
        assert!(probe_command(Platform::Unix).unwrap().program().ends_with("env"));
    }
}
