// src/launch/wrappers.rs

//! Pure request rewrites used to compose launchers.
//!
//! Each function takes a [`LaunchRequest`] and returns a new one whose command
//! line performs the directory change itself. They do nothing when no working
//! directory is requested, and clear `dir` once they have handled it, so at
//! most one of them takes effect per launch.

use std::path::{Component, Path, Prefix};

use crate::errors::{ExecError, Result};
use crate::launch::LaunchRequest;
use crate::types::CommandLine;

/// Shell used to perform the directory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// `/bin/sh -c 'cd "$0" && exec "$@"' DIR cmd...`
    Posix,
    /// `cmd /c cd /d DIR && cmd...`
    Cmd,
    /// `cmd /c D: && cd DIR && cmd...` (no `/d` switch on OS/2).
    Os2Cmd,
}

/// Quote a single argument for a command line that a shell will re-parse.
///
/// - contains `"`: wrapped in single quotes (error if it also contains `'`)
/// - contains whitespace or `'`: wrapped in double quotes
/// - otherwise unchanged
pub fn quote_argument(arg: &str) -> Result<String> {
    if arg.contains('"') {
        if arg.contains('\'') {
            return Err(ExecError::Quoting(format!(
                "argument contains both single and double quotes: {arg}"
            )));
        }
        return Ok(format!("'{arg}'"));
    }
    if arg.is_empty() || arg.contains('\'') || arg.chars().any(char::is_whitespace) {
        return Ok(format!("\"{arg}\""));
    }
    Ok(arg.to_string())
}

/// Join a command into one shell line, quoting every part.
pub fn shell_line(command: &CommandLine) -> Result<String> {
    let quoted = command
        .parts()
        .iter()
        .map(|p| quote_argument(p))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(" "))
}

/// Route the command through a shell that changes directory first.
pub fn wrap_with_shell_cd(req: LaunchRequest, flavor: ShellFlavor) -> Result<LaunchRequest> {
    let Some(dir) = req.dir.clone() else {
        return Ok(req);
    };
    let dir_str = dir.to_string_lossy().into_owned();

    let (command, verbatim) = match flavor {
        ShellFlavor::Posix => (
            req.command
                .prefixed(["/bin/sh", "-c", "cd \"$0\" && exec \"$@\"", dir_str.as_str()]),
            false,
        ),
        ShellFlavor::Cmd => {
            let line = format!("cd /d {} && {}", quote_argument(&dir_str)?, shell_line(&req.command)?);
            (CommandLine::new(["cmd", "/c", line.as_str()])?, true)
        }
        ShellFlavor::Os2Cmd => {
            let cd = format!("cd {} && {}", quote_argument(&dir_str)?, shell_line(&req.command)?);
            let line = match drive_of(&dir) {
                Some(drive) => format!("{drive} && {cd}"),
                None => cd,
            };
            (CommandLine::new(["cmd", "/c", line.as_str()])?, true)
        }
    };

    Ok(LaunchRequest {
        command,
        dir: None,
        verbatim_last_arg: verbatim,
        ..req
    })
}

/// Route the command through a helper script invoked as
/// `[interpreter] script DIR cmd...`.
pub fn wrap_with_script(
    req: LaunchRequest,
    interpreter: Option<&str>,
    script: &Path,
) -> Result<LaunchRequest> {
    let Some(dir) = req.dir.clone() else {
        return Ok(req);
    };

    let mut prefix: Vec<String> = interpreter.map(str::to_string).into_iter().collect();
    prefix.push(script.to_string_lossy().into_owned());
    prefix.push(dir.to_string_lossy().into_owned());

    Ok(LaunchRequest {
        command: req.command.prefixed(prefix),
        dir: None,
        ..req
    })
}

/// Drive designator (`C:`) of a path, if it has one.
fn drive_of(path: &Path) -> Option<String> {
    if let Some(Component::Prefix(prefix)) = path.components().next() {
        if let Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) = prefix.kind() {
            return Some(format!("{}:", char::from(letter)));
        }
    }
    // Non-Windows hosts do not parse prefixes; fall back to the textual form.
    let s = path.to_str()?;
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Some(s[..2].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn request(parts: &[&str], dir: Option<&str>) -> LaunchRequest {
        let mut req = LaunchRequest::new(CommandLine::new(parts.iter().copied()).unwrap());
        req.dir = dir.map(PathBuf::from);
        req
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(quote_argument("plain").unwrap(), "plain");
        assert_eq!(quote_argument("two words").unwrap(), "\"two words\"");
        assert_eq!(quote_argument("it's").unwrap(), "\"it's\"");
        assert_eq!(quote_argument("say \"hi\"").unwrap(), "'say \"hi\"'");
        assert_eq!(quote_argument("").unwrap(), "\"\"");
        assert!(matches!(
            quote_argument("both ' and \""),
            Err(ExecError::Quoting(_))
        ));
    }

    #[test]
    fn wrappers_leave_requests_without_dir_alone() {
        let req = request(&["ls", "-l"], None);
        let same = wrap_with_shell_cd(req.clone(), ShellFlavor::Cmd).unwrap();
        assert_eq!(same.command, req.command);
        let same = wrap_with_script(req.clone(), Some("sh"), Path::new("/x")).unwrap();
        assert_eq!(same.command, req.command);
    }

    #[test]
    fn posix_cd_passes_dir_as_positional_parameter() {
        let wrapped = wrap_with_shell_cd(request(&["ls", "a b"], Some("/tmp/x y")), ShellFlavor::Posix)
            .unwrap();
        assert_eq!(
            wrapped.command.parts(),
            &["/bin/sh", "-c", "cd \"$0\" && exec \"$@\"", "/tmp/x y", "ls", "a b"]
        );
        assert!(wrapped.dir.is_none());
        assert!(!wrapped.verbatim_last_arg);
    }

    #[test]
    fn cmd_cd_builds_single_shell_line() {
        let wrapped = wrap_with_shell_cd(
            request(&["dir", "/b", "my file"], Some("D:\\work dir")),
            ShellFlavor::Cmd,
        )
        .unwrap();
        assert_eq!(
            wrapped.command.parts(),
            &["cmd", "/c", "cd /d \"D:\\work dir\" && dir /b \"my file\""]
        );
        assert!(wrapped.verbatim_last_arg);
        assert!(wrapped.dir.is_none());
    }

    #[test]
    fn os2_cd_switches_drive_first() {
        let wrapped =
            wrap_with_shell_cd(request(&["make"], Some("E:\\src")), ShellFlavor::Os2Cmd).unwrap();
        assert_eq!(wrapped.command.parts()[2], "E: && cd E:\\src && make");
    }

    #[test]
    fn script_indirection_prepends_script_and_dir() {
        let wrapped = wrap_with_script(
            request(&["make", "all"], Some("/build")),
            Some("sh"),
            Path::new("/opt/procrun/bin/procrun-cd"),
        )
        .unwrap();
        assert_eq!(
            wrapped.command.parts(),
            &["sh", "/opt/procrun/bin/procrun-cd", "/build", "make", "all"]
        );
        assert!(wrapped.dir.is_none());
    }
}
