// src/launch/spawn.rs

//! The host's native spawn primitive.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::errors::{ExecError, Result};
use crate::launch::process::ProcessHandle;
use crate::launch::{LaunchRequest, StdioMode};

/// Spawn `req` exactly as described: no shell, no quoting, no wrapping.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_native(req: &LaunchRequest) -> Result<ProcessHandle> {
    let mut cmd = Command::new(req.command.program());
    add_args(&mut cmd, req);

    if let Some(env) = &req.env {
        cmd.env_clear();
        cmd.envs(env.iter());
    }
    if let Some(dir) = &req.dir {
        cmd.current_dir(dir);
    }

    let group_leader = match req.stdio {
        StdioMode::Piped => {
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            lead_own_group(&mut cmd)
        }
        StdioMode::Detached => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(false);
            false
        }
    };

    let child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: req.command.describe(),
        source,
    })?;

    let handle = ProcessHandle::new(child, group_leader);
    debug!(pid = ?handle.id(), group_leader, cmd = %req.command, "spawned child process");
    Ok(handle)
}

#[cfg(windows)]
fn add_args(cmd: &mut Command, req: &LaunchRequest) {
    let args = req.command.args();
    match args.split_last() {
        // cmd.exe re-parses this line itself; it must not be quoted again.
        Some((last, rest)) if req.verbatim_last_arg => {
            cmd.args(rest);
            cmd.raw_arg(last);
        }
        _ => {
            cmd.args(args);
        }
    }
}

#[cfg(not(windows))]
fn add_args(cmd: &mut Command, req: &LaunchRequest) {
    cmd.args(req.command.args());
}

/// Supervised children get their own process group so a kill can reach
/// everything they started.
#[cfg(unix)]
fn lead_own_group(cmd: &mut Command) -> bool {
    cmd.process_group(0);
    true
}

#[cfg(not(unix))]
fn lead_own_group(_cmd: &mut Command) -> bool {
    false
}
