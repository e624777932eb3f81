// src/lib.rs

pub mod cli;
pub mod config;
pub mod env;
pub mod errors;
pub mod execute;
pub mod launch;
pub mod logging;
pub mod platform;
pub mod reaper;
pub mod stream;
pub mod task;
pub mod types;
pub mod watchdog;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, error};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_or_default;
use crate::env::EnvMode;
use crate::errors::ExecError;
use crate::launch::{LaunchRequest, LauncherSet};
use crate::reaper::ProcessReaper;
use crate::task::{ExecTask, OutputTarget};
use crate::types::CommandLine;

/// Exit code reported when the command could not be judged by its own code.
const FAILURE_EXIT_CODE: i32 = 1;

/// High-level entry point used by `main.rs`.
///
/// Returns the exit code `procrun` should exit with: the child's own code
/// for a completed run, `0` for the informational modes.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = load_or_default(args.config.as_deref()).context("loading configuration")?;
    apply_cli_overrides(&mut cfg, &args)?;

    let launchers = Arc::new(cfg.launchers());

    if args.probe_env {
        let env = crate::env::probe_with(cfg.exec.platform, Arc::clone(&launchers))
            .await
            .context("probing environment")?;
        for line in env.to_pairs() {
            println!("{line}");
        }
        return Ok(0);
    }

    if args.command.is_empty() {
        bail!("no command given; usage: procrun [OPTIONS] -- <COMMAND>...");
    }
    let command = CommandLine::new(args.command.iter().cloned())?;

    let env_mode = cfg.env_mode();
    let output = build_output(&cfg, &args);

    let mut task = ExecTask::new(command)
        .launchers(Arc::clone(&launchers))
        .env(env_mode)
        .timeout(cfg.exec.timeout)
        .fail_on_error(cfg.exec.fail_on_error)
        .search_path(cfg.exec.search_path)
        .prefer_shell(cfg.exec.prefer_shell)
        .output(output);
    if let Some(dir) = &args.dir {
        task = task.dir(dir.clone());
    }

    if args.dry_run {
        print_dry_run(&task, &launchers, &args)?;
        return Ok(0);
    }

    if args.spawn {
        let pid = task.spawn()?;
        println!("{pid}");
        return Ok(0);
    }

    ProcessReaper::global().install_shutdown_hook();

    match task.run().await {
        Ok(report) => Ok(report.status.code().unwrap_or(FAILURE_EXIT_CODE)),
        Err(ExecError::CommandFailed { command, status }) => {
            error!(%command, %status, "command failed");
            Ok(status.code().unwrap_or(FAILURE_EXIT_CODE))
        }
        Err(err @ ExecError::TimedOut { .. }) => {
            error!(error = %err, "command timed out");
            Ok(FAILURE_EXIT_CODE)
        }
        Err(err) => Err(err.into()),
    }
}

/// Fold command-line flags into the loaded config; `--env` entries override
/// `[env]`.
fn apply_cli_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if let Some(root) = &args.install_root {
        cfg.exec.launch.install_root = Some(root.clone());
    }
    if args.helper_script {
        cfg.exec.launch.use_helper_script = true;
    }
    if let Some(timeout) = args.timeout {
        cfg.exec.timeout = Some(timeout);
    }
    cfg.exec.prefer_shell |= args.shell;
    cfg.exec.new_environment |= args.new_env;
    if args.no_fail {
        cfg.exec.fail_on_error = false;
    }
    if args.no_search_path {
        cfg.exec.search_path = false;
    }
    for assignment in &args.env {
        let (key, value) = crate::env::parse_assignment(assignment)?;
        cfg.env.set(key, value);
    }
    Ok(())
}

fn build_output(cfg: &ConfigFile, args: &CliArgs) -> OutputTarget {
    if let Some(path) = &args.output {
        return OutputTarget::File {
            path: path.clone(),
            error_path: args.error.clone(),
            append: args.append,
        };
    }
    if args.log_output {
        return OutputTarget::Log {
            stdout: crate::types::Severity::Info,
            stderr: crate::types::Severity::Warn,
        };
    }
    cfg.output.clone()
}

/// Print the command as the native spawn would receive it.
fn print_dry_run(task: &ExecTask, launchers: &LauncherSet, args: &CliArgs) -> Result<()> {
    let (exe, _) = task.build()?;
    let launcher = launchers.select(exe.prefers_shell());

    let mut req = LaunchRequest::new(exe.command().clone());
    req.dir = exe.working_dir().cloned();
    let prepared = launcher.prepare(req)?;

    println!("procrun dry-run");
    println!("  platform = {}", launchers.platform());
    println!("  launcher = {}", launcher.name());
    println!("  command  = {}", exe.command().describe());
    println!("  spawned  = {}", prepared.command.describe());
    match &prepared.dir {
        Some(dir) => println!("  dir      = {}", dir.display()),
        None => println!("  dir      = (inherited)"),
    }
    match exe.env_mode() {
        EnvMode::Inherit => println!("  env      = inherit"),
        EnvMode::Merge(env) => {
            println!("  env      = merge ({} overrides)", env.len());
            for pair in env.to_pairs() {
                println!("      {pair}");
            }
        }
        EnvMode::Replace(env) => {
            println!("  env      = replace ({} variables)", env.len());
            for pair in env.to_pairs() {
                println!("      {pair}");
            }
        }
    }
    if args.spawn {
        println!("  mode     = detached");
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
