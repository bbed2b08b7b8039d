//! Terraform process execution
//!
//! `run_terraform_safe` is the single place terraform is spawned. It:
//!
//! - isolates the child in its own process group with a parent-death signal
//! - registers the child PID for cleanup while it runs
//! - captures stdout and stderr without interpreting them

use crate::args::TerraformArgs;
use crate::error::HarnessError;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Run one terraform invocation to completion.
///
/// Returns `Ok` whenever the process ran, even if it exited non-zero; use
/// [`TerraformOutput::ensure_success`] to turn a failed run into an error.
/// Returns `Err` only when the binary could not be spawned or waited on.
pub fn run_terraform_safe<T: TerraformArgs>(args: &T) -> Result<TerraformOutput> {
    let binary = args.binary();
    let subcommand = args.subcommand();
    let cli_args = args.to_cli_args();
    let env_vars = args.get_env_vars();

    let env_keys: Vec<&str> = env_vars.iter().map(|(k, _)| k.as_str()).collect();
    info!(
        binary = %binary.display(),
        dir = %args.working_dir().display(),
        args = ?cli_args,
        env = ?env_keys,
        "running terraform"
    );

    let mut cmd = Command::new(binary);
    cmd.args(&cli_args)
        .current_dir(args.working_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();

    for (key, value) in &env_vars {
        cmd.env(key, value);
    }

    let child = cmd.spawn().map_err(|e| HarnessError::Spawn {
        binary: binary.display().to_string(),
        reason: e.to_string(),
    })?;
    let pid = child.id();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid, subcommand);
    }

    let waited = child
        .wait_with_output()
        .with_context(|| format!("Failed waiting for terraform {}", subcommand));

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
    let output = waited?;

    let result = TerraformOutput {
        subcommand: subcommand.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };

    if result.success {
        info!("terraform {} succeeded", subcommand);
    } else {
        warn!(
            "terraform {} failed with exit code {}",
            subcommand,
            result.exit_code.unwrap_or(-1)
        );
    }
    Ok(result)
}

/// Captured result of one terraform run.
#[derive(Debug, Clone)]
pub struct TerraformOutput {
    /// Subcommand that produced this output.
    pub subcommand: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl TerraformOutput {
    /// Error out if the run did not exit with status 0.
    ///
    /// The error carries terraform's stderr unchanged apart from trimming.
    pub fn ensure_success(&self) -> std::result::Result<(), HarnessError> {
        if self.success {
            Ok(())
        } else {
            Err(HarnessError::Terraform {
                command: self.subcommand.clone(),
                code: self.exit_code.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}
