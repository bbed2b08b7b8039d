//! Pre-flight checks run before terraform is invoked
//!
//! Verifies that the terraform binary is reachable and the template
//! directory exists. The integration tests use this to skip cleanly on
//! machines without terraform.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::options::TerraformOptions;

/// Result of environment verification
#[derive(Debug)]
pub struct PreflightResult {
    pub missing_binary: Option<String>,
    pub missing_dir: Option<String>,
}

impl PreflightResult {
    pub fn is_ok(&self) -> bool {
        self.missing_binary.is_none() && self.missing_dir.is_none()
    }
}

/// True if `binary` can be executed (`<binary> version` exits 0)
pub fn binary_exists(binary: &Path) -> bool {
    Command::new(binary)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn verify_environment(options: &TerraformOptions) -> PreflightResult {
    let missing_binary = (!binary_exists(&options.terraform_binary))
        .then(|| options.terraform_binary.display().to_string());
    let missing_dir = (!options.terraform_dir.is_dir())
        .then(|| options.terraform_dir.display().to_string());

    PreflightResult {
        missing_binary,
        missing_dir,
    }
}

/// Human-readable summary of failed checks, one per line
pub fn format_preflight_errors(result: &PreflightResult) -> String {
    let mut lines = Vec::new();
    if let Some(ref binary) = result.missing_binary {
        lines.push(format!(
            "terraform binary '{}' not found or not runnable; install terraform or set terraform_binary",
            binary
        ));
    }
    if let Some(ref dir) = result.missing_dir {
        lines.push(format!("template directory '{}' does not exist", dir));
    }
    lines.join("\n")
}
