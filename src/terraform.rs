//! Terraform operations: init, plan, apply, destroy and output.
//!
//! Each operation returns terraform's stdout on success. A run that exits
//! non-zero becomes [`HarnessError::Terraform`] with stderr attached.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::args::{Invocation, Subcommand};
use crate::error::{HarnessError, Result};
use crate::options::TerraformOptions;
use crate::runner::{TerraformOutput, run_terraform_safe};

/// One entry of `terraform output -json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    #[serde(default)]
    pub sensitive: bool,
    /// Terraform type constraint, e.g. `"string"` or `["list", "string"]`
    #[serde(rename = "type", default)]
    pub value_type: serde_json::Value,
    pub value: serde_json::Value,
}

fn run(options: &TerraformOptions, subcommand: Subcommand) -> Result<TerraformOutput> {
    let invocation = Invocation::new(options, subcommand);
    let output = run_terraform_safe(&invocation).map_err(|err| {
        err.downcast::<HarnessError>()
            .unwrap_or_else(|other| HarnessError::Io(std::io::Error::other(format!("{:#}", other))))
    })?;
    output.ensure_success()?;
    Ok(output)
}

/// `terraform init`
pub fn init(options: &TerraformOptions) -> Result<String> {
    Ok(run(options, Subcommand::Init)?.stdout)
}

/// `terraform plan`
pub fn plan(options: &TerraformOptions) -> Result<String> {
    Ok(run(options, Subcommand::Plan)?.stdout)
}

/// `terraform apply -auto-approve`
pub fn apply(options: &TerraformOptions) -> Result<String> {
    Ok(run(options, Subcommand::Apply)?.stdout)
}

/// `terraform destroy -auto-approve`
pub fn destroy(options: &TerraformOptions) -> Result<String> {
    Ok(run(options, Subcommand::Destroy)?.stdout)
}

/// Init, then apply. An init failure stops before apply.
pub fn init_and_apply(options: &TerraformOptions) -> Result<String> {
    info!(dir = %options.terraform_dir.display(), "init and apply");
    init(options)?;
    apply(options)
}

/// Init, then plan.
pub fn init_and_plan(options: &TerraformOptions) -> Result<String> {
    info!(dir = %options.terraform_dir.display(), "init and plan");
    init(options)?;
    plan(options)
}

/// Every root module output, keyed by name
pub fn output_all(options: &TerraformOptions) -> Result<BTreeMap<String, OutputValue>> {
    let stdout = run(options, Subcommand::Output)?.stdout;
    parse_outputs(&stdout)
}

/// Value of a single output
pub fn output(options: &TerraformOptions, key: &str) -> Result<serde_json::Value> {
    let mut outputs = output_all(options)?;
    outputs
        .remove(key)
        .map(|o| o.value)
        .ok_or_else(|| HarnessError::output(format!("output {:?} not found", key)))
}

/// Parse the document printed by `terraform output -json`
pub fn parse_outputs(json: &str) -> Result<BTreeMap<String, OutputValue>> {
    let trimmed = json.trim();
    // No outputs at all prints an empty object, older versions print nothing
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(trimmed)?)
}
