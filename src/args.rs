//! Type-safe terraform argument contracts.
//!
//! Instead of raw string vectors, an invocation is described by a struct that
//! implements [`TerraformArgs`], so the flag set for each subcommand lives in
//! one place.

use std::path::Path;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::options::TerraformOptions;

/// Terraform subcommands driven by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Subcommand {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
}

impl Subcommand {
    /// Flags that always follow the subcommand name
    pub fn base_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Init => &["-upgrade=false"],
            Self::Plan => &["-input=false", "-lock=false"],
            Self::Apply => &["-input=false", "-auto-approve"],
            Self::Destroy => &["-auto-approve", "-input=false"],
            Self::Output => &["-json"],
        }
    }

    /// Whether input variables and var files are meaningful for this subcommand
    pub fn accepts_vars(&self) -> bool {
        matches!(self, Self::Plan | Self::Apply | Self::Destroy)
    }

    /// Whether `-lock` and `-parallelism` are honoured
    pub fn mutates_state(&self) -> bool {
        matches!(self, Self::Apply | Self::Destroy)
    }
}

/// Trait for typed terraform arguments.
///
/// # Contract
///
/// - `to_cli_args()`: arguments exactly as terraform expects them, subcommand first.
/// - `get_env_vars()`: environment for the child process.
/// - `subcommand()`: which terraform subcommand this describes.
/// - `working_dir()`: directory terraform runs in.
/// - `binary()`: executable to spawn.
pub trait TerraformArgs {
    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)>;

    fn subcommand(&self) -> Subcommand;

    fn working_dir(&self) -> &Path;

    fn binary(&self) -> &Path;
}

/// One subcommand run against one set of options
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub options: &'a TerraformOptions,
    pub subcommand: Subcommand,
}

impl<'a> Invocation<'a> {
    pub fn new(options: &'a TerraformOptions, subcommand: Subcommand) -> Self {
        Self {
            options,
            subcommand,
        }
    }
}

impl TerraformArgs for Invocation<'_> {
    fn to_cli_args(&self) -> Vec<String> {
        let opts = self.options;
        let mut args = vec![self.subcommand.to_string()];
        args.extend(self.subcommand.base_flags().iter().map(|f| f.to_string()));

        if self.subcommand.mutates_state() {
            args.push(format!("-lock={}", opts.lock));
            if let Some(n) = opts.parallelism {
                args.push(format!("-parallelism={}", n));
            }
        }

        if self.subcommand.accepts_vars() {
            for file in &opts.var_files {
                args.push(format!("-var-file={}", file.display()));
            }
            // BTreeMap keeps -var order stable across runs
            for (key, value) in &opts.vars {
                args.push("-var".to_string());
                args.push(format!("{}={}", key, value));
            }
        }

        if opts.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .options
            .env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // Terraform reads TF_INPUT even when -input is absent (init, output)
        if !self.options.env_vars.contains_key("TF_INPUT") {
            env.push(("TF_INPUT".to_string(), "0".to_string()));
        }
        env
    }

    fn subcommand(&self) -> Subcommand {
        self.subcommand
    }

    fn working_dir(&self) -> &Path {
        &self.options.terraform_dir
    }

    fn binary(&self) -> &Path {
        &self.options.terraform_binary
    }
}
