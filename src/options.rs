//! Options record passed to every terraform operation.
//!
//! Options can be built in code or saved to and loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Default executable looked up on PATH.
pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";

/// Settings for one terraform working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformOptions {
    /// Directory containing the template source
    pub terraform_dir: PathBuf,
    /// Suppress colorized output (`-no-color`)
    pub no_color: bool,
    /// Input variables, passed as `-var key=value`
    pub vars: BTreeMap<String, String>,
    /// Variable files, passed as `-var-file=<path>`
    pub var_files: Vec<PathBuf>,
    /// Extra environment for the terraform process
    pub env_vars: BTreeMap<String, String>,
    /// Executable to run
    pub terraform_binary: PathBuf,
    /// State locking on apply/destroy
    pub lock: bool,
    /// Concurrent operations limit (`-parallelism=<n>`)
    pub parallelism: Option<u32>,
}

impl Default for TerraformOptions {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::new(),
            no_color: false,
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            env_vars: BTreeMap::new(),
            terraform_binary: PathBuf::from(DEFAULT_TERRAFORM_BINARY),
            lock: true,
            parallelism: None,
        }
    }
}

impl TerraformOptions {
    /// Options for the given template directory with everything else defaulted
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    /// Save options to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Load options from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            HarnessError::config(format!(
                "Failed to read options from {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let options: Self = serde_json::from_str(&content)?;
        Ok(options)
    }

    /// Local checks that fail fast before terraform is spawned.
    ///
    /// Whether the directory holds a valid template is left to terraform.
    pub fn validate(&self) -> Result<()> {
        if self.terraform_dir.as_os_str().is_empty() {
            return Err(HarnessError::config("terraform_dir must be specified"));
        }
        if !self.terraform_dir.is_dir() {
            return Err(HarnessError::config(format!(
                "terraform_dir {:?} is not a directory",
                self.terraform_dir
            )));
        }
        if self.terraform_binary.as_os_str().is_empty() {
            return Err(HarnessError::config("terraform_binary must not be empty"));
        }
        if let Some(key) = self.vars.keys().find(|k| k.trim().is_empty()) {
            return Err(HarnessError::config(format!(
                "variable name {:?} is empty",
                key
            )));
        }
        if self.parallelism == Some(0) {
            return Err(HarnessError::config("parallelism must be at least 1"));
        }
        Ok(())
    }
}
