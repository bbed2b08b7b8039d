//! Error handling for tfharness
//!
//! Every failure raised by a terraform invocation is carried through
//! unchanged so the test framework can report it verbatim.

use thiserror::Error;

/// Main error type for tfharness
#[derive(Error, Debug)]
pub enum HarnessError {
    /// IO errors (reading config files, temp files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The terraform binary could not be started
    #[error("Failed to spawn {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    /// terraform ran and exited non-zero
    #[error("terraform {command} failed (exit code {code}): {stderr}")]
    Terraform {
        command: String,
        code: i32,
        stderr: String,
    },

    /// `terraform output` returned something we could not use
    #[error("Output error: {0}")]
    Output(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for tfharness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an output error
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Exit code reported by terraform, if this error came from a completed run.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Terraform { code, .. } => Some(*code),
            _ => None,
        }
    }
}
