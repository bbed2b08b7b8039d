//! tfharness
//!
//! Typed bindings for driving the terraform CLI from Rust tests: build a
//! [`TerraformOptions`], call [`init_and_apply`], and let a [`DestroyGuard`]
//! tear everything down when the test finishes.

pub mod args;
pub mod cleanup;
pub mod cli;
pub mod error;
pub mod options;
pub mod preflight;
pub mod process_guard;
pub mod runner;
pub mod terraform;

pub use args::{Invocation, Subcommand, TerraformArgs};
pub use cleanup::DestroyGuard;
pub use error::{HarnessError, Result};
pub use options::TerraformOptions;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard, ShutdownReport};
pub use runner::{TerraformOutput, run_terraform_safe};
pub use terraform::{
    OutputValue, apply, destroy, init, init_and_apply, init_and_plan, output, output_all, plan,
};
