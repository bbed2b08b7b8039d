//! Deferred teardown for tests that provision infrastructure.
//!
//! ```ignore
//! let options = TerraformOptions::new("demos/basic").with_no_color(true);
//! let _destroy = DestroyGuard::new(&options);
//! tfharness::init_and_apply(&options)?;
//! ```
//!
//! The guard runs `terraform destroy` when it goes out of scope, whether
//! the test body returned normally or panicked.

use std::thread;
use tracing::{error, info};

use crate::options::TerraformOptions;
use crate::terraform;

/// Runs `terraform destroy` on drop
#[must_use = "the destroy runs when the guard is dropped; binding it to `_` drops it immediately"]
pub struct DestroyGuard {
    options: TerraformOptions,
    armed: bool,
}

impl DestroyGuard {
    pub fn new(options: &TerraformOptions) -> Self {
        Self {
            options: options.clone(),
            armed: true,
        }
    }

    /// Skip the destroy, e.g. to keep resources around for debugging.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Run the destroy now instead of at drop, returning its result.
    pub fn destroy_now(mut self) -> crate::Result<String> {
        self.armed = false;
        terraform::destroy(&self.options)
    }
}

impl Drop for DestroyGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        info!(dir = %self.options.terraform_dir.display(), "running deferred destroy");
        if let Err(e) = terraform::destroy(&self.options) {
            if thread::panicking() {
                // A second panic would abort and hide the original failure
                error!(error = %e, "deferred destroy failed");
            } else {
                panic!("deferred terraform destroy failed: {}", e);
            }
        }
    }
}
