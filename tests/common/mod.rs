//! Shared helpers for integration tests
//!
//! `FakeTerraform` writes a small shell script that stands in for the
//! terraform binary. It appends each argument list to a log file, fails the
//! subcommand named in `FAKE_TF_FAIL`, and prints `FAKE_TF_OUTPUTS` for
//! `output`.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use tempfile::TempDir;
use tfharness::TerraformOptions;

const SCRIPT: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_TF_LOG"
if [ "$1" = "$FAKE_TF_FAIL" ]; then
    echo "Error: simulated $1 failure" >&2
    exit 1
fi
if [ "$1" = "output" ]; then
    printf '%s' "$FAKE_TF_OUTPUTS"
    exit 0
fi
echo "$1 complete"
"#;

pub struct FakeTerraform {
    dir: TempDir,
    binary: PathBuf,
    log: PathBuf,
}

impl FakeTerraform {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let binary = dir.path().join("terraform");
        let log = dir.path().join("calls.log");

        fs::write(&binary, SCRIPT).expect("write fake terraform");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).expect("chmod");
        fs::write(&log, "").expect("create log");
        wait_until_executable(&binary);

        Self { dir, binary, log }
    }

    /// Options pointing at the fake binary, running inside its temp dir
    pub fn options(&self) -> TerraformOptions {
        TerraformOptions::new(self.dir.path())
            .with_no_color(true)
            .with_binary(&self.binary)
            .with_env("FAKE_TF_LOG", self.log.display().to_string())
    }

    /// Argument lists received so far, one entry per invocation
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .expect("read log")
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Subcommand names received so far
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.split_whitespace().next().map(str::to_string))
            .collect()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// A freshly written script can briefly fail with ETXTBSY while another
/// test thread is forking; probe until it runs.
fn wait_until_executable(binary: &Path) {
    for _ in 0..50 {
        let status = Command::new(binary)
            .arg("probe")
            .env("FAKE_TF_LOG", "/dev/null")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(_) => return,
            Err(e) if e.raw_os_error() == Some(Errno::ETXTBSY as i32) => thread::sleep(Duration::from_millis(20)),
            Err(e) => panic!("fake terraform not executable: {}", e),
        }
    }
    panic!("fake terraform stayed busy");
}
