//! Lifecycle management for spawned terraform processes
//!
//! A terraform apply that outlives its parent keeps mutating real
//! infrastructure and holds the state lock, so every child is:
//! - started as the leader of its own process group
//! - given a parent-death signal
//! - tracked in a registry, together with its subcommand, until it exits
//!
//! On shutdown (guard drop or SIGINT/SIGTERM/SIGHUP) each group gets SIGTERM
//! so terraform can release the state lock; groups still running when the
//! grace period ends get SIGKILL.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::args::Subcommand;

/// Time terraform gets to release its lock after SIGTERM.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Running terraform processes, keyed by PID (which is also the PGID)
#[derive(Debug, Default)]
pub struct ChildRegistry {
    running: BTreeMap<u32, Subcommand>,
    shutting_down: bool,
}

/// What a shutdown did to the tracked processes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Exited within the grace period
    pub exited: Vec<(u32, Subcommand)>,
    /// Needed SIGKILL
    pub killed: Vec<(u32, Subcommand)>,
}

impl ChildRegistry {
    /// Registry shared by the runner, the CLI guard and the signal handler
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32, subcommand: Subcommand) {
        self.running.insert(pid, subcommand);
        debug!(pid, %subcommand, "tracking terraform process");
    }

    pub fn unregister(&mut self, pid: u32) {
        if let Some(subcommand) = self.running.remove(&pid) {
            debug!(pid, %subcommand, "terraform process finished");
        }
    }

    pub fn count(&self) -> usize {
        self.running.len()
    }

    /// Subcommand running under `pid`, if tracked
    pub fn subcommand_of(&self, pid: u32) -> Option<Subcommand> {
        self.running.get(&pid).copied()
    }

    /// Stop every tracked terraform process group.
    ///
    /// Only the first call does anything; the registry stays closed to
    /// shutdown afterwards so a signal racing a guard drop is harmless.
    pub fn terminate_all(&mut self, grace_period: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if std::mem::replace(&mut self.shutting_down, true) {
            return report;
        }

        let targets: Vec<(u32, Subcommand)> =
            std::mem::take(&mut self.running).into_iter().collect();
        if targets.is_empty() {
            return report;
        }

        for &(pid, subcommand) in &targets {
            info!(pid, %subcommand, "stopping terraform");
            signal_group(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        let mut pending = targets;
        loop {
            let (gone, alive): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|&(pid, _)| !is_process_alive(pid));
            report.exited.extend(gone);
            pending = alive;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        for &(pid, subcommand) in &pending {
            warn!(pid, %subcommand, "terraform still running after grace period, killing");
            signal_group(pid, Signal::SIGKILL);
        }
        report.killed = pending;
        report
    }
}

/// Signal the whole group so provider plugins stop with terraform; fall back
/// to the leader alone if the group is already gone.
fn signal_group(pid: u32, sig: Signal) {
    let raw = pid as i32;
    if let Err(group_err) = signal::kill(Pid::from_raw(-raw), sig) {
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            debug!(pid, %sig, group = %group_err, error = %e, "nothing left to signal");
        }
    }
}

/// Scheduler state letter from `/proc/<pid>/stat`
fn proc_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may contain spaces; the state follows its closing paren
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.trim_start().chars().next()
}

/// Present and not a zombie
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    !matches!(proc_state(pid), Some('Z' | 'X'))
}

/// Stops every terraform process in its registry when dropped.
///
/// The CLI holds one for the duration of a command, so an early return or a
/// panic never leaves terraform running with the lock held.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
    grace_period: Duration,
}

impl ProcessGuard {
    /// Guard over the global registry
    pub fn new() -> Self {
        Self::for_registry(ChildRegistry::global())
    }

    pub fn for_registry(registry: Arc<Mutex<ChildRegistry>>) -> Self {
        Self {
            registry,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Number of terraform processes currently tracked
    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        let Ok(mut registry) = self.registry.lock() else {
            error!("child registry poisoned, terraform processes not stopped");
            return;
        };
        let report = registry.terminate_all(self.grace_period);
        if !report.killed.is_empty() {
            warn!(killed = report.killed.len(), "terraform processes killed on exit");
        }
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handling for the CLI.
///
/// On a signal, running terraform processes are stopped and the program
/// exits with 128 + signal number.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received signal, stopping terraform");
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(DEFAULT_GRACE_PERIOD);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group, terminated if the
    /// spawning thread dies
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        self.process_group(0);
        // SAFETY: prctl is async-signal-safe
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Child, Command};

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .in_new_process_group()
            .spawn()
            .expect("spawn sh")
    }

    /// Reap `child`, polling until `timeout`
    fn reaped_within(child: &mut Child, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_tracks_subcommands() {
        let mut registry = ChildRegistry::default();

        registry.register(1234, Subcommand::Apply);
        registry.register(5678, Subcommand::Destroy);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.subcommand_of(1234), Some(Subcommand::Apply));

        registry.unregister(1234);
        assert_eq!(registry.subcommand_of(1234), None);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_stops_process_group() {
        let mut child = spawn_sh("sleep 60");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid, Subcommand::Apply);

        let report = registry.terminate_all(Duration::from_secs(2));

        assert!(reaped_within(&mut child, Duration::from_secs(2)));
        assert_eq!(registry.count(), 0);
        assert_eq!(report.exited.len() + report.killed.len(), 1);
    }

    #[test]
    fn test_sigterm_lets_process_clean_up() {
        let mut child = spawn_sh("trap 'exit 0' TERM; sleep 60 & wait");
        let pid = child.id();
        std::thread::sleep(Duration::from_millis(50));

        let mut registry = ChildRegistry::default();
        registry.register(pid, Subcommand::Destroy);
        registry.terminate_all(Duration::from_secs(2));

        assert!(reaped_within(&mut child, Duration::from_secs(3)));
    }

    #[test]
    fn test_sigkill_after_grace_period() {
        let mut child = spawn_sh("trap '' TERM; while :; do sleep 1; done");
        let pid = child.id();
        std::thread::sleep(Duration::from_millis(50));

        let mut registry = ChildRegistry::default();
        registry.register(pid, Subcommand::Apply);
        let report = registry.terminate_all(Duration::from_millis(200));

        assert!(reaped_within(&mut child, Duration::from_secs(3)));
        assert_eq!(report.killed, vec![(pid, Subcommand::Apply)]);
    }

    #[test]
    fn test_shutdown_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.register(999_999, Subcommand::Init);

        let first = registry.terminate_all(Duration::from_millis(10));
        assert_eq!(first.exited, vec![(999_999, Subcommand::Init)]);

        registry.register(999_998, Subcommand::Plan);
        let second = registry.terminate_all(Duration::from_millis(10));
        assert_eq!(second, ShutdownReport::default());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_proc_state() {
        assert!(matches!(proc_state(std::process::id()), Some('R' | 'S')));
        assert_eq!(proc_state(999_999), None);
        assert!(!is_process_alive(999_999));
    }

    #[test]
    fn test_guard_drop_stops_registered_processes() {
        let mut child = spawn_sh("sleep 60");
        let registry = Arc::new(Mutex::new(ChildRegistry::default()));
        registry.lock().unwrap().register(child.id(), Subcommand::Apply);

        let guard = ProcessGuard::for_registry(Arc::clone(&registry))
            .with_grace_period(Duration::from_secs(1));
        assert_eq!(guard.child_count(), 1);
        drop(guard);

        assert!(reaped_within(&mut child, Duration::from_secs(3)));
        assert_eq!(registry.lock().unwrap().count(), 0);
    }
}
