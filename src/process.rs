use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Interval at which liveness is re-checked while waiting for a process to
/// die.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Live, OS-backed reference to a process resolved from the process table.
///
/// Only the pid is held; liveness is re-checked against the OS on every
/// call, so a handle can go dead at any time. A pid recycled to an
/// unrelated process is not detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        is_alive(self.pid)
    }

    /// Request graceful termination (SIGTERM on Unix).
    pub fn terminate(&self) {
        terminate(self.pid)
    }

    /// Force kill without waiting for the process to clean up.
    pub fn force_kill(&self) {
        force_kill(self.pid)
    }
}

/// Whether `pid` currently maps to a process in a running state. Zombies
/// and dead-but-listed processes do not count.
pub(crate) fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    is_alive_in(&mut system, pid)
}

pub(crate) fn is_alive_in(system: &mut System, pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::default(),
    );
    system
        .process(target)
        .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}

#[cfg(unix)]
pub(crate) fn terminate(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use tracing::{info, warn};

    match signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => info!("Sent SIGTERM to process {}", pid),
        Err(nix::errno::Errno::ESRCH) => info!("Process {} not found (already terminated)", pid),
        Err(e) => warn!("Failed to send SIGTERM to process {}: {}", pid, e),
    }
}

#[cfg(unix)]
pub(crate) fn force_kill(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use tracing::{info, warn};

    match signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => info!("Sent SIGKILL to process {}", pid),
        Err(nix::errno::Errno::ESRCH) => info!("Process {} not found (already terminated)", pid),
        Err(e) => warn!("Failed to send SIGKILL to process {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate(pid: u32) {
    use std::process::Command;
    use tracing::warn;

    if let Err(e) = Command::new("taskkill")
        .args(["/T", "/PID", &pid.to_string()])
        .output()
    {
        warn!("Failed to terminate process {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
pub(crate) fn force_kill(pid: u32) {
    use std::process::Command;
    use tracing::warn;

    if let Err(e) = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output()
    {
        warn!("Failed to kill process {}: {}", pid, e);
    }
}
