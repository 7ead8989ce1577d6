//! Process lookup, usage sampling and signalling for the watched target.
//!
//! The watchdog never owns the processes it looks at: any of them can exit
//! between two calls, so "gone" and "access denied" are ordinary results.
use crate::target::Target;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A live process matched during the current tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}

/// Resource usage measured for one process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

#[derive(Debug)]
pub enum ProcessError {
    /// The process exited before or during the operation.
    Gone { pid: u32 },
    AccessDenied { pid: u32 },
    /// Signal delivery failed for another reason.
    Signal { pid: u32, source: nix::Error },
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Gone { pid } => write!(f, "process {pid} no longer exists"),
            ProcessError::AccessDenied { pid } => write!(f, "access denied to process {pid}"),
            ProcessError::Signal { pid, source } => {
                write!(f, "failed to signal process {pid}: {source}")
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Signal { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// OS process introspection and control used by the watchdog loop.
pub trait ProcessTable {
    /// All live processes matching the target. Empty when nothing matches.
    fn resolve(&mut self, target: &Target) -> Vec<ProcessHandle>;

    /// Measure memory and CPU for a process. Blocks for the CPU sample window.
    async fn sample(&mut self, handle: &ProcessHandle) -> Result<Usage, ProcessError>;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError>;

    /// Force the process to exit (SIGKILL).
    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError>;

    /// Wait until the process has exited. Returns `false` if it is still
    /// alive when `timeout` elapses.
    async fn wait_for_exit(&mut self, handle: &ProcessHandle, timeout: Duration) -> bool;
}

/// `ProcessTable` backed by sysinfo for inspection and nix for signals.
pub struct SystemProcessTable {
    system: System,
    cpu_window: Duration,
}

impl SystemProcessTable {
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            system: System::new(),
            // sysinfo needs at least this long between refreshes for a CPU reading
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn refresh_one(&mut self, pid: Pid, kind: ProcessRefreshKind) -> bool {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, kind);
        self.system.process(pid).is_some()
    }

    /// Refresh the whole table and report whether `pid` is in it. sysinfo only
    /// computes per-process CPU on a full refresh.
    fn refresh_all(&mut self, pid: Pid, kind: ProcessRefreshKind) -> bool {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        self.system.process(pid).is_some()
    }

    /// The watchdog and the processes that launched it. Their command lines
    /// carry the selector (`--name <x>`), so they would otherwise match it.
    fn own_lineage(&self) -> HashSet<Pid> {
        let mut lineage = HashSet::new();
        let mut next = Some(Pid::from_u32(std::process::id()));
        while let Some(pid) = next {
            if !lineage.insert(pid) {
                break;
            }
            next = self.system.process(pid).and_then(|p| p.parent());
        }
        lineage
    }
}

impl ProcessTable for SystemProcessTable {
    fn resolve(&mut self, target: &Target) -> Vec<ProcessHandle> {
        match target {
            Target::Pid(raw) => {
                let pid = Pid::from_u32(*raw);
                if !self.refresh_one(pid, ProcessRefreshKind::new()) {
                    return Vec::new();
                }
                self.system
                    .process(pid)
                    .map(|p| ProcessHandle {
                        pid: *raw,
                        name: p.name().to_string_lossy().into_owned(),
                    })
                    .into_iter()
                    .collect()
            }
            Target::Name(_) => {
                self.system.refresh_processes_specifics(
                    ProcessesToUpdate::All,
                    true,
                    ProcessRefreshKind::new().with_cmd(UpdateKind::OnlyIfNotSet),
                );
                let lineage = self.own_lineage();
                self.system
                    .processes()
                    .iter()
                    // Linux threads are listed as entries of their own
                    .filter(|(_, process)| process.thread_kind().is_none())
                    .filter(|(pid, _)| !lineage.contains(pid))
                    .filter_map(|(pid, process)| {
                        let name = process.name().to_string_lossy().into_owned();
                        let cmdline: Vec<String> = process
                            .cmd()
                            .iter()
                            .map(|arg| arg.to_string_lossy().into_owned())
                            .collect();
                        target.matches(&name, &cmdline).then(|| ProcessHandle {
                            pid: pid.as_u32(),
                            name,
                        })
                    })
                    .collect()
            }
        }
    }

    async fn sample(&mut self, handle: &ProcessHandle) -> Result<Usage, ProcessError> {
        let pid = Pid::from_u32(handle.pid);
        let kind = ProcessRefreshKind::new().with_memory().with_cpu();
        let gone = || ProcessError::Gone { pid: handle.pid };

        if !self.refresh_all(pid, kind) {
            return Err(gone());
        }
        tokio::time::sleep(self.cpu_window).await;
        if !self.refresh_all(pid, kind) {
            return Err(gone());
        }

        let process = self.system.process(pid).ok_or_else(gone)?;
        Ok(Usage {
            memory_mb: process.memory() as f64 / BYTES_PER_MB,
            cpu_percent: f64::from(process.cpu_usage()),
        })
    }

    fn terminate(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        send_signal(handle.pid, nix::sys::signal::Signal::SIGTERM)
    }

    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        send_signal(handle.pid, nix::sys::signal::Signal::SIGKILL)
    }

    async fn wait_for_exit(&mut self, handle: &ProcessHandle, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if !process_exists(handle.pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        !process_exists(handle.pid)
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), ProcessError> {
    use nix::errno::Errno;

    // 0 and negative values address process groups
    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return Err(ProcessError::Gone { pid }),
    };
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessError::Gone { pid }),
        Err(Errno::EPERM) => Err(ProcessError::AccessDenied { pid }),
        Err(source) => Err(ProcessError::Signal { pid, source }),
    }
}

fn process_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};

    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };
    match kill(nix::unistd::Pid::from_raw(raw), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
