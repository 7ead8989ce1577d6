//! In-memory fakes for the process, command and notification seams.
//!
//! Every fake appends to a shared `CallLog` so tests can assert on the
//! order of calls across components.
use crate::notify::{Delivery, Notify};
use crate::process::{ProcessError, ProcessHandle, ProcessTable, Usage};
use crate::runner::{CommandOutput, CommandRunner};
use crate::target::Target;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

pub struct FakeProcesses {
    log: CallLog,
    handles: Vec<ProcessHandle>,
    usage: HashMap<u32, Usage>,
    exits_on_sigterm: bool,
    already_exited: bool,
    deny_signals: bool,
}

impl FakeProcesses {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            handles: Vec::new(),
            usage: HashMap::new(),
            exits_on_sigterm: true,
            already_exited: false,
            deny_signals: false,
        }
    }

    /// Add a live process. Processes without usage vanish when sampled.
    pub fn with_process(mut self, pid: u32, usage: Option<Usage>) -> Self {
        self.handles.push(ProcessHandle {
            pid,
            name: format!("proc-{pid}"),
        });
        if let Some(u) = usage {
            self.usage.insert(pid, u);
        }
        self
    }

    pub fn ignoring_sigterm(mut self) -> Self {
        self.exits_on_sigterm = false;
        self
    }

    pub fn already_exited(mut self) -> Self {
        self.already_exited = true;
        self
    }

    pub fn denying_signals(mut self) -> Self {
        self.deny_signals = true;
        self
    }

    fn signal_result(&self, pid: u32) -> Result<(), ProcessError> {
        if self.deny_signals {
            Err(ProcessError::AccessDenied { pid })
        } else if self.already_exited {
            Err(ProcessError::Gone { pid })
        } else {
            Ok(())
        }
    }
}

impl ProcessTable for FakeProcesses {
    fn resolve(&mut self, _target: &Target) -> Vec<ProcessHandle> {
        self.log.push("resolve");
        self.handles.clone()
    }

    async fn sample(&mut self, handle: &ProcessHandle) -> Result<Usage, ProcessError> {
        self.log.push(format!("sample {}", handle.pid));
        self.usage
            .get(&handle.pid)
            .copied()
            .ok_or(ProcessError::Gone { pid: handle.pid })
    }

    fn terminate(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        self.log.push(format!("terminate {}", handle.pid));
        self.signal_result(handle.pid)
    }

    fn kill(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        self.log.push(format!("kill {}", handle.pid));
        self.signal_result(handle.pid)
    }

    async fn wait_for_exit(&mut self, handle: &ProcessHandle, _timeout: Duration) -> bool {
        self.log.push(format!("wait {}", handle.pid));
        self.exits_on_sigterm
    }
}

/// Commands succeed unless their joined command line contains one of the
/// `failing` (non-zero exit) or `erroring` (spawn error) patterns.
pub struct FakeRunner {
    log: CallLog,
    failing: Vec<String>,
    erroring: Vec<String>,
}

impl FakeRunner {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            failing: Vec::new(),
            erroring: Vec::new(),
        }
    }

    pub fn failing(mut self, patterns: &[&str]) -> Self {
        self.failing = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn erroring(mut self, patterns: &[&str]) -> Self {
        self.erroring = patterns.iter().map(|p| p.to_string()).collect();
        self
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        let line = command_line(program, args);
        self.log.push(format!("run {line}"));
        if self.erroring.iter().any(|p| line.contains(p.as_str())) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "program not found",
            ));
        }
        let failed = self.failing.iter().any(|p| line.contains(p.as_str()));
        Ok(CommandOutput {
            exit_code: Some(if failed { 1 } else { 0 }),
            stderr: String::new(),
        })
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) {
        self.log.push(format!("spawn {}", command_line(program, args)));
    }
}

pub struct FakeNotifier {
    log: CallLog,
}

impl FakeNotifier {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl Notify for FakeNotifier {
    async fn notify(&self, message: &str) -> Delivery {
        self.log.push(format!("notify {message}"));
        Delivery::Sent
    }
}
