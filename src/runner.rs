//! Subprocess execution for recovery actions: synchronous runs whose exit
//! status matters, and detached launches whose outcome is never observed.
use std::process::Stdio;
use tokio::process::Command;

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Captured stderr, trimmed.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short description of a failed run for logs and notifications.
    pub fn failure_detail(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "killed by signal".to_string(),
        };
        if self.stderr.is_empty() {
            status
        } else {
            format!("{status}: {}", self.stderr)
        }
    }
}

pub trait CommandRunner {
    /// Run `program` with `args`, wait for it to exit and capture stderr.
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput>;

    /// Launch `program` in its own process group and return immediately.
    ///
    /// The launched process is not tracked: its exit status is never
    /// collected and a failure to launch is only logged.
    fn spawn_detached(&self, program: &str, args: &[&str]);
}

/// `CommandRunner` that executes real subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        tracing::debug!(program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) {
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0) // Survive signals aimed at the watchdog's group
            .spawn();

        match spawned {
            Ok(child) => tracing::info!(pid = ?child.id(), program, "launched detached process"),
            Err(e) => tracing::warn!(error = %e, program, "failed to launch detached process"),
        }
    }
}
