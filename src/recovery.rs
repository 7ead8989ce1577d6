//! Recovery strategies and the escalation that runs them in priority order.
use crate::config::{MonitorConfig, RecoveryConfig};
use crate::process::{ProcessError, ProcessHandle, ProcessTable};
use crate::runner::CommandRunner;
use std::time::Duration;
use tracing::{error, info, warn};

/// One way of bringing the target back to health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `<service-manager> restart <unit>`.
    ServiceRestart { unit: String },
    /// Run the configured start command and wait for it.
    StartCommand { command: String },
    /// SIGTERM, escalate to SIGKILL after the timeout, then launch the start
    /// command detached if there is one.
    TerminateRestart { start_command: Option<String> },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::ServiceRestart { .. } => "service-restart",
            Strategy::StartCommand { .. } => "start-command",
            Strategy::TerminateRestart { .. } => "terminate-restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Succeeded { detail: String },
    Failed { detail: String },
}

impl StrategyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StrategyOutcome::Succeeded { .. })
    }

    pub fn detail(&self) -> &str {
        match self {
            StrategyOutcome::Succeeded { detail } | StrategyOutcome::Failed { detail } => detail,
        }
    }
}

/// Ordered strategies available for this run.
///
/// Service restart and start command appear only when configured;
/// terminate-restart is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    strategies: Vec<Strategy>,
}

impl RecoveryPlan {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        let mut strategies = Vec::with_capacity(3);
        if let Some(unit) = &config.service {
            strategies.push(Strategy::ServiceRestart { unit: unit.clone() });
        }
        if let Some(command) = &config.start_command {
            strategies.push(Strategy::StartCommand {
                command: command.clone(),
            });
        }
        strategies.push(Strategy::TerminateRestart {
            start_command: config.start_command.clone(),
        });
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }
}

impl std::fmt::Display for RecoveryPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.strategies.iter().map(Strategy::label).collect();
        write!(f, "{}", labels.join(" -> "))
    }
}

/// Record of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: &'static str,
    pub outcome: StrategyOutcome,
}

/// Everything tried for one trigger, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Escalation {
    pub attempts: Vec<Attempt>,
}

impl Escalation {
    /// The attempt that succeeded, if any. Always the last one.
    pub fn succeeded(&self) -> Option<&Attempt> {
        self.attempts.last().filter(|a| a.outcome.is_success())
    }
}

/// Executes recovery strategies through a `CommandRunner`.
pub struct Recovery<R> {
    runner: R,
    shell: String,
    service_manager: String,
    terminate_timeout: Duration,
}

impl<R: CommandRunner> Recovery<R> {
    pub fn new(runner: R, recovery: &RecoveryConfig, monitor: &MonitorConfig) -> Self {
        Self {
            runner,
            shell: recovery.shell.clone(),
            service_manager: recovery.service_manager.clone(),
            terminate_timeout: Duration::from_secs(monitor.terminate_timeout_secs),
        }
    }

    /// Try each strategy in order until one succeeds.
    pub async fn escalate<P: ProcessTable>(
        &self,
        plan: &RecoveryPlan,
        processes: &mut P,
        handle: &ProcessHandle,
    ) -> Escalation {
        let mut escalation = Escalation::default();
        for strategy in plan.strategies() {
            let outcome = self.attempt(strategy, processes, handle).await;
            match &outcome {
                StrategyOutcome::Succeeded { detail } => {
                    info!(pid = handle.pid, strategy = strategy.label(), %detail, "recovery succeeded")
                }
                StrategyOutcome::Failed { detail } => {
                    warn!(pid = handle.pid, strategy = strategy.label(), %detail, "recovery step failed")
                }
            }
            let done = outcome.is_success();
            escalation.attempts.push(Attempt {
                strategy: strategy.label(),
                outcome,
            });
            if done {
                return escalation;
            }
        }
        error!(pid = handle.pid, name = %handle.name, "all recovery strategies failed");
        escalation
    }

    pub async fn attempt<P: ProcessTable>(
        &self,
        strategy: &Strategy,
        processes: &mut P,
        handle: &ProcessHandle,
    ) -> StrategyOutcome {
        match strategy {
            Strategy::ServiceRestart { unit } => self.restart_service(unit).await,
            Strategy::StartCommand { command } => self.start(command).await,
            Strategy::TerminateRestart { start_command } => {
                self.terminate_restart(processes, handle, start_command.as_deref())
                    .await
            }
        }
    }

    pub async fn restart_service(&self, unit: &str) -> StrategyOutcome {
        let program = self.service_manager.as_str();
        match self.runner.run(program, &["restart", unit]).await {
            Ok(out) if out.success() => StrategyOutcome::Succeeded {
                detail: format!("{program} restart {unit} completed"),
            },
            Ok(out) => StrategyOutcome::Failed {
                detail: format!("{program} restart {unit} failed: {}", out.failure_detail()),
            },
            Err(e) => StrategyOutcome::Failed {
                detail: format!("{program} restart {unit} failed: {e}"),
            },
        }
    }

    /// Run the start command through the shell and wait for it.
    pub async fn start(&self, command: &str) -> StrategyOutcome {
        match self.runner.run(&self.shell, &["-c", command]).await {
            Ok(out) if out.success() => StrategyOutcome::Succeeded {
                detail: format!("start command `{command}` completed"),
            },
            Ok(out) => StrategyOutcome::Failed {
                detail: format!("start command `{command}` failed: {}", out.failure_detail()),
            },
            Err(e) => StrategyOutcome::Failed {
                detail: format!("start command `{command}` failed: {e}"),
            },
        }
    }

    async fn terminate_restart<P: ProcessTable>(
        &self,
        processes: &mut P,
        handle: &ProcessHandle,
        start_command: Option<&str>,
    ) -> StrategyOutcome {
        info!(pid = handle.pid, name = %handle.name, "terminating process");
        let already_gone = match processes.terminate(handle) {
            Ok(()) => false,
            Err(ProcessError::Gone { .. }) => true,
            Err(e) => {
                return StrategyOutcome::Failed {
                    detail: e.to_string(),
                }
            }
        };

        if !already_gone && !processes.wait_for_exit(handle, self.terminate_timeout).await {
            warn!(
                pid = handle.pid,
                timeout_secs = self.terminate_timeout.as_secs(),
                "process did not exit, killing"
            );
            match processes.kill(handle) {
                Ok(()) | Err(ProcessError::Gone { .. }) => {}
                Err(e) => {
                    return StrategyOutcome::Failed {
                        detail: e.to_string(),
                    }
                }
            }
        }

        match start_command {
            Some(command) => {
                info!(command, "launching start command");
                self.runner.spawn_detached(&self.shell, &["-c", command]);
                StrategyOutcome::Succeeded {
                    detail: format!("terminated pid {} and launched `{command}`", handle.pid),
                }
            }
            None => StrategyOutcome::Succeeded {
                detail: format!("terminated pid {}", handle.pid),
            },
        }
    }
}
