//! The monitor-evaluate-act loop.
//!
//! Each tick resolves the target, samples every match in turn, and for each
//! threshold trip runs the recovery plan if the shared cooldown allows it.
//! When nothing matches and a start command is configured, the tick tries
//! to start the target instead, under the same cooldown.
use crate::config::WatchdogConfig;
use crate::cooldown::Cooldown;
use crate::notify::{self, Notify};
use crate::process::{ProcessHandle, ProcessTable, Usage};
use crate::recovery::{Recovery, RecoveryPlan};
use crate::runner::CommandRunner;
use crate::signals::SignalHandler;
use crate::target::Target;
use crate::thresholds::Thresholds;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Processes matching the target.
    pub matched: usize,
    /// Processes successfully sampled.
    pub sampled: usize,
    /// Samples that exceeded a threshold.
    pub tripped: usize,
    /// Recovery or start actions actually run.
    pub dispatched: usize,
    /// Triggers dropped because the cooldown was active.
    pub suppressed: usize,
}

pub struct Watchdog<P, R, N> {
    target: Target,
    thresholds: Thresholds,
    plan: RecoveryPlan,
    start_command: Option<String>,
    interval: Duration,
    cooldown: Cooldown,
    processes: P,
    recovery: Recovery<R>,
    notifier: N,
}

impl<P, R, N> Watchdog<P, R, N>
where
    P: ProcessTable,
    R: CommandRunner,
    N: Notify,
{
    pub fn new(
        target: Target,
        config: &WatchdogConfig,
        processes: P,
        runner: R,
        notifier: N,
    ) -> Self {
        Self {
            target,
            thresholds: Thresholds::from_config(&config.thresholds),
            plan: RecoveryPlan::from_config(&config.recovery),
            start_command: config.recovery.start_command.clone(),
            interval: config.interval(),
            cooldown: Cooldown::new(config.cooldown()),
            processes,
            recovery: Recovery::new(runner, &config.recovery, &config.monitor),
            notifier,
        }
    }

    #[cfg(test)]
    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    /// Run ticks until shutdown is requested.
    pub async fn run(&mut self, shutdown: &mut SignalHandler) {
        info!(
            selector = %self.target,
            thresholds = %self.thresholds,
            plan = %self.plan,
            interval_secs = self.interval.as_secs(),
            "watchdog started"
        );

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let report = self.tick().await;
            debug!(
                matched = report.matched,
                sampled = report.sampled,
                tripped = report.tripped,
                dispatched = report.dispatched,
                suppressed = report.suppressed,
                "tick complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {}
            }
        }

        info!("watchdog stopped");
    }

    /// One resolve-sample-act pass.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let handles = self.processes.resolve(&self.target);
        report.matched = handles.len();

        if handles.is_empty() {
            warn!(selector = %self.target, "process not found");
            self.start_missing(&mut report).await;
            return report;
        }

        for handle in &handles {
            let usage = match self.processes.sample(handle).await {
                Ok(u) => u,
                Err(e) => {
                    debug!(pid = handle.pid, error = %e, "skipping process");
                    continue;
                }
            };
            report.sampled += 1;
            debug!(
                pid = handle.pid,
                memory_mb = usage.memory_mb,
                cpu_percent = usage.cpu_percent,
                "sampled"
            );

            let Some(trip) = self.thresholds.evaluate(&usage) else {
                continue;
            };
            report.tripped += 1;
            warn!(
                pid = handle.pid,
                name = %handle.name,
                memory_mb = usage.memory_mb,
                cpu_percent = usage.cpu_percent,
                memory_exceeded = trip.memory,
                cpu_exceeded = trip.cpu,
                "threshold exceeded"
            );

            if self.gate_closed() {
                report.suppressed += 1;
                continue;
            }
            self.recover(handle, &usage).await;
            report.dispatched += 1;
        }

        report
    }

    fn gate_closed(&self) -> bool {
        let now = Instant::now();
        if self.cooldown.is_open(now) {
            return false;
        }
        info!(
            remaining_secs = self.cooldown.remaining(now).as_secs(),
            "cooldown active, no action taken"
        );
        true
    }

    async fn recover(&mut self, handle: &ProcessHandle, usage: &Usage) {
        let escalation = self
            .recovery
            .escalate(&self.plan, &mut self.processes, handle)
            .await;

        let message = notify::recovery_message(
            &self.target,
            handle,
            usage,
            &escalation,
            &chrono::Local::now(),
        );
        self.notifier.notify(&message).await;
        self.cooldown.record(Instant::now());
    }

    async fn start_missing(&mut self, report: &mut TickReport) {
        let Some(command) = self.start_command.as_deref() else {
            return;
        };
        if self.gate_closed() {
            report.suppressed += 1;
            return;
        }

        let outcome = self.recovery.start(command).await;
        if outcome.is_success() {
            info!(selector = %self.target, detail = outcome.detail(), "start attempt succeeded");
        } else {
            warn!(selector = %self.target, detail = outcome.detail(), "start attempt failed");
        }

        let message = notify::start_message(
            &self.target,
            outcome.is_success(),
            outcome.detail(),
            &chrono::Local::now(),
        );
        self.notifier.notify(&message).await;
        self.cooldown.record(Instant::now());
        report.dispatched += 1;
    }
}
