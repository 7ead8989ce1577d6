mod config;
mod cooldown;
mod notify;
mod process;
mod recovery;
mod runner;
mod signals;
mod target;
#[cfg(test)]
mod testing;
mod thresholds;
mod watchdog;

use clap::Parser;
use config::WatchdogConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "procwatch.toml";

/// Watch a process by name or PID and restart it when it exceeds memory or
/// CPU thresholds: systemd restart, then a start command, then kill+start.
#[derive(Parser, Debug)]
#[command(name = "procwatch", version, about)]
pub struct Cli {
    /// Process name or part of its command line
    #[arg(long)]
    name: Option<String>,

    /// Process PID (takes priority over --name)
    #[arg(long)]
    pid: Option<u32>,

    /// Memory threshold in MB, 0 disables (default: from config)
    #[arg(long)]
    max_mem_mb: Option<f64>,

    /// CPU threshold in percent, 0 disables (default: from config)
    #[arg(long)]
    max_cpu: Option<f64>,

    /// Check interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// systemd service name for `systemctl restart`
    #[arg(long)]
    service: Option<String>,

    /// Shell command that starts the process
    #[arg(long)]
    start_cmd: Option<String>,

    /// Webhook URL for notifications
    #[arg(long)]
    webhook: Option<String>,

    /// Minimum seconds between recovery actions
    #[arg(long)]
    cooldown: Option<u64>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,

    /// Extra logging (per-process samples, cooldown decisions)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Apply command-line flags on top of file/default configuration.
    fn apply(&self, config: &mut WatchdogConfig) {
        if let Some(name) = &self.name {
            config.target.name = Some(name.clone());
        }
        if let Some(pid) = self.pid {
            config.target.pid = Some(pid);
        }
        if let Some(mb) = self.max_mem_mb {
            config.thresholds.max_memory_mb = mb;
        }
        if let Some(cpu) = self.max_cpu {
            config.thresholds.max_cpu_percent = cpu;
        }
        if let Some(secs) = self.interval {
            config.monitor.interval_secs = secs;
        }
        if let Some(secs) = self.cooldown {
            config.monitor.cooldown_secs = secs;
        }
        if let Some(service) = &self.service {
            config.recovery.service = Some(service.clone());
        }
        if let Some(cmd) = &self.start_cmd {
            config.recovery.start_command = Some(cmd.clone());
        }
        if let Some(url) = &self.webhook {
            config.notify.webhook = Some(url.clone());
        }
    }

    fn log_directive(&self) -> &'static str {
        if self.verbose {
            "procwatch=debug"
        } else if self.quiet {
            "procwatch=warn"
        } else {
            "procwatch=info"
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_directive())),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut config = match config::load(&config_path, required) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    cli.apply(&mut config);

    let target = match config.validate() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.dry_run {
        print_settings(&config, &target);
        return ExitCode::SUCCESS;
    }

    let notifier = match notify::WebhookNotifier::new(
        config.notify.webhook.clone(),
        Duration::from_secs(config.notify.timeout_secs),
    ) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("error: failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let processes =
        process::SystemProcessTable::new(Duration::from_millis(config.monitor.cpu_sample_ms));
    let mut watchdog =
        watchdog::Watchdog::new(target, &config, processes, runner::SystemRunner, notifier);

    if cli.once {
        let report = watchdog.tick().await;
        tracing::info!(?report, "single check complete");
        return ExitCode::SUCCESS;
    }

    let mut shutdown = match signals::SignalHandler::install() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };
    watchdog.run(&mut shutdown).await;
    ExitCode::SUCCESS
}

fn print_settings(config: &WatchdogConfig, target: &target::Target) {
    let thresholds = thresholds::Thresholds::from_config(&config.thresholds);
    let plan = recovery::RecoveryPlan::from_config(&config.recovery);
    println!("procwatch v{}", env!("CARGO_PKG_VERSION"));
    println!("target:     {target}");
    println!("thresholds: {thresholds}");
    println!("interval:   {}s", config.monitor.interval_secs);
    println!("cooldown:   {}s", config.monitor.cooldown_secs);
    println!("recovery:   {plan}");
    match &config.notify.webhook {
        Some(url) => println!("webhook:    {url}"),
        None => println!("webhook:    (none)"),
    }
    println!("Dry run: config validated, not running.");
}
