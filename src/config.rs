use crate::target::Target;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from procwatch.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WatchdogConfig {
    pub target: TargetConfig,
    pub thresholds: ThresholdsConfig,
    pub monitor: MonitorConfig,
    pub recovery: RecoveryConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct TargetConfig {
    pub name: Option<String>,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Resident memory limit in megabytes. 0 disables the check.
    pub max_memory_mb: f64,
    /// CPU limit in percent of one core. 0 disables the check.
    pub max_cpu_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub cooldown_secs: u64,
    pub cpu_sample_ms: u64,
    pub terminate_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub service: Option<String>,
    pub start_command: Option<String>,
    pub service_manager: String,
    pub shell: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook: Option<String>,
    pub timeout_secs: u64,
}

// --- Default implementations ---

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024.0,
            max_cpu_percent: 80.0,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            cooldown_secs: 300,
            cpu_sample_ms: 100,
            terminate_timeout_secs: 10,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            service: None,
            start_command: None,
            service_manager: "systemctl".to_string(),
            shell: "sh".to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            timeout_secs: 5,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Neither a process name nor a PID was supplied.
    MissingTarget,
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::MissingTarget => write!(f, "must specify --name or --pid"),
            ConfigError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingTarget | ConfigError::Invalid { .. } => None,
        }
    }
}

/// Load config from `path`.
///
/// A missing file yields the defaults unless `required` is set, in which
/// case it is reported as a read error.
pub fn load(path: &Path, required: bool) -> Result<WatchdogConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(WatchdogConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl WatchdogConfig {
    /// Check the merged configuration and resolve the target selector.
    pub fn validate(&self) -> Result<Target, ConfigError> {
        let target = Target::from_selectors(self.target.name.as_deref(), self.target.pid)
            .ok_or(ConfigError::MissingTarget)?;

        if self.monitor.interval_secs == 0 {
            return Err(invalid("monitor.interval_secs", "must be at least 1"));
        }
        check_threshold("thresholds.max_memory_mb", self.thresholds.max_memory_mb)?;
        check_threshold("thresholds.max_cpu_percent", self.thresholds.max_cpu_percent)?;

        if let Some(service) = &self.recovery.service {
            if service.trim().is_empty() {
                return Err(invalid("recovery.service", "must not be empty"));
            }
        }
        if let Some(cmd) = &self.recovery.start_command {
            if cmd.trim().is_empty() {
                return Err(invalid("recovery.start_command", "must not be empty"));
            }
        }
        if let Some(url) = &self.notify.webhook {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| invalid("notify.webhook", &e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid("notify.webhook", "must be an http(s) URL"));
            }
        }

        Ok(target)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.monitor.cooldown_secs)
    }
}

fn check_threshold(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, "must be a non-negative number"));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn named(name: &str) -> WatchdogConfig {
        let mut config = WatchdogConfig::default();
        config.target.name = Some(name.to_string());
        config
    }

    #[test]
    fn test_defaults() {
        let config = WatchdogConfig::default();
        assert_eq!(config.thresholds.max_memory_mb, 1024.0);
        assert_eq!(config.thresholds.max_cpu_percent, 80.0);
        assert_eq!(config.monitor.interval_secs, 15);
        assert_eq!(config.monitor.cooldown_secs, 300);
        assert_eq!(config.monitor.terminate_timeout_secs, 10);
        assert_eq!(config.recovery.service_manager, "systemctl");
        assert_eq!(config.notify.timeout_secs, 5);
        assert!(config.notify.webhook.is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("procwatch.toml");
        std::fs::write(
            &path,
            r#"
[target]
name = "worker"

[recovery]
service = "worker.service"

[monitor]
cooldown_secs = 60
"#,
        )
        .unwrap();

        let config = load(&path, true).unwrap();
        assert_eq!(config.target.name.as_deref(), Some("worker"));
        assert_eq!(config.recovery.service.as_deref(), Some("worker.service"));
        assert_eq!(config.monitor.cooldown_secs, 60);
        assert_eq!(config.monitor.interval_secs, 15);
        assert_eq!(config.recovery.shell, "sh");
    }

    #[test]
    fn test_load_missing_optional_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml"), false).unwrap();
        assert!(config.target.name.is_none());
        assert_eq!(config.monitor.interval_secs, 15);
    }

    #[test]
    fn test_load_missing_required_file_errors() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("absent.toml"), true).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[monitor\ninterval_secs = ").unwrap();
        let err = load(&path, true).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_validate_requires_selector() {
        let err = WatchdogConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingTarget));
    }

    #[test]
    fn test_validate_pid_wins_over_name() {
        let mut config = named("worker");
        config.target.pid = Some(4242);
        assert_eq!(config.validate().unwrap(), Target::Pid(4242));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = named("worker");
        config.monitor.interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let mut config = named("worker");
        config.thresholds.max_cpu_percent = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "thresholds.max_cpu_percent",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_zero_thresholds_allowed() {
        let mut config = named("worker");
        config.thresholds.max_memory_mb = 0.0;
        config.thresholds.max_cpu_percent = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_webhook() {
        let mut config = named("worker");
        config.notify.webhook = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.notify.webhook = Some("ftp://example.com/hook".to_string());
        assert!(config.validate().is_err());

        config.notify.webhook = Some("https://example.com/hook".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_start_command() {
        let mut config = named("worker");
        config.recovery.start_command = Some("   ".to_string());
        assert!(config.validate().is_err());
    }
}
