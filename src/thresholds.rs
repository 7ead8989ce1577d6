use crate::config::ThresholdsConfig;
use crate::process::Usage;

/// Which limits a sample exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trip {
    pub memory: bool,
    pub cpu: bool,
}

/// Memory and CPU limits. A `None` limit is disabled and never trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub max_memory_mb: Option<f64>,
    pub max_cpu_percent: Option<f64>,
}

impl Thresholds {
    /// Zero in the config means "disabled".
    pub fn from_config(config: &ThresholdsConfig) -> Self {
        let enabled = |v: f64| (v > 0.0).then_some(v);
        Self {
            max_memory_mb: enabled(config.max_memory_mb),
            max_cpu_percent: enabled(config.max_cpu_percent),
        }
    }

    /// Returns a `Trip` if either enabled limit is strictly exceeded.
    pub fn evaluate(&self, usage: &Usage) -> Option<Trip> {
        let memory = self
            .max_memory_mb
            .is_some_and(|max| usage.memory_mb > max);
        let cpu = self
            .max_cpu_percent
            .is_some_and(|max| usage.cpu_percent > max);

        (memory || cpu).then_some(Trip { memory, cpu })
    }
}

impl std::fmt::Display for Thresholds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_memory_mb {
            Some(mb) => write!(f, "mem>{mb:.1}MB")?,
            None => write!(f, "mem=off")?,
        }
        match self.max_cpu_percent {
            Some(pct) => write!(f, " cpu>{pct:.1}%"),
            None => write!(f, " cpu=off"),
        }
    }
}
