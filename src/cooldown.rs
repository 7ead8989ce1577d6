use std::time::{Duration, Instant};

/// Single gate that spaces out recovery actions.
///
/// Shared by every matched process and by both trigger kinds (threshold
/// trip and "not running"): one action anywhere restarts the clock.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    last_action: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_action: None,
        }
    }

    /// True if no action was taken yet, or more than `period` has passed
    /// since the last one.
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_action {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.period,
        }
    }

    /// Time left before the gate opens again.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_action {
            None => Duration::ZERO,
            Some(last) => self
                .period
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Mark an action as taken at `at`, whether it succeeded or not.
    pub fn record(&mut self, at: Instant) {
        self.last_action = Some(at);
    }

    #[cfg(test)]
    pub fn last_action(&self) -> Option<Instant> {
        self.last_action
    }
}
