use std::time::Duration;

use flowbal_config::{from_toml_value, render_toml, Config, ConfigError};
use flowbal_types::BatchDuration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMonitorConfig {
    /// Delay before the first "report now" poll.
    #[serde(default = "default_poll_initial_delay_ms")]
    pub poll_initial_delay_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Work cadence assumed until the job monitor pushes one.
    #[serde(default = "default_cadence_ms")]
    pub default_cadence_ms: u64,

    /// Drop reporters silent for this long on each poll. Zero disables eviction.
    #[serde(default)]
    pub reporter_stale_after_ms: u64,
}

fn default_poll_initial_delay_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_cadence_ms() -> u64 {
    1_000
}

impl Default for WorkerMonitorConfig {
    fn default() -> Self {
        Self {
            poll_initial_delay_ms: default_poll_initial_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            default_cadence_ms: default_cadence_ms(),
            reporter_stale_after_ms: 0,
        }
    }
}

impl WorkerMonitorConfig {
    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_cadence(&self) -> BatchDuration {
        BatchDuration::from_millis(self.default_cadence_ms)
    }

    pub fn reporter_stale_after(&self) -> Option<Duration> {
        (self.reporter_stale_after_ms > 0).then(|| Duration::from_millis(self.reporter_stale_after_ms))
    }
}

impl Config for WorkerMonitorConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    /// Only the eviction window is hot. Poll timing is fixed at spawn and the
    /// cadence is replaced by the job monitor's ack.
    fn hot_update(&mut self, other: &Self) {
        self.reporter_stale_after_ms = other.reporter_stale_after_ms;
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::out_of_range("poll_interval_ms", 0, Some(1), None::<u64>));
        }
        if self.reporter_stale_after_ms != 0 && self.reporter_stale_after_ms < self.poll_interval_ms {
            return Err(ConfigError::out_of_range(
                "reporter_stale_after_ms",
                self.reporter_stale_after_ms,
                Some(self.poll_interval_ms),
                None::<u64>,
            ));
        }
        Ok(())
    }
}
