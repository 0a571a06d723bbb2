use flowbal_config::{from_toml_value, render_toml, Config, ConfigError};
use flowbal_rebalance::{RebalanceParams, DEFAULT_COOLDOWN_THRESHOLD, DEFAULT_MAX_RATIO, TOP_HOSTS};
use flowbal_types::{BatchDuration, JobId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMonitorConfig {
    #[serde(default)]
    pub job_id: JobId,

    /// Batch length assumed until the scheduler reports one.
    #[serde(default = "default_batch_duration_ms")]
    pub default_batch_duration_ms: u64,

    /// Largest share any host may get before its excess is redistributed.
    #[serde(default = "default_max_ratio")]
    pub max_ratio: f64,

    /// Consecutive caps of one host before it sits a cycle out.
    #[serde(default = "default_cooldown_threshold")]
    pub cooldown_threshold: u32,

    /// Hosts fed into the ratio computation. Only 3 is supported.
    #[serde(default = "default_top_hosts")]
    pub top_hosts: usize,
}

fn default_batch_duration_ms() -> u64 {
    2_000
}

fn default_max_ratio() -> f64 {
    DEFAULT_MAX_RATIO
}

fn default_cooldown_threshold() -> u32 {
    DEFAULT_COOLDOWN_THRESHOLD
}

fn default_top_hosts() -> usize {
    TOP_HOSTS
}

impl Default for JobMonitorConfig {
    fn default() -> Self {
        Self {
            job_id: JobId::default(),
            default_batch_duration_ms: default_batch_duration_ms(),
            max_ratio: default_max_ratio(),
            cooldown_threshold: default_cooldown_threshold(),
            top_hosts: default_top_hosts(),
        }
    }
}

impl JobMonitorConfig {
    pub fn default_batch_duration(&self) -> BatchDuration {
        BatchDuration::from_millis(self.default_batch_duration_ms)
    }

    pub fn rebalance_params(&self) -> RebalanceParams {
        RebalanceParams {
            max_ratio: self.max_ratio,
            cooldown_threshold: self.cooldown_threshold,
        }
    }
}

impl Config for JobMonitorConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.default_batch_duration_ms = other.default_batch_duration_ms;
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_batch_duration_ms == 0 {
            return Err(ConfigError::out_of_range("default_batch_duration_ms", 0, Some(1), None::<u64>));
        }
        // At or below an equal share the cap would push the other hosts above it.
        if !(self.max_ratio > 1.0 / 3.0 && self.max_ratio <= 1.0) {
            return Err(ConfigError::out_of_range(
                "max_ratio",
                self.max_ratio,
                Some("1/3 (exclusive)"),
                Some(1.0),
            ));
        }
        if self.cooldown_threshold == 0 {
            return Err(ConfigError::out_of_range("cooldown_threshold", 0, Some(1), None::<u32>));
        }
        if self.top_hosts != TOP_HOSTS {
            return Err(ConfigError::out_of_range(
                "top_hosts",
                self.top_hosts,
                Some(TOP_HOSTS),
                Some(TOP_HOSTS),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbal_config::parse_config;

    #[test]
    fn test_defaults() {
        let cfg: JobMonitorConfig = parse_config("job_id = 7").unwrap();
        assert_eq!(cfg.job_id, JobId(7));
        assert_eq!(cfg.max_ratio, 0.7);
        assert_eq!(cfg.cooldown_threshold, 3);
        assert_eq!(cfg.top_hosts, 3);
        assert_eq!(cfg.rebalance_params(), RebalanceParams::default());
    }

    #[test]
    fn test_rejects_cap_at_or_below_equal_share() {
        assert!(parse_config::<JobMonitorConfig>("max_ratio = 0.3").is_err());
        assert!(parse_config::<JobMonitorConfig>("max_ratio = 1.5").is_err());
        assert!(parse_config::<JobMonitorConfig>("max_ratio = 0.5").is_ok());
    }

    #[test]
    fn test_top_hosts_is_fixed() {
        let err = parse_config::<JobMonitorConfig>("top_hosts = 4").unwrap_err();
        assert!(err.to_string().contains("top_hosts"));
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        assert!(parse_config::<JobMonitorConfig>("cooldown_threshold = 0").is_err());
    }
}
