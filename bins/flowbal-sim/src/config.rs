use flowbal_config::{from_toml_value, render_toml, Config, ConfigError};
use flowbal_job_monitor::JobMonitorConfig;
use flowbal_logging::LogConfig;
use flowbal_types::BatchDuration;
use flowbal_worker_monitor::WorkerMonitorConfig;
use serde::{Deserialize, Serialize};

/// Shape of the simulated cluster and its workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_hosts")]
    pub hosts: usize,

    #[serde(default = "default_reporters_per_host")]
    pub reporters_per_host: usize,

    #[serde(default = "default_streams_per_host")]
    pub streams_per_host: usize,

    #[serde(default = "default_batch_duration_ms")]
    pub batch_duration_ms: u64,

    /// Batches to run before stopping. Zero runs until interrupted.
    #[serde(default = "default_batches")]
    pub batches: u64,

    /// Bytes arriving across all hosts per batch.
    #[serde(default = "default_ingest_bytes_per_batch")]
    pub ingest_bytes_per_batch: u64,

    /// Handling throughput of the slowest host, bytes per second.
    #[serde(default = "default_base_handling_rate")]
    pub base_handling_rate: f64,

    /// Host `i` handles `base_handling_rate * (1 + host_skew * i)`.
    #[serde(default = "default_host_skew")]
    pub host_skew: f64,

    /// Seconds between config file re-reads. Zero disables reloading.
    #[serde(default)]
    pub reload_interval_secs: u64,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub job_monitor: JobMonitorConfig,

    #[serde(default)]
    pub worker_monitor: WorkerMonitorConfig,
}

fn default_hosts() -> usize {
    4
}

fn default_reporters_per_host() -> usize {
    2
}

fn default_streams_per_host() -> usize {
    2
}

fn default_batch_duration_ms() -> u64 {
    1_000
}

fn default_batches() -> u64 {
    20
}

fn default_ingest_bytes_per_batch() -> u64 {
    64 << 20
}

fn default_base_handling_rate() -> f64 {
    8.0 * (1 << 20) as f64
}

fn default_host_skew() -> f64 {
    0.5
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            reporters_per_host: default_reporters_per_host(),
            streams_per_host: default_streams_per_host(),
            batch_duration_ms: default_batch_duration_ms(),
            batches: default_batches(),
            ingest_bytes_per_batch: default_ingest_bytes_per_batch(),
            base_handling_rate: default_base_handling_rate(),
            host_skew: default_host_skew(),
            reload_interval_secs: 0,
            log: LogConfig::default(),
            job_monitor: JobMonitorConfig::default(),
            worker_monitor: WorkerMonitorConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn batch_duration(&self) -> BatchDuration {
        BatchDuration::from_millis(self.batch_duration_ms)
    }

    /// Handling rate of host `index`, bytes per second.
    pub fn handling_rate(&self, index: usize) -> f64 {
        self.base_handling_rate * (1.0 + self.host_skew * index as f64)
    }
}

impl Config for SimConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.log.hot_update(&other.log);
        self.job_monitor.hot_update(&other.job_monitor);
        self.worker_monitor.hot_update(&other.worker_monitor);
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.log.validate()?;
        self.job_monitor.validate()?;
        self.worker_monitor.validate()?;
        for (field, value) in [
            ("hosts", self.hosts),
            ("reporters_per_host", self.reporters_per_host),
            ("streams_per_host", self.streams_per_host),
        ] {
            if value == 0 {
                return Err(ConfigError::out_of_range(field, value, Some(1), None::<usize>));
            }
        }
        if self.batch_duration_ms == 0 {
            return Err(ConfigError::out_of_range("batch_duration_ms", 0, Some(1), None::<u64>));
        }
        if self.base_handling_rate.is_nan() || self.base_handling_rate <= 0.0 {
            return Err(ConfigError::out_of_range(
                "base_handling_rate",
                self.base_handling_rate,
                Some("0 (exclusive)"),
                None::<f64>,
            ));
        }
        if self.host_skew < 0.0 {
            return Err(ConfigError::out_of_range("host_skew", self.host_skew, Some(0.0), None::<f64>));
        }
        Ok(())
    }
}
