use std::path::PathBuf;

use flowbal_config::{from_toml_value, render_toml, Config, ConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

pub use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, either a bare level or a full `EnvFilter` string.
    #[serde(default = "default_level")]
    pub level: String,

    /// Rolling log files go here; console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// "hourly", "daily" or "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    #[serde(default)]
    pub json_format: bool,

    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "flowbal".into()
}

fn default_rotation() -> String {
    "hourly".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl Config for LogConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.level = other.level.clone();
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| ConfigError::Invalid(format!("log level `{}`: {}", self.level, e)))?;
        if !["hourly", "daily", "never"].contains(&self.rotation.as_str()) {
            return Err(ConfigError::Invalid(format!("unknown rotation `{}`", self.rotation)));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot create log file appender: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),

    #[error("cannot reload filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Keeps the file writer flushing and allows the filter to change at runtime.
///
/// Dropping it flushes and stops the non-blocking file writer.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    _file_guard: Option<WorkerGuard>,
}

impl LogHandle {
    /// Swap the active filter, e.g. after a config hot reload.
    pub fn set_level(&self, level: &str) -> Result<(), LoggingError> {
        let filter = EnvFilter::try_new(level)?;
        self.filter.reload(filter)?;
        tracing::info!(level, "log filter updated");
        Ok(())
    }
}

fn rotation_of(name: &str) -> rolling::Rotation {
    match name {
        "daily" => rolling::Rotation::DAILY,
        "never" => rolling::Rotation::NEVER,
        _ => rolling::Rotation::HOURLY,
    }
}

/// Install the global subscriber. Call once at program startup.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LogConfig) -> Result<LogHandle, LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    let (filter_layer, filter) = reload::Layer::new(env_filter);

    let registry = tracing_subscriber::registry().with(filter_layer);

    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json()))
            } else {
                Some(Box::new(fmt::layer()))
            }
        } else {
            None
        };

    let (file_layer, file_guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<WorkerGuard>,
    ) = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::RollingFileAppender::builder()
            .rotation(rotation_of(&config.rotation))
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
            Box::new(fmt::layer().json().with_writer(non_blocking))
        } else {
            Box::new(fmt::layer().with_ansi(false).with_writer(non_blocking))
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry.with(console_layer).with(file_layer).try_init()?;

    Ok(LogHandle {
        filter,
        _file_guard: file_guard,
    })
}
