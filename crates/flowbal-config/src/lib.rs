//! Configuration trait, errors, and a hot-reloadable holder.

mod manager;

pub use manager::ConfigManager;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("field `{field}` expects {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("field `{field}` = {value} out of range (min {min:?}, max {max:?})")]
    OutOfRange {
        field: String,
        value: String,
        min: Option<String>,
        max: Option<String>,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn out_of_range(
        field: &str,
        value: impl ToString,
        min: Option<impl ToString>,
        max: Option<impl ToString>,
    ) -> Self {
        Self::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: min.map(|m| m.to_string()),
            max: max.map(|m| m.to_string()),
        }
    }
}

/// A configuration section.
///
/// `hot_update` copies only the fields that may change while running; the
/// rest keep their startup value across [`ConfigManager::reload`].
pub trait Config: Sized + Send + Sync + 'static {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError>;

    fn hot_update(&mut self, other: &Self);

    fn render(&self) -> String;

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Deserialize a section through serde, filling absent fields from `#[serde(default)]`.
pub fn from_toml_value<T: DeserializeOwned>(value: &toml::Value) -> Result<T, ConfigError> {
    Ok(value.clone().try_into()?)
}

/// Render a section as TOML text.
pub fn render_toml<T: Serialize>(config: &T) -> String {
    toml::to_string(config).unwrap_or_else(|e| format!("# failed to render config: {}\n", e))
}

/// Parse and validate a config from TOML text.
pub fn parse_config<T: Config>(content: &str) -> Result<T, ConfigError> {
    let value: toml::Value = content.parse()?;
    let config = T::from_toml(&value)?;
    config.validate()?;
    Ok(config)
}
