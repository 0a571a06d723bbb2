use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{parse_config, Config, ConfigError};

/// Holds the live configuration and swaps in hot updates.
pub struct ConfigManager<T: Config> {
    config: ArcSwap<T>,
    path: Option<PathBuf>,
}

impl<T: Config> ConfigManager<T> {
    pub fn new(config: T) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            path: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = parse_config(&std::fs::read_to_string(path)?)?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> arc_swap::Guard<Arc<T>> {
        self.config.load()
    }

    /// Replace the whole config after validating it.
    pub fn update(&self, new_config: T) -> Result<(), ConfigError> {
        new_config.validate()?;
        self.config.store(Arc::new(new_config));
        Ok(())
    }
}

impl<T: Config + Clone> ConfigManager<T> {
    /// Re-read the backing file and apply only its hot-updatable fields.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh: T = parse_config(&std::fs::read_to_string(path)?)?;
        let mut current = self.snapshot();
        current.hot_update(&fresh);
        current.validate()?;
        self.config.store(Arc::new(current));
        tracing::info!(path = %path.display(), "config reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> T {
        (*self.config.load_full()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_toml_value, render_toml};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Limits {
        #[serde(default)]
        port: u16,
        #[serde(default)]
        interval_ms: u64,
    }

    impl Config for Limits {
        fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
            from_toml_value(value)
        }

        fn hot_update(&mut self, other: &Self) {
            self.interval_ms = other.interval_ms;
        }

        fn render(&self) -> String {
            render_toml(self)
        }

        fn validate(&self) -> Result<(), ConfigError> {
            if self.interval_ms == 0 {
                return Err(ConfigError::Invalid("interval_ms must be positive".into()));
            }
            Ok(())
        }
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("flowbal-config-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_update_rejects_invalid() {
        let mgr = ConfigManager::new(Limits {
            port: 1,
            interval_ms: 10,
        });
        assert!(mgr
            .update(Limits {
                port: 2,
                interval_ms: 0
            })
            .is_err());
        assert_eq!(mgr.get().port, 1);
    }

    #[test]
    fn test_reload_applies_hot_fields_only() {
        let path = temp_file("reload", "port = 80\ninterval_ms = 100\n");
        let mgr = ConfigManager::<Limits>::load(&path).unwrap();
        assert_eq!(mgr.path(), Some(path.as_path()));

        std::fs::write(&path, "port = 8080\ninterval_ms = 250\n").unwrap();
        mgr.reload().unwrap();
        let cfg = mgr.snapshot();
        assert_eq!(cfg.port, 80);
        assert_eq!(cfg.interval_ms, 250);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigManager::<Limits>::load("/nonexistent/flowbal.toml").err().unwrap();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_reload_without_path_is_noop() {
        let mgr = ConfigManager::new(Limits {
            port: 1,
            interval_ms: 1,
        });
        mgr.reload().unwrap();
        assert_eq!(mgr.snapshot().port, 1);
    }
}
