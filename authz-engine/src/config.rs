//! Configuration for the authorization engine

use ledger_store::Currency;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Currency applied when a creation request does not specify one
    pub default_currency: Currency,

    /// Bounded audit queue depth; overflow drops events
    pub audit_queue_capacity: usize,

    /// Underlying store configuration
    pub store: ledger_store::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_currency: Currency::TRY,
            audit_queue_capacity: 1024,
            store: ledger_store::Config::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("ENGINE_DATA_DIR") {
            config.store.data_dir = dir.into();
        }

        if let Ok(code) = std::env::var("ENGINE_DEFAULT_CURRENCY") {
            config.default_currency = Currency::parse(&code).ok_or_else(|| {
                crate::Error::Config(format!("Unknown default currency: {}", code))
            })?;
        }

        Ok(config)
    }
}
