//! Configuration for the settlement layer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger data directory
    pub ledger_data_dir: PathBuf,

    /// Callback verification configuration
    pub callback: CallbackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "akiba-settlement".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_data_dir: PathBuf::from("./data/ledger"),
            callback: CallbackConfig::default(),
        }
    }
}

/// Callback verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Require an HMAC signature on every callback
    pub verify_signatures: bool,

    /// Shared secret for HMAC-SHA256 verification
    pub secret: Option<String>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            verify_signatures: false,
            secret: None,
        }
    }
}

impl CallbackConfig {
    /// The secret to verify against, if verification is enabled
    pub fn active_secret(&self) -> Option<&str> {
        if self.verify_signatures {
            self.secret.as_deref()
        } else {
            None
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("AKIBA_LEDGER_DATA_DIR") {
            config.ledger_data_dir = PathBuf::from(dir);
        }

        if let Ok(secret) = std::env::var("AKIBA_CALLBACK_SECRET") {
            config.callback.verify_signatures = true;
            config.callback.secret = Some(secret);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "akiba-settlement");
        assert!(!config.callback.verify_signatures);
        assert!(config.callback.active_secret().is_none());
    }

    #[test]
    fn test_active_secret_requires_toggle() {
        let mut callback = CallbackConfig::default();
        callback.secret = Some("s3cret".to_string());
        assert!(callback.active_secret().is_none());

        callback.verify_signatures = true;
        assert_eq!(callback.active_secret(), Some("s3cret"));
    }
}
