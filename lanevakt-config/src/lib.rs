//! # lanevakt Configuration System
//!
//! Hierarchical configuration for the risk monitor: defaults, YAML files,
//! and `LANEVAKT_*` environment overrides, validated before use.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod alerts;
mod chain;
mod error;
mod telemetry;
mod validation;

pub use alerts::{
    default_thresholds, AlertsConfig, EmailConfig, TelegramConfig, ThresholdConfig,
};
pub use chain::ChainConfig;
pub use error::ConfigError;
pub use telemetry::{AuditConfig, TelemetryConfig};

/// Top-level configuration container for all monitor components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct LanevaktConfig {
    /// Chain endpoint and collector scheduling.
    #[validate(nested)]
    pub chain: ChainConfig,

    /// Alert thresholds, rate limiting, and channels.
    #[validate(nested)]
    pub alerts: AlertsConfig,

    /// Metrics and logging.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    /// Audit trail persistence.
    #[validate(nested)]
    pub audit: AuditConfig,
}

impl LanevaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/lanevakt.yaml` - base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - environment-specific overrides.
    /// 4. `LANEVAKT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(LanevaktConfig::default()));

        if Path::new("config/lanevakt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/lanevakt.yaml"));
        }

        let env = std::env::var("LANEVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        figment
            .merge(Env::prefixed("LANEVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path for testing/validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(
                path.to_string_lossy().to_string(),
            )));
        }

        Figment::from(Serialized::defaults(LanevaktConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("LANEVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = LanevaktConfig::default();
        config.validate().expect("default config should validate");
    }

    #[test]
    fn default_thresholds_are_installed() {
        let config = LanevaktConfig::default();
        assert!(config
            .alerts
            .thresholds
            .iter()
            .any(|t| t.metric == "utilization_rate" && t.warning == 80.0 && t.critical == 95.0));
        assert_eq!(config.alerts.max_alerts_per_minute, 10);
        assert_eq!(config.alerts.cooldown_secs, 60);
    }

    #[test]
    fn bad_pool_address_is_rejected() {
        let config = LanevaktConfig {
            chain: ChainConfig {
                pool_address: "not-an-address".into(),
                ..ChainConfig::default()
            },
            ..LanevaktConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn polling_interval_range_is_enforced() {
        let config = LanevaktConfig {
            chain: ChainConfig {
                polling_interval_ms: 10,
                ..ChainConfig::default()
            },
            ..LanevaktConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
