//! Alerting thresholds, rate limiting, and channel configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Alert manager configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AlertsConfig {
    /// Dispatch cap per rolling window before the circuit breaker opens.
    #[validate(range(min = 1, max = 1_000))]
    #[serde(default = "default_max_per_minute")]
    pub max_alerts_per_minute: u32,

    /// Circuit breaker cooldown (seconds).
    #[validate(range(min = 1, max = 3_600))]
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Per-metric alerting levels; replaces the defaults when present.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<ThresholdConfig>,

    /// Telegram-like channel toggle (transport is external).
    #[validate(nested)]
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Email-like channel toggle (transport is external).
    #[validate(nested)]
    #[serde(default)]
    pub email: EmailConfig,
}

/// One threshold entry, keyed by metric name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ThresholdConfig {
    pub metric: String,
    pub warning: f64,
    pub critical: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

fn default_max_per_minute() -> u32 {
    10
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

/// The stock threshold set installed when no overrides are configured.
pub fn default_thresholds() -> Vec<ThresholdConfig> {
    vec![
        ThresholdConfig {
            metric: "utilization_rate".into(),
            warning: 80.0,
            critical: 95.0,
            enabled: true,
        },
        ThresholdConfig {
            metric: "flashloan_volume_hourly".into(),
            warning: 1_000_000.0,
            critical: 10_000_000.0,
            enabled: true,
        },
        ThresholdConfig {
            metric: "liquidation_count_hourly".into(),
            warning: 10.0,
            critical: 50.0,
            enabled: true,
        },
        ThresholdConfig {
            metric: "collector_health".into(),
            warning: 0.0,
            critical: 0.0,
            enabled: true,
        },
    ]
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            max_alerts_per_minute: default_max_per_minute(),
            cooldown_secs: default_cooldown_secs(),
            thresholds: default_thresholds(),
            telegram: TelegramConfig::default(),
            email: EmailConfig::default(),
        }
    }
}
