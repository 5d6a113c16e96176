//! Observability and audit persistence configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Bind address the external metrics surface scrapes from.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// Default logging level.
    #[validate(custom(function = validation::validate_log_level))]
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".into()
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            log_level: default_log_level(),
        }
    }
}

/// Audit trail persistence configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AuditConfig {
    /// Path of the line-oriented audit store.
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("logs/lanevakt.audit.jsonl")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
        }
    }
}
