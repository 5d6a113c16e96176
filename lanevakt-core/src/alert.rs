//! Alert and threshold types owned by the alert manager.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity. Ordering matters: resolution notices are `Info`, threshold
/// crossings are `Warning` or `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-metric alerting levels. Keyed by metric name, last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub metric: String,
    /// Crossing this level (inclusive) raises a warning alert.
    pub warning: f64,
    /// Crossing this level (inclusive) raises a critical alert.
    pub critical: f64,
    pub enabled: bool,
}

/// One logical alert, active for a `(metric, label-set)` key until the value
/// returns below the warning level.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub metric: String,
    pub message: String,
    pub value: f64,
    /// The threshold level that was crossed.
    pub threshold: f64,
    pub timestamp_ms: u64,
    pub acknowledged: bool,
}
