//! Notification channel capability.
//!
//! Transports (Telegram, SMTP, webhooks) live outside this workspace; the
//! alert manager depends only on this contract. `Ok(true)` means delivered,
//! `Ok(false)` means the channel skipped (disabled or unconfigured), `Err`
//! means the transport failed.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use lanevakt_core::alert::{Alert, Severity};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel transport failure: {0}")]
    Transport(String),
}

/// One outbound alert destination.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Channel name used in metrics labels and logs.
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Delivers one alert. Failures are recorded against this channel only.
    async fn send(&self, alert: &Alert) -> Result<bool, NotifyError>;
}

/// Channel that writes alerts to the process log.
///
/// Used by the simulate mode and anywhere no real transport is wired; keeps
/// the dispatch path fully exercised.
#[derive(Debug, Default)]
pub struct TracingChannel;

#[async_trait]
impl NotifyChannel for TracingChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<bool, NotifyError> {
        match alert.severity {
            Severity::Critical => error!(
                id = %alert.id,
                metric = %alert.metric,
                value = alert.value,
                "{}", alert.message
            ),
            Severity::Warning => warn!(
                id = %alert.id,
                metric = %alert.metric,
                value = alert.value,
                "{}", alert.message
            ),
            Severity::Info => info!(
                id = %alert.id,
                metric = %alert.metric,
                value = alert.value,
                "{}", alert.message
            ),
        }
        Ok(true)
    }
}
