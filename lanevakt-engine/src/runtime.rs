//! Top-level monitor assembly.

use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::Address;
use serde::Serialize;
use tracing::info;

use lanevakt_alerts::{AlertManager, AlertStatus, NotifyChannel};
use lanevakt_audit::AuditLog;
use lanevakt_chain::provider::ChainProvider;
use lanevakt_collectors::{CollectorStatus, EventCollector, PollingCollector};
use lanevakt_config::LanevaktConfig;
use lanevakt_core::alert::AlertThreshold;
use lanevakt_core::time::{Clock, SystemClock};
use lanevakt_telemetry::{MetricSink, MetricsRecorder};

use crate::error::MonitorError;

/// Aggregate status across both collectors and the alert manager.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub polling: CollectorStatus,
    pub events: CollectorStatus,
    pub alerts: AlertStatus,
}

/// The assembled monitor: one provider, two collectors, one alert manager,
/// one audit trail.
pub struct Monitor {
    metrics: MetricsRecorder,
    audit: Arc<AuditLog>,
    alerts: Arc<AlertManager>,
    polling: Arc<PollingCollector>,
    events: Arc<EventCollector>,
}

impl Monitor {
    /// Wires the full pipeline from configuration. The provider and the
    /// notification channels are injected so the same assembly serves both
    /// live RPC and simulated runs.
    pub fn new(
        config: &LanevaktConfig,
        provider: Arc<dyn ChainProvider>,
        channels: Vec<Arc<dyn NotifyChannel>>,
    ) -> Result<Self, MonitorError> {
        let pool: Address = config
            .chain
            .pool_address
            .parse()
            .map_err(|_| MonitorError::InvalidPoolAddress(config.chain.pool_address.clone()))?;

        let metrics = MetricsRecorder::new();
        let sink: Arc<dyn MetricSink> = Arc::new(metrics.clone());
        let audit = Arc::new(AuditLog::open(&config.audit.path)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let alerts = Arc::new(AlertManager::new(
            Arc::clone(&sink),
            Arc::clone(&audit),
            Arc::clone(&clock),
            channels,
            config.alerts.max_alerts_per_minute,
            config.alerts.cooldown_secs * 1_000,
        ));
        for threshold in &config.alerts.thresholds {
            alerts.set_threshold(AlertThreshold {
                metric: threshold.metric.clone(),
                warning: threshold.warning,
                critical: threshold.critical,
                enabled: threshold.enabled,
            });
        }

        let polling = Arc::new(PollingCollector::new(
            Arc::clone(&provider),
            Arc::clone(&sink),
            Arc::clone(&alerts),
            Arc::clone(&audit),
            Arc::clone(&clock),
            Duration::from_millis(config.chain.polling_interval_ms),
        ));
        let events = Arc::new(EventCollector::new(
            provider,
            pool,
            sink,
            audit.clone(),
            clock,
        ));

        Ok(Self {
            metrics,
            audit,
            alerts,
            polling,
            events,
        })
    }

    /// Starts both collectors. If the event collector fails to come up, the
    /// polling collector is stopped again so the monitor never runs half-open.
    pub async fn start(&self) -> Result<(), MonitorError> {
        Arc::clone(&self.polling).start().await?;
        if let Err(e) = Arc::clone(&self.events).start().await {
            self.polling.stop();
            return Err(e.into());
        }
        info!("monitor running");
        Ok(())
    }

    pub fn stop(&self) {
        self.events.stop();
        self.polling.stop();
        info!("monitor stopped");
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            polling: self.polling.status(),
            events: self.events.status(),
            alerts: self.alerts.status(),
        }
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn metrics_text(&self) -> Result<String, prometheus::Error> {
        self.metrics.gather()
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }
}
