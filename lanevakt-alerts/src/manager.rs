//! Alert manager: threshold evaluation, per-key alert lifecycle, and the
//! rate-limited dispatch fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use lanevakt_audit::AuditLog;
use lanevakt_core::alert::{Alert, AlertThreshold, Severity};
use lanevakt_core::time::Clock;
use lanevakt_telemetry::MetricSink;

use crate::breaker::{Admission, DispatchGate};
use crate::notify::NotifyChannel;

const WINDOW_MS: u64 = 60_000;

/// Read-only alert manager state exposed to the external status surface.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatus {
    pub active_alert_count: usize,
    pub circuit_breaker_open: bool,
    pub dispatches_in_window: u32,
}

enum Transition {
    Raise(Alert),
    Resolve { previous: Alert, key: String },
}

/// Owns the threshold table and the active-alert table (single writer), and
/// drives every notification through the dispatch gate.
pub struct AlertManager {
    thresholds: Mutex<HashMap<String, AlertThreshold>>,
    active: Mutex<HashMap<String, Alert>>,
    gate: Mutex<DispatchGate>,
    channels: Vec<Arc<dyn NotifyChannel>>,
    sink: Arc<dyn MetricSink>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    cooldown_ms: u64,
}

impl AlertManager {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        channels: Vec<Arc<dyn NotifyChannel>>,
        max_alerts_per_window: u32,
        cooldown_ms: u64,
    ) -> Self {
        Self {
            thresholds: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            gate: Mutex::new(DispatchGate::new(
                max_alerts_per_window,
                WINDOW_MS,
                cooldown_ms,
            )),
            channels,
            sink,
            audit,
            clock,
            cooldown_ms,
        }
    }

    /// Canonical `(metric, label-set)` key.
    pub fn alert_key(metric: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return metric.to_string();
        }
        let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{metric}{{{}}}", rendered.join(","))
    }

    /// Installs or replaces a threshold. Last write wins.
    pub fn set_threshold(&self, threshold: AlertThreshold) {
        self.audit(
            "THRESHOLD_SET",
            json!({
                "metric": threshold.metric,
                "warning": threshold.warning,
                "critical": threshold.critical,
                "enabled": threshold.enabled,
            }),
        );
        self.thresholds
            .lock()
            .insert(threshold.metric.clone(), threshold);
    }

    pub fn threshold(&self, metric: &str) -> Option<AlertThreshold> {
        self.thresholds.lock().get(metric).cloned()
    }

    /// Evaluates `value` against the metric's threshold and advances the
    /// alert state machine for the `(metric, label-set)` key.
    ///
    /// Boundary values exactly equal to a level count as crossing it. An
    /// unchanged severity never re-dispatches; only severity changes and
    /// resolutions produce notifications.
    pub async fn check_and_alert(&self, metric: &str, value: f64, labels: &[(&str, &str)]) {
        let threshold = match self.thresholds.lock().get(metric) {
            Some(t) if t.enabled => t.clone(),
            _ => return,
        };

        let key = Self::alert_key(metric, labels);
        let target = if value >= threshold.critical {
            Some(Severity::Critical)
        } else if value >= threshold.warning {
            Some(Severity::Warning)
        } else {
            None
        };

        // Table mutation happens under the lock; dispatch happens after it
        // is released.
        let transition = {
            let mut active = self.active.lock();
            match (target, active.get(&key).map(|a| a.severity)) {
                (None, _) => active.remove(&key).map(|previous| Transition::Resolve {
                    previous,
                    key: key.clone(),
                }),
                (Some(severity), current) if current != Some(severity) => {
                    let alert = self.build_alert(&key, metric, value, &threshold, severity, labels);
                    active.insert(key.clone(), alert.clone());
                    Some(Transition::Raise(alert))
                }
                _ => None,
            }
        };

        match transition {
            Some(Transition::Raise(alert)) => self.dispatch(alert).await,
            Some(Transition::Resolve { previous, key }) => {
                let now = self.clock.now_ms();
                let resolution = Alert {
                    id: format!("{key}-resolved-{now}"),
                    severity: Severity::Info,
                    metric: previous.metric.clone(),
                    message: format!(
                        "RESOLVED: {} is now {:.2} (was {:.2})",
                        previous.metric, value, previous.value
                    ),
                    value,
                    threshold: previous.threshold,
                    timestamp_ms: now,
                    acknowledged: false,
                };
                self.dispatch(resolution).await;
                self.audit(
                    "ALERT_RESOLVED",
                    json!({
                        "alert_key": key,
                        "previous_value": previous.value,
                        "current_value": value,
                    }),
                );
                info!(
                    metric = %previous.metric,
                    previous_value = previous.value,
                    current_value = value,
                    "alert resolved"
                );
            }
            None => {}
        }
    }

    fn build_alert(
        &self,
        key: &str,
        metric: &str,
        value: f64,
        threshold: &AlertThreshold,
        severity: Severity,
        labels: &[(&str, &str)],
    ) -> Alert {
        let now = self.clock.now_ms();
        let crossed = match severity {
            Severity::Critical => threshold.critical,
            _ => threshold.warning,
        };
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!(" [{}]", rendered.join(", "))
        };

        Alert {
            id: format!("{key}-{now}"),
            severity,
            metric: metric.to_string(),
            message: format!(
                "{}: {metric}{label_str} is {value:.2} (threshold: {crossed})",
                severity.as_str().to_uppercase()
            ),
            value,
            threshold: crossed,
            timestamp_ms: now,
            acknowledged: false,
        }
    }

    /// Sends one alert through the rate-limiting gate and on to every
    /// enabled channel.
    async fn dispatch(&self, alert: Alert) {
        let admission = self.gate.lock().admit(self.clock.now_ms());

        match admission {
            Admission::Drop {
                cooldown_remaining_ms,
            } => {
                warn!(
                    id = %alert.id,
                    cooldown_remaining_ms,
                    "circuit breaker open, dropping alert"
                );
            }
            Admission::Tripped => {
                warn!(metric = %alert.metric, "alert rate cap reached, circuit breaker engaged");
                let now = self.clock.now_ms();
                let notice = Alert {
                    id: format!("{}-breaker", alert.id),
                    severity: Severity::Critical,
                    metric: alert.metric.clone(),
                    message: format!(
                        "CIRCUIT BREAKER: alert rate cap reached, pausing dispatch for {}s",
                        self.cooldown_ms / 1_000
                    ),
                    value: alert.value,
                    threshold: alert.threshold,
                    timestamp_ms: now,
                    acknowledged: false,
                };
                self.fan_out(&notice).await;
                self.audit(
                    "CIRCUIT_BREAKER_OPEN",
                    json!({
                        "suppressed_alert": alert.id,
                        "metric": alert.metric,
                        "cooldown_ms": self.cooldown_ms,
                    }),
                );
            }
            Admission::Deliver => {
                self.fan_out(&alert).await;
                self.sink.inc_counter(
                    "alerts_triggered_total",
                    &[
                        ("severity", alert.severity.as_str()),
                        ("metric", &alert.metric),
                    ],
                    1.0,
                );
                self.audit(
                    "ALERT_SENT",
                    json!({
                        "alert_id": alert.id,
                        "severity": alert.severity.as_str(),
                        "metric": alert.metric,
                        "value": alert.value,
                    }),
                );
                info!(
                    id = %alert.id,
                    severity = %alert.severity,
                    metric = %alert.metric,
                    "alert dispatched"
                );
            }
        }
    }

    /// Fans one alert out to every enabled channel concurrently; a channel
    /// failure is recorded against that channel only.
    async fn fan_out(&self, alert: &Alert) {
        let mut tasks = JoinSet::new();
        for channel in &self.channels {
            if !channel.is_enabled() {
                debug!(channel = channel.name(), "channel disabled, skipping");
                continue;
            }
            let channel = Arc::clone(channel);
            let alert = alert.clone();
            tasks.spawn(async move {
                let outcome = channel.send(&alert).await;
                (channel.name().to_string(), outcome)
            });
        }

        let severity = alert.severity.as_str();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(true))) => {
                    self.sink.inc_counter(
                        "alerts_sent_total",
                        &[("channel", &name), ("severity", severity)],
                        1.0,
                    );
                }
                Ok((name, Ok(false))) => {
                    debug!(channel = %name, id = %alert.id, "notification skipped");
                }
                Ok((name, Err(e))) => {
                    self.sink.inc_counter(
                        "alerts_failed_total",
                        &[("channel", &name), ("severity", severity)],
                        1.0,
                    );
                    error!(channel = %name, id = %alert.id, error = %e, "failed to send alert");
                }
                Err(e) => {
                    error!(id = %alert.id, error = %e, "notification task failed");
                }
            }
        }
    }

    /// Marks the active alert for `key` acknowledged. Never changes severity
    /// or removes the alert; only resolution does that.
    pub fn acknowledge_alert(&self, key: &str) -> bool {
        let mut active = self.active.lock();
        match active.get_mut(key) {
            Some(alert) => {
                alert.acknowledged = true;
                drop(active);
                self.audit("ALERT_ACKNOWLEDGED", json!({ "alert_key": key }));
                true
            }
            None => false,
        }
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active.lock().values().cloned().collect()
    }

    pub fn status(&self) -> AlertStatus {
        let gate = self.gate.lock();
        AlertStatus {
            active_alert_count: self.active.lock().len(),
            circuit_breaker_open: gate.is_open(),
            dispatches_in_window: gate.dispatches_in_window(),
        }
    }

    fn audit(&self, action: &str, details: serde_json::Value) {
        if let Err(e) = self.audit.append(action, details) {
            error!(action, error = %e, "audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use lanevakt_core::time::VirtualClock;
    use lanevakt_telemetry::MetricsRecorder;

    struct RecordingChannel {
        name: String,
        sent: Arc<Mutex<Vec<Alert>>>,
        fail: bool,
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, alert: &Alert) -> Result<bool, NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("boom".into()));
            }
            self.sent.lock().push(alert.clone());
            Ok(true)
        }
    }

    struct Fixture {
        manager: AlertManager,
        sent: Arc<Mutex<Vec<Alert>>>,
        clock: VirtualClock,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        let clock = VirtualClock::new(1_000_000);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(RecordingChannel {
            name: "test".into(),
            sent: Arc::clone(&sent),
            fail: false,
        });
        let manager = AlertManager::new(
            Arc::new(MetricsRecorder::new()),
            audit,
            Arc::new(clock.clone()),
            vec![channel],
            10,
            60_000,
        );
        manager.set_threshold(AlertThreshold {
            metric: "utilization_rate".into(),
            warning: 80.0,
            critical: 95.0,
            enabled: true,
        });
        Fixture {
            manager,
            sent,
            clock,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn warning_critical_resolution_scenario() {
        let f = fixture();
        let labels = [("asset", "WETH")];

        f.manager.check_and_alert("utilization_rate", 70.0, &labels).await;
        assert!(f.sent.lock().is_empty());
        assert_eq!(f.manager.active_alerts().len(), 0);

        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 85.0, &labels).await;
        assert_eq!(f.sent.lock().len(), 1);
        assert_eq!(f.sent.lock()[0].severity, Severity::Warning);
        assert_eq!(f.manager.active_alerts().len(), 1);

        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 97.0, &labels).await;
        assert_eq!(f.sent.lock().len(), 2);
        assert_eq!(f.sent.lock()[1].severity, Severity::Critical);
        // Replaced, not stacked: still one active alert for the key.
        assert_eq!(f.manager.active_alerts().len(), 1);

        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 60.0, &labels).await;
        assert_eq!(f.sent.lock().len(), 3);
        assert_eq!(f.sent.lock()[2].severity, Severity::Info);
        assert!(f.sent.lock()[2].message.starts_with("RESOLVED"));
        assert_eq!(f.manager.active_alerts().len(), 0);
    }

    #[tokio::test]
    async fn unchanged_severity_never_redispatches() {
        let f = fixture();
        let labels = [("asset", "DAI")];

        f.manager.check_and_alert("utilization_rate", 85.0, &labels).await;
        let first_id = f.manager.active_alerts()[0].id.clone();

        f.clock.advance(5_000);
        f.manager.check_and_alert("utilization_rate", 88.0, &labels).await;

        assert_eq!(f.sent.lock().len(), 1);
        assert_eq!(f.manager.active_alerts()[0].id, first_id);
    }

    #[tokio::test]
    async fn severity_change_issues_fresh_id() {
        let f = fixture();
        let labels = [("asset", "DAI")];

        f.manager.check_and_alert("utilization_rate", 85.0, &labels).await;
        let warning_id = f.manager.active_alerts()[0].id.clone();

        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 96.0, &labels).await;
        let critical_id = f.manager.active_alerts()[0].id.clone();

        assert_ne!(warning_id, critical_id);
    }

    #[tokio::test]
    async fn boundary_values_cross() {
        let f = fixture();

        f.manager.check_and_alert("utilization_rate", 80.0, &[("asset", "A")]).await;
        assert_eq!(f.sent.lock()[0].severity, Severity::Warning);

        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 95.0, &[("asset", "B")]).await;
        assert_eq!(f.sent.lock()[1].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn missing_or_disabled_threshold_is_a_noop() {
        let f = fixture();

        f.manager.check_and_alert("unknown_metric", 1e9, &[]).await;
        assert!(f.sent.lock().is_empty());

        f.manager.set_threshold(AlertThreshold {
            metric: "utilization_rate".into(),
            warning: 80.0,
            critical: 95.0,
            enabled: false,
        });
        f.manager.check_and_alert("utilization_rate", 99.0, &[]).await;
        assert!(f.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn eleventh_dispatch_trips_the_breaker() {
        let f = fixture();

        // Ten distinct keys dispatch normally.
        for i in 0..10 {
            let asset = format!("A{i}");
            f.manager
                .check_and_alert("utilization_rate", 85.0, &[("asset", &asset)])
                .await;
            f.clock.advance(10);
        }
        assert_eq!(f.sent.lock().len(), 10);

        // The 11th becomes a single synthetic breaker notice.
        f.manager
            .check_and_alert("utilization_rate", 85.0, &[("asset", "A10")])
            .await;
        assert_eq!(f.sent.lock().len(), 11);
        let notice = f.sent.lock().last().unwrap().clone();
        assert_eq!(notice.severity, Severity::Critical);
        assert!(notice.message.starts_with("CIRCUIT BREAKER"));
        assert!(f.manager.status().circuit_breaker_open);

        // While open, further alerts are dropped silently.
        f.clock.advance(1_000);
        f.manager
            .check_and_alert("utilization_rate", 85.0, &[("asset", "A11")])
            .await;
        assert_eq!(f.sent.lock().len(), 11);

        // After the cooldown, dispatch resumes.
        f.clock.advance(60_000);
        f.manager
            .check_and_alert("utilization_rate", 85.0, &[("asset", "A12")])
            .await;
        assert_eq!(f.sent.lock().len(), 12);
        assert!(!f.manager.status().circuit_breaker_open);
    }

    #[tokio::test]
    async fn acknowledge_sets_flag_without_resolving() {
        let f = fixture();
        let labels = [("asset", "WETH")];
        f.manager.check_and_alert("utilization_rate", 85.0, &labels).await;

        let key = AlertManager::alert_key("utilization_rate", &labels);
        assert!(f.manager.acknowledge_alert(&key));
        let active = f.manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert!(active[0].acknowledged);
        assert_eq!(active[0].severity, Severity::Warning);

        assert!(!f.manager.acknowledge_alert("nope"));
    }

    #[tokio::test]
    async fn channel_failure_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        let clock = VirtualClock::new(0);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let good = Arc::new(RecordingChannel {
            name: "good".into(),
            sent: Arc::clone(&sent),
            fail: false,
        });
        let bad = Arc::new(RecordingChannel {
            name: "bad".into(),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        });
        let manager = AlertManager::new(
            Arc::new(MetricsRecorder::new()),
            audit,
            Arc::new(clock),
            vec![bad, good],
            10,
            60_000,
        );
        manager.set_threshold(AlertThreshold {
            metric: "utilization_rate".into(),
            warning: 80.0,
            critical: 95.0,
            enabled: true,
        });

        manager.check_and_alert("utilization_rate", 85.0, &[]).await;
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn every_dispatch_lands_in_the_audit_trail() {
        let f = fixture();
        f.manager.check_and_alert("utilization_rate", 97.0, &[]).await;
        f.clock.advance(1);
        f.manager.check_and_alert("utilization_rate", 10.0, &[]).await;

        let report = f.manager.audit.verify();
        assert!(report.valid);
        // THRESHOLD_SET + ALERT_SENT + resolution dispatch + ALERT_RESOLVED.
        assert!(report.entries >= 4);
    }
}
