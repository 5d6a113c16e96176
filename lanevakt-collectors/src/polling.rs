//! Periodic reserve-snapshot collector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use lanevakt_alerts::AlertManager;
use lanevakt_audit::AuditLog;
use lanevakt_chain::provider::{ChainError, ChainProvider};
use lanevakt_core::reserve::{ReserveSnapshot, ReserveToken};
use lanevakt_core::time::Clock;
use lanevakt_core::units::{ray_to_percent, wad_to_units};
use lanevakt_telemetry::MetricSink;

use crate::{CollectorState, CollectorStatus};

const COLLECTOR: &str = "polling";

/// Polls reserve state on a fixed interval and publishes per-asset gauges.
///
/// One failed asset fetch drops that asset from the cycle; one failed height
/// read fails the whole cycle and flips health until a cycle succeeds again.
/// The scheduler itself never stops on errors.
pub struct PollingCollector {
    provider: Arc<dyn ChainProvider>,
    sink: Arc<dyn MetricSink>,
    alerts: Arc<AlertManager>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: AtomicBool,
    state: Mutex<CollectorState>,
    reserves: Mutex<Vec<ReserveToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingCollector {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        sink: Arc<dyn MetricSink>,
        alerts: Arc<AlertManager>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            sink,
            alerts,
            audit,
            clock,
            interval,
            running: AtomicBool::new(false),
            state: Mutex::new(CollectorState::default()),
            reserves: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        }
    }

    /// Loads the reserve list, runs one immediate cycle, then schedules the
    /// interval loop. Fails only if the reserve list cannot be fetched.
    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("polling collector already running");
            return Ok(());
        }

        let reserves = match self.provider.list_reserves().await {
            Ok(reserves) => reserves,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        };
        info!(reserves = reserves.len(), interval_ms = self.interval.as_millis() as u64, "polling collector started");
        self.audit(
            "COLLECTOR_START",
            json!({ "collector": COLLECTOR, "reserves": reserves.len() }),
        );
        *self.reserves.lock() = reserves;

        // First data lands before the interval elapses.
        if let Err(e) = self.poll_cycle().await {
            warn!(error = %e, "initial poll cycle failed");
        }

        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.tick().await;
            while this.running.load(Ordering::Acquire) {
                ticker.tick().await;
                if !this.running.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = this.poll_cycle().await {
                    warn!(error = %e, "poll cycle failed");
                }
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stops the scheduler. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.audit("COLLECTOR_STOP", json!({ "collector": COLLECTOR }));
        info!("polling collector stopped");
    }

    pub fn status(&self) -> CollectorStatus {
        self.state.lock().status()
    }

    /// One full cycle: read height, fetch every reserve concurrently,
    /// publish gauges, run threshold checks.
    pub async fn poll_cycle(&self) -> Result<(), ChainError> {
        let height = match self.provider.current_height().await {
            Ok(height) => height,
            Err(e) => {
                self.record_cycle_failure(&e);
                return Err(e);
            }
        };

        if height <= self.state.lock().last_height {
            debug!(height, "no new block, skipping cycle");
            return Ok(());
        }

        let reserves = self.reserves.lock().clone();
        let mut fetches = JoinSet::new();
        for token in reserves {
            let provider = Arc::clone(&self.provider);
            fetches.spawn(async move {
                let result = provider.reserve_state(token.address).await;
                (token, result)
            });
        }

        let mut snapshots = Vec::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((token, Ok(raw))) => {
                    snapshots.push(ReserveSnapshot::from_raw(&token, &raw));
                }
                Ok((token, Err(e))) => {
                    warn!(asset = %token.symbol, error = %e, "reserve fetch failed, skipping asset");
                }
                Err(e) => {
                    error!(error = %e, "reserve fetch task failed");
                }
            }
        }

        for snapshot in &snapshots {
            self.publish(snapshot);
            self.alerts
                .check_and_alert(
                    "utilization_rate",
                    snapshot.utilization_rate,
                    &[("asset", snapshot.symbol.as_str())],
                )
                .await;
        }

        let published = snapshots.len() as u64;
        {
            let mut state = self.state.lock();
            state.last_height = height;
            state.records_processed += published;
            state.last_update_ms = self.clock.now_ms();
            state.healthy = true;
        }
        let labels = [("collector", COLLECTOR)];
        self.sink.set_gauge("collector_health", &labels, 1.0);
        self.sink
            .set_gauge("collector_last_block_processed", &labels, height as f64);
        debug!(height, snapshots = published, "poll cycle complete");
        Ok(())
    }

    fn publish(&self, snapshot: &ReserveSnapshot) {
        let labels = [("asset", snapshot.symbol.as_str())];
        self.sink.set_gauge(
            "pool_total_liquidity",
            &labels,
            wad_to_units(snapshot.total_liquidity),
        );
        self.sink
            .set_gauge("pool_total_debt", &labels, wad_to_units(snapshot.total_debt));
        self.sink
            .set_gauge("pool_utilization_rate", &labels, snapshot.utilization_rate);
        self.sink.set_gauge(
            "pool_liquidity_rate",
            &labels,
            ray_to_percent(snapshot.liquidity_rate),
        );
        self.sink.set_gauge(
            "pool_variable_borrow_rate",
            &labels,
            ray_to_percent(snapshot.variable_borrow_rate),
        );
        self.sink.set_gauge(
            "pool_stable_borrow_rate",
            &labels,
            ray_to_percent(snapshot.stable_borrow_rate),
        );
    }

    fn record_cycle_failure(&self, error: &ChainError) {
        warn!(error = %error, "height read failed");
        let mut state = self.state.lock();
        state.error_count += 1;
        state.healthy = false;
        drop(state);
        let labels = [("collector", COLLECTOR)];
        self.sink.set_gauge("collector_health", &labels, 0.0);
        self.sink.inc_counter("collector_errors_total", &labels, 1.0);
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
    use async_trait::async_trait;
    use ethers_core::types::{Address, H256, U256};
    use lanevakt_chain::provider::EventSubscription;
    use lanevakt_core::alert::AlertThreshold;
    use lanevakt_core::reserve::RawReserveState;
    use lanevakt_core::time::VirtualClock;
    use lanevakt_telemetry::MetricsRecorder;
    use std::sync::atomic::AtomicU64;

    struct MockProvider {
        height: AtomicU64,
        fail_height: AtomicBool,
        utilization_pct: u64,
    }

    impl MockProvider {
        fn new(utilization_pct: u64) -> Self {
            Self {
                height: AtomicU64::new(100),
                fail_height: AtomicBool::new(false),
                utilization_pct,
            }
        }
    }

    #[async_trait]
    impl ChainProvider for MockProvider {
        async fn current_height(&self) -> Result<u64, ChainError> {
            if self.fail_height.load(Ordering::Acquire) {
                return Err(ChainError::Transport("rpc down".into()));
            }
            Ok(self.height.load(Ordering::Acquire))
        }

        async fn block_timestamp(&self, height: u64) -> Result<u64, ChainError> {
            Ok(1_700_000_000 + height * 12)
        }

        async fn list_reserves(&self) -> Result<Vec<ReserveToken>, ChainError> {
            Ok(vec![ReserveToken {
                symbol: "WETH".into(),
                address: Address::from_low_u64_be(1),
            }])
        }

        async fn reserve_state(&self, _asset: Address) -> Result<RawReserveState, ChainError> {
            let liquidity = U256::exp10(18) * U256::from(1_000u64);
            Ok(RawReserveState {
                total_a_token: liquidity,
                total_variable_debt: liquidity * U256::from(self.utilization_pct)
                    / U256::from(100u64),
                ..Default::default()
            })
        }

        async fn subscribe_events(
            &self,
            _contract: Address,
            _signatures: &[H256],
        ) -> Result<EventSubscription, ChainError> {
            Err(ChainError::SubscriptionClosed)
        }
    }

    fn collector(provider: Arc<MockProvider>) -> (Arc<PollingCollector>, Arc<AlertManager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        let sink: Arc<dyn MetricSink> = Arc::new(MetricsRecorder::new());
        let clock = Arc::new(VirtualClock::new(1_000));
        let alerts = Arc::new(AlertManager::new(
            Arc::clone(&sink),
            Arc::clone(&audit),
            clock.clone(),
            Vec::new(),
            10,
            60_000,
        ));
        alerts.set_threshold(AlertThreshold {
            metric: "utilization_rate".into(),
            warning: 80.0,
            critical: 95.0,
            enabled: true,
        });
        let collector = Arc::new(PollingCollector::new(
            provider,
            sink,
            Arc::clone(&alerts),
            audit,
            clock,
            Duration::from_secs(60),
        ));
        (collector, alerts, dir)
    }

    #[tokio::test]
    async fn cycle_publishes_and_checks_thresholds() {
        let provider = Arc::new(MockProvider::new(85));
        let (collector, alerts, _dir) = collector(provider.clone());
        collector.clone().start().await.unwrap();

        let status = collector.status();
        assert!(status.healthy);
        assert_eq!(status.last_height, 100);
        assert_eq!(status.records_processed, 1);
        assert_eq!(alerts.active_alerts().len(), 1);

        collector.stop();
    }

    #[tokio::test]
    async fn unchanged_height_skips_the_cycle() {
        let provider = Arc::new(MockProvider::new(10));
        let (collector, _alerts, _dir) = collector(provider.clone());
        collector.clone().start().await.unwrap();
        assert_eq!(collector.status().records_processed, 1);

        // Same height: no snapshot work.
        collector.poll_cycle().await.unwrap();
        assert_eq!(collector.status().records_processed, 1);

        provider.height.store(101, Ordering::Release);
        collector.poll_cycle().await.unwrap();
        assert_eq!(collector.status().records_processed, 2);

        collector.stop();
    }

    #[tokio::test]
    async fn height_failure_flips_health() {
        let provider = Arc::new(MockProvider::new(10));
        let (collector, _alerts, _dir) = collector(provider.clone());
        collector.clone().start().await.unwrap();
        assert!(collector.status().healthy);

        provider.fail_height.store(true, Ordering::Release);
        assert!(collector.poll_cycle().await.is_err());
        let status = collector.status();
        assert!(!status.healthy);
        assert_eq!(status.error_count, 1);

        // Recovery on the next good cycle.
        provider.fail_height.store(false, Ordering::Release);
        provider.height.store(101, Ordering::Release);
        collector.poll_cycle().await.unwrap();
        assert!(collector.status().healthy);

        collector.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let provider = Arc::new(MockProvider::new(10));
        let (collector, _alerts, _dir) = collector(provider);
        collector.clone().start().await.unwrap();
        collector.stop();
        collector.stop();
        assert!(!collector.running.load(Ordering::Acquire));
    }
}
