//! Push-based chain-event collector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ethers_core::types::Address;
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lanevakt_audit::AuditLog;
use lanevakt_chain::provider::{ChainError, ChainProvider, RawLog, SubscriptionUpdate};
use lanevakt_core::event::{ChainEvent, EventKey, EventKind, EventPayload};
use lanevakt_core::time::Clock;
use lanevakt_core::units::wad_to_units;
use lanevakt_telemetry::MetricSink;

use crate::decode::{decode_log, DecodeError};
use crate::dedup::DedupTable;
use crate::{CollectorState, CollectorStatus};

const COLLECTOR: &str = "events";
const DEDUP_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Subscribes to pool logs and turns each new record into counters, an audit
/// entry, and a structured log line.
///
/// A record seen twice under the same `(tx_hash, log_index)` key is dropped
/// silently; a record that fails to decode is counted and skipped; the batch
/// always continues.
pub struct EventCollector {
    provider: Arc<dyn ChainProvider>,
    pool: Address,
    sink: Arc<dyn MetricSink>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    state: Mutex<CollectorState>,
    dedup: Mutex<DedupTable>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventCollector {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        pool: Address,
        sink: Arc<dyn MetricSink>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            pool,
            sink,
            audit,
            clock,
            running: AtomicBool::new(false),
            state: Mutex::new(CollectorState::default()),
            dedup: Mutex::new(DedupTable::new(DEDUP_CAPACITY)),
            task: Mutex::new(None),
        }
    }

    /// Opens the event subscription and spawns the drain loop. Fails only if
    /// the baseline height or the subscription cannot be obtained.
    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("event collector already running");
            return Ok(());
        }

        let baseline = match self.provider.current_height().await {
            Ok(height) => height,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let subscription = match self
            .provider
            .subscribe_events(self.pool, &EventKind::all_topics())
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        self.state.lock().last_height = baseline;
        self.audit(
            "COLLECTOR_START",
            json!({ "collector": COLLECTOR, "height": baseline }),
        );
        info!(height = baseline, pool = %self.pool, "event collector started");

        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            // The subscription lives inside the task; aborting the task drops
            // it, which cancels delivery on the provider side.
            let mut subscription = subscription;
            while let Some(update) = subscription.updates.recv().await {
                if !this.running.load(Ordering::Acquire) {
                    break;
                }
                match update {
                    SubscriptionUpdate::Batch(batch) => this.handle_batch(batch).await,
                    SubscriptionUpdate::Error(e) => this.record_stream_failure(&e),
                }
            }
            debug!("event subscription drained");
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Stops the drain loop and cancels the subscription. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.audit("COLLECTOR_STOP", json!({ "collector": COLLECTOR }));
        info!("event collector stopped");
    }

    pub fn status(&self) -> CollectorStatus {
        self.state.lock().status()
    }

    async fn handle_batch(&self, batch: Vec<RawLog>) {
        let mut processed: u64 = 0;
        let mut errors: u64 = 0;
        let mut max_height: u64 = 0;

        for log in batch {
            let started = Instant::now();
            max_height = max_height.max(log.block_number);
            match self.process_log(&log).await {
                Ok(Some(kind)) => {
                    processed += 1;
                    self.sink.observe_histogram(
                        "event_processing_duration_seconds",
                        &[("event_type", kind.as_str())],
                        started.elapsed().as_secs_f64(),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        tx = %log.transaction_hash,
                        log_index = log.log_index,
                        error = %e,
                        "event record failed"
                    );
                    errors += 1;
                }
            }
        }

        {
            let mut state = self.state.lock();
            state.records_processed += processed;
            state.error_count += errors;
            state.last_height = state.last_height.max(max_height);
            state.last_update_ms = self.clock.now_ms();
            state.healthy = true;
        }
        let labels = [("collector", COLLECTOR)];
        self.sink.set_gauge("collector_health", &labels, 1.0);
        if max_height > 0 {
            self.sink
                .set_gauge("collector_last_block_processed", &labels, max_height as f64);
        }
        if errors > 0 {
            self.sink
                .inc_counter("collector_errors_total", &labels, errors as f64);
        }
    }

    /// Returns the classified kind for a processed record, `None` for a
    /// duplicate or unknown-signature record.
    async fn process_log(&self, log: &RawLog) -> Result<Option<EventKind>, ProcessError> {
        let key = EventKey {
            tx_hash: log.transaction_hash,
            log_index: log.log_index,
        };
        if self.dedup.lock().contains(&key) {
            debug!(tx = %key.tx_hash, log_index = key.log_index, "duplicate event dropped");
            return Ok(None);
        }

        let kind = match log.topics.first().and_then(EventKind::from_topic) {
            Some(kind) => kind,
            None => {
                debug!(tx = %log.transaction_hash, "unclassified log skipped");
                return Ok(None);
            }
        };

        let timestamp = self.provider.block_timestamp(log.block_number).await?;
        let event = decode_log(log, timestamp)?;
        self.record(&event);
        self.dedup.lock().insert(key);
        Ok(Some(kind))
    }

    fn record(&self, event: &ChainEvent) {
        let kind = event.kind();
        self.sink
            .inc_counter(&format!("pool_{}_total", kind.as_str()), &[], 1.0);

        let details = match &event.payload {
            EventPayload::FlashLoan {
                initiator,
                asset,
                amount,
                premium,
            } => {
                self.sink
                    .inc_counter("pool_flashloan_volume_total", &[], wad_to_units(*amount));
                info!(
                    initiator = %initiator,
                    asset = %asset,
                    amount = wad_to_units(*amount),
                    "flashloan observed"
                );
                json!({
                    "initiator": initiator,
                    "asset": asset,
                    "amount": amount.to_string(),
                    "premium": premium.to_string(),
                })
            }
            EventPayload::LiquidationCall {
                collateral_asset,
                debt_asset,
                user,
                debt_to_cover,
                liquidated_collateral,
                liquidator,
            } => {
                self.sink.inc_counter(
                    "pool_liquidation_volume_total",
                    &[],
                    wad_to_units(*debt_to_cover),
                );
                warn!(
                    user = %user,
                    debt_asset = %debt_asset,
                    debt_to_cover = wad_to_units(*debt_to_cover),
                    "liquidation observed"
                );
                json!({
                    "collateral_asset": collateral_asset,
                    "debt_asset": debt_asset,
                    "user": user,
                    "debt_to_cover": debt_to_cover.to_string(),
                    "liquidated_collateral": liquidated_collateral.to_string(),
                    "liquidator": liquidator,
                })
            }
            EventPayload::Supply {
                reserve,
                user,
                amount,
                ..
            }
            | EventPayload::Withdraw {
                reserve,
                user,
                amount,
                ..
            }
            | EventPayload::Repay {
                reserve,
                user,
                amount,
                ..
            } => {
                debug!(kind = kind.as_str(), reserve = %reserve, user = %user, "pool event observed");
                json!({
                    "reserve": reserve,
                    "user": user,
                    "amount": amount.to_string(),
                })
            }
            EventPayload::Borrow {
                reserve,
                user,
                amount,
                borrow_rate,
                ..
            } => {
                debug!(reserve = %reserve, user = %user, "borrow observed");
                json!({
                    "reserve": reserve,
                    "user": user,
                    "amount": amount.to_string(),
                    "borrow_rate": borrow_rate.to_string(),
                })
            }
        };

        self.audit(
            kind.audit_action(),
            json!({
                "tx_hash": event.tx_hash,
                "log_index": event.log_index,
                "block": event.block_number,
                "timestamp": event.timestamp,
                "fields": details,
            }),
        );
    }

    fn record_stream_failure(&self, error: &ChainError) {
        warn!(error = %error, "event stream error");
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
    use bytes::Bytes;
    use ethers_core::types::{H256, U256};
    use lanevakt_chain::provider::EventSubscription;
    use lanevakt_core::reserve::{RawReserveState, ReserveToken};
    use lanevakt_core::time::VirtualClock;
    use lanevakt_telemetry::MetricsRecorder;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    /// Provider whose subscription is fed by the test.
    struct ScriptedProvider {
        feed: Mutex<Option<mpsc::Receiver<SubscriptionUpdate>>>,
    }

    #[async_trait]
    impl ChainProvider for ScriptedProvider {
        async fn current_height(&self) -> Result<u64, ChainError> {
            Ok(500)
        }

        async fn block_timestamp(&self, height: u64) -> Result<u64, ChainError> {
            Ok(1_700_000_000 + height * 12)
        }

        async fn list_reserves(&self) -> Result<Vec<ReserveToken>, ChainError> {
            Ok(Vec::new())
        }

        async fn reserve_state(&self, _asset: Address) -> Result<RawReserveState, ChainError> {
            Ok(RawReserveState::default())
        }

        async fn subscribe_events(
            &self,
            _contract: Address,
            _signatures: &[H256],
        ) -> Result<EventSubscription, ChainError> {
            let rx = self
                .feed
                .lock()
                .take()
                .ok_or(ChainError::SubscriptionClosed)?;
            let (cancel_tx, _cancel_rx) = oneshot::channel();
            Ok(EventSubscription::new(rx, cancel_tx))
        }
    }

    struct Fixture {
        collector: Arc<EventCollector>,
        feed: mpsc::Sender<SubscriptionUpdate>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let (tx, rx) = mpsc::channel(16);
        let provider = Arc::new(ScriptedProvider {
            feed: Mutex::new(Some(rx)),
        });
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        let sink: Arc<dyn MetricSink> = Arc::new(MetricsRecorder::new());
        let clock = Arc::new(VirtualClock::new(1_000));
        let collector = Arc::new(EventCollector::new(
            provider,
            Address::from_low_u64_be(0xF00),
            sink,
            audit,
            clock,
        ));
        collector.clone().start().await.unwrap();
        Fixture {
            collector,
            feed: tx,
            _dir: dir,
        }
    }

    fn topic_of(addr: Address) -> H256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(addr.as_bytes());
        H256(bytes)
    }

    fn word(value: U256) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        bytes
    }

    fn supply_log(tx: u64, log_index: u64) -> RawLog {
        let user = Address::from_low_u64_be(0x100);
        RawLog {
            address: Address::from_low_u64_be(0xF00),
            topics: vec![
                EventKind::Supply.topic(),
                topic_of(Address::from_low_u64_be(1)),
                topic_of(user),
                H256::zero(),
            ],
            data: Bytes::from(
                [topic_of(user).0, word(U256::exp10(18))].concat(),
            ),
            block_number: 501,
            transaction_hash: H256::from_low_u64_be(tx),
            log_index,
        }
    }

    async fn wait_for<F: Fn(&CollectorStatus) -> bool>(
        collector: &EventCollector,
        predicate: F,
    ) -> CollectorStatus {
        for _ in 0..200 {
            let status = collector.status();
            if predicate(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached; status: {:?}", collector.status());
    }

    #[tokio::test]
    async fn processes_a_batch_and_tracks_height() {
        let f = fixture().await;
        f.feed
            .send(SubscriptionUpdate::Batch(vec![
                supply_log(1, 0),
                supply_log(1, 1),
            ]))
            .await
            .unwrap();

        let status = wait_for(&f.collector, |s| s.records_processed == 2).await;
        assert_eq!(status.last_height, 501);
        assert_eq!(status.error_count, 0);
        assert!(status.healthy);

        f.collector.stop();
    }

    #[tokio::test]
    async fn duplicate_key_is_processed_once() {
        let f = fixture().await;
        f.feed
            .send(SubscriptionUpdate::Batch(vec![supply_log(7, 3)]))
            .await
            .unwrap();
        f.feed
            .send(SubscriptionUpdate::Batch(vec![supply_log(7, 3)]))
            .await
            .unwrap();

        wait_for(&f.collector, |s| s.records_processed == 1).await;
        // Give the second batch time to land; the count must not move.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = f.collector.status();
        assert_eq!(status.records_processed, 1);
        assert_eq!(status.error_count, 0);

        f.collector.stop();
    }

    #[tokio::test]
    async fn unknown_signature_is_skipped_without_error() {
        let f = fixture().await;
        let mut log = supply_log(9, 0);
        log.topics[0] = H256::repeat_byte(0xEE);
        f.feed
            .send(SubscriptionUpdate::Batch(vec![log, supply_log(9, 1)]))
            .await
            .unwrap();

        let status = wait_for(&f.collector, |s| s.records_processed == 1).await;
        assert_eq!(status.error_count, 0);

        f.collector.stop();
    }

    #[tokio::test]
    async fn malformed_log_counts_an_error() {
        let f = fixture().await;
        let mut log = supply_log(11, 0);
        log.data = Bytes::from(vec![0u8; 8]);
        f.feed
            .send(SubscriptionUpdate::Batch(vec![log]))
            .await
            .unwrap();

        let status = wait_for(&f.collector, |s| s.error_count == 1).await;
        assert_eq!(status.records_processed, 0);

        f.collector.stop();
    }

    #[tokio::test]
    async fn stream_error_flips_health() {
        let f = fixture().await;
        f.feed
            .send(SubscriptionUpdate::Error(ChainError::Transport(
                "ws dropped".into(),
            )))
            .await
            .unwrap();

        let status = wait_for(&f.collector, |s| s.error_count == 1).await;
        assert!(!status.healthy);

        // A later good batch restores health.
        f.feed
            .send(SubscriptionUpdate::Batch(vec![supply_log(13, 0)]))
            .await
            .unwrap();
        let status = wait_for(&f.collector, |s| s.records_processed == 1).await;
        assert!(status.healthy);

        f.collector.stop();
    }
}
