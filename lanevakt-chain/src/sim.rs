//! Deterministic simulated chain.
//!
//! Drives the full collector/alerting pipeline without an RPC endpoint: every
//! height read observes a fresh block, reserve figures are derived from the
//! seed and height, and the event subscription emits a small synthetic batch
//! on a fixed cadence. The same seed always produces the same sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ethers_core::types::{Address, H256, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use lanevakt_core::event::EventKind;
use lanevakt_core::reserve::{RawReserveState, ReserveToken};

use crate::provider::{
    ChainError, ChainProvider, EventSubscription, RawLog, SubscriptionUpdate,
};

const BLOCK_TIME_SECS: u64 = 12;

/// Seeded in-memory chain implementing [`ChainProvider`].
pub struct SimProvider {
    seed: u64,
    height: AtomicU64,
    base_timestamp: u64,
    reserves: Vec<ReserveToken>,
    batch_interval: Duration,
}

impl SimProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            height: AtomicU64::new(1_000),
            base_timestamp: 1_700_000_000,
            reserves: vec![
                reserve("WETH", 0x01),
                reserve("USDC", 0x02),
                reserve("DAI", 0x03),
            ],
            batch_interval: Duration::from_millis(250),
        }
    }

    /// Overrides the synthetic batch cadence (tests use a short interval).
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    fn rng_for(&self, height: u64, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ height.wrapping_mul(0x9e37_79b9) ^ salt)
    }
}

fn reserve(symbol: &str, low: u64) -> ReserveToken {
    ReserveToken {
        symbol: symbol.into(),
        address: Address::from_low_u64_be(low),
    }
}

fn topic_from_address(addr: Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_bytes());
    H256(bytes)
}

fn word_u256(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

fn word_address(addr: Address) -> [u8; 32] {
    topic_from_address(addr).0
}

#[async_trait]
impl ChainProvider for SimProvider {
    async fn current_height(&self) -> Result<u64, ChainError> {
        // A new block appears on every read; poll cycles never catch up.
        Ok(self.height.fetch_add(1, Ordering::AcqRel) + 1)
    }

    async fn block_timestamp(&self, height: u64) -> Result<u64, ChainError> {
        Ok(self.base_timestamp + height * BLOCK_TIME_SECS)
    }

    async fn list_reserves(&self) -> Result<Vec<ReserveToken>, ChainError> {
        Ok(self.reserves.clone())
    }

    async fn reserve_state(&self, asset: Address) -> Result<RawReserveState, ChainError> {
        let height = self.height.load(Ordering::Acquire);
        let mut rng = self.rng_for(height, asset.to_low_u64_be());

        let liquidity_tokens: u64 = rng.random_range(1_000..50_000);
        let utilization: u64 = rng.random_range(0..100);
        let total_a_token = U256::from(liquidity_tokens) * U256::exp10(18);
        let total_debt = total_a_token * U256::from(utilization) / U256::from(100u64);

        Ok(RawReserveState {
            total_a_token,
            total_stable_debt: total_debt / U256::from(4u64),
            total_variable_debt: total_debt - total_debt / U256::from(4u64),
            liquidity_rate: U256::exp10(25) * U256::from(rng.random_range(0..8u64)),
            variable_borrow_rate: U256::exp10(25) * U256::from(rng.random_range(1..12u64)),
            stable_borrow_rate: U256::exp10(25) * U256::from(rng.random_range(2..15u64)),
            last_update_timestamp: self.base_timestamp + height * BLOCK_TIME_SECS,
            ..Default::default()
        })
    }

    async fn subscribe_events(
        &self,
        contract: Address,
        signatures: &[H256],
    ) -> Result<EventSubscription, ChainError> {
        let (tx, rx) = mpsc::channel(64);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        let seed = self.seed;
        let signatures = signatures.to_vec();
        let start_height = self.height.load(Ordering::Acquire);
        let interval = self.batch_interval;

        tokio::spawn(async move {
            let mut nonce: u64 = 0;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        let batch = synth_batch(seed, contract, &signatures, start_height, &mut nonce);
                        if tx.send(SubscriptionUpdate::Batch(batch)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("simulated subscription terminated");
        });

        Ok(EventSubscription::new(rx, cancel_tx))
    }
}

fn synth_batch(
    seed: u64,
    contract: Address,
    signatures: &[H256],
    start_height: u64,
    nonce: &mut u64,
) -> Vec<RawLog> {
    // An empty filter matches nothing; nonce selection below divides by len.
    if signatures.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed ^ *nonce);
    let count = rng.random_range(1..=3usize);
    (0..count)
        .map(|i| {
            let log = synth_log(&mut rng, contract, signatures, start_height + *nonce, *nonce + i as u64);
            *nonce += 1;
            log
        })
        .collect()
}

fn synth_log(
    rng: &mut StdRng,
    contract: Address,
    signatures: &[H256],
    block_number: u64,
    nonce: u64,
) -> RawLog {
    let reserve_addr = Address::from_low_u64_be(rng.random_range(1..=3u64));
    let user = Address::from_low_u64_be(rng.random_range(0x100..0x1ff_u64));
    let amount = U256::from(rng.random_range(1..5_000u64)) * U256::exp10(18);

    let topic0 = signatures[(nonce as usize) % signatures.len()];
    let kind = EventKind::from_topic(&topic0).unwrap_or(EventKind::Supply);

    let (topics, data): (Vec<H256>, Vec<u8>) = match kind {
        EventKind::FlashLoan => (
            vec![topic0, topic_from_address(user), topic_from_address(reserve_addr), H256::zero()],
            [
                word_address(user),
                word_u256(amount),
                word_u256(U256::from(2u64)),
                word_u256(amount / U256::from(1_000u64)),
            ]
            .concat(),
        ),
        EventKind::LiquidationCall => (
            vec![
                topic0,
                topic_from_address(reserve_addr),
                topic_from_address(Address::from_low_u64_be(2)),
                topic_from_address(user),
            ],
            [
                word_u256(amount),
                word_u256(amount / U256::from(2u64)),
                word_address(Address::from_low_u64_be(0x999)),
                word_u256(U256::zero()),
            ]
            .concat(),
        ),
        EventKind::Supply | EventKind::Borrow => (
            vec![topic0, topic_from_address(reserve_addr), topic_from_address(user), H256::zero()],
            [
                word_address(user),
                word_u256(amount),
                word_u256(U256::from(2u64)),
                word_u256(U256::exp10(25)),
            ]
            .concat(),
        ),
        EventKind::Withdraw => (
            vec![
                topic0,
                topic_from_address(reserve_addr),
                topic_from_address(user),
                topic_from_address(user),
            ],
            word_u256(amount).to_vec(),
        ),
        EventKind::Repay => (
            vec![
                topic0,
                topic_from_address(reserve_addr),
                topic_from_address(user),
                topic_from_address(user),
            ],
            [word_u256(amount), word_u256(U256::zero())].concat(),
        ),
    };

    RawLog {
        address: contract,
        topics,
        data: Bytes::from(data),
        block_number,
        transaction_hash: H256::from_low_u64_be(0xdead_0000 + nonce),
        log_index: nonce % 8,
    }
}
