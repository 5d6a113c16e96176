//! Chain data source contract.

use async_trait::async_trait;
use bytes::Bytes;
use ethers_core::types::{Address, H256};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use lanevakt_core::reserve::{RawReserveState, ReserveToken};

/// Chain access error conditions.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transient RPC/transport failure; retried on the next scheduled cycle.
    #[error("chain transport error: {0}")]
    Transport(String),

    /// The requested block is not known to the node.
    #[error("unknown block height {0}")]
    UnknownBlock(u64),

    /// The event subscription was closed by the provider.
    #[error("event subscription closed")]
    SubscriptionClosed,
}

/// One raw log record as delivered by the node, before classification.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

/// Push delivery from an event subscription: either a batch of raw logs or
/// an in-band transport error.
#[derive(Debug)]
pub enum SubscriptionUpdate {
    Batch(Vec<RawLog>),
    Error(ChainError),
}

/// Handle to an active event subscription.
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// cancels delivery promptly; no batch is pushed after cancellation.
pub struct EventSubscription {
    pub updates: mpsc::Receiver<SubscriptionUpdate>,
    cancel: Option<oneshot::Sender<()>>,
}

impl EventSubscription {
    pub fn new(updates: mpsc::Receiver<SubscriptionUpdate>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            updates,
            cancel: Some(cancel),
        }
    }

    /// Cancels the subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        // Dropping the sender resolves the provider-side cancellation future.
        self.cancel.take();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Read access to a lending-protocol deployment.
///
/// Implementations wrap an RPC transport; per-call timeouts are whatever the
/// transport enforces.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current chain height.
    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Timestamp of the block at `height`, Unix seconds.
    async fn block_timestamp(&self, height: u64) -> Result<u64, ChainError>;

    /// The pool's reserve list.
    async fn list_reserves(&self) -> Result<Vec<ReserveToken>, ChainError>;

    /// Raw reserve data tuple for one asset.
    async fn reserve_state(&self, asset: Address) -> Result<RawReserveState, ChainError>;

    /// Subscribes to logs emitted by `contract` matching any of `signatures`.
    /// Batches arrive in chain order on the returned handle.
    async fn subscribe_events(
        &self,
        contract: Address,
        signatures: &[H256],
    ) -> Result<EventSubscription, ChainError>;
}
