//! Decoded pool events and their identity keys.
//!
//! Events form a closed tagged union: one payload shape per event type,
//! selected by topic-signature lookup into a fixed table. Unknown signatures
//! are simply not in the table, which is how forward compatibility with new
//! pool versions falls out.

use ethers_core::types::{Address, H256, U256};
use once_cell::sync::Lazy;
use serde::Serialize;

const FLASH_LOAN_TOPIC: &str =
    "0x631042c832b07452973831137f2d73e395028b44b250dedc5abb0ee766e168ac";
const LIQUIDATION_TOPIC: &str =
    "0xe413a321e8681d831f4dbccbca790d2952b56f977908e45be37335533e005286";
const SUPPLY_TOPIC: &str = "0x2b627736bca15cd5381dcf80b0bf11fd197d01a037c52b927a881a10fb73ba61";
const BORROW_TOPIC: &str = "0xb3d084820fb1a9decffb176436bd02558d15fac9b0ddfed8c465bc7359d7dce0";
const WITHDRAW_TOPIC: &str = "0x3115d1449a7b732c986cba18244e897a450f61e1bb8d589cd2e69e6c8924f9f7";
const REPAY_TOPIC: &str = "0xa534c8dbe71f871f9f3530e97a74601fea17b426cae02e1c5aee42c96c784051";

static SIGNATURES: Lazy<Vec<(H256, EventKind)>> = Lazy::new(|| {
    [
        (FLASH_LOAN_TOPIC, EventKind::FlashLoan),
        (LIQUIDATION_TOPIC, EventKind::LiquidationCall),
        (SUPPLY_TOPIC, EventKind::Supply),
        (BORROW_TOPIC, EventKind::Borrow),
        (WITHDRAW_TOPIC, EventKind::Withdraw),
        (REPAY_TOPIC, EventKind::Repay),
    ]
    .into_iter()
    .map(|(topic, kind)| (topic.parse().expect("static topic constant"), kind))
    .collect()
});

/// The fixed set of pool event types this system observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    FlashLoan,
    LiquidationCall,
    Supply,
    Borrow,
    Withdraw,
    Repay,
}

impl EventKind {
    /// Classifies a log's first topic against the signature table.
    pub fn from_topic(topic: &H256) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, kind)| *kind)
    }

    /// The keccak topic signature for this event type.
    pub fn topic(self) -> H256 {
        SIGNATURES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(topic, _)| *topic)
            .unwrap_or_default()
    }

    /// All known topic signatures, in table order.
    pub fn all_topics() -> Vec<H256> {
        SIGNATURES.iter().map(|(topic, _)| *topic).collect()
    }

    /// Audit-trail action tag for this event type.
    pub fn audit_action(self) -> &'static str {
        match self {
            EventKind::FlashLoan => "EVENT_FLASHLOAN",
            EventKind::LiquidationCall => "EVENT_LIQUIDATION",
            EventKind::Supply => "EVENT_SUPPLY",
            EventKind::Borrow => "EVENT_BORROW",
            EventKind::Withdraw => "EVENT_WITHDRAW",
            EventKind::Repay => "EVENT_REPAY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FlashLoan => "flashloan",
            EventKind::LiquidationCall => "liquidation",
            EventKind::Supply => "supply",
            EventKind::Borrow => "borrow",
            EventKind::Withdraw => "withdraw",
            EventKind::Repay => "repay",
        }
    }
}

/// Globally unique identity of one on-chain log record.
///
/// The pair is the sole deduplication criterion: a key observed twice is
/// discarded unconditionally, content is never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub tx_hash: H256,
    pub log_index: u64,
}

/// One decoded pool event.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub tx_hash: H256,
    pub log_index: u64,
    pub block_number: u64,
    /// Block timestamp in Unix seconds.
    pub timestamp: u64,
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::FlashLoan { .. } => EventKind::FlashLoan,
            EventPayload::LiquidationCall { .. } => EventKind::LiquidationCall,
            EventPayload::Supply { .. } => EventKind::Supply,
            EventPayload::Borrow { .. } => EventKind::Borrow,
            EventPayload::Withdraw { .. } => EventKind::Withdraw,
            EventPayload::Repay { .. } => EventKind::Repay,
        }
    }
}

/// Variant-specific event fields, decoded minimally for metrics and audit.
#[derive(Debug, Clone)]
pub enum EventPayload {
    FlashLoan {
        initiator: Address,
        asset: Address,
        amount: U256,
        premium: U256,
    },
    LiquidationCall {
        collateral_asset: Address,
        debt_asset: Address,
        user: Address,
        debt_to_cover: U256,
        liquidated_collateral: U256,
        liquidator: Address,
    },
    Supply {
        reserve: Address,
        user: Address,
        on_behalf_of: Address,
        amount: U256,
    },
    Borrow {
        reserve: Address,
        user: Address,
        on_behalf_of: Address,
        amount: U256,
        borrow_rate: U256,
    },
    Withdraw {
        reserve: Address,
        user: Address,
        to: Address,
        amount: U256,
    },
    Repay {
        reserve: Address,
        user: Address,
        repayer: Address,
        amount: U256,
    },
}
