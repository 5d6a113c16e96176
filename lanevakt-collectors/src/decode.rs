//! Raw log decoding into [`ChainEvent`]s.
//!
//! Topic and data layouts follow the pool contract ABI: indexed parameters
//! arrive as topics 1..=3, the rest packed as 32-byte words in the data
//! field. Only the fields the metrics and audit trail need are pulled out.

use ethers_core::types::{Address, H256, U256};
use thiserror::Error;

use lanevakt_chain::provider::RawLog;
use lanevakt_core::event::{ChainEvent, EventKind, EventPayload};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log carries no topics")]
    NoTopics,

    #[error("unknown event signature {0:#x}")]
    UnknownSignature(H256),

    #[error("{kind:?} log has {actual} topics, needs {expected}")]
    MissingTopics {
        kind: EventKind,
        expected: usize,
        actual: usize,
    },

    #[error("{kind:?} log data is {actual} bytes, needs {expected}")]
    ShortData {
        kind: EventKind,
        expected: usize,
        actual: usize,
    },
}

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.0[12..])
}

fn data_word(data: &[u8], index: usize) -> U256 {
    U256::from_big_endian(&data[index * 32..(index + 1) * 32])
}

fn data_address(data: &[u8], index: usize) -> Address {
    Address::from_slice(&data[index * 32 + 12..(index + 1) * 32])
}

fn require(
    kind: EventKind,
    log: &RawLog,
    topics: usize,
    data_words: usize,
) -> Result<(), DecodeError> {
    if log.topics.len() < topics {
        return Err(DecodeError::MissingTopics {
            kind,
            expected: topics,
            actual: log.topics.len(),
        });
    }
    if log.data.len() < data_words * 32 {
        return Err(DecodeError::ShortData {
            kind,
            expected: data_words * 32,
            actual: log.data.len(),
        });
    }
    Ok(())
}

/// Decodes one raw log into a typed event, stamping it with the containing
/// block's timestamp (Unix seconds).
pub fn decode_log(log: &RawLog, timestamp: u64) -> Result<ChainEvent, DecodeError> {
    let topic0 = log.topics.first().ok_or(DecodeError::NoTopics)?;
    let kind = EventKind::from_topic(topic0).ok_or(DecodeError::UnknownSignature(*topic0))?;
    let data = &log.data;

    let payload = match kind {
        EventKind::FlashLoan => {
            require(kind, log, 3, 4)?;
            EventPayload::FlashLoan {
                initiator: data_address(data, 0),
                asset: topic_address(&log.topics[2]),
                amount: data_word(data, 1),
                premium: data_word(data, 3),
            }
        }
        EventKind::LiquidationCall => {
            require(kind, log, 4, 3)?;
            EventPayload::LiquidationCall {
                collateral_asset: topic_address(&log.topics[1]),
                debt_asset: topic_address(&log.topics[2]),
                user: topic_address(&log.topics[3]),
                debt_to_cover: data_word(data, 0),
                liquidated_collateral: data_word(data, 1),
                liquidator: data_address(data, 2),
            }
        }
        EventKind::Supply => {
            require(kind, log, 3, 2)?;
            EventPayload::Supply {
                reserve: topic_address(&log.topics[1]),
                user: data_address(data, 0),
                on_behalf_of: topic_address(&log.topics[2]),
                amount: data_word(data, 1),
            }
        }
        EventKind::Borrow => {
            require(kind, log, 3, 4)?;
            EventPayload::Borrow {
                reserve: topic_address(&log.topics[1]),
                user: data_address(data, 0),
                on_behalf_of: topic_address(&log.topics[2]),
                amount: data_word(data, 1),
                borrow_rate: data_word(data, 3),
            }
        }
        EventKind::Withdraw => {
            require(kind, log, 4, 1)?;
            EventPayload::Withdraw {
                reserve: topic_address(&log.topics[1]),
                user: topic_address(&log.topics[2]),
                to: topic_address(&log.topics[3]),
                amount: data_word(data, 0),
            }
        }
        EventKind::Repay => {
            require(kind, log, 4, 1)?;
            EventPayload::Repay {
                reserve: topic_address(&log.topics[1]),
                user: topic_address(&log.topics[2]),
                repayer: topic_address(&log.topics[3]),
                amount: data_word(data, 0),
            }
        }
    };

    Ok(ChainEvent {
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        block_number: log.block_number,
        timestamp,
        payload,
    })
}
