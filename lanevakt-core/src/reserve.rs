//! Reserve state as read from the pool data provider.

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::units::u256_to_f64;

/// One entry of the pool's reserve list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveToken {
    pub symbol: String,
    pub address: Address,
}

/// Raw reserve data tuple as returned by the chain, before any scaling.
///
/// Field layout mirrors the pool data provider's `getReserveData` return
/// value; amounts are wad-scaled, rates and indices ray-scaled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReserveState {
    pub unbacked: U256,
    pub accrued_to_treasury_scaled: U256,
    pub total_a_token: U256,
    pub total_stable_debt: U256,
    pub total_variable_debt: U256,
    pub liquidity_rate: U256,
    pub variable_borrow_rate: U256,
    pub stable_borrow_rate: U256,
    pub average_stable_borrow_rate: U256,
    pub liquidity_index: U256,
    pub variable_borrow_index: U256,
    pub last_update_timestamp: u64,
}

/// Immutable per-asset snapshot taken during one poll cycle.
///
/// A snapshot is never mutated; the next cycle publishes a fresh one for the
/// same asset.
#[derive(Debug, Clone, Serialize)]
pub struct ReserveSnapshot {
    pub asset: Address,
    pub symbol: String,
    /// Total supplied liquidity in base token units (wad).
    pub total_liquidity: U256,
    /// Stable plus variable debt in base token units (wad).
    pub total_debt: U256,
    /// `total_debt / total_liquidity` as a percentage; 0 when liquidity is 0.
    pub utilization_rate: f64,
    pub liquidity_rate: U256,
    pub variable_borrow_rate: U256,
    pub stable_borrow_rate: U256,
    pub last_update_timestamp: u64,
}

impl ReserveSnapshot {
    /// Builds a snapshot from the raw on-chain tuple.
    pub fn from_raw(token: &ReserveToken, raw: &RawReserveState) -> Self {
        let total_liquidity = raw.total_a_token;
        let total_debt = raw.total_stable_debt + raw.total_variable_debt;
        let utilization_rate = if total_liquidity.is_zero() {
            0.0
        } else {
            // Basis-point integer division first keeps the ratio exact for
            // values far beyond f64 range.
            u256_to_f64(total_debt * U256::from(10_000u64) / total_liquidity) / 100.0
        };

        Self {
            asset: token.address,
            symbol: token.symbol.clone(),
            total_liquidity,
            total_debt,
            utilization_rate,
            liquidity_rate: raw.liquidity_rate,
            variable_borrow_rate: raw.variable_borrow_rate,
            stable_borrow_rate: raw.stable_borrow_rate,
            last_update_timestamp: raw.last_update_timestamp,
        }
    }
}
