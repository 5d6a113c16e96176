//! Chain connection and collector scheduling configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Chain endpoint and polling parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ChainConfig {
    /// RPC endpoint URL.
    #[validate(url)]
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Lending pool contract address (events are observed here).
    #[validate(custom(function = validation::validate_address))]
    #[serde(default = "default_pool_address")]
    pub pool_address: String,

    /// Reserve snapshot interval (milliseconds).
    #[validate(range(min = 1_000, max = 600_000))]
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

fn default_rpc_url() -> String {
    "https://eth-sepolia.example.org/rpc".into()
}

fn default_pool_address() -> String {
    "0x6Ae43d3271ff6888e7Fc43Fd7321a503ff738951".into()
}

fn default_polling_interval_ms() -> u64 {
    30_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            pool_address: default_pool_address(),
            polling_interval_ms: default_polling_interval_ms(),
        }
    }
}
