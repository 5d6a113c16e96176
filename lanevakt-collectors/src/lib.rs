//! Data collectors: the polling reserve-snapshot loop and the push-based
//! chain-event drain. Both publish through [`MetricSink`] and record
//! lifecycle transitions in the audit trail.
//!
//! [`MetricSink`]: lanevakt_telemetry::MetricSink

pub mod decode;
pub mod dedup;
pub mod events;
pub mod polling;

use serde::Serialize;

pub use decode::{decode_log, DecodeError};
pub use dedup::DedupTable;
pub use events::EventCollector;
pub use polling::PollingCollector;

/// Point-in-time health view of one collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    /// Highest block height observed so far.
    pub last_height: u64,
    /// Snapshots published (polling) or events processed (events).
    pub records_processed: u64,
    pub error_count: u64,
    /// Unix ms of the last successful cycle or batch.
    pub last_update_ms: u64,
    pub healthy: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CollectorState {
    pub last_height: u64,
    pub records_processed: u64,
    pub error_count: u64,
    pub last_update_ms: u64,
    pub healthy: bool,
}

impl CollectorState {
    pub(crate) fn status(&self) -> CollectorStatus {
        CollectorStatus {
            last_height: self.last_height,
            records_processed: self.records_processed,
            error_count: self.error_count,
            last_update_ms: self.last_update_ms,
            healthy: self.healthy,
        }
    }
}
