//! Clock abstraction for all time-dependent logic.
//!
//! The alert dispatch gate and collector state keep their timing behavior
//! unit-testable by reading time through [`Clock`] instead of the wall clock
//! directly. Production wiring uses [`SystemClock`]; tests drive a
//! [`VirtualClock`] forward explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond-resolution time source.
pub trait Clock: Send + Sync {
    /// Current time as Unix milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock that advances only when told to.
#[derive(Clone)]
pub struct VirtualClock {
    offset: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Creates a new virtual clock starting at `seed` milliseconds.
    pub fn new(seed: u64) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(seed)),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    #[inline]
    pub fn advance(&self, ms: u64) {
        self.offset.fetch_add(ms, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }
}
