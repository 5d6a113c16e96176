//! Dispatch rate limiter and circuit breaker.
//!
//! Modeled as an explicit state machine `{Closed, Open(since)}` driven only
//! by the dispatch path, with time injected by the caller so the logic is
//! testable without wall-clock sleeps.

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { since_ms: u64 },
}

/// Decision for one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Within the rate cap; dispatch normally.
    Deliver,
    /// Breaker is open; drop the alert, dispatch nothing.
    Drop { cooldown_remaining_ms: u64 },
    /// The cap was just reached; breaker is now open and exactly one
    /// synthetic breaker notice should be dispatched instead of the alert.
    Tripped,
}

/// Rolling-window dispatch gate.
pub struct DispatchGate {
    state: BreakerState,
    window_count: u32,
    last_dispatch_ms: u64,
    max_per_window: u32,
    window_ms: u64,
    cooldown_ms: u64,
}

impl DispatchGate {
    pub fn new(max_per_window: u32, window_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            state: BreakerState::Closed,
            window_count: 0,
            last_dispatch_ms: 0,
            max_per_window,
            window_ms,
            cooldown_ms,
        }
    }

    /// Admits or rejects one dispatch at time `now_ms`.
    pub fn admit(&mut self, now_ms: u64) -> Admission {
        if let BreakerState::Open { since_ms } = self.state {
            let elapsed = now_ms.saturating_sub(since_ms);
            if elapsed < self.cooldown_ms {
                return Admission::Drop {
                    cooldown_remaining_ms: self.cooldown_ms - elapsed,
                };
            }
            // Cooldown elapsed: close and reset, then treat this dispatch
            // normally.
            self.state = BreakerState::Closed;
            self.window_count = 0;
        }

        if now_ms.saturating_sub(self.last_dispatch_ms) > self.window_ms {
            self.window_count = 0;
        }

        if self.window_count >= self.max_per_window {
            self.state = BreakerState::Open { since_ms: now_ms };
            return Admission::Tripped;
        }

        self.window_count += 1;
        self.last_dispatch_ms = now_ms;
        Admission::Deliver
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open { .. })
    }

    pub fn dispatches_in_window(&self) -> u32 {
        self.window_count
    }
}
