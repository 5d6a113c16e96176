//! # lanevakt-alerts
//!
//! Threshold-based alerting: one logical alert per `(metric, label-set)` key,
//! severity transitions driven by [`AlertManager::check_and_alert`], and a
//! rate-limited dispatch path guarded by an explicit circuit-breaker state
//! machine.

pub mod breaker;
pub mod manager;
pub mod notify;

pub use breaker::{Admission, BreakerState, DispatchGate};
pub use manager::{AlertManager, AlertStatus};
pub use notify::{NotifyChannel, NotifyError, TracingChannel};
