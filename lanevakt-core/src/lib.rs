//! # lanevakt-core
//!
//! Domain types shared by every lanevakt component: reserve snapshots,
//! decoded pool events, alerts and thresholds, fixed-point unit conversion,
//! and the injectable clock used to keep time-dependent logic testable.

pub mod alert;
pub mod event;
pub mod reserve;
pub mod time;
pub mod units;

pub use alert::{Alert, AlertThreshold, Severity};
pub use event::{ChainEvent, EventKey, EventKind, EventPayload};
pub use reserve::{RawReserveState, ReserveSnapshot, ReserveToken};
pub use time::{Clock, SystemClock, VirtualClock};
