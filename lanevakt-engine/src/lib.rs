//! Monitor runtime: wires configuration, collectors, alerting, and the audit
//! trail into one start/stop unit.

pub mod error;
pub mod runtime;

pub use error::MonitorError;
pub use runtime::{Monitor, MonitorStatus};
