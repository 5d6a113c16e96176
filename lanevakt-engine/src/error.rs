use thiserror::Error;

use lanevakt_audit::AuditError;
use lanevakt_chain::provider::ChainError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("invalid pool address: {0}")]
    InvalidPoolAddress(String),
}
