//! # lanevakt-chain
//!
//! The consumed chain-data interface: the [`ChainProvider`] trait, raw log
//! records as delivered by a node subscription, and a deterministic seeded
//! provider for running the full pipeline without an RPC endpoint.
//!
//! The RPC client library itself is an external collaborator; this crate
//! only defines the contract the collectors depend on.

pub mod provider;
pub mod sim;

pub use provider::{
    ChainError, ChainProvider, EventSubscription, RawLog, SubscriptionUpdate,
};
pub use sim::SimProvider;
