//! Spore Demo orchestration core.
//!
//! Builds, signs and broadcasts spore and cluster transactions on a
//! cell-model chain, then invalidates cached views and notifies the user.

// Chain model
pub mod chain;
pub mod sdk;

// Orchestration
pub mod orchestrator;
pub mod query;
pub mod wallet;

// Reference chain
pub mod devnet;

// Cross-cutting concerns
pub mod config;
pub mod notify;
pub mod observability;

pub use config::SporeConfig;
pub use devnet::Devnet;
pub use orchestrator::{Orchestrator, TransactionBuilder};
