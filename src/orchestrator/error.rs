//! Orchestration error taxonomy.

use thiserror::Error;

use super::gateway::{BroadcastError, SigningError};
use crate::chain::address::AddressError;
use crate::chain::types::H256;
use crate::sdk::SdkError;

/// Errors surfaced to the user by an orchestrated action. None are retried.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("insufficient funds: need {needed} shannons, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("signing rejected: {0}")]
    SigningRejected(String),

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("transaction {tx_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: H256, timeout_secs: u64 },

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("another action on {0} is already in flight")]
    AlreadyInFlight(String),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl OrchestrationError {
    pub fn invalid_address(address: &str, source: AddressError) -> Self {
        OrchestrationError::InvalidAddress { address: address.to_string(), reason: source.to_string() }
    }

    /// Soft errors are reported as warnings rather than failures.
    pub fn is_soft(&self) -> bool {
        matches!(self, OrchestrationError::ConfirmationTimeout { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::InvalidAddress { .. } => "invalid_address",
            OrchestrationError::InsufficientFunds { .. } => "insufficient_funds",
            OrchestrationError::AssetNotFound(_) => "asset_not_found",
            OrchestrationError::SigningRejected(_) => "signing_rejected",
            OrchestrationError::BroadcastRejected(_) => "broadcast_rejected",
            OrchestrationError::ConfirmationTimeout { .. } => "confirmation_timeout",
            OrchestrationError::InvalidIntent(_) => "invalid_intent",
            OrchestrationError::AlreadyInFlight(_) => "already_in_flight",
        }
    }
}

impl From<SdkError> for OrchestrationError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::InvalidAddress { address, source } => OrchestrationError::invalid_address(&address, source),
            SdkError::InsufficientCapacity { needed, available } => {
                OrchestrationError::InsufficientFunds { needed, available }
            }
            SdkError::SporeNotFound(out_point) => OrchestrationError::AssetNotFound(format!("spore at {}", out_point)),
            SdkError::ClusterNotFound(id) => OrchestrationError::AssetNotFound(format!("cluster {}", id)),
            other => OrchestrationError::InvalidIntent(other.to_string()),
        }
    }
}

impl From<SigningError> for OrchestrationError {
    fn from(err: SigningError) -> Self {
        OrchestrationError::SigningRejected(err.to_string())
    }
}

impl From<BroadcastError> for OrchestrationError {
    fn from(err: BroadcastError) -> Self {
        match err {
            BroadcastError::Rejected(reason) => OrchestrationError::BroadcastRejected(reason),
            BroadcastError::Unavailable(reason) => OrchestrationError::BroadcastRejected(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::OutPoint;

    #[test]
    fn test_sdk_error_mapping() {
        let err: OrchestrationError = SdkError::SporeNotFound(OutPoint::default()).into();
        assert!(matches!(err, OrchestrationError::AssetNotFound(_)));

        let err: OrchestrationError = SdkError::InsufficientCapacity { needed: 2, available: 1 }.into();
        assert!(matches!(err, OrchestrationError::InsufficientFunds { needed: 2, available: 1 }));

        let err: OrchestrationError = SdkError::NoFundingAccounts.into();
        assert_eq!(err.kind(), "invalid_intent");

        let err: OrchestrationError = SdkError::CapacityOverflow("spore output").into();
        assert_eq!(err.kind(), "invalid_intent");
    }

    #[test]
    fn test_only_timeout_is_soft() {
        let timeout = OrchestrationError::ConfirmationTimeout { tx_hash: H256::ZERO, timeout_secs: 1 };
        assert!(timeout.is_soft());
        assert!(!OrchestrationError::BroadcastRejected("x".into()).is_soft());
    }
}
