//! Signing and broadcast gateway contracts.
//!
//! Both gateways are external collaborators: the signing gateway is the
//! active wallet connector, the broadcast gateway is the node (or devnet).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::hash;
use crate::chain::skeleton::TransactionSkeleton;
use crate::chain::types::{Transaction, H256};

/// A transaction with its witnesses filled in. Only broadcast looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: Transaction,
    tx_hash: H256,
}

impl SignedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        let tx_hash = hash::tx_hash(&transaction);
        Self { transaction, tx_hash }
    }

    pub fn tx_hash(&self) -> H256 {
        self.tx_hash
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("signing rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The node refused the transaction (fee too low, double spend, bad witness).
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("node unavailable: {0}")]
    Unavailable(String),
}

/// Transaction status as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted into the pool, not yet in a block.
    Pending,
    /// Included in a block.
    Committed { block_number: u64 },
    /// Dropped after acceptance.
    Rejected { reason: String },
    /// Never seen by the node.
    Unknown,
}

/// Turns a balanced draft into a signed transaction.
///
/// Takes the draft by value: once handed over it cannot be mutated by the builder.
#[async_trait]
pub trait SigningGateway: Send + Sync {
    async fn sign(&self, draft: TransactionSkeleton) -> Result<SignedTransaction, SigningError>;
}

#[async_trait]
pub trait BroadcastGateway: Send + Sync {
    /// Submit a signed transaction, returning its hash.
    async fn submit(&self, signed: SignedTransaction) -> Result<H256, BroadcastError>;

    async fn transaction_status(&self, tx_hash: &H256) -> Result<TxStatus, BroadcastError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_transaction_hash_ignores_witnesses() {
        let tx = TransactionSkeleton::new().to_transaction();
        let mut witnessed = tx.clone();
        witnessed.witnesses.push(vec![1, 2, 3]);
        assert_eq!(SignedTransaction::new(tx).tx_hash(), SignedTransaction::new(witnessed).tx_hash());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TxStatus::Committed { block_number: 7 }).unwrap();
        assert_eq!(json, r#"{"status":"committed","block_number":7}"#);
    }
}
