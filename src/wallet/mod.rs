//! Wallet connectors.
//!
//! A connector owns one lock, carries its own session and signs the input
//! groups it owns. There is no global wallet store; callers hold the
//! connector and pass the session where it is needed.

pub mod key;

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::skeleton::TransactionSkeleton;
use crate::chain::types::{Script, Transaction};

pub use key::{KeyConnector, PRIVATE_KEY_ENV_VAR};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid private key format: {0}")]
    InvalidKey(String),

    #[error("environment variable {0} not set")]
    MissingKey(&'static str),

    #[error("wallet not connected")]
    NotConnected,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no input in the transaction is owned by this wallet")]
    NothingToSign,
}

pub type WalletResult<T> = Result<T, WalletError>;

/// The connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub address: String,
    pub lock: Script,
}

/// One wallet backend.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend name, for logs.
    fn kind(&self) -> &'static str;

    fn connect(&self) -> WalletResult<WalletSession>;

    fn disconnect(&self);

    /// The active session, if connected.
    fn session(&self) -> Option<WalletSession>;

    fn lock(&self) -> Script;

    /// The anyone-can-pay lock derived from this wallet's lock.
    fn anyone_can_pay_lock(&self) -> Script;

    /// Whether this wallet can unlock cells guarded by `lock`.
    fn is_owned(&self, lock: &Script) -> bool;

    /// Fill the witnesses of every owned input group.
    async fn sign_transaction(&self, draft: TransactionSkeleton) -> WalletResult<Transaction>;
}
