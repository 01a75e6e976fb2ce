//! Private-key connector: an omnilock account in Ethereum auth mode.
//!
//! # Security
//! - Private keys are loaded from the environment or passed in directly
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Connector, WalletError, WalletResult, WalletSession};
use crate::chain::{codec, hash};
use crate::chain::skeleton::TransactionSkeleton;
use crate::chain::types::{Script, Transaction};
use crate::config::SporeConfig;
use crate::orchestrator::builder::public_cluster_lock;
use crate::orchestrator::gateway::{SignedTransaction, SigningError, SigningGateway};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "SPORE_DEMO_PRIVATE_KEY";

/// Omnilock auth flag for Ethereum-style (EIP-191) signatures.
const ETHEREUM_AUTH_FLAG: u8 = 0x01;

/// Omnilock args: auth flag, 20-byte auth content, omni-lock flags.
fn omnilock_args(address: Address) -> Vec<u8> {
    let mut args = Vec::with_capacity(22);
    args.push(ETHEREUM_AUTH_FLAG);
    args.extend_from_slice(address.as_slice());
    args.push(0x00);
    args
}

/// Connector backed by a local secp256k1 key.
#[derive(Debug, Clone)]
pub struct KeyConnector {
    signer: PrivateKeySigner,
    config: Arc<SporeConfig>,
    lock: Script,
    connected: Arc<AtomicBool>,
}

impl KeyConnector {
    /// Create a connector from a hex-encoded private key (with or without 0x).
    pub fn from_private_key(private_key_hex: &str, config: Arc<SporeConfig>) -> WalletResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| WalletError::InvalidKey(format!("{}", e)))?;

        let lock = config.scripts.omnilock.script(omnilock_args(signer.address()));
        tracing::info!(
            eth_address = %signer.address(),
            address = %config.encode_address(&lock),
            "Key connector initialized"
        );

        Ok(Self {
            signer,
            config,
            lock,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Load the key from `SPORE_DEMO_PRIVATE_KEY`.
    pub fn from_env(config: Arc<SporeConfig>) -> WalletResult<Self> {
        let private_key =
            std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| WalletError::MissingKey(PRIVATE_KEY_ENV_VAR))?;
        Self::from_private_key(&private_key, config)
    }

    /// The Ethereum address behind the lock.
    pub fn eth_address(&self) -> Address {
        self.signer.address()
    }

    pub fn address(&self) -> String {
        self.config.encode_address(&self.lock)
    }
}

#[async_trait]
impl Connector for KeyConnector {
    fn kind(&self) -> &'static str {
        "private-key"
    }

    fn connect(&self) -> WalletResult<WalletSession> {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(address = %self.address(), "Wallet connected");
        Ok(WalletSession { address: self.address(), lock: self.lock.clone() })
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn session(&self) -> Option<WalletSession> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| WalletSession { address: self.address(), lock: self.lock.clone() })
    }

    fn lock(&self) -> Script {
        self.lock.clone()
    }

    fn anyone_can_pay_lock(&self) -> Script {
        public_cluster_lock(&self.config, &self.lock)
    }

    fn is_owned(&self, lock: &Script) -> bool {
        lock == &self.lock
    }

    async fn sign_transaction(&self, draft: TransactionSkeleton) -> WalletResult<Transaction> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(WalletError::NotConnected);
        }

        let placeholder = draft.to_transaction();
        let tx_hash = hash::tx_hash(&placeholder);
        let mut tx = placeholder.clone();
        let mut signed_groups = 0;

        for (lock, group) in draft.lock_groups() {
            if !self.is_owned(&lock) {
                continue;
            }
            let Some(&first) = group.first() else {
                continue;
            };
            let message = hash::sighash_all_message(&placeholder, &tx_hash, &group);
            let signature = self
                .signer
                .sign_message(&message)
                .await
                .map_err(|e| WalletError::Signing(e.to_string()))?;
            tx.witnesses[first] = codec::witness_args(Some(signature.as_bytes().as_slice()));
            signed_groups += 1;
        }

        if signed_groups == 0 {
            return Err(WalletError::NothingToSign);
        }
        tracing::debug!(tx_hash = %tx_hash, groups = signed_groups, "Transaction signed");
        Ok(tx)
    }
}

#[async_trait]
impl SigningGateway for KeyConnector {
    async fn sign(&self, draft: TransactionSkeleton) -> Result<SignedTransaction, SigningError> {
        match self.sign_transaction(draft).await {
            Ok(tx) => Ok(SignedTransaction::new(tx)),
            Err(WalletError::NotConnected) => Err(SigningError::NotConnected),
            Err(e) => Err(SigningError::Rejected(e.to_string())),
        }
    }
}
