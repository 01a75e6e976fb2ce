//! Asset SDK contract.
//!
//! The transaction builder never selects cells or balances capacity itself;
//! it sequences calls to an [`AssetSdk`]. Each construction routine returns
//! the skeleton plus the index of the asset output it created or moved, and
//! the balance routines mutate a skeleton in place.
//!
//! # Data Flow
//! ```text
//! create_spore / create_cluster / transfer_spore
//!     → BuiltSkeleton { skeleton, output_index }
//!     → transfer(&mut skeleton, ..)           (optional fee payment)
//!     → pay_fee_by_fee_rate(&mut skeleton, ..)
//! ```

pub mod data;

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::address::AddressError;
use crate::chain::codec::MoleculeError;
use crate::chain::skeleton::TransactionSkeleton;
use crate::chain::types::{OutPoint, Script, H256};
use crate::config::SporeConfig;

pub use data::{ClusterData, ContentType, SporeData};

/// Errors raised by SDK construction routines.
#[derive(Debug, Error)]
pub enum SdkError {
    /// An address could not be resolved under the active network.
    #[error("invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    /// The funding accounts cannot cover outputs plus fee.
    #[error("insufficient capacity: need {needed} shannons, have {available}")]
    InsufficientCapacity { needed: u64, available: u64 },

    /// An output would hold less than its occupied capacity.
    #[error("output capacity {capacity} is below the minimum {minimum} shannons")]
    BelowMinimum { capacity: u64, minimum: u64 },

    /// No live spore cell at the out point.
    #[error("no live spore cell at {0}")]
    SporeNotFound(OutPoint),

    /// No live cluster with this id.
    #[error("cluster {0} not found")]
    ClusterNotFound(H256),

    /// The cluster exists but the minter may not mint into it.
    #[error("cluster {0} is not owned by the minter and is not public")]
    ClusterNotMintable(H256),

    #[error("invalid content type '{0}'")]
    InvalidContentType(String),

    #[error("funding account list is empty")]
    NoFundingAccounts,

    #[error("malformed cell data: {0}")]
    Data(#[from] MoleculeError),

    /// Capacity arithmetic left the `u64` range.
    #[error("capacity overflow while computing {0}")]
    CapacityOverflow(&'static str),

    #[error("cell {0} was added to the transaction twice")]
    DuplicateInput(OutPoint),
}

pub type SdkResult<T> = Result<T, SdkError>;

/// A freshly constructed skeleton and the index of its asset output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSkeleton {
    pub skeleton: TransactionSkeleton,
    pub output_index: usize,
}

pub struct CreateSporeParams<'a> {
    pub data: SporeData,
    /// Funding addresses; the first also receives change.
    pub from_infos: Vec<String>,
    pub to_lock: Script,
    pub config: &'a SporeConfig,
    /// Capacity kept in the spore cell beyond its occupied minimum.
    pub capacity_margin: u64,
}

pub struct TransferSporeParams<'a> {
    pub out_point: OutPoint,
    pub from_infos: Vec<String>,
    pub to_lock: Script,
    pub config: &'a SporeConfig,
    /// Pay the fee out of the spore's capacity margin instead of the funding accounts.
    pub use_capacity_margin_as_fee: bool,
}

pub struct CreateClusterParams<'a> {
    pub data: ClusterData,
    pub from_infos: Vec<String>,
    pub to_lock: Script,
    pub config: &'a SporeConfig,
}

/// Construction routines of the asset SDK.
#[async_trait]
pub trait AssetSdk: Send + Sync {
    async fn create_spore(&self, params: CreateSporeParams<'_>) -> SdkResult<BuiltSkeleton>;

    async fn transfer_spore(&self, params: TransferSporeParams<'_>) -> SdkResult<BuiltSkeleton>;

    async fn create_cluster(&self, params: CreateClusterParams<'_>) -> SdkResult<BuiltSkeleton>;

    /// Add an output paying `amount` shannons to `to`, funded by `from_infos`.
    /// The fee already carried by the skeleton is preserved.
    async fn transfer(
        &self,
        skeleton: &mut TransactionSkeleton,
        from_infos: &[String],
        to: &str,
        amount: u64,
        config: &SporeConfig,
    ) -> SdkResult<()>;

    /// Rebalance so the skeleton pays exactly the fee its size requires at `fee_rate`.
    async fn pay_fee_by_fee_rate(
        &self,
        skeleton: &mut TransactionSkeleton,
        from_infos: &[String],
        fee_rate: u64,
        config: &SporeConfig,
    ) -> SdkResult<()>;
}

/// Resolve every funding address, keeping order.
pub fn resolve_from_infos(from_infos: &[String], config: &SporeConfig) -> SdkResult<Vec<Script>> {
    if from_infos.is_empty() {
        return Err(SdkError::NoFundingAccounts);
    }
    from_infos
        .iter()
        .map(|address| {
            config.parse_address(address).map_err(|source| SdkError::InvalidAddress {
                address: address.clone(),
                source,
            })
        })
        .collect()
}
