//! User intents. Built once from UI or CLI input, then only borrowed.

use crate::chain::types::{OutPoint, H256};

/// Extra payment layered onto a mint or cluster creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePayment {
    /// Shannons sent to `recipient`.
    pub amount: u64,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintIntent {
    pub content_type: String,
    pub content: Vec<u8>,
    pub cluster_id: Option<H256>,
    /// Address receiving the spore.
    pub owner: String,
    /// Funding addresses, the first receives change.
    pub from_infos: Vec<String>,
    /// Capacity kept in the spore beyond its occupied minimum.
    pub capacity_margin: u64,
    pub fee_payment: Option<FeePayment>,
}

impl MintIntent {
    /// Mint into `owner`'s own account with no margin.
    pub fn new(content_type: impl Into<String>, content: impl Into<Vec<u8>>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            content_type: content_type.into(),
            content: content.into(),
            cluster_id: None,
            from_infos: vec![owner.clone()],
            owner,
            capacity_margin: 0,
            fee_payment: None,
        }
    }

    pub fn with_cluster(mut self, cluster_id: H256) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    pub fn with_capacity_margin(mut self, margin: u64) -> Self {
        self.capacity_margin = margin;
        self
    }

    pub fn with_fee_payment(mut self, amount: u64, recipient: impl Into<String>) -> Self {
        self.fee_payment = Some(FeePayment { amount, recipient: recipient.into() });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub out_point: OutPoint,
    pub to: String,
    pub from_infos: Vec<String>,
    /// Pay the fee out of the spore's capacity margin.
    pub fee_from_margin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateClusterIntent {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub from_infos: Vec<String>,
    /// Lock the cluster with anyone-can-pay so anyone may mint into it.
    pub public: bool,
    pub fee_payment: Option<FeePayment>,
}

impl CreateClusterIntent {
    pub fn new(name: impl Into<String>, description: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            name: name.into(),
            description: description.into(),
            from_infos: vec![owner.clone()],
            owner,
            public: false,
            fee_payment: None,
        }
    }
}
