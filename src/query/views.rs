//! Read views over live spore and cluster cells.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::types::{hex_bytes, Cell, OutPoint, Script, H256};
use crate::config::SporeConfig;
use crate::sdk::{ClusterData, SporeData};

/// A live spore cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporeView {
    pub id: H256,
    pub content_type: String,
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
    pub cluster_id: Option<H256>,
    pub owner: Script,
    pub out_point: OutPoint,
    pub capacity: u64,
    /// Capacity above the occupied minimum, usable to pay transfer fees.
    pub capacity_margin: u64,
}

impl SporeView {
    /// Build a view if `cell` is a live spore with well-formed data.
    pub fn from_cell(cell: &Cell, config: &SporeConfig) -> Option<Self> {
        let type_script = cell.output.type_script.as_ref()?;
        if !config.scripts.spore.matches(type_script) {
            return None;
        }
        let id = H256::from_slice(&type_script.args).ok()?;
        let data = SporeData::decode(&cell.data).ok()?;
        Some(Self {
            id,
            content_type: data.content_type,
            content: data.content,
            cluster_id: data.cluster_id,
            owner: cell.output.lock.clone(),
            out_point: cell.out_point?,
            capacity: cell.output.capacity,
            capacity_margin: cell.capacity_margin(),
        })
    }
}

/// A live cluster cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: H256,
    pub name: String,
    pub description: String,
    pub owner: Script,
    pub out_point: OutPoint,
    pub capacity: u64,
    /// Locked by anyone-can-pay: anyone may mint into it.
    pub public: bool,
}

impl ClusterView {
    pub fn from_cell(cell: &Cell, config: &SporeConfig) -> Option<Self> {
        let type_script = cell.output.type_script.as_ref()?;
        if !config.scripts.cluster.matches(type_script) {
            return None;
        }
        let data = ClusterData::decode(&cell.data).ok()?;
        Some(Self {
            id: H256::from_slice(&type_script.args).ok()?,
            name: data.name,
            description: data.description,
            owner: cell.output.lock.clone(),
            out_point: cell.out_point?,
            capacity: cell.output.capacity,
            public: config.scripts.anyone_can_pay.matches(&cell.output.lock),
        })
    }
}

/// Read side of the chain the query cache fetches from.
#[async_trait]
pub trait ReadModel: Send + Sync {
    async fn spores_by_lock(&self, lock: &Script) -> Vec<SporeView>;

    async fn spore(&self, id: &H256) -> Option<SporeView>;

    async fn cluster_spores(&self, cluster_id: &H256) -> Vec<SporeView>;

    async fn clusters_by_lock(&self, lock: &Script) -> Vec<ClusterView>;

    async fn cluster(&self, id: &H256) -> Option<ClusterView>;

    /// Clusters `lock` may mint into: its own plus every public one.
    async fn mintable_clusters(&self, lock: &Script) -> Vec<ClusterView>;

    /// Total capacity of plain cells held by `lock`.
    async fn balance(&self, lock: &Script) -> u64;
}
