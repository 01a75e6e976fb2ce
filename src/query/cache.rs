//! Cached read views and their invalidation.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::views::ReadModel;
use crate::chain::address::AddressError;
use crate::chain::types::{Script, H256};
use crate::config::SporeConfig;
use crate::observability::metrics;

/// Identity of one cached view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    SporesByAddress(String),
    Spore(H256),
    ClusterSpores(H256),
    ClustersByAddress(String),
    Cluster(H256),
    MintableClusters(String),
}

/// What a view lists, for bulk invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Spore,
    Cluster,
}

impl QueryKey {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryKey::SporesByAddress(_) | QueryKey::Spore(_) | QueryKey::ClusterSpores(_) => QueryKind::Spore,
            QueryKey::ClustersByAddress(_) | QueryKey::Cluster(_) | QueryKey::MintableClusters(_) => {
                QueryKind::Cluster
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("failed to serialize view: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What the orchestrator needs from the cache after a mutation.
pub trait QueryInvalidator: Send + Sync {
    /// Drop one view. Returns whether it was cached.
    fn invalidate(&self, key: &QueryKey) -> bool;

    /// Drop every view of `kind`. Returns how many were cached.
    fn invalidate_kind(&self, kind: QueryKind) -> usize;
}

/// A thread-safe cache of read views.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<DashMap<QueryKey, Value>>,
    config: Arc<SporeConfig>,
}

impl QueryCache {
    pub fn new(config: Arc<SporeConfig>) -> Self {
        Self { entries: Arc::new(DashMap::new()), config }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lock_of(&self, address: &str) -> Result<Script, QueryError> {
        self.config.parse_address(address).map_err(|source| QueryError::InvalidAddress {
            address: address.to_string(),
            source,
        })
    }

    /// Return the cached view, or load it from `model` and cache it.
    pub async fn fetch(&self, key: &QueryKey, model: &dyn ReadModel) -> Result<Value, QueryError> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = match key {
            QueryKey::SporesByAddress(address) => serde_json::to_value(model.spores_by_lock(&self.lock_of(address)?).await)?,
            QueryKey::Spore(id) => serde_json::to_value(model.spore(id).await)?,
            QueryKey::ClusterSpores(id) => serde_json::to_value(model.cluster_spores(id).await)?,
            QueryKey::ClustersByAddress(address) => {
                serde_json::to_value(model.clusters_by_lock(&self.lock_of(address)?).await)?
            }
            QueryKey::Cluster(id) => serde_json::to_value(model.cluster(id).await)?,
            QueryKey::MintableClusters(address) => {
                serde_json::to_value(model.mintable_clusters(&self.lock_of(address)?).await)?
            }
        };

        tracing::debug!(key = ?key, "Query cache miss, view loaded");
        self.entries.insert(key.clone(), value.clone());
        Ok(value)
    }
}

impl QueryInvalidator for QueryCache {
    fn invalidate(&self, key: &QueryKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            metrics::record_invalidations(1);
        }
        removed
    }

    fn invalidate_kind(&self, kind: QueryKind) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.kind() != kind);
        let removed = before.saturating_sub(self.entries.len());
        metrics::record_invalidations(removed);
        removed
    }
}
