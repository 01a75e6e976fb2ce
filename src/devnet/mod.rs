//! In-memory reference chain.
//!
//! The devnet keeps a live-cell set and a transaction log behind a tokio
//! `RwLock`. It implements the asset SDK (cell collection and balancing), the
//! broadcast gateway (validation and state transition) and the read model,
//! so orchestration flows can run end to end without a node.
//!
//! # Data Flow
//! ```text
//! fund(lock) ──► live cells
//! AssetSdk::create_spore ──► balance.rs ──► TransactionSkeleton
//! BroadcastGateway::submit ──► verify.rs ──► live cells updated ──► (auto-commit) block
//! ```

mod balance;
mod sdk;
mod verify;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use ckb_types::prelude::*;

use crate::chain::{codec, hash};
use crate::chain::types::{Cell, CellOutput, OutPoint, Script, Transaction, H256};
use crate::config::{ScriptInfo, SporeConfig};
use crate::orchestrator::gateway::TxStatus;
use crate::query::views::{ClusterView, ReadModel, SporeView};

/// A transaction the devnet has accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TxRecord {
    status: TxStatus,
    transaction: Transaction,
}

#[derive(Debug, Default)]
struct ChainState {
    live: BTreeMap<OutPoint, Cell>,
    transactions: HashMap<H256, TxRecord>,
    pending: Vec<H256>,
    tip: u64,
    funding_nonce: u64,
}

/// On-disk form. Out points are not string keys, so cells travel as a list.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    tip: u64,
    funding_nonce: u64,
    cells: Vec<Cell>,
    transactions: HashMap<H256, TxRecord>,
    pending: Vec<H256>,
}

impl ChainState {
    fn next_block(&mut self) -> u64 {
        self.tip += 1;
        self.tip
    }

    fn commit_pending(&mut self) -> u64 {
        let block_number = self.next_block();
        for tx_hash in self.pending.drain(..) {
            if let Some(record) = self.transactions.get_mut(&tx_hash) {
                record.status = TxStatus::Committed { block_number };
            }
        }
        block_number
    }

    /// Plain cells of `locks` in out-point order.
    fn free_cells(&self, locks: &[Script]) -> Vec<Cell> {
        self.live
            .values()
            .filter(|cell| cell.is_plain() && locks.contains(&cell.output.lock))
            .cloned()
            .collect()
    }

    fn find_by_type_args<'a>(&'a self, code: &'a ScriptInfo, id: &'a H256) -> Option<&'a Cell> {
        self.live.values().find(|cell| {
            cell.output
                .type_script
                .as_ref()
                .is_some_and(|t| code.matches(t) && t.args == id.0)
        })
    }
}

/// In-memory chain shared by the SDK, broadcast and read sides.
#[derive(Debug, Clone)]
pub struct Devnet {
    config: Arc<SporeConfig>,
    state: Arc<RwLock<ChainState>>,
}

impl Devnet {
    pub fn new(config: Arc<SporeConfig>) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ChainState::default())),
        }
    }

    pub fn config(&self) -> &SporeConfig {
        &self.config
    }

    /// Create `cells` plain cells of `capacity` shannons each for `lock`.
    ///
    /// The funding record lands in a block of its own; pending transactions stay pending.
    pub async fn fund(&self, lock: &Script, cells: u32, capacity: u64) -> Vec<OutPoint> {
        let mut state = self.state.write().await;
        state.funding_nonce += 1;
        let tx_hash = H256(hash::blake2b_256_multi(&[
            b"devnet-funding".as_slice(),
            &state.funding_nonce.to_le_bytes(),
            codec::script(lock).as_slice(),
        ]));

        let outputs: Vec<CellOutput> = (0..cells)
            .map(|_| CellOutput { capacity, lock: lock.clone(), type_script: None })
            .collect();
        let mut out_points = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            let out_point = OutPoint::new(tx_hash, index as u32);
            state.live.insert(
                out_point,
                Cell { output: output.clone(), data: Vec::new(), out_point: Some(out_point) },
            );
            out_points.push(out_point);
        }

        let block_number = state.next_block();
        state.transactions.insert(
            tx_hash,
            TxRecord {
                status: TxStatus::Committed { block_number },
                transaction: Transaction {
                    version: 0,
                    cell_deps: Vec::new(),
                    inputs: Vec::new(),
                    outputs_data: vec![Vec::new(); outputs.len()],
                    outputs,
                    witnesses: Vec::new(),
                },
            },
        );

        tracing::info!(
            tx_hash = %tx_hash,
            cells = cells,
            capacity = capacity,
            block = block_number,
            "Funded lock"
        );
        out_points
    }

    /// Fund `lock` with the configured genesis allocation.
    pub async fn fund_genesis(&self, lock: &Script) -> Vec<OutPoint> {
        let devnet = &self.config.devnet;
        self.fund(lock, devnet.genesis_cells, devnet.genesis_cell_capacity).await
    }

    /// Commit every pending transaction in a new block.
    pub async fn mine_block(&self) -> u64 {
        let mut state = self.state.write().await;
        let committed = state.pending.len();
        let block_number = state.commit_pending();
        tracing::info!(block = block_number, committed = committed, "Mined block");
        block_number
    }

    pub async fn tip(&self) -> u64 {
        self.state.read().await.tip
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn live_cell(&self, out_point: &OutPoint) -> Option<Cell> {
        self.state.read().await.live.get(out_point).cloned()
    }

    pub async fn transaction(&self, tx_hash: &H256) -> Option<Transaction> {
        self.state
            .read()
            .await
            .transactions
            .get(tx_hash)
            .map(|record| record.transaction.clone())
    }

    async fn scan<T>(&self, view: impl Fn(&Cell) -> Option<T>) -> Vec<T> {
        self.state.read().await.live.values().filter_map(view).collect()
    }

    /// Load from file if it exists, otherwise start empty.
    pub fn load_from_file(path: &Path, config: Arc<SporeConfig>) -> std::io::Result<Self> {
        let mut devnet = Self::new(config);
        if path.exists() {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;

            let mut state = ChainState {
                tip: snapshot.tip,
                funding_nonce: snapshot.funding_nonce,
                transactions: snapshot.transactions,
                pending: snapshot.pending,
                ..ChainState::default()
            };
            for cell in snapshot.cells {
                if let Some(out_point) = cell.out_point {
                    state.live.insert(out_point, cell);
                }
            }
            tracing::info!(
                cells = state.live.len(),
                tip = state.tip,
                "Loaded devnet state from {}",
                path.display()
            );
            devnet.state = Arc::new(RwLock::new(state));
        }
        Ok(devnet)
    }

    pub async fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let state = self.state.read().await;
        let snapshot = Snapshot {
            tip: state.tip,
            funding_nonce: state.funding_nonce,
            cells: state.live.values().cloned().collect(),
            transactions: state.transactions.clone(),
            pending: state.pending.clone(),
        };
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &snapshot)?;
        tracing::info!(cells = snapshot.cells.len(), "Saved devnet state to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl ReadModel for Devnet {
    async fn spores_by_lock(&self, lock: &Script) -> Vec<SporeView> {
        self.scan(|cell| SporeView::from_cell(cell, &self.config).filter(|v| &v.owner == lock))
            .await
    }

    async fn spore(&self, id: &H256) -> Option<SporeView> {
        let state = self.state.read().await;
        state
            .find_by_type_args(&self.config.scripts.spore, id)
            .and_then(|cell| SporeView::from_cell(cell, &self.config))
    }

    async fn cluster_spores(&self, cluster_id: &H256) -> Vec<SporeView> {
        self.scan(|cell| {
            SporeView::from_cell(cell, &self.config).filter(|v| v.cluster_id.as_ref() == Some(cluster_id))
        })
        .await
    }

    async fn clusters_by_lock(&self, lock: &Script) -> Vec<ClusterView> {
        self.scan(|cell| ClusterView::from_cell(cell, &self.config).filter(|v| &v.owner == lock))
            .await
    }

    async fn cluster(&self, id: &H256) -> Option<ClusterView> {
        let state = self.state.read().await;
        state
            .find_by_type_args(&self.config.scripts.cluster, id)
            .and_then(|cell| ClusterView::from_cell(cell, &self.config))
    }

    async fn mintable_clusters(&self, lock: &Script) -> Vec<ClusterView> {
        self.scan(|cell| ClusterView::from_cell(cell, &self.config).filter(|v| v.public || &v.owner == lock))
            .await
    }

    async fn balance(&self, lock: &Script) -> u64 {
        self.state
            .read()
            .await
            .free_cells(std::slice::from_ref(lock))
            .iter()
            .fold(0u64, |total, cell| total.saturating_add(cell.output.capacity))
    }
}
