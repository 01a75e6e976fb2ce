//! Action sequencing: build → sign → submit → (confirm) → invalidate → notify.
//!
//! # Responsibilities
//! - Refuse a second concurrent action on the same intent key
//! - Read asset ids from the draft before it is handed to the signer
//! - Await confirmation under a timeout when configured
//! - Invalidate the cached views the action touched
//! - Turn every outcome into a notice

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout};
use tracing::Instrument;
use uuid::Uuid;

use super::builder::{BuiltDraft, TransactionBuilder};
use super::error::{OrchestrationError, OrchestrationResult};
use super::gateway::{BroadcastGateway, SigningGateway, TxStatus};
use super::intent::{CreateClusterIntent, MintIntent, TransferIntent};
use crate::chain::hash;
use crate::chain::types::{encode_hex, OutPoint, H256};
use crate::config::ConfirmationConfig;
use crate::notify::{Notice, Notifier};
use crate::observability::metrics;
use crate::observability::tracing::action_span;
use crate::query::{QueryInvalidator, QueryKey, QueryKind};
use crate::sdk::SporeData;

/// Outcome of the confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Confirmation {
    /// Not awaited.
    Skipped,
    Committed { block_number: u64 },
    /// Still unconfirmed when the timeout elapsed. The transaction was submitted.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintReceipt {
    pub tx_hash: H256,
    pub spore_id: H256,
    pub out_point: OutPoint,
    pub confirmation: Confirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub tx_hash: H256,
    pub spore_id: H256,
    pub out_point: OutPoint,
    pub confirmation: Confirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterReceipt {
    pub tx_hash: H256,
    pub cluster_id: H256,
    pub out_point: OutPoint,
    pub confirmation: Confirmation,
}

/// Removes the in-flight entry when the action ends, however it ends.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, Uuid>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Submitted transaction plus its confirmation outcome.
struct Submitted {
    tx_hash: H256,
    confirmation: Confirmation,
}

pub struct Orchestrator {
    builder: TransactionBuilder,
    signer: Arc<dyn SigningGateway>,
    broadcaster: Arc<dyn BroadcastGateway>,
    cache: Arc<dyn QueryInvalidator>,
    notifier: Arc<dyn Notifier>,
    confirmation: ConfirmationConfig,
    in_flight: DashMap<String, Uuid>,
}

impl Orchestrator {
    pub fn new(
        builder: TransactionBuilder,
        signer: Arc<dyn SigningGateway>,
        broadcaster: Arc<dyn BroadcastGateway>,
        cache: Arc<dyn QueryInvalidator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let confirmation = builder.config().confirmation.clone();
        Self {
            builder,
            signer,
            broadcaster,
            cache,
            notifier,
            confirmation,
            in_flight: DashMap::new(),
        }
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationConfig) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    fn acquire(&self, key: String, action_id: Uuid) -> OrchestrationResult<InFlightGuard<'_>> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => Err(OrchestrationError::AlreadyInFlight(key)),
            Entry::Vacant(slot) => {
                slot.insert(action_id);
                Ok(InFlightGuard { map: &self.in_flight, key })
            }
        }
    }

    /// Mint a spore. Success notice links to `/spore/<id>`.
    pub async fn mint_spore(&self, intent: &MintIntent) -> OrchestrationResult<MintReceipt> {
        let (span, action_id) = action_span("mint");
        let result = self.run_mint(intent, action_id).instrument(span).await;
        self.report("mint", result)
    }

    /// Move a spore to a new owner. The spore id is unchanged, its out point is not.
    pub async fn transfer_spore(&self, intent: &TransferIntent) -> OrchestrationResult<TransferReceipt> {
        let (span, action_id) = action_span("transfer");
        let result = self.run_transfer(intent, action_id).instrument(span).await;
        self.report("transfer", result)
    }

    pub async fn create_cluster(&self, intent: &CreateClusterIntent) -> OrchestrationResult<ClusterReceipt> {
        let (span, action_id) = action_span("create_cluster");
        let result = self.run_create_cluster(intent, action_id).instrument(span).await;
        self.report("create_cluster", result)
    }

    async fn run_mint(&self, intent: &MintIntent, action_id: Uuid) -> OrchestrationResult<MintReceipt> {
        let content_hash = encode_hex(&hash::blake2b_256(&intent.content));
        let key = format!("mint:{}:{}:{}", intent.owner, intent.content_type, content_hash);
        let _guard = self.acquire(key, action_id)?;

        let built = self.builder.build_mint_draft(intent).await?;
        let spore_id = asset_id(&built)?;
        let output_index = built.output_index;
        tracing::info!(spore_id = %spore_id, output_index = output_index, "Mint draft built");

        let submitted = self.sign_and_submit("mint", built).await?;

        let mut keys = vec![
            QueryKey::SporesByAddress(intent.owner.clone()),
            QueryKey::ClustersByAddress(intent.owner.clone()),
            QueryKey::MintableClusters(intent.owner.clone()),
        ];
        if let Some(cluster_id) = intent.cluster_id {
            keys.push(QueryKey::ClusterSpores(cluster_id));
        }
        self.invalidate(&keys);
        if intent.cluster_id.is_some() {
            // The cluster cell was re-created at a new out point; its owner may not be the minter.
            let removed = self.cache.invalidate_kind(QueryKind::Cluster);
            tracing::debug!(removed = removed, "Invalidated cluster views");
        }

        self.notifier.notify(
            Notice::success("Spore minted!", format!("Spore {} minted in {}", spore_id, submitted.tx_hash))
                .with_link(format!("/spore/{}", spore_id)),
        );
        Ok(MintReceipt {
            tx_hash: submitted.tx_hash,
            spore_id,
            out_point: OutPoint::new(submitted.tx_hash, output_index as u32),
            confirmation: submitted.confirmation,
        })
    }

    async fn run_transfer(&self, intent: &TransferIntent, action_id: Uuid) -> OrchestrationResult<TransferReceipt> {
        let _guard = self.acquire(format!("spore:{}", intent.out_point), action_id)?;

        let built = self.builder.build_transfer_draft(intent).await?;
        let spore_id = asset_id(&built)?;
        let output_index = built.output_index;

        // Everything the invalidation needs is read before the draft is handed over.
        let moved = built.draft.output(output_index);
        let spore_type = moved.and_then(|cell| cell.output.type_script.clone());
        let cluster_id = moved
            .and_then(|cell| SporeData::decode(&cell.data).ok())
            .and_then(|data| data.cluster_id);
        let previous_owner = built
            .draft
            .inputs()
            .iter()
            .find(|cell| cell.output.type_script == spore_type)
            .map(|cell| self.builder.config().encode_address(&cell.output.lock));
        tracing::info!(spore_id = %spore_id, output_index = output_index, "Transfer draft built");

        let submitted = self.sign_and_submit("transfer", built).await?;

        let mut keys = vec![QueryKey::Spore(spore_id), QueryKey::SporesByAddress(intent.to.clone())];
        if let Some(from) = previous_owner {
            keys.push(QueryKey::SporesByAddress(from));
        }
        if let Some(cluster_id) = cluster_id {
            keys.push(QueryKey::ClusterSpores(cluster_id));
        }
        self.invalidate(&keys);

        self.notifier.notify(
            Notice::success("Spore Transferred!", format!("Spore {} sent to {}", spore_id, intent.to))
                .with_link(format!("/spore/{}", spore_id)),
        );
        Ok(TransferReceipt {
            tx_hash: submitted.tx_hash,
            spore_id,
            out_point: OutPoint::new(submitted.tx_hash, output_index as u32),
            confirmation: submitted.confirmation,
        })
    }

    async fn run_create_cluster(
        &self,
        intent: &CreateClusterIntent,
        action_id: Uuid,
    ) -> OrchestrationResult<ClusterReceipt> {
        let _guard = self.acquire(format!("cluster:{}:{}", intent.owner, intent.name), action_id)?;

        let built = self.builder.build_create_cluster_draft(intent).await?;
        let cluster_id = asset_id(&built)?;
        let output_index = built.output_index;
        tracing::info!(
            cluster_id = %cluster_id,
            output_index = output_index,
            public = intent.public,
            "Cluster draft built"
        );

        let submitted = self.sign_and_submit("create_cluster", built).await?;

        let removed = self.cache.invalidate_kind(QueryKind::Cluster);
        tracing::debug!(removed = removed, "Invalidated cluster views");

        self.notifier.notify(
            Notice::success("Congratulations!", "Your cluster has been created.")
                .with_link(format!("/cluster/{}", cluster_id)),
        );
        Ok(ClusterReceipt {
            tx_hash: submitted.tx_hash,
            cluster_id,
            out_point: OutPoint::new(submitted.tx_hash, output_index as u32),
            confirmation: submitted.confirmation,
        })
    }

    /// Hand the draft to the signer, submit, and await confirmation if configured.
    async fn sign_and_submit(&self, kind: &'static str, built: BuiltDraft) -> OrchestrationResult<Submitted> {
        if let Some(fee) = built.fee() {
            metrics::record_fee(kind, fee);
        }

        let signed = self.signer.sign(built.draft).await?;
        let tx_hash = self.broadcaster.submit(signed).await?;
        tracing::info!(tx_hash = %tx_hash, "Transaction submitted");

        let confirmation = if self.confirmation.wait {
            match self.await_confirmation(&tx_hash).await {
                Ok(block_number) => Confirmation::Committed { block_number },
                Err(e) if e.is_soft() => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Confirmation timed out");
                    self.notifier.notify(Notice::warning("Transaction pending", e.to_string()));
                    Confirmation::TimedOut
                }
                Err(e) => return Err(e),
            }
        } else {
            Confirmation::Skipped
        };

        Ok(Submitted { tx_hash, confirmation })
    }

    /// Poll the broadcast gateway until the transaction is committed.
    ///
    /// Only this step is time-limited. A timeout never resubmits.
    pub async fn await_confirmation(&self, tx_hash: &H256) -> OrchestrationResult<u64> {
        let timeout_secs = self.confirmation.timeout_secs;
        match timeout(Duration::from_secs(timeout_secs), self.poll_until_committed(tx_hash)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestrationError::ConfirmationTimeout { tx_hash: *tx_hash, timeout_secs }),
        }
    }

    async fn poll_until_committed(&self, tx_hash: &H256) -> OrchestrationResult<u64> {
        let poll_interval = Duration::from_millis(self.confirmation.poll_interval_ms.max(1));
        let mut ticker = interval(poll_interval);

        loop {
            ticker.tick().await;

            // A failed status query is retried until the timeout; only a rejection ends the wait.
            match self.broadcaster.transaction_status(tx_hash).await {
                Ok(TxStatus::Committed { block_number }) => {
                    tracing::info!(tx_hash = %tx_hash, block = block_number, "Transaction committed");
                    return Ok(block_number);
                }
                Ok(TxStatus::Rejected { reason }) => return Err(OrchestrationError::BroadcastRejected(reason)),
                Ok(TxStatus::Pending | TxStatus::Unknown) => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                }
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Status query failed, retrying");
                }
            }
        }
    }

    fn invalidate(&self, keys: &[QueryKey]) {
        let removed = keys.iter().filter(|key| self.cache.invalidate(key)).count();
        tracing::debug!(keys = keys.len(), removed = removed, "Invalidated cached views");
    }

    /// Record the outcome and raise an error notice on failure.
    fn report<T>(&self, kind: &'static str, result: OrchestrationResult<T>) -> OrchestrationResult<T> {
        match &result {
            Ok(_) => metrics::record_action(kind, "success"),
            Err(e) => {
                metrics::record_action(kind, e.kind());
                tracing::error!(action = kind, error = %e, "Action failed");
                self.notifier.notify(Notice::error("Error!", e.to_string()));
            }
        }
        result
    }
}

fn asset_id(built: &BuiltDraft) -> OrchestrationResult<H256> {
    built
        .asset_id()
        .ok_or_else(|| OrchestrationError::InvalidIntent("draft has no asset output".to_string()))
}
