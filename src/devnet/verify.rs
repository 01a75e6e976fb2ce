//! Transaction acceptance: the devnet's broadcast gateway.

use alloy::primitives::Signature;
use async_trait::async_trait;
use std::collections::HashSet;

use super::{ChainState, Devnet, TxRecord};
use ckb_types::prelude::*;

use crate::chain::{codec, hash};
use crate::chain::skeleton::{calculate_fee, SIGNATURE_PLACEHOLDER_LEN};
use crate::chain::types::{checked_capacity_sum, encode_hex, Cell, CellInput, OutPoint, Script, Transaction, H256};
use crate::config::{ScriptInfo, SporeConfig};
use crate::orchestrator::gateway::{BroadcastError, BroadcastGateway, SignedTransaction, TxStatus};
use crate::sdk::{ClusterData, SporeData};

/// Omnilock args in Ethereum auth mode: flag, 20-byte address, omni flags.
const OMNILOCK_ETH_ARGS_LEN: usize = 22;
const OMNILOCK_ETH_FLAG: u8 = 0x01;

type VerifyResult<T> = Result<T, BroadcastError>;

fn reject(reason: impl Into<String>) -> BroadcastError {
    BroadcastError::Rejected(reason.into())
}

/// Resolve every input against the live set.
fn resolve_inputs(state: &ChainState, tx: &Transaction) -> VerifyResult<Vec<Cell>> {
    let mut seen = HashSet::new();
    tx.inputs
        .iter()
        .map(|input| {
            let out_point = input.previous_output;
            if !seen.insert(out_point) {
                return Err(reject(format!("input {} spent twice in one transaction", out_point)));
            }
            state
                .live
                .get(&out_point)
                .cloned()
                .ok_or_else(|| reject(format!("input {} is unknown or already spent", out_point)))
        })
        .collect()
}

fn check_capacity(tx: &Transaction, inputs: &[Cell], min_fee_rate: u64) -> VerifyResult<u64> {
    if tx.outputs.len() != tx.outputs_data.len() {
        return Err(reject("outputs and outputs_data differ in length"));
    }
    for (index, (output, data)) in tx.outputs.iter().zip(&tx.outputs_data).enumerate() {
        let minimum = output.occupied_capacity(data.len());
        if output.capacity < minimum {
            return Err(reject(format!(
                "output {} holds {} shannons, needs at least {}",
                index, output.capacity, minimum
            )));
        }
    }

    let input_capacity = checked_capacity_sum(inputs.iter().map(|c| c.output.capacity))
        .ok_or_else(|| reject("input capacity overflows"))?;
    let output_capacity = checked_capacity_sum(tx.outputs.iter().map(|o| o.capacity))
        .ok_or_else(|| reject("output capacity overflows"))?;
    let fee = input_capacity
        .checked_sub(output_capacity)
        .ok_or_else(|| reject(format!("outputs ({}) exceed inputs ({})", output_capacity, input_capacity)))?;

    let size = codec::transaction(tx).as_slice().len() + 4;
    let min_fee = calculate_fee(size, min_fee_rate);
    if fee < min_fee {
        return Err(reject(format!("fee {} below minimum {} for {} bytes", fee, min_fee, size)));
    }
    Ok(fee)
}

/// Check one lock group's witness.
fn verify_lock_group(
    config: &SporeConfig,
    tx: &Transaction,
    tx_hash: &H256,
    inputs: &[Cell],
    lock: &Script,
    group: &[usize],
) -> VerifyResult<()> {
    let scripts = &config.scripts;
    if scripts.anyone_can_pay.matches(lock) {
        // Unlocks without a signature when at least the consumed capacity is returned.
        let consumed = checked_capacity_sum(group.iter().filter_map(|&i| inputs.get(i)).map(|c| c.output.capacity));
        let returned = checked_capacity_sum(tx.outputs.iter().filter(|o| &o.lock == lock).map(|o| o.capacity));
        return if returned.zip(consumed).is_some_and(|(returned, consumed)| returned >= consumed) {
            Ok(())
        } else {
            Err(reject("anyone-can-pay capacity not returned to its lock"))
        };
    }
    if !scripts.omnilock.matches(lock) {
        return Err(reject(format!("no verifier for lock code hash {}", lock.code_hash)));
    }
    if lock.args.len() != OMNILOCK_ETH_ARGS_LEN || lock.args[0] != OMNILOCK_ETH_FLAG {
        return Err(reject("unsupported omnilock auth mode"));
    }

    let first = group.first().copied().ok_or_else(|| reject("empty lock group"))?;
    let witness = tx
        .witnesses
        .get(first)
        .ok_or_else(|| reject(format!("missing witness for input {}", first)))?;
    let signature = codec::witness_lock(witness)
        .map_err(|e| reject(format!("malformed witness for input {}: {}", first, e)))?
        .ok_or_else(|| reject(format!("witness for input {} carries no signature", first)))?;

    let mut unsigned = tx.clone();
    unsigned.witnesses[first] = codec::witness_args(Some(&[0u8; SIGNATURE_PLACEHOLDER_LEN][..]));
    let message = hash::sighash_all_message(&unsigned, tx_hash, group);

    let recovered = Signature::from_raw(&signature)
        .and_then(|sig| sig.recover_address_from_msg(message))
        .map_err(|e| reject(format!("invalid signature for input {}: {}", first, e)))?;
    if recovered.as_slice() != &lock.args[1..21] {
        return Err(reject(format!("signature for input {} does not match its lock", first)));
    }
    Ok(())
}

/// Input indices grouped by lock, in first-appearance order.
fn lock_groups(inputs: &[Cell]) -> Vec<(&Script, Vec<usize>)> {
    let mut groups: Vec<(&Script, Vec<usize>)> = Vec::new();
    for (i, cell) in inputs.iter().enumerate() {
        match groups.iter_mut().find(|(lock, _)| *lock == &cell.output.lock) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((&cell.output.lock, vec![i])),
        }
    }
    groups
}

/// Typed assets: existing ones keep their data, new ones carry the derived id.
fn verify_assets(config: &SporeConfig, tx: &Transaction, inputs: &[Cell], code: &ScriptInfo) -> VerifyResult<()> {
    let first_input = tx
        .inputs
        .first()
        .cloned()
        .unwrap_or(CellInput { previous_output: OutPoint::default(), since: 0 });

    let mut seen = HashSet::new();
    for (index, (output, data)) in tx.outputs.iter().zip(&tx.outputs_data).enumerate() {
        let Some(type_script) = output.type_script.as_ref().filter(|t| code.matches(t)) else {
            continue;
        };
        if !seen.insert(&type_script.args) {
            return Err(reject(format!("output {}: asset {} appears twice", index, encode_hex(&type_script.args))));
        }
        let existing = inputs
            .iter()
            .find(|cell| cell.output.type_script.as_ref() == Some(type_script));
        match existing {
            Some(cell) => {
                if &cell.data != data {
                    return Err(reject(format!("output {}: asset data is immutable", index)));
                }
            }
            None => {
                if type_script.args != hash::type_id(&first_input, index).0 {
                    return Err(reject(format!("output {}: asset id does not match its creating input", index)));
                }
                if config.scripts.spore.matches(type_script) {
                    verify_new_spore(config, tx, inputs, index, data)?;
                } else {
                    ClusterData::decode(data)
                        .map_err(|e| reject(format!("output {}: bad cluster data: {}", index, e)))?;
                }
            }
        }
    }
    Ok(())
}

fn verify_new_spore(
    config: &SporeConfig,
    tx: &Transaction,
    inputs: &[Cell],
    index: usize,
    data: &[u8],
) -> VerifyResult<()> {
    let spore = SporeData::decode(data).map_err(|e| reject(format!("output {}: bad spore data: {}", index, e)))?;
    let Some(cluster_id) = spore.cluster_id else {
        return Ok(());
    };
    let is_cluster = |t: Option<&Script>| t.is_some_and(|t| config.scripts.cluster.matches(t) && t.args == cluster_id.0);
    let consumed = inputs.iter().any(|c| is_cluster(c.output.type_script.as_ref()));
    let recreated = tx.outputs.iter().any(|o| is_cluster(o.type_script.as_ref()));
    if !(consumed && recreated) {
        return Err(reject(format!("output {}: cluster {} must pass through the transaction", index, cluster_id)));
    }
    Ok(())
}

impl Devnet {
    fn apply(state: &mut ChainState, tx: &Transaction, tx_hash: H256, auto_commit: bool) -> TxStatus {
        for input in &tx.inputs {
            state.live.remove(&input.previous_output);
        }
        for (index, (output, data)) in tx.outputs.iter().zip(&tx.outputs_data).enumerate() {
            let out_point = OutPoint::new(tx_hash, index as u32);
            state.live.insert(
                out_point,
                Cell { output: output.clone(), data: data.clone(), out_point: Some(out_point) },
            );
        }
        state.transactions.insert(
            tx_hash,
            TxRecord { status: TxStatus::Pending, transaction: tx.clone() },
        );
        state.pending.push(tx_hash);
        if auto_commit {
            let block_number = state.commit_pending();
            TxStatus::Committed { block_number }
        } else {
            TxStatus::Pending
        }
    }
}

#[async_trait]
impl BroadcastGateway for Devnet {
    async fn submit(&self, signed: SignedTransaction) -> Result<H256, BroadcastError> {
        let tx = signed.transaction();
        let tx_hash = signed.tx_hash();
        let config = &self.config;

        let mut state = self.state.write().await;
        if state.transactions.contains_key(&tx_hash) {
            return Err(reject(format!("transaction {} already submitted", tx_hash)));
        }

        let inputs = resolve_inputs(&state, tx)?;
        let fee = check_capacity(tx, &inputs, config.fees.min_fee_rate)?;
        for (lock, group) in lock_groups(&inputs) {
            verify_lock_group(config, tx, &tx_hash, &inputs, lock, &group)?;
        }
        verify_assets(config, tx, &inputs, &config.scripts.spore)?;
        verify_assets(config, tx, &inputs, &config.scripts.cluster)?;

        let status = Self::apply(&mut state, tx, tx_hash, config.devnet.auto_commit);
        tracing::info!(
            tx_hash = %tx_hash,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = fee,
            status = ?status,
            "Transaction accepted"
        );
        Ok(tx_hash)
    }

    async fn transaction_status(&self, tx_hash: &H256) -> Result<TxStatus, BroadcastError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .get(tx_hash)
            .map(|record| record.status.clone())
            .unwrap_or(TxStatus::Unknown))
    }
}
