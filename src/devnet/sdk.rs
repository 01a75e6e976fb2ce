//! Asset SDK construction routines over the devnet's live cells.

use async_trait::async_trait;

use super::balance::{balance, FeeTarget};
use super::Devnet;
use crate::chain::hash;
use crate::chain::skeleton::{calculate_fee, TransactionSkeleton};
use crate::chain::types::{Cell, CellDep, CellInput, CellOutput, Script};
use crate::config::SporeConfig;
use crate::sdk::{
    resolve_from_infos, AssetSdk, BuiltSkeleton, ContentType, CreateClusterParams, CreateSporeParams, SdkError,
    SdkResult, TransferSporeParams,
};

/// Cell deps needed to unlock inputs guarded by `lock`.
fn lock_deps(config: &SporeConfig, lock: &Script) -> Vec<CellDep> {
    let scripts = &config.scripts;
    if scripts.omnilock.matches(lock) {
        vec![scripts.omnilock.cell_dep.clone(), scripts.secp256k1_blake160.cell_dep.clone()]
    } else if scripts.anyone_can_pay.matches(lock) {
        vec![scripts.anyone_can_pay.cell_dep.clone()]
    } else if scripts.secp256k1_blake160.matches(lock) {
        vec![scripts.secp256k1_blake160.cell_dep.clone()]
    } else {
        Vec::new()
    }
}

fn add_lock_deps(skeleton: &mut TransactionSkeleton, config: &SporeConfig, locks: &[Script]) {
    for lock in locks {
        for dep in lock_deps(config, lock) {
            skeleton.add_cell_dep(dep);
        }
    }
}

fn add_input(skeleton: &mut TransactionSkeleton, cell: Cell) -> SdkResult<usize> {
    skeleton.add_input(cell).map_err(|dup| SdkError::DuplicateInput(dup.0))
}

/// Derive the id from the first input and write it into the output's type args.
fn assign_type_id(skeleton: &mut TransactionSkeleton, output_index: usize) {
    let first_input = CellInput {
        previous_output: skeleton
            .inputs()
            .first()
            .and_then(|cell| cell.out_point)
            .unwrap_or_default(),
        since: 0,
    };
    let id = hash::type_id(&first_input, output_index);
    if let Some(type_script) = skeleton
        .output_mut(output_index)
        .and_then(|cell| cell.output.type_script.as_mut())
    {
        type_script.args = id.0.to_vec();
    }
}

/// A new typed output with a zeroed id placeholder; ids change no sizes.
fn typed_output(lock: Script, type_script: Script, data: Vec<u8>, margin: u64) -> SdkResult<Cell> {
    let mut output = CellOutput { capacity: 0, lock, type_script: Some(type_script) };
    output.capacity = output
        .occupied_capacity(data.len())
        .checked_add(margin)
        .ok_or(SdkError::CapacityOverflow("asset output"))?;
    Ok(Cell::new(output, data))
}

#[async_trait]
impl AssetSdk for Devnet {
    async fn create_spore(&self, params: CreateSporeParams<'_>) -> SdkResult<BuiltSkeleton> {
        let CreateSporeParams { data, from_infos, to_lock, config, capacity_margin } = params;
        if ContentType::parse(&data.content_type).is_none() {
            return Err(SdkError::InvalidContentType(data.content_type));
        }
        let from_locks = resolve_from_infos(&from_infos, config)?;
        let mut skeleton = TransactionSkeleton::new();

        let state = self.state.read().await;
        if let Some(cluster_id) = data.cluster_id {
            let cluster = state
                .find_by_type_args(&config.scripts.cluster, &cluster_id)
                .ok_or(SdkError::ClusterNotFound(cluster_id))?;
            // A private cluster cell is unlocked by its owner, who must be funding the mint.
            let public = config.scripts.anyone_can_pay.matches(&cluster.output.lock);
            let owned = from_locks.contains(&cluster.output.lock);
            if !public && !owned {
                return Err(SdkError::ClusterNotMintable(cluster_id));
            }
            // The cluster cell passes through unchanged to prove the spore belongs to it.
            add_input(&mut skeleton, cluster.clone())?;
            skeleton.add_fixed_output(Cell::new(cluster.output.clone(), cluster.data.clone()));
            skeleton.add_cell_dep(config.scripts.cluster.cell_dep.clone());
            add_lock_deps(&mut skeleton, config, std::slice::from_ref(&cluster.output.lock));
        }

        let spore = typed_output(
            to_lock,
            config.scripts.spore.script(vec![0u8; 32]),
            data.encode(),
            capacity_margin,
        )?;
        let output_index = skeleton.add_fixed_output(spore);
        skeleton.add_cell_dep(config.scripts.spore.cell_dep.clone());
        add_lock_deps(&mut skeleton, config, &from_locks);

        let candidates = state.free_cells(&from_locks);
        drop(state);
        balance(&mut skeleton, candidates, &from_locks[0], FeeTarget::Rate(config.fees.fee_rate))?;
        assign_type_id(&mut skeleton, output_index);

        tracing::debug!(
            inputs = skeleton.inputs().len(),
            outputs = skeleton.outputs().len(),
            output_index = output_index,
            "Built spore skeleton"
        );
        Ok(BuiltSkeleton { skeleton, output_index })
    }

    async fn transfer_spore(&self, params: TransferSporeParams<'_>) -> SdkResult<BuiltSkeleton> {
        let TransferSporeParams { out_point, from_infos, to_lock, config, use_capacity_margin_as_fee } = params;
        let from_locks = resolve_from_infos(&from_infos, config)?;

        let state = self.state.read().await;
        let spore = state
            .live
            .get(&out_point)
            .filter(|cell| {
                cell.output
                    .type_script
                    .as_ref()
                    .is_some_and(|t| config.scripts.spore.matches(t))
            })
            .cloned()
            .ok_or(SdkError::SporeNotFound(out_point))?;

        let mut skeleton = TransactionSkeleton::new();
        add_input(&mut skeleton, spore.clone())?;
        let moved = CellOutput { lock: to_lock, ..spore.output.clone() };
        let output_index = skeleton.add_fixed_output(Cell::new(moved, spore.data.clone()));
        skeleton.add_cell_dep(config.scripts.spore.cell_dep.clone());
        add_lock_deps(&mut skeleton, config, std::slice::from_ref(&spore.output.lock));

        if use_capacity_margin_as_fee {
            drop(state);
            let fee = calculate_fee(skeleton.serialized_size(), config.fees.fee_rate);
            let capacity = spore.output.capacity;
            let minimum = spore.occupied_capacity();
            let reduced = capacity
                .checked_sub(fee)
                .filter(|c| *c >= minimum)
                .ok_or(SdkError::InsufficientCapacity { needed: minimum.saturating_add(fee), available: capacity })?;
            if let Some(cell) = skeleton.output_mut(output_index) {
                cell.output.capacity = reduced;
            }
        } else {
            add_lock_deps(&mut skeleton, config, &from_locks);
            let candidates = state.free_cells(&from_locks);
            drop(state);
            balance(&mut skeleton, candidates, &from_locks[0], FeeTarget::Rate(config.fees.fee_rate))?;
        }

        Ok(BuiltSkeleton { skeleton, output_index })
    }

    async fn create_cluster(&self, params: CreateClusterParams<'_>) -> SdkResult<BuiltSkeleton> {
        let CreateClusterParams { data, from_infos, to_lock, config } = params;
        let from_locks = resolve_from_infos(&from_infos, config)?;

        let mut skeleton = TransactionSkeleton::new();
        let cluster = typed_output(to_lock, config.scripts.cluster.script(vec![0u8; 32]), data.encode(), 0)?;
        let output_index = skeleton.add_fixed_output(cluster);
        skeleton.add_cell_dep(config.scripts.cluster.cell_dep.clone());
        add_lock_deps(&mut skeleton, config, &from_locks);

        let candidates = self.state.read().await.free_cells(&from_locks);
        balance(&mut skeleton, candidates, &from_locks[0], FeeTarget::Rate(config.fees.fee_rate))?;
        assign_type_id(&mut skeleton, output_index);

        Ok(BuiltSkeleton { skeleton, output_index })
    }

    async fn transfer(
        &self,
        skeleton: &mut TransactionSkeleton,
        from_infos: &[String],
        to: &str,
        amount: u64,
        config: &SporeConfig,
    ) -> SdkResult<()> {
        let from_locks = resolve_from_infos(from_infos, config)?;
        let to_lock = config.parse_address(to).map_err(|source| SdkError::InvalidAddress {
            address: to.to_string(),
            source,
        })?;

        let payment = Cell::new(CellOutput { capacity: amount, lock: to_lock, type_script: None }, Vec::new());
        let minimum = payment.occupied_capacity();
        if amount < minimum {
            return Err(SdkError::BelowMinimum { capacity: amount, minimum });
        }

        let preserved = skeleton.fee().unwrap_or(0);
        skeleton.add_fixed_output(payment);
        add_lock_deps(skeleton, config, &from_locks);

        let candidates = self.state.read().await.free_cells(&from_locks);
        balance(skeleton, candidates, &from_locks[0], FeeTarget::Fixed(preserved))
    }

    async fn pay_fee_by_fee_rate(
        &self,
        skeleton: &mut TransactionSkeleton,
        from_infos: &[String],
        fee_rate: u64,
        config: &SporeConfig,
    ) -> SdkResult<()> {
        let from_locks = resolve_from_infos(from_infos, config)?;
        add_lock_deps(skeleton, config, &from_locks);
        let candidates = self.state.read().await.free_cells(&from_locks);
        balance(skeleton, candidates, &from_locks[0], FeeTarget::Rate(fee_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{H256, SHANNONS_PER_CKB};
    use crate::sdk::{ClusterData, SporeData};
    use std::sync::Arc;

    async fn funded() -> (Devnet, Script, String) {
        let config = Arc::new(SporeConfig::devnet());
        let lock = config.scripts.omnilock.script(vec![7; 22]);
        let address = config.encode_address(&lock);
        let devnet = Devnet::new(config);
        devnet.fund(&lock, 4, 1_000 * SHANNONS_PER_CKB).await;
        (devnet, lock, address)
    }

    #[tokio::test]
    async fn test_create_spore_assigns_type_id() {
        let (devnet, lock, address) = funded().await;
        let config = devnet.config().clone();
        let built = devnet
            .create_spore(CreateSporeParams {
                data: SporeData::new("text/plain", b"Hello, Spore!".to_vec()),
                from_infos: vec![address],
                to_lock: lock,
                config: &config,
                capacity_margin: 0,
            })
            .await
            .unwrap();

        let spore = built.skeleton.output(built.output_index).unwrap();
        let args = &spore.output.type_script.as_ref().unwrap().args;
        let first = CellInput { previous_output: built.skeleton.inputs()[0].out_point.unwrap(), since: 0 };
        assert_eq!(args.as_slice(), hash::type_id(&first, built.output_index).0.as_slice());
        assert_eq!(spore.capacity_margin(), 0);
        assert_eq!(
            built.skeleton.fee(),
            Some(calculate_fee(built.skeleton.serialized_size(), config.fees.fee_rate))
        );
    }

    #[tokio::test]
    async fn test_create_spore_rejects_bad_content_type() {
        let (devnet, lock, address) = funded().await;
        let config = devnet.config().clone();
        let err = devnet
            .create_spore(CreateSporeParams {
                data: SporeData::new("plain", b"x".to_vec()),
                from_infos: vec![address],
                to_lock: lock,
                config: &config,
                capacity_margin: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::InvalidContentType(_)));
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let (devnet, lock, address) = funded().await;
        let config = devnet.config().clone();
        let data = SporeData { cluster_id: Some(H256([4; 32])), ..SporeData::new("text/plain", b"x".to_vec()) };
        let err = devnet
            .create_spore(CreateSporeParams { data, from_infos: vec![address], to_lock: lock, config: &config, capacity_margin: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ClusterNotFound(_)));
    }

    #[tokio::test]
    async fn test_oversized_margin_is_an_error() {
        let (devnet, lock, address) = funded().await;
        let config = devnet.config().clone();
        let err = devnet
            .create_spore(CreateSporeParams {
                data: SporeData::new("text/plain", b"x".to_vec()),
                from_infos: vec![address],
                to_lock: lock,
                config: &config,
                capacity_margin: u64::MAX,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::CapacityOverflow(_)));
    }

    #[tokio::test]
    async fn test_recipient_owned_private_cluster_is_not_mintable() {
        let (devnet, _, address) = funded().await;
        let config = devnet.config().clone();
        let recipient = config.scripts.omnilock.script(vec![8; 22]);
        let cluster_id = H256([6; 32]);
        let cluster = Cell {
            output: CellOutput {
                capacity: 200 * SHANNONS_PER_CKB,
                lock: recipient.clone(),
                type_script: Some(config.scripts.cluster.script(cluster_id.0.to_vec())),
            },
            data: ClusterData { name: "theirs".into(), description: "private".into() }.encode(),
            out_point: Some(crate::chain::types::OutPoint::new(H256([0xcc; 32]), 0)),
        };
        devnet.state.write().await.live.insert(cluster.out_point.unwrap(), cluster);

        let data = SporeData { cluster_id: Some(cluster_id), ..SporeData::new("text/plain", b"x".to_vec()) };
        let err = devnet
            .create_spore(CreateSporeParams {
                data,
                from_infos: vec![address],
                to_lock: recipient,
                config: &config,
                capacity_margin: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ClusterNotMintable(id) if id == cluster_id));
    }

    #[tokio::test]
    async fn test_transfer_preserves_fee() {
        let (devnet, lock, address) = funded().await;
        let config = devnet.config().clone();
        let mut built = devnet
            .create_cluster(CreateClusterParams {
                data: ClusterData { name: "c".into(), description: "d".into() },
                from_infos: vec![address.clone()],
                to_lock: lock,
                config: &config,
            })
            .await
            .unwrap();
        let before = built.skeleton.fee();
        let recipient = config.encode_address(&config.scripts.secp256k1_blake160.script(vec![1; 20]));
        devnet
            .transfer(&mut built.skeleton, &[address], &recipient, 100 * SHANNONS_PER_CKB, &config)
            .await
            .unwrap();
        assert_eq!(built.skeleton.fee(), before);
    }

    #[tokio::test]
    async fn test_transfer_below_minimum() {
        let (devnet, _, address) = funded().await;
        let config = devnet.config().clone();
        let mut skeleton = TransactionSkeleton::new();
        let err = devnet
            .transfer(&mut skeleton, &[address.clone()], &address, SHANNONS_PER_CKB, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::BelowMinimum { .. }));
    }
}
