//! Capacity collection and change balancing.

use crate::chain::skeleton::{calculate_fee, TransactionSkeleton};
use crate::chain::types::{Cell, CellOutput, Script};
use crate::sdk::{SdkError, SdkResult};

/// What the balanced skeleton must leave as fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeeTarget {
    /// Exactly this many shannons.
    Fixed(u64),
    /// `ceil(size × rate / 1000)` for the final serialized size.
    Rate(u64),
}

impl FeeTarget {
    fn fee(self, skeleton: &TransactionSkeleton) -> u64 {
        match self {
            FeeTarget::Fixed(fee) => fee,
            FeeTarget::Rate(rate) => calculate_fee(skeleton.serialized_size(), rate),
        }
    }
}

/// Index of the adjustable change output for `change_lock`, if any.
fn change_index(skeleton: &TransactionSkeleton, change_lock: &Script) -> Option<usize> {
    skeleton
        .outputs()
        .iter()
        .enumerate()
        .find(|(i, cell)| !skeleton.is_fixed(*i) && cell.is_plain() && &cell.output.lock == change_lock)
        .map(|(i, _)| i)
}

/// Balance `skeleton` so inputs cover outputs plus the target fee exactly.
///
/// Candidates are taken greedily in the given order. Surplus goes to a single
/// change output locked by `change_lock`, which must hold at least its
/// occupied capacity. Fixed outputs are never touched.
pub(crate) fn balance(
    skeleton: &mut TransactionSkeleton,
    candidates: Vec<Cell>,
    change_lock: &Script,
    target: FeeTarget,
) -> SdkResult<()> {
    let mut pool = candidates
        .into_iter()
        .filter(|cell| {
            cell.out_point
                .as_ref()
                .is_some_and(|op| !skeleton.contains_input(op))
        })
        .collect::<Vec<_>>()
        .into_iter();

    loop {
        let fee = target.fee(skeleton);
        let inputs = skeleton
            .input_capacity()
            .ok_or(SdkError::CapacityOverflow("input capacity"))?;
        let outputs = skeleton
            .output_capacity()
            .ok_or(SdkError::CapacityOverflow("output capacity"))?;

        let shortfall = match change_index(skeleton, change_lock) {
            Some(index) => {
                let (change_capacity, minimum) = match skeleton.output(index) {
                    Some(change) => (change.output.capacity, change.occupied_capacity()),
                    None => (0, 0),
                };
                let others = outputs.saturating_sub(change_capacity);
                let needed = others
                    .checked_add(fee)
                    .and_then(|n| n.checked_add(minimum))
                    .ok_or(SdkError::InsufficientCapacity { needed: u64::MAX, available: inputs })?;
                if inputs >= needed {
                    if let Some(change) = skeleton.output_mut(index) {
                        change.output.capacity = inputs - others - fee;
                    }
                    if target.fee(skeleton) == fee {
                        return Ok(());
                    }
                    continue;
                }
                needed
            }
            None => {
                let needed = outputs
                    .checked_add(fee)
                    .ok_or(SdkError::InsufficientCapacity { needed: u64::MAX, available: inputs })?;
                if inputs == needed {
                    return Ok(());
                }
                if inputs > needed {
                    let change = Cell::new(
                        CellOutput {
                            capacity: inputs - needed,
                            lock: change_lock.clone(),
                            type_script: None,
                        },
                        Vec::new(),
                    );
                    skeleton.add_output(change);
                    continue;
                }
                needed
            }
        };

        match pool.next() {
            Some(cell) => {
                skeleton
                    .add_input(cell)
                    .map_err(|dup| SdkError::DuplicateInput(dup.0))?;
            }
            None => {
                return Err(SdkError::InsufficientCapacity {
                    needed: shortfall,
                    available: inputs,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{HashType, OutPoint, SHANNONS_PER_CKB, H256};

    fn lock() -> Script {
        Script::new(H256([1; 32]), HashType::Type, vec![2; 20])
    }

    fn plain(index: u32, ckb: u64) -> Cell {
        Cell {
            output: CellOutput { capacity: ckb * SHANNONS_PER_CKB, lock: lock(), type_script: None },
            data: Vec::new(),
            out_point: Some(OutPoint::new(H256([5; 32]), index)),
        }
    }

    fn payment(ckb: u64) -> Cell {
        let other = Script::new(H256([9; 32]), HashType::Type, vec![3; 20]);
        Cell::new(
            CellOutput { capacity: ckb * SHANNONS_PER_CKB, lock: other, type_script: None },
            Vec::new(),
        )
    }

    #[test]
    fn test_balance_by_rate_is_exact() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_fixed_output(payment(100));
        balance(&mut skeleton, vec![plain(0, 1000)], &lock(), FeeTarget::Rate(1000)).unwrap();

        let fee = skeleton.fee().unwrap();
        assert_eq!(fee, calculate_fee(skeleton.serialized_size(), 1000));
        assert_eq!(skeleton.outputs().len(), 2);
        assert_eq!(skeleton.output(0).unwrap().output.capacity, 100 * SHANNONS_PER_CKB);
    }

    #[test]
    fn test_balance_collects_in_order() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_fixed_output(payment(150));
        let candidates = vec![plain(0, 100), plain(1, 100), plain(2, 100)];
        balance(&mut skeleton, candidates, &lock(), FeeTarget::Rate(1000)).unwrap();
        // 200 CKB leaves under 61 CKB of change, so a third cell is needed.
        assert_eq!(skeleton.inputs().len(), 3);
        assert_eq!(skeleton.inputs()[0].out_point.unwrap().index, 0);
    }

    #[test]
    fn test_fixed_fee_preserved() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_fixed_output(payment(100));
        balance(&mut skeleton, vec![plain(0, 500)], &lock(), FeeTarget::Fixed(12_345)).unwrap();
        assert_eq!(skeleton.fee(), Some(12_345));
    }

    #[test]
    fn test_insufficient_capacity() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_fixed_output(payment(1000));
        let err = balance(&mut skeleton, vec![plain(0, 100)], &lock(), FeeTarget::Rate(1000)).unwrap_err();
        assert!(matches!(err, SdkError::InsufficientCapacity { available, .. } if available == 100 * SHANNONS_PER_CKB));
    }

    #[test]
    fn test_existing_inputs_are_skipped() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_input(plain(0, 100)).unwrap();
        skeleton.add_fixed_output(payment(100));
        balance(&mut skeleton, vec![plain(0, 100), plain(1, 100)], &lock(), FeeTarget::Rate(1000)).unwrap();
        assert_eq!(skeleton.inputs().len(), 2);
    }

    #[test]
    fn test_oversized_outputs_are_insufficient_not_a_panic() {
        let mut skeleton = TransactionSkeleton::new();
        let mut huge = payment(0);
        huge.output.capacity = u64::MAX;
        skeleton.add_fixed_output(huge);
        let err = balance(&mut skeleton, vec![plain(0, 100)], &lock(), FeeTarget::Rate(1000)).unwrap_err();
        assert!(matches!(err, SdkError::InsufficientCapacity { needed: u64::MAX, .. }));
    }

    #[test]
    fn test_overflowing_inputs_are_rejected() {
        let mut skeleton = TransactionSkeleton::new();
        let mut huge = plain(0, 0);
        huge.output.capacity = u64::MAX;
        skeleton.add_input(huge).unwrap();
        skeleton.add_input(plain(1, 1)).unwrap();
        let err = balance(&mut skeleton, Vec::new(), &lock(), FeeTarget::Fixed(0)).unwrap_err();
        assert!(matches!(err, SdkError::CapacityOverflow(_)));
    }
}
