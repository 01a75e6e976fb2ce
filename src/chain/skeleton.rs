//! Transaction skeleton: the mutable, unsigned draft built up by SDK routines.

use std::collections::BTreeSet;

use ckb_types::prelude::*;

use crate::chain::codec;
use crate::chain::types::{checked_capacity_sum, Cell, CellDep, CellInput, OutPoint, Script, Transaction};

/// Length of a recoverable secp256k1 signature placed in a witness lock.
pub const SIGNATURE_PLACEHOLDER_LEN: usize = 65;

/// Extra bytes a transaction costs inside a block (its offset entry).
const BLOCK_OFFSET_BYTES: usize = 4;

/// An unsigned transaction under construction.
///
/// Inputs are kept as resolved cells so capacity can be balanced without
/// further lookups. Outputs marked fixed are never adjusted or removed when
/// change and fees are balanced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSkeleton {
    cell_deps: Vec<CellDep>,
    inputs: Vec<Cell>,
    outputs: Vec<Cell>,
    fixed_outputs: BTreeSet<usize>,
}

/// Error returned when the same live cell is added twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateInput(pub OutPoint);

impl TransactionSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell_dep(&mut self, dep: CellDep) {
        if !self.cell_deps.contains(&dep) {
            self.cell_deps.push(dep);
        }
    }

    /// Add a resolved live cell as input. The cell must carry its out point.
    pub fn add_input(&mut self, cell: Cell) -> Result<usize, DuplicateInput> {
        if let Some(op) = cell.out_point {
            if self.contains_input(&op) {
                return Err(DuplicateInput(op));
            }
        }
        self.inputs.push(cell);
        Ok(self.inputs.len() - 1)
    }

    pub fn contains_input(&self, out_point: &OutPoint) -> bool {
        self.inputs.iter().any(|c| c.out_point.as_ref() == Some(out_point))
    }

    pub fn add_output(&mut self, cell: Cell) -> usize {
        self.outputs.push(cell);
        self.outputs.len() - 1
    }

    pub fn add_fixed_output(&mut self, cell: Cell) -> usize {
        let index = self.add_output(cell);
        self.fixed_outputs.insert(index);
        index
    }

    pub fn is_fixed(&self, index: usize) -> bool {
        self.fixed_outputs.contains(&index)
    }

    pub fn output_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.outputs.get_mut(index)
    }

    pub fn cell_deps(&self) -> &[CellDep] {
        &self.cell_deps
    }

    pub fn inputs(&self) -> &[Cell] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Cell] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&Cell> {
        self.outputs.get(index)
    }

    /// Total input capacity, `None` on overflow.
    pub fn input_capacity(&self) -> Option<u64> {
        checked_capacity_sum(self.inputs.iter().map(|c| c.output.capacity))
    }

    pub fn output_capacity(&self) -> Option<u64> {
        checked_capacity_sum(self.outputs.iter().map(|c| c.output.capacity))
    }

    /// Inputs minus outputs, or `None` while outputs exceed inputs.
    pub fn fee(&self) -> Option<u64> {
        self.input_capacity()?.checked_sub(self.output_capacity()?)
    }

    /// Input indices grouped by lock script, in first-appearance order.
    pub fn lock_groups(&self) -> Vec<(Script, Vec<usize>)> {
        let mut groups: Vec<(Script, Vec<usize>)> = Vec::new();
        for (i, cell) in self.inputs.iter().enumerate() {
            match groups.iter_mut().find(|(lock, _)| *lock == cell.output.lock) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((cell.output.lock.clone(), vec![i])),
            }
        }
        groups
    }

    /// Assemble the transaction with placeholder witnesses: the first input
    /// of each lock group gets a zeroed signature, the rest stay empty.
    pub fn to_transaction(&self) -> Transaction {
        let mut witnesses = vec![Vec::new(); self.inputs.len()];
        for (_, indices) in self.lock_groups() {
            if let Some(&first) = indices.first() {
                witnesses[first] = codec::witness_args(Some(&[0u8; SIGNATURE_PLACEHOLDER_LEN][..]));
            }
        }
        Transaction {
            version: 0,
            cell_deps: self.cell_deps.clone(),
            inputs: self
                .inputs
                .iter()
                .map(|c| CellInput {
                    previous_output: c.out_point.unwrap_or_default(),
                    since: 0,
                })
                .collect(),
            outputs: self.outputs.iter().map(|c| c.output.clone()).collect(),
            outputs_data: self.outputs.iter().map(|c| c.data.clone()).collect(),
            witnesses,
        }
    }

    /// Serialized size used for fee calculation; signing does not change it.
    pub fn serialized_size(&self) -> usize {
        codec::transaction(&self.to_transaction()).as_slice().len() + BLOCK_OFFSET_BYTES
    }
}

/// Fee in shannons for `size` bytes at `fee_rate` shannons per 1000 bytes, rounded up.
pub fn calculate_fee(size: usize, fee_rate: u64) -> u64 {
    let product = (size as u64).saturating_mul(fee_rate);
    product.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{CellOutput, HashType, H256, SHANNONS_PER_CKB};

    fn lock(tag: u8) -> Script {
        Script::new(H256([tag; 32]), HashType::Type, vec![tag; 20])
    }

    fn live_cell(tag: u8, index: u32, ckb: u64) -> Cell {
        Cell {
            output: CellOutput { capacity: ckb * SHANNONS_PER_CKB, lock: lock(tag), type_script: None },
            data: Vec::new(),
            out_point: Some(OutPoint::new(H256([index as u8; 32]), index)),
        }
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_input(live_cell(1, 0, 100)).unwrap();
        assert!(skeleton.add_input(live_cell(1, 0, 100)).is_err());
    }

    #[test]
    fn test_fee_is_none_when_unbalanced() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_output(live_cell(1, 0, 100));
        assert_eq!(skeleton.fee(), None);
        skeleton.add_input(live_cell(1, 1, 150)).unwrap();
        assert_eq!(skeleton.fee(), Some(50 * SHANNONS_PER_CKB));
    }

    #[test]
    fn test_lock_groups_and_placeholders() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_input(live_cell(1, 0, 100)).unwrap();
        skeleton.add_input(live_cell(2, 1, 100)).unwrap();
        skeleton.add_input(live_cell(1, 2, 100)).unwrap();
        let groups = skeleton.lock_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, vec![0, 2]);

        let tx = skeleton.to_transaction();
        assert!(!tx.witnesses[0].is_empty());
        assert!(!tx.witnesses[1].is_empty());
        assert!(tx.witnesses[2].is_empty());
    }

    #[test]
    fn test_capacity_overflow_is_none() {
        let mut skeleton = TransactionSkeleton::new();
        let mut huge = live_cell(1, 0, 1);
        huge.output.capacity = u64::MAX;
        skeleton.add_input(huge.clone()).unwrap();
        skeleton.add_input(live_cell(1, 1, 1)).unwrap();
        skeleton.add_output(huge);
        assert_eq!(skeleton.input_capacity(), None);
        assert_eq!(skeleton.output_capacity(), Some(u64::MAX));
        assert_eq!(skeleton.fee(), None);
    }

    #[test]
    fn test_fixed_outputs_are_tracked() {
        let mut skeleton = TransactionSkeleton::new();
        skeleton.add_output(live_cell(1, 0, 100));
        let fixed = skeleton.add_fixed_output(live_cell(2, 1, 100));
        assert_eq!(fixed, 1);
        assert!(skeleton.is_fixed(1));
        assert!(!skeleton.is_fixed(0));
    }

    #[test]
    fn test_calculate_fee_rounds_up() {
        assert_eq!(calculate_fee(1000, 1000), 1000);
        assert_eq!(calculate_fee(1001, 1000), 1001);
        assert_eq!(calculate_fee(1, 1), 1);
        assert_eq!(calculate_fee(0, 1000), 0);
    }
}
