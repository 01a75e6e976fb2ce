//! Blake2b hashing for scripts, transactions and signing messages.
//!
//! All digests use the `ckb-default-hash` personalization from `ckb-hash`.

use ckb_hash::new_blake2b;
use ckb_types::prelude::*;

use crate::chain::codec;
use crate::chain::types::{CellInput, Script, Transaction, H256};

pub use ckb_hash::blake2b_256;

/// Hash multiple byte slices in sequence.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = new_blake2b();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

pub fn script_hash(script: &Script) -> H256 {
    codec::h256(&codec::script(script).calc_script_hash())
}

/// Transaction id: hash of the raw transaction, witnesses excluded.
pub fn tx_hash(tx: &Transaction) -> H256 {
    codec::h256(&codec::raw_transaction(tx).calc_tx_hash())
}

/// Unique id for a type script created by `first_input` at `output_index`.
pub fn type_id(first_input: &CellInput, output_index: usize) -> H256 {
    let input = codec::cell_input(first_input);
    let index = (output_index as u64).to_le_bytes();
    H256(blake2b_256_multi(&[input.as_slice(), &index]))
}

/// Sighash-all message for the lock group whose inputs sit at `group`.
///
/// The first witness of the group is hashed as given, so callers pass the
/// placeholder form (zeroed signature) both when signing and verifying.
pub fn sighash_all_message(tx: &Transaction, tx_hash: &H256, group: &[usize]) -> [u8; 32] {
    let mut hasher = new_blake2b();
    hasher.update(&tx_hash.0);
    let trailing = tx.inputs.len()..tx.witnesses.len();
    for index in group.iter().copied().chain(trailing) {
        let witness = tx.witnesses.get(index).map(Vec::as_slice).unwrap_or_default();
        hasher.update(&(witness.len() as u64).to_le_bytes());
        hasher.update(witness);
    }
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}
