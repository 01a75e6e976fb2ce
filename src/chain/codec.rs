//! Conversion of chain primitives into `ckb-types` packed structures.
//!
//! The serde-facing structs in `types.rs` are what the rest of the crate
//! handles; anything that must be byte-exact (hashes, sizes, witnesses)
//! goes through the packed form built here.

use ckb_types::bytes::Bytes;
use ckb_types::molecule::{pack_number, unpack_number, NUMBER_SIZE};
use ckb_types::packed;
use ckb_types::prelude::*;
use thiserror::Error;

use crate::chain::types::{CellDep, CellInput, CellOutput, DepType, OutPoint, Script, Transaction, H256};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoleculeError {
    #[error("malformed molecule data: {0}")]
    Verification(String),

    #[error("expected {expected} fields, found {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("field is not valid UTF-8")]
    Utf8,
}

fn verification(err: impl std::fmt::Display) -> MoleculeError {
    MoleculeError::Verification(err.to_string())
}

pub fn byte32(hash: &H256) -> packed::Byte32 {
    hash.0.pack()
}

pub fn h256(hash: &packed::Byte32) -> H256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_slice());
    H256(out)
}

pub fn script(script: &Script) -> packed::Script {
    packed::Script::new_builder()
        .code_hash(byte32(&script.code_hash))
        .hash_type(packed::Byte::new(script.hash_type.to_byte()))
        .args(Bytes::copy_from_slice(&script.args).pack())
        .build()
}

pub fn out_point(out_point: &OutPoint) -> packed::OutPoint {
    packed::OutPoint::new_builder()
        .tx_hash(byte32(&out_point.tx_hash))
        .index(out_point.index.pack())
        .build()
}

pub fn cell_input(input: &CellInput) -> packed::CellInput {
    packed::CellInput::new_builder()
        .since(input.since.pack())
        .previous_output(out_point(&input.previous_output))
        .build()
}

fn cell_dep(dep: &CellDep) -> packed::CellDep {
    let dep_type = match dep.dep_type {
        DepType::Code => 0,
        DepType::DepGroup => 1,
    };
    packed::CellDep::new_builder()
        .out_point(out_point(&dep.out_point))
        .dep_type(packed::Byte::new(dep_type))
        .build()
}

pub fn cell_output(output: &CellOutput) -> packed::CellOutput {
    let type_script = packed::ScriptOpt::new_builder()
        .set(output.type_script.as_ref().map(script))
        .build();
    packed::CellOutput::new_builder()
        .capacity(output.capacity.pack())
        .lock(script(&output.lock))
        .type_(type_script)
        .build()
}

fn bytes_vec(items: &[Vec<u8>]) -> packed::BytesVec {
    packed::BytesVec::new_builder()
        .set(items.iter().map(|item| Bytes::copy_from_slice(item).pack()).collect())
        .build()
}

pub fn raw_transaction(tx: &Transaction) -> packed::RawTransaction {
    packed::RawTransaction::new_builder()
        .version(tx.version.pack())
        .cell_deps(packed::CellDepVec::new_builder().set(tx.cell_deps.iter().map(cell_dep).collect()).build())
        .inputs(packed::CellInputVec::new_builder().set(tx.inputs.iter().map(cell_input).collect()).build())
        .outputs(packed::CellOutputVec::new_builder().set(tx.outputs.iter().map(cell_output).collect()).build())
        .outputs_data(bytes_vec(&tx.outputs_data))
        .build()
}

pub fn transaction(tx: &Transaction) -> packed::Transaction {
    packed::Transaction::new_builder()
        .raw(raw_transaction(tx))
        .witnesses(bytes_vec(&tx.witnesses))
        .build()
}

/// Serialized `WitnessArgs` carrying only `lock`.
pub fn witness_args(lock: Option<&[u8]>) -> Vec<u8> {
    let lock = packed::BytesOpt::new_builder()
        .set(lock.map(|raw| Bytes::copy_from_slice(raw).pack()))
        .build();
    packed::WitnessArgs::new_builder().lock(lock).build().as_slice().to_vec()
}

/// The `lock` field of a serialized `WitnessArgs`.
pub fn witness_lock(witness: &[u8]) -> Result<Option<Vec<u8>>, MoleculeError> {
    let args = packed::WitnessArgsReader::from_slice(witness).map_err(verification)?;
    Ok(args.lock().to_opt().map(|lock| lock.raw_data().to_vec()))
}

/// Assemble a molecule table from already-serialized fields, the way
/// generated builders write one.
pub fn table(fields: &[&[u8]]) -> Vec<u8> {
    let header = NUMBER_SIZE * (fields.len() + 1);
    let total = header + fields.iter().map(|f| f.len()).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&pack_number(total as u32));
    let mut offset = header;
    for field in fields {
        out.extend_from_slice(&pack_number(offset as u32));
        offset += field.len();
    }
    for field in fields {
        out.extend_from_slice(field);
    }
    out
}

/// Split a table with exactly `expected` fields into field slices.
pub fn table_fields(data: &[u8], expected: usize) -> Result<Vec<&[u8]>, MoleculeError> {
    let header = NUMBER_SIZE * (expected + 1);
    if data.len() < header {
        return Err(verification(format!("table of {} bytes is shorter than its header", data.len())));
    }
    let total = unpack_number(data) as usize;
    if total != data.len() {
        return Err(verification(format!("declared size {} != {}", total, data.len())));
    }
    let first = unpack_number(&data[NUMBER_SIZE..]) as usize;
    if first % NUMBER_SIZE != 0 || first < NUMBER_SIZE * 2 {
        return Err(verification("bad first offset"));
    }
    let actual = first / NUMBER_SIZE - 1;
    if actual != expected {
        return Err(MoleculeError::FieldCount { expected, actual });
    }

    let mut offsets: Vec<usize> = (0..expected)
        .map(|i| unpack_number(&data[NUMBER_SIZE * (i + 1)..]) as usize)
        .collect();
    offsets.push(total);
    offsets
        .windows(2)
        .map(|pair| match data.get(pair[0]..pair[1]) {
            Some(field) if pair[0] >= header => Ok(field),
            _ => Err(verification("offsets out of order")),
        })
        .collect()
}

pub fn pack_bytes(raw: &[u8]) -> packed::Bytes {
    Bytes::copy_from_slice(raw).pack()
}

pub fn pack_bytes_opt(raw: Option<&[u8]>) -> packed::BytesOpt {
    packed::BytesOpt::new_builder().set(raw.map(pack_bytes)).build()
}

pub fn unpack_bytes(field: &[u8]) -> Result<&[u8], MoleculeError> {
    packed::BytesReader::from_slice(field)
        .map(|reader| reader.raw_data())
        .map_err(verification)
}

pub fn unpack_bytes_opt(field: &[u8]) -> Result<Option<&[u8]>, MoleculeError> {
    let reader = packed::BytesOptReader::from_slice(field).map_err(verification)?;
    Ok(reader.to_opt().map(|bytes| bytes.raw_data()))
}

pub fn unpack_string(field: &[u8]) -> Result<String, MoleculeError> {
    let raw = unpack_bytes(field)?;
    String::from_utf8(raw.to_vec()).map_err(|_| MoleculeError::Utf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::HashType;

    #[test]
    fn test_script_matches_packed_layout() {
        let s = Script::new(H256([5; 32]), HashType::Type, vec![1; 20]);
        let entity = script(&s);
        // header 16 + code hash 32 + hash type 1 + args (4 + 20)
        assert_eq!(entity.as_slice().len(), 73);
        assert_eq!(h256(&entity.code_hash()), s.code_hash);
        let args: Bytes = entity.args().unpack();
        assert_eq!(args.to_vec(), s.args);
    }

    #[test]
    fn test_table_fields_roundtrip() {
        let name = pack_bytes(b"name");
        let none = pack_bytes_opt(None);
        let x = pack_bytes(b"x");
        let encoded = table(&[name.as_slice(), none.as_slice(), x.as_slice()]);

        let fields = table_fields(&encoded, 3).unwrap();
        assert_eq!(unpack_bytes(fields[0]).unwrap(), b"name");
        assert_eq!(unpack_bytes_opt(fields[1]).unwrap(), None);
        assert_eq!(unpack_string(fields[2]).unwrap(), "x");
        assert!(matches!(table_fields(&encoded, 2), Err(MoleculeError::FieldCount { expected: 2, actual: 3 })));
    }

    #[test]
    fn test_truncated_table_is_rejected() {
        let field = pack_bytes(b"abc");
        let mut encoded = table(&[field.as_slice()]);
        encoded.pop();
        assert!(matches!(table_fields(&encoded, 1), Err(MoleculeError::Verification(_))));
    }

    #[test]
    fn test_witness_lock_roundtrip() {
        let witness = witness_args(Some(&[9u8; 65]));
        assert_eq!(witness_lock(&witness).unwrap(), Some(vec![9u8; 65]));
        assert_eq!(witness_lock(&witness_args(None)).unwrap(), None);
        assert!(witness_lock(b"junk").is_err());
    }

    #[test]
    fn test_transaction_roundtrips_through_packed() {
        let tx = Transaction {
            version: 0,
            cell_deps: vec![CellDep { out_point: OutPoint::new(H256([1; 32]), 0), dep_type: DepType::DepGroup }],
            inputs: vec![CellInput { previous_output: OutPoint::new(H256([2; 32]), 3), since: 0 }],
            outputs: vec![CellOutput {
                capacity: 100,
                lock: Script::new(H256([3; 32]), HashType::Type, vec![4; 20]),
                type_script: None,
            }],
            outputs_data: vec![vec![7, 8]],
            witnesses: vec![witness_args(None)],
        };
        let entity = transaction(&tx);
        assert!(packed::Transaction::from_slice(entity.as_slice()).is_ok());
        assert_eq!(entity.raw().inputs().len(), 1);
        assert_eq!(entity.witnesses().len(), 1);
    }
}
