//! Cell-model primitives and error definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Shannons in one CKB. Cell capacity is denominated in shannons.
pub const SHANNONS_PER_CKB: u64 = 100_000_000;

/// Bytes taken by the capacity field of every cell.
const CAPACITY_FIELD_BYTES: u64 = 8;

/// 32-byte hash (transaction hash, script code hash, asset id).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct H256(pub [u8; 32]);

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, HexError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HexError::Length { expected: 32, actual: bytes.len() })?;
        Ok(Self(array))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for H256 {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        Self::from_slice(&bytes)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors decoding `0x`-prefixed hex.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexError {
    #[error("invalid hex: {0}")]
    Invalid(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Decode hex with or without the `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, HexError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| HexError::Invalid(e.to_string()))
}

/// Encode bytes as `0x`-prefixed hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Serde adapter storing byte vectors as `0x` hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// How a script's `code_hash` is matched against cell deps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl HashType {
    pub fn to_byte(self) -> u8 {
        match self {
            HashType::Data => 0,
            HashType::Type => 1,
            HashType::Data1 => 2,
            HashType::Data2 => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(HashType::Data),
            1 => Some(HashType::Type),
            2 => Some(HashType::Data1),
            4 => Some(HashType::Data2),
            _ => None,
        }
    }
}

/// Lock or type script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script {
    pub code_hash: H256,
    pub hash_type: HashType,
    #[serde(with = "hex_bytes")]
    pub args: Vec<u8>,
}

impl Script {
    pub fn new(code_hash: H256, hash_type: HashType, args: Vec<u8>) -> Self {
        Self { code_hash, hash_type, args }
    }

    /// Bytes this script occupies inside a cell.
    pub fn occupied_bytes(&self) -> u64 {
        32 + 1 + self.args.len() as u64
    }

    /// Whether `self` runs the same code as `other`, regardless of args.
    pub fn same_code(&self, other: &Script) -> bool {
        self.code_hash == other.code_hash && self.hash_type == other.hash_type
    }
}

/// Location of a cell: the transaction that created it and the output index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: H256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: H256, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

impl FromStr for OutPoint {
    type Err = HexError;

    /// Parses `0x<tx_hash>:<index>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .split_once(':')
            .ok_or_else(|| HexError::Invalid(format!("missing ':' in out point '{}'", s)))?;
        let index = index
            .parse()
            .map_err(|_| HexError::Invalid(format!("bad output index '{}'", index)))?;
        Ok(Self { tx_hash: hash.parse()?, index })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    Code,
    DepGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellDep {
    pub out_point: OutPoint,
    pub dep_type: DepType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    pub previous_output: OutPoint,
    pub since: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    pub capacity: u64,
    pub lock: Script,
    pub type_script: Option<Script>,
}

impl CellOutput {
    /// Minimum capacity (shannons) a cell with `data_len` bytes of data must hold.
    pub fn occupied_capacity(&self, data_len: usize) -> u64 {
        let type_bytes = self.type_script.as_ref().map_or(0, Script::occupied_bytes);
        let bytes = [self.lock.occupied_bytes(), type_bytes, data_len as u64]
            .into_iter()
            .fold(CAPACITY_FIELD_BYTES, u64::saturating_add);
        bytes.saturating_mul(SHANNONS_PER_CKB)
    }
}

/// Sum of capacities, `None` if the total does not fit in a `u64`.
pub fn checked_capacity_sum(capacities: impl IntoIterator<Item = u64>) -> Option<u64> {
    capacities.into_iter().try_fold(0u64, u64::checked_add)
}

/// A cell together with its data and, once on chain, its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub output: CellOutput,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub out_point: Option<OutPoint>,
}

impl Cell {
    pub fn new(output: CellOutput, data: Vec<u8>) -> Self {
        Self { output, data, out_point: None }
    }

    pub fn occupied_capacity(&self) -> u64 {
        self.output.occupied_capacity(self.data.len())
    }

    /// Capacity held beyond the occupied minimum.
    pub fn capacity_margin(&self) -> u64 {
        self.output.capacity.saturating_sub(self.occupied_capacity())
    }

    /// A plain cell carries no type script and no data; only those fund transactions.
    pub fn is_plain(&self) -> bool {
        self.output.type_script.is_none() && self.data.is_empty()
    }
}

/// Fully assembled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub cell_deps: Vec<CellDep>,
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    #[serde(with = "hex_vec")]
    pub outputs_data: Vec<Vec<u8>>,
    #[serde(with = "hex_vec")]
    pub witnesses: Vec<Vec<u8>>,
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        items
            .iter()
            .map(|b| super::encode_hex(b))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| super::decode_hex(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> Script {
        Script::new(H256([7u8; 32]), HashType::Type, vec![0u8; 20])
    }

    #[test]
    fn test_h256_roundtrip_display() {
        let hash = H256([0xab; 32]);
        let text = hash.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.parse::<H256>().unwrap(), hash);
    }

    #[test]
    fn test_h256_rejects_wrong_length() {
        let err = "0x1234".parse::<H256>().unwrap_err();
        assert_eq!(err, HexError::Length { expected: 32, actual: 2 });
    }

    #[test]
    fn test_out_point_parse() {
        let op: OutPoint = format!("{}:3", H256([1u8; 32])).parse().unwrap();
        assert_eq!(op.index, 3);
        assert!("nocolon".parse::<OutPoint>().is_err());
    }

    #[test]
    fn test_plain_cell_occupied_capacity() {
        // 8 capacity + 32 code hash + 1 hash type + 20 args = 61 CKB
        let cell = Cell::new(
            CellOutput { capacity: 100 * SHANNONS_PER_CKB, lock: lock(), type_script: None },
            Vec::new(),
        );
        assert_eq!(cell.occupied_capacity(), 61 * SHANNONS_PER_CKB);
        assert_eq!(cell.capacity_margin(), 39 * SHANNONS_PER_CKB);
        assert!(cell.is_plain());
    }

    #[test]
    fn test_capacity_sum_overflow() {
        assert_eq!(checked_capacity_sum([1, 2, 3]), Some(6));
        assert_eq!(checked_capacity_sum([u64::MAX, 1]), None);
    }

    #[test]
    fn test_hash_type_bytes() {
        for ht in [HashType::Data, HashType::Type, HashType::Data1, HashType::Data2] {
            assert_eq!(HashType::from_byte(ht.to_byte()), Some(ht));
        }
        assert_eq!(HashType::from_byte(3), None);
    }

    #[test]
    fn test_script_serde_hex_args() {
        let json = serde_json::to_string(&lock()).unwrap();
        assert!(json.contains("\"hash_type\":\"type\""));
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lock());
    }
}
