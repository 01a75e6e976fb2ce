//! Cell-model chain primitives.
//!
//! # Data Flow
//! ```text
//! address string
//!     → address.rs (bech32m → lock Script)
//!     → skeleton.rs (inputs/outputs accumulate into a draft)
//!     → codec.rs (ckb-types packed form)
//!     → hash.rs (tx hash, type ids, sighash messages)
//! ```

pub mod address;
pub mod codec;
pub mod hash;
pub mod skeleton;
pub mod types;

pub use address::{encode_address, parse_address, AddressError};
pub use skeleton::{calculate_fee, TransactionSkeleton};
pub use types::{Cell, CellDep, CellOutput, DepType, HashType, OutPoint, Script, Transaction, H256};
