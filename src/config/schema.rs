//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestration core. All types derive Serde traits for deserialization
//! from config files, and every section falls back to the testnet preset.

use serde::{Deserialize, Serialize};

use crate::chain::address::{self, AddressError};
use crate::chain::types::{CellDep, DepType, HashType, OutPoint, Script, SHANNONS_PER_CKB, H256};

/// Root configuration: network, script table and orchestration policy.
///
/// Passed unmodified to every SDK call.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SporeConfig {
    /// Network identity and node endpoint.
    pub network: NetworkConfig,

    /// Deployed script locations.
    pub scripts: ScriptTable,

    /// Fee defaults.
    pub fees: FeeConfig,

    /// Confirmation policy after broadcast.
    pub confirmation: ConfirmationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// In-memory chain settings.
    pub devnet: DevnetConfig,
}

impl SporeConfig {
    /// Aggron4 testnet preset.
    pub fn testnet() -> Self {
        Self::default()
    }

    /// Local devnet preset: testnet script table, local endpoint.
    pub fn devnet() -> Self {
        Self {
            network: NetworkConfig {
                name: "devnet".to_string(),
                address_prefix: "ckt".to_string(),
                rpc_url: "http://127.0.0.1:8114".to_string(),
            },
            ..Self::default()
        }
    }

    /// Resolve an address into its lock script under this network.
    pub fn parse_address(&self, address: &str) -> Result<Script, AddressError> {
        address::parse_address(address, &self.network.address_prefix)
    }

    pub fn encode_address(&self, lock: &Script) -> String {
        address::encode_address(lock, &self.network.address_prefix)
    }
}

/// Network identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Preset name (e.g., "testnet", "devnet").
    pub name: String,

    /// Address prefix: "ckt" for test networks, "ckb" for mainnet.
    pub address_prefix: String,

    /// Node JSON-RPC endpoint.
    pub rpc_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "testnet".to_string(),
            address_prefix: "ckt".to_string(),
            rpc_url: "https://testnet.ckb.dev/rpc".to_string(),
        }
    }
}

/// One deployed script: how to reference it and where its code lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScriptInfo {
    pub code_hash: H256,
    pub hash_type: HashType,
    pub cell_dep: CellDep,
}

impl ScriptInfo {
    fn preset(code_hash: &str, hash_type: HashType, dep_tx: &str, dep_type: DepType) -> Self {
        Self {
            code_hash: hash_const(code_hash),
            hash_type,
            cell_dep: CellDep {
                out_point: OutPoint::new(hash_const(dep_tx), 0),
                dep_type,
            },
        }
    }

    /// Instantiate the script with `args`.
    pub fn script(&self, args: Vec<u8>) -> Script {
        Script::new(self.code_hash, self.hash_type, args)
    }

    /// Whether `script` runs this code.
    pub fn matches(&self, script: &Script) -> bool {
        script.code_hash == self.code_hash && script.hash_type == self.hash_type
    }
}

/// Preset hashes are literals checked by tests; a bad literal degrades to zero.
fn hash_const(hex: &str) -> H256 {
    hex.parse().unwrap_or(H256::ZERO)
}

/// Script table for the active network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptTable {
    pub spore: ScriptInfo,
    pub cluster: ScriptInfo,
    pub omnilock: ScriptInfo,
    pub anyone_can_pay: ScriptInfo,
    pub secp256k1_blake160: ScriptInfo,
}

impl Default for ScriptTable {
    fn default() -> Self {
        Self {
            spore: ScriptInfo::preset(
                "0x685a60219309029d01310311dba953d67029170ca4848a4ff638e57002130a0d",
                HashType::Data1,
                "0x5e8d2a517d50fd4bb4d01737a7952a1f1d35c8afc77240695bb569cd7d9d5a1f",
                DepType::Code,
            ),
            cluster: ScriptInfo::preset(
                "0x0bbe768b519d8ea7b96d58f1182eb7e6ef96c541fbd9526975077ee09f049058",
                HashType::Data1,
                "0xcebb174d6e300e26074aea2f5dbd7f694bb4fe3de52b6dfe205e54f90164510a",
                DepType::Code,
            ),
            omnilock: ScriptInfo::preset(
                "0xf329effd1c475a2978453c8600e1eaf0bc2087ee093c3ee64cc96ec6847752cb",
                HashType::Type,
                "0xec18bf0d857c981c3d1f4e17999b9b90c484b303378e94de1a57b0872f5d4602",
                DepType::Code,
            ),
            anyone_can_pay: ScriptInfo::preset(
                "0x3419a1c09eb2567f6552ee7a8ecffd64155cffe0f1796e6e61ec088d740c1356",
                HashType::Type,
                "0xec26b0f85ed839ece5f11c4c4e837ec359f5adc4420410f6453b1f6b60fb96a6",
                DepType::DepGroup,
            ),
            secp256k1_blake160: ScriptInfo::preset(
                "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8",
                HashType::Type,
                "0xf8de3bb47d055cdf460d93a2a6e1b05f7432f9777c8c474abf4eec1d4aee5d37",
                DepType::DepGroup,
            ),
        }
    }
}

/// Fee defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Fee rate in shannons per 1000 bytes used by fee-payment steps.
    pub fee_rate: u64,

    /// Lowest fee rate the chain accepts.
    pub min_fee_rate: u64,

    /// Capacity margin (shannons) added to spores minted with a margin.
    pub capacity_margin: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: 1000,
            min_fee_rate: 1000,
            capacity_margin: SHANNONS_PER_CKB,
        }
    }
}

/// Confirmation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Await confirmation after a successful broadcast.
    pub wait: bool,

    /// Maximum time to wait for confirmation in seconds.
    pub timeout_secs: u64,

    /// Status polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            wait: false,
            timeout_secs: 60,
            poll_interval_ms: 500,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// In-memory chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of plain cells given to a wallet at genesis.
    pub genesis_cells: u32,

    /// Capacity of each genesis cell in shannons.
    pub genesis_cell_capacity: u64,

    /// Commit accepted transactions immediately in a new block.
    pub auto_commit: bool,

    /// Where the CLI persists devnet state between runs.
    pub state_path: String,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            genesis_cells: 4,
            genesis_cell_capacity: 10_000 * SHANNONS_PER_CKB,
            auto_commit: true,
            state_path: "devnet-state.json".to_string(),
        }
    }
}
