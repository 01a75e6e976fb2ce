//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or preset (testnet/devnet)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SporeConfig (validated, immutable)
//!     → shared via Arc with builder, connector and devnet
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ConfirmationConfig, DevnetConfig, FeeConfig, NetworkConfig, ObservabilityConfig, ScriptInfo, ScriptTable,
    SporeConfig,
};
