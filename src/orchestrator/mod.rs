//! Transaction orchestration.
//!
//! # Data Flow
//! ```text
//! Intent (mint / transfer / create-cluster)
//!     → builder.rs (validate, AssetSdk construction, optional fee payment)
//!     → gateway.rs SigningGateway::sign (draft moved, never touched again)
//!     → gateway.rs BroadcastGateway::submit
//!     → flow.rs (await confirmation, invalidate cached views, notify)
//! ```

pub mod builder;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod intent;

pub use builder::{public_cluster_lock, BuiltDraft, TransactionBuilder};
pub use error::{OrchestrationError, OrchestrationResult};
pub use flow::{ClusterReceipt, Confirmation, MintReceipt, Orchestrator, TransferReceipt};
pub use gateway::{BroadcastError, BroadcastGateway, SignedTransaction, SigningError, SigningGateway, TxStatus};
pub use intent::{CreateClusterIntent, FeePayment, MintIntent, TransferIntent};
