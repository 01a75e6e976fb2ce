//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator, devnet and CLI produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → tracing.rs (action spans with correlation IDs)
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::init_logging;
