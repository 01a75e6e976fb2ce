//! Query cache over chain read views.
//!
//! The orchestrator only sees [`QueryInvalidator`]; readers go through
//! [`QueryCache::fetch`], which loads missing views from a [`ReadModel`].

pub mod cache;
pub mod views;

pub use cache::{QueryCache, QueryError, QueryInvalidator, QueryKey, QueryKind};
pub use views::{ClusterView, ReadModel, SporeView};
