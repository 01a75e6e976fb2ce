//! Metrics collection.
//!
//! # Metrics
//! - `spore_actions_total` (counter): orchestrated actions by kind and outcome
//! - `spore_action_fee_shannons` (histogram): fee paid by broadcast transactions
//! - `spore_query_invalidations_total` (counter): cached views invalidated
//!
//! No exporter is installed here; without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Record the outcome of one orchestrated action.
pub fn record_action(kind: &'static str, outcome: &'static str) {
    counter!("spore_actions_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record the fee of a broadcast transaction.
pub fn record_fee(kind: &'static str, fee_shannons: u64) {
    histogram!("spore_action_fee_shannons", "kind" => kind).record(fee_shannons as f64);
}

pub fn record_invalidations(count: usize) {
    counter!("spore_query_invalidations_total").increment(count as u64);
}
