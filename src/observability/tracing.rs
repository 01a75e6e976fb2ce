//! Per-action spans.
//!
//! Every orchestrated action runs inside a span carrying its kind and a
//! UUID v4 action id, so build, sign, submit and invalidate events correlate.

use tracing::Span;
use uuid::Uuid;

/// Create the span for one user-initiated action.
pub fn action_span(kind: &'static str) -> (Span, Uuid) {
    let action_id = Uuid::new_v4();
    let span = tracing::info_span!("action", kind = kind, action_id = %action_id);
    (span, action_id)
}
