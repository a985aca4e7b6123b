//! Metrics for observability.
//!
//! Exports counters for:
//! - Records applied, discarded as stale, and published to the mesh
//! - Peer session lifecycle
//! - Fan-out messages shed by lossy delivery policies
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `strata_` and follow Prometheus
//! conventions: counters end in `_total`, labels carry the low-cardinality
//! dimension (session direction, delivery policy).

use metrics::counter;

/// Record an inbound or local update accepted by last-write-wins.
pub fn record_applied() {
    counter!("strata_records_applied_total").increment(1);
}

/// Record an update discarded because its stamp was not strictly newer.
///
/// Stale records are the normal currency of a flood mesh (every relay loop
/// ends in one), so this counter running hot is not by itself a problem.
pub fn record_stale() {
    counter!("strata_records_stale_total").increment(1);
}

/// Record a locally accepted update handed to the fan-out for relay.
pub fn record_published() {
    counter!("strata_records_published_total").increment(1);
}

/// Record a peer session starting. `direction` is "inbound" or "outbound".
pub fn record_session_opened(direction: &str) {
    counter!("strata_sessions_opened_total", "direction" => direction.to_string()).increment(1);
}

/// Record a peer session ending, cleanly or not.
pub fn record_session_closed(direction: &str, clean: bool) {
    let outcome = if clean { "clean" } else { "error" };
    counter!(
        "strata_sessions_closed_total",
        "direction" => direction.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a fan-out message shed by a lossy delivery policy.
pub fn record_fanout_dropped(policy: &str) {
    counter!("strata_fanout_dropped_total", "policy" => policy.to_string()).increment(1);
}
