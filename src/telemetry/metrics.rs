//! Metric recording through the `metrics` facade.
//!
//! Nothing is exported unless the embedding binary installs a recorder.

use std::time::Duration;

use crate::models::SlotKind;

/// Record the end of a load attempt.
pub fn record_load(slot: SlotKind, success: bool, elapsed: Duration) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("slot_loads_total", "slot" => slot.as_str(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("slot_load_seconds", "slot" => slot.as_str())
        .record(elapsed.as_secs_f64());
}

/// Record a finished generate, analyze or synthesize request.
pub fn record_request(slot: SlotKind, mode: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!(
        "generation_requests_total",
        "slot" => slot.as_str(),
        "mode" => mode,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_stream_chunk() {
    metrics::counter!("stream_chunks_total").increment(1);
}

pub fn record_stream_cancelled() {
    metrics::counter!("stream_cancellations_total").increment(1);
}
