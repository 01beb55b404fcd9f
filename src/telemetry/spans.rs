//! Span utilities for load and generation operations.

use tracing::{info_span, Span};

/// Extension trait for recording an operation's result into its span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized operation spans.
pub struct OperationSpan;

impl OperationSpan {
    /// Span covering one background load, from dequeue to install.
    pub fn load(load_id: &str, slot: &str, model_id: &str) -> Span {
        info_span!(
            "model_load",
            load_id = %load_id,
            slot = %slot,
            model_id = %model_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span covering one generate/analyze/synthesize call.
    pub fn request(slot: &str, mode: &str) -> Span {
        info_span!(
            "slot_request",
            slot = %slot,
            mode = %mode,
            model_id = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
