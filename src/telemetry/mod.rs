//! Telemetry: structured logging, operation spans and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_load, record_request, record_stream_cancelled, record_stream_chunk};
pub use spans::{OperationSpan, SpanExt};
