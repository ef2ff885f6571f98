//! Observability: structured logging and operational metrics
//!
//! Logging comes up from environment variables before anything else so the
//! rest of the boot sequence can report problems. Metrics are a process-wide
//! collector fed by the connectivity and session layers.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{LogFormat, init_default_logging, init_logging};
pub use metrics::{MetricsCollector, MetricsSnapshot, metrics};
