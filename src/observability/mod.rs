//! Observability for the control plane channel
//!
//! Structured logging through `tracing` plus process-wide counters.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{connection_span, dispatch_span, lifecycle_span};
