//! Observability: structured logging, stage tracing and metrics

pub mod logging;
pub mod metrics;
pub mod tracer;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot, PipelineMetrics, PipelineSummary};
pub use tracer::{AgentTrace, Tracer};

pub use logging::{session_span, stage_span};
