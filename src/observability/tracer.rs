//! Per-stage execution traces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

use super::metrics::{metrics, PipelineMetrics};

const INPUT_SUMMARY_LEN: usize = 200;

/// One agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrace {
    pub agent_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    /// First 200 characters of the stage input
    pub input_summary: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AgentTrace {
    pub fn new(agent_name: impl Into<String>, input: &str) -> Self {
        Self {
            agent_name: agent_name.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            input_summary: input.chars().take(INPUT_SUMMARY_LEN).collect(),
            success: true,
            error: None,
        }
    }
}

/// Open trace for a running stage.
///
/// Created with [`Tracer::start`] and closed with [`Tracer::finish`], which
/// logs the outcome and folds it into the pipeline metrics.
pub struct Tracer {
    trace: AgentTrace,
    started: Instant,
}

impl Tracer {
    pub fn start(agent_name: impl Into<String>, input: &str) -> Self {
        let trace = AgentTrace::new(agent_name, input);
        info!(agent = %trace.agent_name, "{} started", trace.agent_name);
        Self {
            trace,
            started: Instant::now(),
        }
    }

    pub fn finish<T, E: std::fmt::Display>(
        mut self,
        outcome: &Result<T, E>,
        pipeline: &mut PipelineMetrics,
    ) -> AgentTrace {
        let elapsed = self.started.elapsed();
        self.trace.end_time = Some(Utc::now());
        self.trace.duration_ms = Some(elapsed.as_secs_f64() * 1000.0);

        match outcome {
            Ok(_) => {
                self.trace.success = true;
                info!(
                    agent = %self.trace.agent_name,
                    duration_ms = elapsed.as_millis() as u64,
                    "{} completed in {}ms",
                    self.trace.agent_name,
                    elapsed.as_millis()
                );
            }
            Err(e) => {
                self.trace.success = false;
                self.trace.error = Some(e.to_string());
                error!(agent = %self.trace.agent_name, error = %e, "{} failed", self.trace.agent_name);
            }
        }

        pipeline.record(&self.trace);
        metrics().stage_completed(&self.trace.agent_name, elapsed);
        self.trace
    }
}
