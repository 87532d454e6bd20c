//! Thread-safe metrics collection
//!
//! Two layers: [`PipelineMetrics`] is owned by one orchestrator and counts
//! its stage executions, while the process-wide [`MetricsCollector`] keeps
//! atomic counters that any component can bump without a handle.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::tracer::AgentTrace;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Process-wide counters using atomics and a mutex-protected latency window
pub struct MetricsCollector {
    llm_calls: AtomicU64,
    llm_failures: AtomicU64,
    fallbacks_used: AtomicU64,
    compactions: AtomicU64,
    sessions_created: AtomicU64,
    turns_processed: AtomicU64,
    started_at: AtomicU64,

    // Per-stage latencies in milliseconds, newest last
    stage_latencies: Mutex<HashMap<String, Vec<u64>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            llm_calls: AtomicU64::new(0),
            llm_failures: AtomicU64::new(0),
            fallbacks_used: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            turns_processed: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
            stage_latencies: Mutex::new(HashMap::new()),
        }
    }

    pub fn llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn llm_failure(&self) {
        self.llm_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An agent answered from its deterministic fallback
    pub fn fallback_used(&self) {
        self.fallbacks_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn context_compacted(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_processed(&self) {
        self.turns_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stage_completed(&self, stage: &str, duration: Duration) {
        if let Ok(mut latencies) = self.stage_latencies.lock() {
            let samples = latencies.entry(stage.to_string()).or_default();
            samples.push(duration.as_millis() as u64);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn reset(&self) {
        self.llm_calls.store(0, Ordering::Relaxed);
        self.llm_failures.store(0, Ordering::Relaxed);
        self.fallbacks_used.store(0, Ordering::Relaxed);
        self.compactions.store(0, Ordering::Relaxed);
        self.sessions_created.store(0, Ordering::Relaxed);
        self.turns_processed.store(0, Ordering::Relaxed);
        self.started_at
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut latencies) = self.stage_latencies.lock() {
            latencies.clear();
        }
    }

    fn build_stage_statistics(&self) -> BTreeMap<String, StageLatencySnapshot> {
        let Ok(latencies) = self.stage_latencies.lock() else {
            return BTreeMap::new();
        };

        latencies
            .iter()
            .map(|(stage, samples)| {
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                let snapshot = StageLatencySnapshot {
                    count: sorted.len() as u64,
                    p50_ms: percentile(&sorted, 50.0),
                    p95_ms: percentile(&sorted, 95.0),
                    max_ms: sorted.last().copied().unwrap_or(0),
                };
                (stage.clone(), snapshot)
            })
            .collect()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        MetricsSnapshot {
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            llm_failures: self.llm_failures.load(Ordering::Relaxed),
            fallbacks_used: self.fallbacks_used.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            turns_processed: self.turns_processed.load(Ordering::Relaxed),
            uptime_seconds: now.saturating_sub(self.started_at.load(Ordering::Relaxed)),
            stages: self.build_stage_statistics(),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the global counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub llm_failures: u64,
    pub fallbacks_used: u64,
    pub compactions: u64,
    pub sessions_created: u64,
    pub turns_processed: u64,
    pub uptime_seconds: u64,
    pub stages: BTreeMap<String, StageLatencySnapshot>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageLatencySnapshot {
    pub count: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: u64,
}

/// Stage execution statistics for one orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_latency_ms: f64,
    pub agent_latencies: BTreeMap<String, Vec<f64>>,
}

impl PipelineMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_latency_ms / self.total_requests as f64
    }

    /// Fold a finished trace into the totals
    pub fn record(&mut self, trace: &AgentTrace) {
        self.total_requests += 1;
        if trace.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        if let Some(duration_ms) = trace.duration_ms.filter(|d| *d > 0.0) {
            self.total_latency_ms += duration_ms;
            self.agent_latencies
                .entry(trace.agent_name.clone())
                .or_default()
                .push(duration_ms);
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        let agent_avg_latency = self
            .agent_latencies
            .iter()
            .filter(|(_, latencies)| !latencies.is_empty())
            .map(|(agent, latencies)| {
                let avg = latencies.iter().sum::<f64>() / latencies.len() as f64;
                (agent.clone(), avg)
            })
            .collect();

        PipelineSummary {
            total_requests: self.total_requests,
            success_rate: format!("{:.1}%", self.success_rate() * 100.0),
            avg_latency_ms: format!("{:.0}ms", self.avg_latency_ms()),
            agent_avg_latency,
        }
    }
}

/// Display-ready view of [`PipelineMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_requests: u64,
    pub success_rate: String,
    pub avg_latency_ms: String,
    pub agent_avg_latency: BTreeMap<String, f64>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;

    lower + (upper - lower) * index.fract()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(agent: &str, duration_ms: f64, success: bool) -> AgentTrace {
        let mut trace = AgentTrace::new(agent, "");
        trace.duration_ms = Some(duration_ms);
        trace.success = success;
        trace
    }

    #[test]
    fn test_empty_pipeline_metrics() {
        let metrics = PipelineMetrics::default();
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.avg_latency_ms(), 0.0);

        let summary = metrics.summary();
        assert_eq!(summary.success_rate, "0.0%");
        assert_eq!(summary.avg_latency_ms, "0ms");
        assert!(summary.agent_avg_latency.is_empty());
    }

    #[test]
    fn test_pipeline_metrics_record() {
        let mut metrics = PipelineMetrics::default();
        metrics.record(&trace("MetricsAgent", 10.0, true));
        metrics.record(&trace("MetricsAgent", 30.0, true));
        metrics.record(&trace("ResearchAgent", 200.0, false));

        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.total_latency_ms, 240.0);

        let summary = metrics.summary();
        assert_eq!(summary.success_rate, "66.7%");
        assert_eq!(summary.avg_latency_ms, "80ms");
        assert_eq!(summary.agent_avg_latency["MetricsAgent"], 20.0);
        assert_eq!(summary.agent_avg_latency["ResearchAgent"], 200.0);
    }

    #[test]
    fn test_zero_duration_not_added_to_latencies() {
        let mut metrics = PipelineMetrics::default();
        metrics.record(&trace("CoachAgent", 0.0, true));

        assert_eq!(metrics.total_requests, 1);
        assert!(metrics.agent_latencies.is_empty());
    }

    #[test]
    fn test_collector_counters() {
        let collector = MetricsCollector::new();
        collector.llm_call();
        collector.llm_call();
        collector.llm_failure();
        collector.fallback_used();
        collector.session_created();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.llm_calls, 2);
        assert_eq!(snapshot.llm_failures, 1);
        assert_eq!(snapshot.fallbacks_used, 1);
        assert_eq!(snapshot.sessions_created, 1);
        assert_eq!(snapshot.compactions, 0);

        collector.reset();
        assert_eq!(collector.get_metrics().llm_calls, 0);
    }

    #[test]
    fn test_stage_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in [10, 20, 30, 40, 50] {
            collector.stage_completed("metrics", Duration::from_millis(ms));
        }

        let snapshot = collector.get_metrics();
        let stage = &snapshot.stages["metrics"];
        assert_eq!(stage.count, 5);
        assert_eq!(stage.p50_ms, 30.0);
        assert_eq!(stage.max_ms, 50);
    }

    #[test]
    fn test_stage_latency_window_is_capped() {
        let collector = MetricsCollector::new();
        for _ in 0..(MAX_LATENCY_SAMPLES + 5) {
            collector.stage_completed("coach", Duration::from_millis(1));
        }
        assert_eq!(
            collector.get_metrics().stages["coach"].count,
            MAX_LATENCY_SAMPLES as u64
        );
    }

    #[test]
    fn test_percentile_interpolation() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[10, 20], 50.0), 15.0);
        assert_eq!(percentile(&[5], 95.0), 5.0);
    }
}
