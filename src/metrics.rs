// src/metrics.rs
// Wide-result metrics (C10, spec §3, §4.10): per-tool counters for the
// tools whose output size scales with repository size.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::warn;

/// One observation of a wide tool's call (recorded by the dispatcher after
/// the handler returns).
#[derive(Debug, Clone)]
pub struct WideResultSample {
    pub tool: String,
    pub total_results: u64,
    pub returned_results: u64,
    pub truncated: bool,
    pub tokens: u64,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Persists individual samples to an external store (metrics database,
/// time-series sink, ...). Failure is logged and never surfaced to the
/// caller — recording a metric must never fail a tool call.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn persist(&self, sample: &WideResultSample) -> Result<(), crate::error::CkbError>;
}

#[derive(Debug, Default, Clone)]
struct Accumulator {
    query_count: u64,
    total_results: u64,
    returned_results: u64,
    truncated_count: u64,
    total_tokens: u64,
    total_bytes: u64,
    total_ms: u64,
}

/// Snapshot of one tool's accumulated counters plus derived averages (spec
/// §3: "derived averages and truncation rate computed on read").
#[derive(Debug, Clone, Serialize)]
pub struct WideResultSummary {
    #[serde(rename = "queryCount")]
    pub query_count: u64,
    #[serde(rename = "totalResults")]
    pub total_results: u64,
    #[serde(rename = "returnedResults")]
    pub returned_results: u64,
    #[serde(rename = "truncatedCount")]
    pub truncated_count: u64,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(rename = "totalBytes")]
    pub total_bytes: u64,
    #[serde(rename = "totalMs")]
    pub total_ms: u64,
    #[serde(rename = "avgTokens")]
    pub avg_tokens: f64,
    #[serde(rename = "avgBytes")]
    pub avg_bytes: f64,
    #[serde(rename = "avgMs")]
    pub avg_ms: f64,
    #[serde(rename = "truncationRate")]
    pub truncation_rate: f64,
}

impl From<&Accumulator> for WideResultSummary {
    fn from(a: &Accumulator) -> Self {
        let n = a.query_count.max(1) as f64;
        WideResultSummary {
            query_count: a.query_count,
            total_results: a.total_results,
            returned_results: a.returned_results,
            truncated_count: a.truncated_count,
            total_tokens: a.total_tokens,
            total_bytes: a.total_bytes,
            total_ms: a.total_ms,
            avg_tokens: a.total_tokens as f64 / n,
            avg_bytes: a.total_bytes as f64 / n,
            avg_ms: a.total_ms as f64 / n,
            truncation_rate: a.truncated_count as f64 / n,
        }
    }
}

/// Thread-safe, constant-time per-tool counters, with optional fire-and-forget
/// persistence to an external sink (spec §4.10; persistence failure policy
/// resolved in the accompanying design notes: logged at `warn`, never
/// surfaced — recording a metric must never fail the call that produced it).
pub struct WideResultMetrics {
    counters: Mutex<HashMap<String, Accumulator>>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl WideResultMetrics {
    pub fn new(sink: Option<Arc<dyn MetricsSink>>) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            sink,
        }
    }

    pub fn record(&self, sample: WideResultSample) {
        {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            let acc = counters.entry(sample.tool.clone()).or_default();
            acc.query_count += 1;
            acc.total_results += sample.total_results;
            acc.returned_results += sample.returned_results;
            acc.truncated_count += sample.truncated as u64;
            acc.total_tokens += sample.tokens;
            acc.total_bytes += sample.bytes;
            acc.total_ms += sample.elapsed_ms;
        }

        if let Some(sink) = self.sink.clone() {
            tokio::spawn(async move {
                if let Err(e) = sink.persist(&sample).await {
                    warn!(tool = %sample.tool, error = %e, "wide-result metric persistence failed (non-fatal)");
                }
            });
        }
    }

    pub fn summary(&self) -> HashMap<String, WideResultSummary> {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, acc)| (name.clone(), WideResultSummary::from(acc)))
            .collect()
    }

    pub fn reset(&self) {
        self.counters.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for WideResultMetrics {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tool: &str, total: u64, returned: u64, truncated: bool) -> WideResultSample {
        WideResultSample {
            tool: tool.to_string(),
            total_results: total,
            returned_results: returned,
            truncated,
            tokens: 100,
            bytes: 400,
            elapsed_ms: 10,
        }
    }

    #[test]
    fn accumulates_and_derives_averages() {
        let metrics = WideResultMetrics::default();
        metrics.record(sample("searchSymbols", 100, 20, true));
        metrics.record(sample("searchSymbols", 50, 50, false));

        let summary = metrics.summary();
        let s = &summary["searchSymbols"];
        assert_eq!(s.query_count, 2);
        assert_eq!(s.total_results, 150);
        assert_eq!(s.truncated_count, 1);
        assert_eq!(s.truncation_rate, 0.5);
        assert_eq!(s.avg_bytes, 400.0);
    }

    #[test]
    fn reset_clears_all_counters() {
        let metrics = WideResultMetrics::default();
        metrics.record(sample("getHotspots", 10, 10, false));
        metrics.reset();
        assert!(metrics.summary().is_empty());
    }

    #[test]
    fn tools_are_tracked_independently() {
        let metrics = WideResultMetrics::default();
        metrics.record(sample("a", 1, 1, false));
        metrics.record(sample("b", 2, 2, false));
        let summary = metrics.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary["a"].total_results, 1);
        assert_eq!(summary["b"].total_results, 2);
    }
}
