//! Aggregate metrics for baseline-vs-optimized comparisons.
//!
//! `DemoMetrics` is a plain value: `record` consumes the current state and
//! returns the next one. The HTTP layer owns the only instance.

use crate::pipeline::{CacheStatus, PathResult, PathStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Most recent comparisons kept in the history
pub const HISTORY_LIMIT: usize = 100;

/// Percentage saved going from `baseline` to `optimized`. Zero when the
/// baseline is zero.
pub fn reduction(baseline: f64, optimized: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    (baseline - optimized) / baseline * 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Both paths run for one query, merged after both finished.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub id: Uuid,
    pub query: String,
    pub timestamp: u64,
    pub baseline: PathResult,
    pub optimized: PathResult,
    pub latency_reduction: f64,
    pub token_reduction: f64,
    pub cost_reduction: f64,
}

impl Comparison {
    pub fn new(query: &str, baseline: PathResult, optimized: PathResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            latency_reduction: round1(reduction(baseline.latency, optimized.latency)),
            token_reduction: round1(reduction(baseline.tokens as f64, optimized.tokens as f64)),
            cost_reduction: round1(reduction(baseline.cost, optimized.cost)),
            baseline,
            optimized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub query: String,
    pub timestamp: u64,
    pub baseline_latency: f64,
    pub optimized_latency: f64,
    pub baseline_tokens: u64,
    pub optimized_tokens: u64,
    pub baseline_cost: f64,
    pub optimized_cost: f64,
    pub cache_status: CacheStatus,
    pub tools_count: usize,
}

impl From<&Comparison> for HistoryRecord {
    fn from(c: &Comparison) -> Self {
        Self {
            id: c.id,
            query: c.query.clone(),
            timestamp: c.timestamp,
            baseline_latency: c.baseline.latency,
            optimized_latency: c.optimized.latency,
            baseline_tokens: c.baseline.tokens,
            optimized_tokens: c.optimized.tokens,
            baseline_cost: c.baseline.cost,
            optimized_cost: c.optimized.cost,
            cache_status: c.optimized.cache_status,
            tools_count: c.optimized.tools_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemoMetrics {
    pub query_count: u64,
    /// Seconds saved by the optimized path, summed over all comparisons
    pub latency_saved: f64,
    pub tokens_saved: i64,
    pub cost_saved: f64,
    pub cache_hits: u64,
    pub cache_lookups: u64,
    pub vector_search_total_ms: u64,
    pub vector_search_count: u64,
    pub history: VecDeque<HistoryRecord>,
}

/// Derived view served by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub query_count: u64,
    pub latency_saved: f64,
    pub tokens_saved: i64,
    pub cost_saved: f64,
    pub cache_hits: u64,
    pub cache_lookups: u64,
    pub cache_hit_rate: f64,
    pub avg_vector_search_ms: f64,
    pub history: Vec<HistoryRecord>,
}

impl DemoMetrics {
    /// Fold one comparison into the aggregate.
    ///
    /// A failed path already carries zero-valued metrics, so it is folded in
    /// like any completed one.
    pub fn record(mut self, comparison: &Comparison) -> Self {
        let (baseline, optimized) = (&comparison.baseline, &comparison.optimized);

        self.query_count += 1;
        self.latency_saved += baseline.latency - optimized.latency;
        self.tokens_saved += baseline.tokens as i64 - optimized.tokens as i64;
        self.cost_saved += baseline.cost - optimized.cost;

        if optimized.cache_consulted {
            self.cache_lookups += 1;
            if optimized.cache_status == CacheStatus::Hit {
                self.cache_hits += 1;
            }
        }

        if optimized.cache_status != CacheStatus::Hit && optimized.status == PathStatus::Completed {
            self.vector_search_total_ms += optimized.vector_search_time;
            self.vector_search_count += 1;
        }

        self.history.push_back(HistoryRecord::from(comparison));
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        self
    }

    /// Percentage of cache lookups that hit.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.cache_lookups == 0 {
            return 0.0;
        }
        round1(self.cache_hits as f64 / self.cache_lookups as f64 * 100.0)
    }

    pub fn avg_vector_search_ms(&self) -> f64 {
        if self.vector_search_count == 0 {
            return 0.0;
        }
        round1(self.vector_search_total_ms as f64 / self.vector_search_count as f64)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            query_count: self.query_count,
            latency_saved: self.latency_saved,
            tokens_saved: self.tokens_saved,
            cost_saved: self.cost_saved,
            cache_hits: self.cache_hits,
            cache_lookups: self.cache_lookups,
            cache_hit_rate: self.cache_hit_rate(),
            avg_vector_search_ms: self.avg_vector_search_ms(),
            history: self.history.iter().cloned().collect(),
        }
    }
}
