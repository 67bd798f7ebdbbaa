//! Per-call gateway metrics.
//!
//! Every gateway call pushes one [`CallMetrics`] record into the
//! configured sink. [`MetricsLog`] is the default sink: a thread-safe
//! bounded ring that debug surfaces can query newest-first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// One gateway call, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetrics {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub estimated_cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// Consumer of call metrics. Implementations must be cheap; the gateway
/// records inline on the request path.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: CallMetrics);
}

/// Sink that discards all records.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record(&self, _metrics: CallMetrics) {}
}

/// Thread-safe bounded ring of recent call metrics.
pub struct MetricsLog {
    inner: Mutex<VecDeque<CallMetrics>>,
    capacity: usize,
}

impl MetricsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// The `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CallMetrics> {
        let buf = self.inner.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }

    /// Total estimated spend across the retained window.
    pub fn total_cost_usd(&self) -> f64 {
        self.inner.lock().iter().map(|m| m.estimated_cost_usd).sum()
    }
}

impl MetricsSink for MetricsLog {
    fn record(&self, metrics: CallMetrics) {
        let mut buf = self.inner.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(metrics);
    }
}
