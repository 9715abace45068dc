//! Performance monitor (component H, metrics half): lock-free counters and
//! per-tool latency tracking, snapshot on demand.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Aggregate call counters plus per-tool latency stats.
pub struct PerformanceMonitor {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    connection_errors: AtomicU64,
    active_connections: AtomicU64,
    active_executions: AtomicU64,
    tool_latencies: DashMap<String, LatencyStats>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            active_executions: AtomicU64::new(0),
            tool_latencies: DashMap::new(),
        }
    }

    pub fn record_call_start(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.active_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_end(&self, public_tool_name: &str, success: bool, duration_ms: u64) {
        self.active_executions.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.tool_latencies
            .entry(public_tool_name.to_string())
            .or_insert_with(LatencyStats::new)
            .record(duration_ms);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_executions: self.active_executions.load(Ordering::Relaxed),
        }
    }

    pub fn tool_latency(&self, public_tool_name: &str) -> Option<LatencySnapshot> {
        self.tool_latencies
            .get(public_tool_name)
            .map(|s| s.snapshot())
    }

    pub fn all_tool_latencies(&self) -> Vec<(String, LatencySnapshot)> {
        self.tool_latencies
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);

        let mut current_min = self.min_ms.load(Ordering::Relaxed);
        while ms < current_min {
            match self
                .min_ms
                .compare_exchange_weak(current_min, ms, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current_min = actual,
            }
        }

        let mut current_max = self.max_ms.load(Ordering::Relaxed);
        while ms > current_max {
            match self
                .max_ms
                .compare_exchange_weak(current_max, ms, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current_max = actual,
            }
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);
        let max = self.max_ms.load(Ordering::Relaxed);
        LatencySnapshot {
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub connection_errors: u64,
    pub active_connections: u64,
    pub active_executions: u64,
}

#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures_separately() {
        let m = PerformanceMonitor::new();
        m.record_call_start();
        m.record_call_end("calculator__evaluate", true, 10);
        m.record_call_start();
        m.record_call_end("calculator__evaluate", false, 20);

        let snap = m.snapshot();
        assert_eq!(snap.total_calls, 2);
        assert_eq!(snap.successful_calls, 1);
        assert_eq!(snap.failed_calls, 1);
        assert_eq!(snap.active_executions, 0);
    }

    #[test]
    fn tracks_min_max_avg_latency_per_tool() {
        let m = PerformanceMonitor::new();
        for ms in [30, 10, 20] {
            m.record_call_start();
            m.record_call_end("now", true, ms);
        }
        let snap = m.tool_latency("now").unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.min_ms, 10);
        assert_eq!(snap.max_ms, 30);
        assert_eq!(snap.avg_ms, 20);
    }

    #[test]
    fn missing_tool_has_no_latency_snapshot() {
        let m = PerformanceMonitor::new();
        assert!(m.tool_latency("nope").is_none());
    }
}
