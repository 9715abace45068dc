//! Tool-call ring log: a bounded history of calls, independently mutex-guarded
//! per §5 (its lock is never held while any other component's lock is held).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ToolCallLogRecord {
    pub tool_name: String,
    pub original_tool_name: Option<String>,
    pub server_name: Option<String>,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct ToolCallRingLog {
    capacity: usize,
    records: Mutex<VecDeque<ToolCallLogRecord>>,
}

impl ToolCallRingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, record: ToolCallLogRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn snapshot(&self) -> Vec<ToolCallLogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tool: &str) -> ToolCallLogRecord {
        ToolCallLogRecord {
            tool_name: tool.to_string(),
            original_tool_name: None,
            server_name: None,
            arguments: serde_json::Value::Null,
            success: true,
            result: None,
            error: None,
            duration_ms: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let log = ToolCallRingLog::new(2);
        log.push(record("a"));
        log.push(record("b"));
        log.push(record("c"));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].tool_name, "b");
        assert_eq!(snapshot[1].tool_name, "c");
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let log = ToolCallRingLog::new(0);
        log.push(record("a"));
        log.push(record("b"));
        assert_eq!(log.len(), 1);
    }
}
