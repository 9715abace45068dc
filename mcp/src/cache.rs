//! Cache / Task Lifecycle (component F): deferred-result store keyed by a
//! fingerprint of `(toolName, canonicalJSON(arguments))`.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Hash of `(toolName, canonicalJSON(arguments))`. Canonicalization here
    /// means "serde_json's own key ordering" since `arguments` already
    /// arrives as a `Map` with a deterministic iteration order for any given
    /// construction path; nested maps inherit the same property.
    pub fn new(tool_name: &str, arguments: &Value) -> Self {
        let mut hasher = DefaultHasher::new();
        tool_name.hash(&mut hasher);
        canonical_json(arguments).hash(&mut hasher);
        Self(hasher.finish())
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for k in keys {
                out.push_str(k);
                out.push(':');
                out.push_str(&canonical_json(&map[k]));
                out.push(',');
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            for item in items {
                out.push_str(&canonical_json(item));
                out.push(',');
            }
            out.push(']');
            out
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
    Consumed,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub ttl: std::time::Duration,
}

impl TaskRecord {
    pub fn new_pending(task_id: String, tool_name: String, arguments: Value, ttl: std::time::Duration) -> Self {
        Self {
            task_id,
            tool_name,
            arguments,
            status: TaskStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            error: None,
            retry_count: 0,
            ttl,
        }
    }

    fn is_fresh(&self) -> bool {
        Utc::now() < self.start_time + chrono::Duration::from_std(self.ttl).unwrap_or_default()
    }
}

pub enum LookupResult {
    Hit(TaskRecord),
    Pending,
    FailedOnce(TaskRecord),
    Miss,
}

/// Two-level store: an in-flight task registry plus a fingerprint-keyed
/// result cache, mirroring §4.F exactly.
pub struct TaskCache {
    tasks: DashMap<String, TaskRecord>,
    by_fingerprint: DashMap<Fingerprint, String>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            by_fingerprint: DashMap::new(),
        }
    }

    pub fn lookup(&self, fingerprint: Fingerprint) -> LookupResult {
        let Some(task_id) = self.by_fingerprint.get(&fingerprint).map(|r| r.clone()) else {
            return LookupResult::Miss;
        };
        let Some(mut entry) = self.tasks.get_mut(&task_id) else {
            return LookupResult::Miss;
        };

        if !entry.is_fresh() {
            return LookupResult::Miss;
        }

        match entry.status {
            TaskStatus::Pending => LookupResult::Pending,
            TaskStatus::Completed => {
                let record = entry.clone();
                entry.status = TaskStatus::Consumed;
                LookupResult::Hit(record)
            }
            TaskStatus::Failed => {
                let record = entry.clone();
                entry.status = TaskStatus::Consumed;
                LookupResult::FailedOnce(record)
            }
            TaskStatus::Consumed => LookupResult::Miss,
        }
    }

    pub fn put(&self, fingerprint: Fingerprint, record: TaskRecord) {
        if let Some(old_id) = self.by_fingerprint.get(&fingerprint).map(|r| r.clone()) {
            self.tasks.remove(&old_id);
        }
        self.by_fingerprint.insert(fingerprint, record.task_id.clone());
        self.tasks.insert(record.task_id.clone(), record);
    }

    pub fn mark_consumed(&self, task_id: &str) {
        if let Some(mut entry) = self.tasks.get_mut(task_id) {
            entry.status = TaskStatus::Consumed;
        }
    }

    /// Legal transitions only: pending->completed|failed, completed->consumed,
    /// failed->consumed. Anything else is a no-op (logged by the caller).
    pub fn transition(
        &self,
        task_id: &str,
        new_status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> bool {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        let legal = matches!(
            (entry.status, new_status),
            (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Completed, TaskStatus::Consumed)
                | (TaskStatus::Failed, TaskStatus::Consumed)
        );
        if !legal {
            return false;
        }
        entry.status = new_status;
        entry.end_time = Some(Utc::now());
        if let Some(r) = result {
            entry.result = Some(r);
        }
        if let Some(e) = error {
            entry.error = Some(e);
        }
        true
    }

    /// Periodic cleanup: expired, old-consumed, and failed entries are
    /// dropped; returns the count removed.
    pub fn cleanup(&self) -> usize {
        let mut to_remove = Vec::new();
        for entry in self.tasks.iter() {
            let record = entry.value();
            let expired = !record.is_fresh();
            let stale_consumed = record.status == TaskStatus::Consumed
                && record
                    .end_time
                    .map(|t| Utc::now() - t > chrono::Duration::minutes(1))
                    .unwrap_or(false);
            let failed = record.status == TaskStatus::Failed;
            if expired || stale_consumed || failed {
                to_remove.push(record.task_id.clone());
            }
        }
        for id in &to_remove {
            self.tasks.remove(id);
        }
        self.by_fingerprint
            .retain(|_, task_id| self.tasks.contains_key(task_id));
        to_remove.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.tasks.iter() {
            stats.total_entries += 1;
            match entry.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Consumed => stats.consumed_entries += 1,
            }
        }
        let denom = (stats.completed_tasks + stats.consumed_entries).max(1);
        stats.cache_hit_rate = stats.consumed_entries as f64 / denom as f64;
        stats
    }
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTaskCache = Arc<TaskCache>;

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub consumed_entries: usize,
    pub cache_hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(n: i64) -> Value {
        serde_json::json!({ "n": n })
    }

    #[test]
    fn fingerprint_is_order_independent_over_keys() {
        let a = serde_json::json!({ "x": 1, "y": 2 });
        let b = serde_json::json!({ "y": 2, "x": 1 });
        assert_eq!(Fingerprint::new("tool", &a).0, Fingerprint::new("tool", &b).0);
    }

    #[test]
    fn pending_lookup_does_not_consume() {
        let cache = TaskCache::new();
        let fp = Fingerprint::new("slow", &args(1));
        let record = TaskRecord::new_pending("t1".into(), "slow".into(), args(1), Duration::from_secs(60));
        cache.put(fp, record);

        assert!(matches!(cache.lookup(fp), LookupResult::Pending));
        assert!(matches!(cache.lookup(fp), LookupResult::Pending));
    }

    #[test]
    fn completed_hit_is_consumed_exactly_once() {
        let cache = TaskCache::new();
        let fp = Fingerprint::new("slow", &args(1));
        cache.put(fp, TaskRecord::new_pending("t1".into(), "slow".into(), args(1), Duration::from_secs(60)));
        cache.transition("t1", TaskStatus::Completed, Some(serde_json::json!("42")), None);

        assert!(matches!(cache.lookup(fp), LookupResult::Hit(_)));
        // second lookup sees the now-Consumed entry and misses.
        assert!(matches!(cache.lookup(fp), LookupResult::Miss));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let cache = TaskCache::new();
        cache.put(
            Fingerprint::new("slow", &args(1)),
            TaskRecord::new_pending("t1".into(), "slow".into(), args(1), Duration::from_secs(60)),
        );
        cache.transition("t1", TaskStatus::Completed, Some(serde_json::json!("42")), None);
        let ok = cache.transition("t1", TaskStatus::Pending, None, None);
        assert!(!ok);
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = TaskCache::new();
        let fp = Fingerprint::new("slow", &args(1));
        cache.put(fp, TaskRecord::new_pending("t1".into(), "slow".into(), args(1), Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(cache.lookup(fp), LookupResult::Miss));
    }

    #[test]
    fn cleanup_drops_failed_entries_immediately() {
        let cache = TaskCache::new();
        cache.put(
            Fingerprint::new("slow", &args(1)),
            TaskRecord::new_pending("t1".into(), "slow".into(), args(1), Duration::from_secs(60)),
        );
        cache.transition("t1", TaskStatus::Failed, None, Some("boom".into()));
        let removed = cache.cleanup();
        assert_eq!(removed, 1);
        assert_eq!(cache.stats().total_entries, 0);
    }
}
