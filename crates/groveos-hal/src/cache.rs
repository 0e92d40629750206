//! [`CommandCache`] – bounded audit ring of issued device commands.
//!
//! Append-only with FIFO eviction: entries are never "read" in a way that
//! should refresh recency, so this is deliberately not an LRU.

use std::collections::VecDeque;

use chrono::Utc;
use groveos_types::DeviceCommand;
use serde_json::Value;

/// Default retention: the 50 most recent commands.
pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded FIFO ring buffer of [`DeviceCommand`] entries.
pub struct CommandCache {
    capacity: usize,
    entries: VecDeque<DeviceCommand>,
}

impl CommandCache {
    /// Cache holding at most [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Cache holding at most `capacity` entries (oldest evicted first).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a command, stamping it with the current time.
    pub fn record(&mut self, name: impl Into<String>, payload: Value) {
        self.entries.push_back(DeviceCommand {
            name: name.into(),
            payload,
            timestamp: Utc::now(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// All retained entries in insertion order (oldest first).
    pub fn entries(&self) -> Vec<DeviceCommand> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CommandCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_in_insertion_order() {
        let mut cache = CommandCache::new();
        cache.record("light", json!({"on": true}));
        cache.record("pump", json!({"on": false}));

        let entries = cache.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "light");
        assert_eq!(entries[1].name, "pump");
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_newest() {
        let mut cache = CommandCache::new();
        for i in 0..60 {
            cache.record("cmd", json!({"seq": i}));
        }

        assert_eq!(cache.len(), 50);
        let entries = cache.entries();
        // Exactly the last 50, still in insertion order.
        assert_eq!(entries[0].payload, json!({"seq": 10}));
        assert_eq!(entries[49].payload, json!({"seq": 59}));
    }

    #[test]
    fn small_capacity_evicts_oldest() {
        let mut cache = CommandCache::with_capacity(2);
        cache.record("a", json!(1));
        cache.record("b", json!(2));
        cache.record("c", json!(3));

        let names: Vec<String> = cache.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn empty_cache_reports_empty() {
        let cache = CommandCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
        assert!(cache.entries().is_empty());
    }
}
