use std::collections::{BTreeSet, HashMap};

/// Many independent deadlines multiplexed over one queue, keyed by `i64`.
///
/// Deadlines are absolute milliseconds on the manager's clock. Setting a key
/// that is already armed moves its deadline in place.
#[derive(Debug, Default)]
pub struct MultiTimeout {
    name: &'static str,
    deadlines: HashMap<i64, u64>,
    queue: BTreeSet<(u64, i64)>,
}

impl MultiTimeout {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            deadlines: HashMap::new(),
            queue: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_timeout(&self, key: i64) -> bool {
        self.deadlines.contains_key(&key)
    }

    pub fn deadline(&self, key: i64) -> Option<u64> {
        self.deadlines.get(&key).copied()
    }

    /// Arms `key` at `at_ms`, replacing any earlier deadline.
    pub fn set_timeout_at(&mut self, key: i64, at_ms: u64) {
        if let Some(old) = self.deadlines.insert(key, at_ms) {
            self.queue.remove(&(old, key));
        }
        self.queue.insert((at_ms, key));
    }

    /// Arms `key` at `at_ms` unless it is already armed.
    pub fn add_timeout_at(&mut self, key: i64, at_ms: u64) {
        if !self.has_timeout(key) {
            self.set_timeout_at(key, at_ms);
        }
    }

    pub fn cancel_timeout(&mut self, key: i64) {
        if let Some(old) = self.deadlines.remove(&key) {
            self.queue.remove(&(old, key));
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.first().map(|(at, _)| *at)
    }

    /// Removes and returns every key whose deadline is at or before `now_ms`,
    /// earliest first.
    pub fn pop_expired(&mut self, now_ms: u64) -> Vec<i64> {
        let mut expired = Vec::new();
        while let Some(&(at, key)) = self.queue.first() {
            if at > now_ms {
                break;
            }
            self.queue.remove(&(at, key));
            self.deadlines.remove(&key);
            expired.push(key);
        }
        expired
    }

    pub fn keys(&self) -> Vec<i64> {
        self.queue.iter().map(|(_, key)| *key).collect()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.queue.clear();
    }
}
