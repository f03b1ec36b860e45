use std::collections::HashMap;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(300);
const MAX_ENTRIES: usize = 256;

/// Small TTL+size-capped cache keyed by `(bot_id, external_id)`, mirroring the
/// teacher's `MemoryManager` context cache. Callers must `invalidate` on every
/// write so a stale `State` never survives a `save_turn`.
pub struct StateCache<T: Clone> {
    entries: HashMap<(String, String), (T, Instant)>,
}

impl<T: Clone> StateCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, bot_id: &str, external_id: &str) -> Option<T> {
        let key = (bot_id.to_string(), external_id.to_string());
        self.entries.get(&key).and_then(|(value, at)| {
            if at.elapsed() < TTL {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&mut self, bot_id: &str, external_id: &str, value: T) {
        let key = (bot_id.to_string(), external_id.to_string());
        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, at))| *at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&mut self, bot_id: &str, external_id: &str) {
        self.entries
            .remove(&(bot_id.to_string(), external_id.to_string()));
    }
}

impl<T: Clone> Default for StateCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
