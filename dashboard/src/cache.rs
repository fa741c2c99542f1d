use crate::model::Reading;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    readings: Vec<Reading>,
    expires_at: Instant,
}

/// In-process TTL cache for query results.
///
/// Entries are never removed, only overwritten: an expired entry stays
/// readable through [`Cache::get_any`] so the service can fall back to the
/// last-known-good snapshot when a live fetch fails.
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entry for `key` only if its TTL has not elapsed.
    pub fn get_fresh(&self, key: &str) -> Option<Vec<Reading>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.readings.clone())
        } else {
            None
        }
    }

    /// Returns the entry for `key` regardless of expiry.
    pub fn get_any(&self, key: &str) -> Option<Vec<Reading>> {
        self.entries.read().get(key).map(|e| e.readings.clone())
    }

    pub fn put(&self, key: &str, readings: Vec<Reading>, ttl: Duration) {
        let entry = Entry {
            readings,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
