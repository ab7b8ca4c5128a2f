use std::collections::HashMap;

use parking_lot::Mutex;

/// Small label-lookup cache shared by every tenant's bucket store. Keys are
/// `{user}/{kind}` strings, values the materialized string lists.
#[derive(Debug)]
pub struct IndexCache {
    entries: Mutex<HashMap<String, Vec<String>>>,
    capacity: usize,
}

impl IndexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, values: Vec<String>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            // Full: drop an arbitrary entry rather than grow without bound.
            if let Some(evict) = entries.keys().next().cloned() {
                entries.remove(&evict);
            }
        }
        entries.insert(key, values);
    }

    /// Drops every entry for one tenant, called after that tenant syncs.
    pub fn invalidate_user(&self, user_id: &str) {
        let prefix = format!("{}/", user_id);
        self.entries.lock().retain(|k, _| !k.starts_with(&prefix));
    }
}
