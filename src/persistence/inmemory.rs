use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

use super::KeyValueStore;
use crate::log_warn;
use crate::Result;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Bounded in process store. The least recently used entry is evicted once
/// `capacity` entries are held. Every operation runs under a single lock, so
/// a rename is never observed half done.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryStore {
    /// A zero capacity falls back to the default of 20 entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        MemoryStore {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, LruCache<String, Vec<u8>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_warn!("Recovered poisoned memory store lock during {}", op);
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(DEFAULT_CAPACITY.get())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock("get").get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock("save").put(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock("delete").pop(key);
        Ok(())
    }

    fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        let mut entries = self.lock("rename");
        if let Some(value) = entries.pop(old_key) {
            entries.put(new_key.to_string(), value);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock("keys").iter().map(|(key, _)| key.clone()).collect())
    }

    fn find_partial_key(&self, prefix: &str) -> Result<Option<String>> {
        Ok(self
            .lock("find_partial_key")
            .iter()
            .map(|(key, _)| key)
            .find(|key| key.starts_with(prefix))
            .cloned())
    }
}
