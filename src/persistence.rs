//! Persistence port consumed by the cache engine and its key-value backed
//! implementation.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::status::CacheStatus;
use crate::time::{Clock, Milliseconds};
use crate::token::CacheInstruction;
use crate::Result;
use crate::{log_debug, log_warn};

pub mod filesystem;
pub mod inmemory;
pub mod key;

pub use filesystem::FileStore;
pub use inmemory::MemoryStore;
pub use key::CacheKey;

/// A stored entry: serialised payload plus everything needed to decode it and
/// to decide whether it is still fresh.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheDataHolder {
    pub url_hash: String,
    pub type_hash: String,
    pub cache_date: Milliseconds,
    pub expiry_date: Milliseconds,
    pub data: Vec<u8>,
    pub is_compressed: bool,
    pub is_encrypted: bool,
}

impl CacheDataHolder {
    pub fn is_stale(&self, now: Milliseconds) -> bool {
        now > self.expiry_date
    }

    pub fn status(&self, now: Milliseconds) -> CacheStatus {
        if self.is_stale(now) {
            CacheStatus::Stale
        } else {
            CacheStatus::Fresh
        }
    }
}

/// What the engine needs from storage, whatever the storage is. Mutations
/// have to be atomic with respect to a concurrent read of the same key.
pub trait PersistenceManager: Send + Sync {
    fn get_cache_data_holder(&self, url_hash: &str) -> Result<Option<CacheDataHolder>>;
    /// Replaces any existing entry for the same request.
    fn put(&self, holder: CacheDataHolder) -> Result<()>;
    /// Forces the expiry of the entry to epoch zero. Returns whether there
    /// was an entry.
    fn invalidate(&self, url_hash: &str) -> Result<bool>;
    /// Deletes entries of the given type, or of every type, optionally only
    /// the stale ones.
    fn clear(&self, type_hash: Option<&str>, stale_only: bool) -> Result<()>;
    fn entries(&self) -> Result<Vec<CacheDataHolder>>;

    fn invalidate_if_needed(&self, instruction: &CacheInstruction) -> Result<bool> {
        if !instruction.operation.invalidates_existing_data() {
            return Ok(false);
        }
        let hashed = instruction.hashed()?;
        let invalidated = self.invalidate(&hashed.url_hash)?;
        if invalidated {
            log_debug!("Invalidated cached {} for {}", hashed.response_type(), hashed.plain.url);
        }
        Ok(invalidated)
    }

    /// Lookup honouring lazy invalidation: the stored expiry is rewritten
    /// before the read, so an invalidating call always sees a stale entry.
    fn get_cached(&self, instruction: &CacheInstruction) -> Result<Option<CacheDataHolder>> {
        self.invalidate_if_needed(instruction)?;
        self.get_cache_data_holder(&instruction.hashed()?.url_hash)
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn rename(&self, old_key: &str, new_key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;

    fn find_partial_key(&self, prefix: &str) -> Result<Option<String>> {
        Ok(self.keys()?.into_iter().find(|key| key.starts_with(prefix)))
    }
}

/// Entries live in a flat key-value store, with the entry metadata encoded in
/// the key. Lookups, replacements, invalidations and clears each span several
/// store calls, so all of them run under one lock held by the manager.
pub struct KeyValuePersistenceManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl<S: KeyValueStore> KeyValuePersistenceManager<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        KeyValuePersistenceManager {
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn exclusive(&self, op: &'static str) -> MutexGuard<'_, ()> {
        match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_warn!("Recovered poisoned persistence lock during {}", op);
                poisoned.into_inner()
            }
        }
    }

    /// Key currently stored for a request, if any. Keys that do not follow the
    /// expected format are dropped.
    fn find_key(&self, url_hash: &str) -> Result<Option<CacheKey>> {
        let Some(raw) = self.store.find_partial_key(&CacheKey::prefix(url_hash))? else {
            return Ok(None);
        };
        match raw.parse::<CacheKey>() {
            Ok(key) => Ok(Some(key)),
            Err(err) => {
                log_warn!("Deleting entry with unreadable key: {}", err);
                self.store.delete(&raw)?;
                Ok(None)
            }
        }
    }

    fn parsed_keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .store
            .keys()?
            .iter()
            .filter_map(|raw| raw.parse::<CacheKey>().ok())
            .collect())
    }
}

impl<S: KeyValueStore> PersistenceManager for KeyValuePersistenceManager<S> {
    fn get_cache_data_holder(&self, url_hash: &str) -> Result<Option<CacheDataHolder>> {
        let _guard = self.exclusive("get");
        let Some(key) = self.find_key(url_hash)? else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(&key.to_string())?
            .map(|data| key.into_holder(data)))
    }

    fn put(&self, holder: CacheDataHolder) -> Result<()> {
        let _guard = self.exclusive("put");
        if let Some(previous) = self.find_key(&holder.url_hash)? {
            self.store.delete(&previous.to_string())?;
        }
        let key = CacheKey::from(&holder);
        self.store.save(&key.to_string(), &holder.data)
    }

    fn invalidate(&self, url_hash: &str) -> Result<bool> {
        let _guard = self.exclusive("invalidate");
        let Some(key) = self.find_key(url_hash)? else {
            return Ok(false);
        };
        let invalidated = key.invalidated();
        if invalidated != key {
            self.store
                .rename(&key.to_string(), &invalidated.to_string())?;
        }
        Ok(true)
    }

    fn clear(&self, type_hash: Option<&str>, stale_only: bool) -> Result<()> {
        let _guard = self.exclusive("clear");
        let now = self.clock.now();
        let mut cleared = 0;
        for key in self.parsed_keys()? {
            let type_matches = type_hash.map_or(true, |hash| hash == key.type_hash);
            let staleness_matches = !stale_only || now > key.expiry_date;
            if type_matches && staleness_matches {
                self.store.delete(&key.to_string())?;
                cleared += 1;
            }
        }
        log_debug!(
            "Cleared {} entries (type {}, stale only {})",
            cleared,
            type_hash.unwrap_or("any"),
            stale_only
        );
        Ok(())
    }

    fn entries(&self) -> Result<Vec<CacheDataHolder>> {
        let _guard = self.exclusive("entries");
        let mut entries = Vec::new();
        for key in self.parsed_keys()? {
            if let Some(data) = self.store.get(&key.to_string())? {
                entries.push(key.into_holder(data));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CachePriority, Operation};
    use crate::request::{HashedRequestMetadata, PlainRequestMetadata, RequestMetadata};
    use crate::test::utils::MockClock;
    use crate::test::utils::ConfigMock;
    use crate::time::Seconds;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::tempdir;

    fn manager(clock: Arc<MockClock>) -> KeyValuePersistenceManager<MemoryStore> {
        KeyValuePersistenceManager::new(MemoryStore::new(20), clock)
    }

    fn holder(url_hash: &str, type_hash: &str, expiry: u64) -> CacheDataHolder {
        CacheDataHolder {
            url_hash: url_hash.to_string(),
            type_hash: type_hash.to_string(),
            cache_date: Milliseconds::new(1_000),
            expiry_date: Milliseconds::new(expiry),
            data: b"payload".to_vec(),
            is_compressed: false,
            is_encrypted: true,
        }
    }

    fn instruction(operation: Operation, url_hash: &str) -> CacheInstruction {
        CacheInstruction::new(
            operation,
            RequestMetadata::Hashed(HashedRequestMetadata {
                plain: PlainRequestMetadata::new("User", "http://localhost/users"),
                url_hash: url_hash.to_string(),
                type_hash: "USER".to_string(),
            }),
        )
    }

    #[test]
    fn test_put_replaces_previous_entry_for_same_request() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        manager.put(holder("AAA", "USER", 5_000)).unwrap();
        manager.put(holder("AAA", "USER", 9_000)).unwrap();
        assert_eq!(1, manager.entries().unwrap().len());
        let stored = manager.get_cache_data_holder("AAA").unwrap().unwrap();
        assert_eq!(Milliseconds::new(9_000), stored.expiry_date);
        assert!(stored.is_encrypted);
        assert!(!stored.is_compressed);
    }

    #[test]
    fn test_lookup_does_not_match_hash_prefixes() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        manager.put(holder("AAAB", "USER", 5_000)).unwrap();
        assert_eq!(None, manager.get_cache_data_holder("AAA").unwrap());
    }

    #[test]
    fn test_invalidate_moves_expiry_to_epoch_zero() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        manager.put(holder("AAA", "USER", 5_000)).unwrap();
        assert!(manager.invalidate("AAA").unwrap());
        let stored = manager.get_cache_data_holder("AAA").unwrap().unwrap();
        assert_eq!(Milliseconds::new(0), stored.expiry_date);
        assert_eq!(CacheStatus::Stale, stored.status(Milliseconds::new(2_000)));
        assert_eq!(b"payload".to_vec(), stored.data);
        // invalidating twice still reports the entry
        assert!(manager.invalidate("AAA").unwrap());
    }

    #[test]
    fn test_invalidate_missing_entry() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        assert!(!manager.invalidate("AAA").unwrap());
    }

    #[test]
    fn test_get_cached_invalidates_before_reading() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        manager.put(holder("AAA", "USER", 5_000)).unwrap();

        let test_table = vec![
            (
                Operation::cache(CachePriority::CACHED_OR_NETWORK, Seconds::new(60)),
                CacheStatus::Fresh,
            ),
            (
                Operation::cache(CachePriority::INVALIDATED, Seconds::new(60)),
                CacheStatus::Stale,
            ),
        ];
        for (operation, expected) in test_table {
            let cached = manager
                .get_cached(&instruction(operation, "AAA"))
                .unwrap()
                .unwrap();
            assert_eq!(expected, cached.status(Milliseconds::new(2_000)));
        }
    }

    #[test]
    fn test_clear_filters_by_type_and_staleness() {
        // type filter, stale only, remaining url hashes
        let test_table = vec![
            (None, false, vec![]),
            (Some("USER"), false, vec!["C"]),
            (None, true, vec!["A"]),
            (Some("USER"), true, vec!["A", "C"]),
            (Some("REPO"), true, vec!["A", "B"]),
        ];
        for (type_hash, stale_only, remaining) in test_table {
            let manager = manager(Arc::new(MockClock::new(2_000)));
            manager.put(holder("A", "USER", 5_000)).unwrap();
            manager.put(holder("B", "USER", 1_500)).unwrap();
            manager.put(holder("C", "REPO", 1_999)).unwrap();
            manager.clear(type_hash, stale_only).unwrap();
            let mut actual: Vec<String> = manager
                .entries()
                .unwrap()
                .into_iter()
                .map(|holder| holder.url_hash)
                .collect();
            actual.sort();
            assert_eq!(remaining, actual, "type {type_hash:?} stale only {stale_only}");
        }
    }

    #[test]
    fn test_expiry_equal_to_now_is_still_fresh() {
        let entry = holder("A", "USER", 2_000);
        assert_eq!(CacheStatus::Fresh, entry.status(Milliseconds::new(2_000)));
        assert_eq!(CacheStatus::Stale, entry.status(Milliseconds::new(2_001)));
    }

    #[test]
    fn test_unreadable_keys_are_dropped_on_lookup() {
        let manager = manager(Arc::new(MockClock::new(2_000)));
        manager.store().save("AAA_garbage", b"x").unwrap();
        assert_eq!(None, manager.get_cache_data_holder("AAA").unwrap());
        assert_eq!(None, manager.store().get("AAA_garbage").unwrap());
    }

    /// Two writers replace and invalidate the entry of one request while a
    /// reader keeps looking it up. Returns the misses the reader saw.
    fn concurrent_misses<S: KeyValueStore>(manager: &KeyValuePersistenceManager<S>) -> usize {
        manager.put(holder("AAA", "USER", 5_000)).unwrap();
        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let mut misses = 0;
                while !done.load(Ordering::Acquire) {
                    if manager.get_cache_data_holder("AAA").unwrap().is_none() {
                        misses += 1;
                    }
                }
                misses
            });
            let writers: Vec<_> = (0..2u64)
                .map(|writer| {
                    scope.spawn(move || {
                        for i in 0..2_000u64 {
                            manager
                                .put(holder("AAA", "USER", 3_000 + writer * 10_000 + i))
                                .unwrap();
                            if writer == 1 && i % 3 == 0 {
                                assert!(manager.invalidate("AAA").unwrap());
                            }
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::Release);
            reader.join().unwrap()
        })
    }

    #[test]
    fn test_concurrent_writes_never_hide_or_duplicate_an_entry() {
        let clock = Arc::new(MockClock::new(2_000));
        let memory = manager(clock.clone());
        assert_eq!(0, concurrent_misses(&memory), "memory store");
        assert_eq!(1, memory.entries().unwrap().len(), "memory store");

        let dir = tempdir().unwrap();
        let config = ConfigMock::default().with_cache_location(dir.path().to_str().unwrap());
        let files =
            KeyValuePersistenceManager::new(FileStore::new(Arc::new(config)).unwrap(), clock);
        assert_eq!(0, concurrent_misses(&files), "file store");
        assert_eq!(1, files.entries().unwrap().len(), "file store");
    }
}
