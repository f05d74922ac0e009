//! Summary of what is currently in the store, grouped per response type.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use crate::persistence::{CacheDataHolder, PersistenceManager};
use crate::serialisation::SerialisationManager;
use crate::status::CacheStatus;
use crate::time::Milliseconds;
use crate::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub response_type: String,
    pub status: CacheStatus,
    pub encrypted: bool,
    pub compressed: bool,
    pub cache_date: Milliseconds,
    pub expiry_date: Milliseconds,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntrySummary {
    pub response_type: String,
    pub fresh: usize,
    pub stale: usize,
    pub oldest_entry: Milliseconds,
    pub latest_entry: Milliseconds,
    pub entries: Vec<CacheEntry>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStatistics {
    pub entries: Vec<CacheEntrySummary>,
}

impl CacheStatistics {
    /// Entries whose type name cannot be recovered from the stored bytes are
    /// listed under their type hash.
    pub fn compile(
        persistence: &dyn PersistenceManager,
        serialisation: &SerialisationManager,
        now: Milliseconds,
    ) -> Result<Self> {
        let mut per_type: BTreeMap<String, Vec<CacheEntry>> = BTreeMap::new();
        for holder in persistence.entries()? {
            let entry = cache_entry(&holder, serialisation, now);
            per_type
                .entry(entry.response_type.clone())
                .or_default()
                .push(entry);
        }
        let entries = per_type
            .into_iter()
            .map(|(response_type, mut entries)| {
                entries.sort_by_key(|entry| entry.cache_date);
                summarise(response_type, entries)
            })
            .collect();
        Ok(CacheStatistics { entries })
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|summary| summary.entries.len()).sum()
    }
}

fn cache_entry(
    holder: &CacheDataHolder,
    serialisation: &SerialisationManager,
    now: Milliseconds,
) -> CacheEntry {
    CacheEntry {
        response_type: serialisation
            .response_type_name(holder)
            .unwrap_or_else(|| holder.type_hash.clone()),
        status: holder.status(now),
        encrypted: holder.is_encrypted,
        compressed: holder.is_compressed,
        cache_date: holder.cache_date,
        expiry_date: holder.expiry_date,
    }
}

fn summarise(response_type: String, entries: Vec<CacheEntry>) -> CacheEntrySummary {
    let fresh = entries
        .iter()
        .filter(|entry| entry.status == CacheStatus::Fresh)
        .count();
    CacheEntrySummary {
        response_type,
        fresh,
        stale: entries.len() - fresh,
        oldest_entry: entries
            .iter()
            .map(|entry| entry.cache_date)
            .min()
            .unwrap_or_default(),
        latest_entry: entries
            .iter()
            .map(|entry| entry.cache_date)
            .max()
            .unwrap_or_default(),
        entries,
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl Display for CacheStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "No cached entries");
        }
        for summary in &self.entries {
            writeln!(
                f,
                "{} | fresh: {} | stale: {} | oldest: {} | latest: {}",
                summary.response_type,
                summary.fresh,
                summary.stale,
                summary.oldest_entry.to_local_date(),
                summary.latest_entry.to_local_date()
            )?;
            writeln!(f, "  STATUS | CACHED | EXPIRES | ENCRYPTED | COMPRESSED")?;
            for entry in &summary.entries {
                writeln!(
                    f,
                    "  {} | {} | {} | {} | {}",
                    entry.status,
                    entry.cache_date.to_local_date(),
                    entry.expiry_date.to_local_date(),
                    flag(entry.encrypted),
                    flag(entry.compressed)
                )?;
            }
        }
        writeln!(f, "Total: {}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{KeyValuePersistenceManager, MemoryStore};
    use crate::serialisation::{DecorationContext, JsonSerialiser, StoreType};
    use crate::test::utils::MockClock;
    use std::sync::Arc;

    fn holder(
        serialisation: &SerialisationManager,
        url_hash: &str,
        response_type: &str,
        cache_date: u64,
        expiry_date: u64,
    ) -> CacheDataHolder {
        let context = DecorationContext {
            response_type,
            compress: true,
            encrypt: false,
        };
        CacheDataHolder {
            url_hash: url_hash.to_string(),
            type_hash: format!("HASH{}", response_type.len()),
            cache_date: Milliseconds::new(cache_date),
            expiry_date: Milliseconds::new(expiry_date),
            data: serialisation.serialise(&"body".to_string(), &context).unwrap(),
            is_compressed: true,
            is_encrypted: false,
        }
    }

    #[test]
    fn test_entries_grouped_per_type_and_sorted() {
        let clock = Arc::new(MockClock::new(5_000));
        let persistence = KeyValuePersistenceManager::new(MemoryStore::new(20), clock);
        let serialisation =
            SerialisationManager::for_store(StoreType::File, Box::new(JsonSerialiser), None);
        persistence
            .put(holder(&serialisation, "A", "User", 1_000, 9_000))
            .unwrap();
        persistence
            .put(holder(&serialisation, "B", "User", 2_000, 3_000))
            .unwrap();
        persistence
            .put(holder(&serialisation, "C", "Repo", 4_000, 9_000))
            .unwrap();

        let stats =
            CacheStatistics::compile(&persistence, &serialisation, Milliseconds::new(5_000))
                .unwrap();
        assert_eq!(3, stats.total());
        let summaries: Vec<(&str, usize, usize)> = stats
            .entries
            .iter()
            .map(|summary| (summary.response_type.as_str(), summary.fresh, summary.stale))
            .collect();
        assert_eq!(vec![("Repo", 1, 0), ("User", 1, 1)], summaries);
        let users = &stats.entries[1];
        assert_eq!(Milliseconds::new(1_000), users.oldest_entry);
        assert_eq!(Milliseconds::new(2_000), users.latest_entry);
        assert!(users.entries.iter().all(|entry| entry.compressed));
        assert!(stats.to_string().contains("Total: 3"));
    }

    #[test]
    fn test_unknown_type_names_fall_back_to_hash() {
        let clock = Arc::new(MockClock::new(5_000));
        let persistence = KeyValuePersistenceManager::new(MemoryStore::new(20), clock);
        let serialisation =
            SerialisationManager::for_store(StoreType::Memory, Box::new(JsonSerialiser), None);
        persistence
            .put(holder(&serialisation, "A", "User", 1_000, 9_000))
            .unwrap();
        let stats =
            CacheStatistics::compile(&persistence, &serialisation, Milliseconds::new(5_000))
                .unwrap();
        assert_eq!("HASH4", stats.entries[0].response_type);
    }

    #[test]
    fn test_empty_statistics() {
        assert_eq!("No cached entries\n", CacheStatistics::default().to_string());
    }
}
