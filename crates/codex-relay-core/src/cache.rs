//! Ephemeral store of chunk sequences for paginated continuation.
//!
//! Entries are keyed by a digest of the originating prompt plus a per-run
//! salt, so every synthesis run writes to a fresh key exactly once. Entries
//! expire after a TTL and the cache holds a bounded number of entries,
//! evicting the oldest first. Nothing is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::edit::EditChunk;
use crate::metrics::METRICS;
use crate::obs::{emit_cache_evicted, emit_cache_lookup, emit_cache_stored};

pub const DEFAULT_TTL_SECS: u64 = 600;
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Hex characters kept from the key digest.
const KEY_LEN: usize = 16;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to make expiry deterministic.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an entry stays retrievable.
    pub ttl_secs: u64,
    /// Entries kept before the oldest is evicted.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("chunk cache lock poisoned")]
    Poisoned,

    #[error("refusing to cache an empty chunk sequence")]
    Empty,
}

impl<T> From<PoisonError<T>> for CacheError {
    fn from(_: PoisonError<T>) -> Self {
        CacheError::Poisoned
    }
}

struct CacheEntry {
    chunks: Arc<[EditChunk]>,
    created_at: DateTime<Utc>,
}

/// Process-wide chunk store guarded by a single structural lock.
pub struct ChunkCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl ChunkCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Fresh key for `prompt`: digest of the prompt and a random salt.
    pub fn derive_key(prompt: &str) -> String {
        let salt = uuid::Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(salt.as_bytes());
        let mut key = hex::encode(hasher.finalize());
        key.truncate(KEY_LEN);
        key
    }

    fn ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.config.ttl_secs).unwrap_or(i64::MAX / 1_000);
        chrono::Duration::seconds(secs.min(i64::MAX / 1_000))
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.ttl()
    }

    /// Insert or replace the entry for `key`.
    pub fn store(&self, key: &str, chunks: Vec<EditChunk>) -> Result<(), CacheError> {
        if chunks.is_empty() {
            return Err(CacheError::Empty);
        }
        let now = self.clock.now();
        let mut entries = self.entries.write()?;

        entries.retain(|stored_key, entry| {
            let keep = !self.is_expired(entry, now);
            if !keep {
                emit_cache_evicted(stored_key, "expired");
            }
            keep
        });

        let chunk_count = chunks.len();
        entries.insert(
            key.to_string(),
            CacheEntry {
                chunks: chunks.into(),
                created_at: now,
            },
        );

        while entries.len() > self.config.max_entries.max(1) {
            let oldest = entries
                .iter()
                .filter(|(stored_key, _)| stored_key.as_str() != key)
                .min_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)))
                .map(|(stored_key, _)| stored_key.clone());
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                    emit_cache_evicted(&oldest, "capacity");
                }
                None => break,
            }
        }

        emit_cache_stored(key, chunk_count);
        Ok(())
    }

    /// Store `chunks` under a freshly derived key and return it.
    pub fn store_for_prompt(
        &self,
        prompt: &str,
        chunks: Vec<EditChunk>,
    ) -> Result<String, CacheError> {
        let key = Self::derive_key(prompt);
        self.store(&key, chunks)?;
        Ok(key)
    }

    /// Chunks stored under `key`; `None` for unknown, expired or evicted keys.
    pub fn lookup(&self, key: &str) -> Result<Option<Arc<[EditChunk]>>, CacheError> {
        let now = self.clock.now();
        let entries = self.entries.read()?;
        let found = entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| Arc::clone(&entry.chunks));
        emit_cache_lookup(key, found.is_some());
        METRICS.record_cache_lookup(found.is_some());
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{Edit, LineRange};

    fn chunks(n: usize) -> Vec<EditChunk> {
        (1..=n)
            .map(|idx| EditChunk {
                edits: vec![Edit::new(
                    None,
                    LineRange::new(idx as u32, idx as u32),
                    "a",
                    LineRange::new(idx as u32, idx as u32),
                    "b",
                )],
                chunk_index: idx,
                total_chunks: n,
                has_more: idx < n,
                estimated_chars: 10,
            })
            .collect()
    }

    fn cache_with_clock(ttl_secs: u64, max_entries: usize) -> (ChunkCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ChunkCache::with_clock(
            CacheConfig {
                ttl_secs,
                max_entries,
            },
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_derive_key_is_salted() {
        let a = ChunkCache::derive_key("refactor the parser");
        let b = ChunkCache::derive_key("refactor the parser");
        assert_eq!(a.len(), KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_store_then_lookup() {
        let (cache, _) = cache_with_clock(60, 10);
        let key = cache.store_for_prompt("prompt", chunks(3)).unwrap();
        let found = cache.lookup(&key).unwrap().unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].chunk_index, 3);
    }

    #[test]
    fn test_unknown_key_is_none() {
        let (cache, _) = cache_with_clock(60, 10);
        assert!(cache.lookup("deadbeef").unwrap().is_none());
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache_with_clock(600, 10);
        cache.store("k", chunks(2)).unwrap();

        clock.advance(chrono::Duration::seconds(599));
        assert!(cache.lookup("k").unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.lookup("k").unwrap().is_none());

        // the next store sweeps the expired entry out
        cache.store("fresh", chunks(2)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (cache, clock) = cache_with_clock(600, 2);
        cache.store("first", chunks(2)).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        cache.store("second", chunks(2)).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        cache.store("third", chunks(2)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("first").unwrap().is_none());
        assert!(cache.lookup("second").unwrap().is_some());
        assert!(cache.lookup("third").unwrap().is_some());
    }

    #[test]
    fn test_store_replaces_existing_key() {
        let (cache, _) = cache_with_clock(600, 10);
        cache.store("k", chunks(2)).unwrap();
        cache.store("k", chunks(4)).unwrap();
        assert_eq!(cache.lookup("k").unwrap().unwrap().len(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let (cache, _) = cache_with_clock(600, 10);
        assert!(matches!(cache.store("k", Vec::new()), Err(CacheError::Empty)));
    }
}
