//! Cache Store Module
//!
//! Disk-backed cache engine: artifacts and metadata sidecars on disk, an
//! in-memory index with LRU tracking, a byte ceiling, and a JSON index
//! document that survives restarts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::key::is_valid_key;
use crate::cache::metadata::{extract_headers, CacheEntry, Metadata};
use crate::cache::{CacheStats, LruTracker, StatsCounters, INDEX_FILE_NAME, METADATA_SUFFIX};
use crate::error::{ProxyError, Result};

// == Lookup Result ==
/// Result of [`CacheStore::get`]: the entry plus whether it is within TTL.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: CacheEntry,
    pub is_fresh: bool,
}

// == Index Document ==
/// On-disk shape of `index.json`. `access_list` is ordered least recently used first.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    entries: HashMap<String, CacheEntry>,
    access_list: Vec<String>,
}

#[derive(Serialize)]
struct IndexDocumentRef<'a> {
    entries: &'a HashMap<String, CacheEntry>,
    access_list: Vec<&'a String>,
}

// == Store State ==
/// Everything guarded by the store lock.
#[derive(Debug, Default)]
struct StoreState {
    index: HashMap<String, CacheEntry>,
    lru: LruTracker,
    /// Always equals the sum of `index[*].metadata.size`
    total_bytes: u64,
}

// == Cache Store ==
/// Disk-backed cache with TTL freshness and LRU eviction.
///
/// All mutations hold the write side of a single lock for their whole
/// duration, file writes included. Freshness lookups share the read side.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    max_bytes: u64,
    state: RwLock<StoreState>,
    counters: StatsCounters,
}

impl CacheStore {
    // == Open ==
    /// Opens (or creates) a store rooted at `dir`.
    ///
    /// A missing index starts an empty store. An unreadable or malformed index
    /// is logged and also starts empty; only failing to create the directory
    /// is an error.
    ///
    /// # Arguments
    /// * `dir` - Directory for artifacts, sidecars and `index.json`
    /// * `ttl` - Freshness lifetime measured from `created_at`
    /// * `max_bytes` - Byte ceiling enforced by LRU eviction
    pub async fn open(dir: impl Into<PathBuf>, ttl: Duration, max_bytes: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProxyError::storage("create cache directory", e))?;

        let store = Self {
            dir,
            ttl,
            max_bytes,
            state: RwLock::new(StoreState::default()),
            counters: StatsCounters::new(),
        };

        let document = match store.load_index().await {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, "failed to load cache index, starting fresh");
                IndexDocument::default()
            }
        };

        {
            let mut guard = store.state.write().await;
            let state = &mut *guard;
            if store.rehydrate(state, document).await {
                if let Err(e) = store.persist_locked(state).await {
                    error!(error = %e, "failed to save cache index");
                }
            }
        }

        // A lowered ceiling takes effect at open
        let evicted = store.evict_if_needed().await;

        {
            let state = store.state.read().await;
            info!(
                cache_dir = ?store.dir,
                entries = state.index.len(),
                total_bytes = state.total_bytes,
                evicted,
                "cache store opened"
            );
        }

        Ok(store)
    }

    // == Close ==
    /// Flushes the index one last time.
    pub async fn close(&self) -> Result<()> {
        let state = self.state.write().await;
        self.persist_locked(&state).await?;
        info!(entries = state.index.len(), "cache index flushed");
        Ok(())
    }

    // == Get ==
    /// Looks up an entry without touching recency.
    ///
    /// Stale entries are still returned, with `is_fresh = false`, so callers
    /// can use them as a revalidation basis.
    pub async fn get(&self, key: &str) -> Option<CacheLookup> {
        let state = self.state.read().await;

        match state.index.get(key) {
            Some(entry) => {
                let is_fresh = entry.metadata.is_fresh_at(self.ttl, Utc::now());
                if is_fresh {
                    self.counters.record_hit();
                } else {
                    self.counters.record_miss();
                }
                Some(CacheLookup {
                    entry: entry.clone(),
                    is_fresh,
                })
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Stores `data` under `key`, replacing any previous entry.
    ///
    /// `metadata.size` is overwritten with `data.len()` and headers outside the
    /// allowed subset are dropped. A failed artifact or sidecar write removes
    /// whatever was written for this key and returns `StorageFailure`. A failed
    /// index write is only logged.
    pub async fn set(&self, key: &str, data: &[u8], metadata: Metadata) -> Result<()> {
        if !is_valid_key(key) {
            return Err(ProxyError::InvalidRequest(format!("invalid cache key: {}", key)));
        }

        let mut metadata = normalize(metadata);
        metadata.size = data.len() as u64;

        let file_path = self.artifact_path(key);
        let meta_path = self.metadata_path(key);

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if let Err(e) = fs::write(&file_path, data).await {
            self.rollback_locked(state, key).await;
            return Err(ProxyError::storage("write artifact", e));
        }

        if let Err(e) = write_metadata(&meta_path, &metadata).await {
            self.rollback_locked(state, key).await;
            return Err(e);
        }

        let size = metadata.size;
        let entry = CacheEntry {
            key: key.to_string(),
            file_path,
            metadata,
        };

        if let Some(previous) = state.index.insert(key.to_string(), entry) {
            state.total_bytes -= previous.metadata.size;
        }
        state.total_bytes += size;
        state.lru.touch(key);

        self.evict_locked(state, Some(key)).await;

        if let Err(e) = self.persist_locked(state).await {
            error!(key, error = %e, "failed to save cache index");
        }

        debug!(key, size, total_bytes = state.total_bytes, "cached artifact");
        Ok(())
    }

    // == Update Metadata ==
    /// Replaces the metadata of an existing entry without touching its bytes.
    ///
    /// The stored `size` is kept. Returns `NotFound` if the key is absent.
    pub async fn update_metadata(&self, key: &str, metadata: Metadata) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        self.update_metadata_locked(state, key, metadata).await?;

        if let Err(e) = self.persist_locked(state).await {
            error!(key, error = %e, "failed to save cache index");
        }

        Ok(())
    }

    // == Refresh If Unchanged ==
    /// Merges an upstream 304 into the entry it revalidated.
    ///
    /// `basis` is the stale metadata the conditional request was built from.
    /// If the stored entry no longer matches it, because a concurrent `set`
    /// replaced it, nothing is written and `None` is returned. Otherwise both
    /// timestamps move to `now` and the refreshed metadata is returned with
    /// the artifact bytes, all under one lock.
    pub async fn refresh_if_unchanged(
        &self,
        key: &str,
        basis: &Metadata,
        now: DateTime<Utc>,
    ) -> Result<Option<(Metadata, Vec<u8>)>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let current = state
            .index
            .get(key)
            .ok_or_else(|| ProxyError::NotFound(key.to_string()))?;
        if !same_representation(&current.metadata, basis) {
            debug!(key, "entry replaced while revalidating");
            return Ok(None);
        }

        let refreshed = current.metadata.clone().refreshed(now);
        self.update_metadata_locked(state, key, refreshed.clone()).await?;
        let data = self.read_locked(state, key).await?;

        if let Err(e) = self.persist_locked(state).await {
            error!(key, error = %e, "failed to save cache index");
        }

        Ok(Some((refreshed, data)))
    }

    // == Read ==
    /// Returns the stored artifact bytes and marks the entry as just used.
    ///
    /// An artifact that vanished from disk drops the entry and reports
    /// `StorageFailure`.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut guard = self.state.write().await;
        self.read_locked(&mut guard, key).await
    }

    async fn read_locked(&self, state: &mut StoreState, key: &str) -> Result<Vec<u8>> {
        let file_path = match state.index.get(key) {
            Some(entry) => entry.file_path.clone(),
            None => return Err(ProxyError::NotFound(key.to_string())),
        };

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    warn!(key, "artifact missing on disk, dropping entry");
                    self.discard_locked(state, key).await;
                    if let Err(e) = self.persist_locked(state).await {
                        error!(key, error = %e, "failed to save cache index");
                    }
                }
                return Err(ProxyError::storage("read artifact", e));
            }
        };

        state.lru.touch(key);

        if let Some(entry) = state.index.get_mut(key) {
            entry.metadata.last_accessed_at = Utc::now();
            if let Err(e) = write_metadata(&self.metadata_path(key), &entry.metadata).await {
                warn!(key, error = %e, "failed to update metadata");
            }
        }

        Ok(data)
    }

    // == Evict If Needed ==
    /// Evicts least recently used entries until the total fits the ceiling.
    ///
    /// Returns the number of entries removed.
    pub async fn evict_if_needed(&self) -> usize {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let evicted = self.evict_locked(state, None).await;
        if evicted > 0 {
            if let Err(e) = self.persist_locked(state).await {
                error!(error = %e, "failed to save cache index");
            }
        }
        evicted
    }

    // == Accessors ==
    /// Freshness lifetime applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the current number of entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.index.len()
    }

    /// Returns true if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.index.is_empty()
    }

    /// Bytes currently stored across all artifacts.
    pub async fn total_bytes(&self) -> u64 {
        self.state.read().await.total_bytes
    }

    /// Keys from least to most recently used.
    pub async fn recency_order(&self) -> Vec<String> {
        self.state.read().await.lru.keys().cloned().collect()
    }

    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        self.counters
            .snapshot(state.index.len(), state.total_bytes, self.max_bytes)
    }

    /// Counts a stale entry that the origin confirmed unchanged.
    pub fn record_revalidation(&self) {
        self.counters.record_revalidation();
    }

    // == Paths ==
    fn artifact_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", key, METADATA_SUFFIX))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    // == Internal: Persistence ==
    async fn load_index(&self) -> Result<IndexDocument> {
        let raw = match fs::read(self.index_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexDocument::default()),
            Err(e) => return Err(ProxyError::storage("read index", e)),
        };

        serde_json::from_slice(&raw).map_err(|e| ProxyError::MalformedIndex(e.to_string()))
    }

    /// Installs a loaded index, dropping entries whose artifact is gone.
    ///
    /// Returns true if the document needed repairs and should be rewritten.
    async fn rehydrate(&self, state: &mut StoreState, document: IndexDocument) -> bool {
        let mut dirty = false;

        for (key, mut entry) in document.entries {
            if !is_valid_key(&key) || entry.key != key {
                warn!(key = %key, "skipping index entry with invalid key");
                dirty = true;
                continue;
            }

            let file_path = self.artifact_path(&key);
            if !matches!(fs::try_exists(&file_path).await, Ok(true)) {
                warn!(key = %key, "artifact missing on disk, dropping index entry");
                let _ = fs::remove_file(self.metadata_path(&key)).await;
                dirty = true;
                continue;
            }

            entry.file_path = file_path;
            state.index.insert(key, entry);
        }

        let listed = document
            .access_list
            .iter()
            .filter(|key| state.index.contains_key(key.as_str()));
        state.lru = LruTracker::from_keys(listed);

        if state.lru.len() != document.access_list.len() {
            dirty = true;
        }

        // Entries missing from the access list are treated as just used
        let mut unlisted: Vec<&String> = state
            .index
            .keys()
            .filter(|key| !state.lru.contains(key.as_str()))
            .collect();
        unlisted.sort();
        let unlisted: Vec<String> = unlisted.into_iter().cloned().collect();
        for key in &unlisted {
            state.lru.touch(key);
            dirty = true;
        }

        state.total_bytes = state.index.values().map(|e| e.metadata.size).sum();
        dirty
    }

    async fn persist_locked(&self, state: &StoreState) -> Result<()> {
        let document = IndexDocumentRef {
            entries: &state.index,
            access_list: state.lru.keys().collect(),
        };

        let bytes = serde_json::to_vec(&document)
            .map_err(|e| ProxyError::storage("encode index", e))?;
        fs::write(self.index_path(), bytes)
            .await
            .map_err(|e| ProxyError::storage("write index", e))
    }

    // == Internal: Eviction ==
    /// Pops LRU entries while over the ceiling. `protect` names a key that
    /// must survive this pass, so the total may exceed the ceiling by at most
    /// that entry's size.
    async fn evict_locked(&self, state: &mut StoreState, protect: Option<&str>) -> usize {
        let mut evicted = 0;

        while state.total_bytes > self.max_bytes {
            match state.lru.peek_oldest() {
                None => break,
                Some(oldest) if Some(oldest.as_str()) == protect => break,
                Some(_) => {}
            }

            let Some(key) = state.lru.evict_oldest() else {
                break;
            };

            if let Some(entry) = state.index.remove(&key) {
                state.total_bytes -= entry.metadata.size;
                self.remove_files(&key).await;
                self.counters.record_eviction();
                evicted += 1;
                info!(key = %key, size = entry.metadata.size, "evicted cache entry");
            }
        }

        evicted
    }

    async fn update_metadata_locked(
        &self,
        state: &mut StoreState,
        key: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let entry = state
            .index
            .get_mut(key)
            .ok_or_else(|| ProxyError::NotFound(key.to_string()))?;

        let mut metadata = normalize(metadata);
        metadata.size = entry.metadata.size;

        write_metadata(&self.metadata_path(key), &metadata).await?;
        entry.metadata = metadata;
        Ok(())
    }

    /// Drops a key from memory and disk.
    async fn discard_locked(&self, state: &mut StoreState, key: &str) {
        if let Some(entry) = state.index.remove(key) {
            state.total_bytes -= entry.metadata.size;
        }
        state.lru.remove(key);
        self.remove_files(key).await;
    }

    /// Undoes a partial `set`: the artifact on disk may already be
    /// overwritten, so any previous entry for the key goes too.
    async fn rollback_locked(&self, state: &mut StoreState, key: &str) {
        let had_entry = state.index.contains_key(key);
        self.discard_locked(state, key).await;

        if had_entry {
            if let Err(e) = self.persist_locked(state).await {
                error!(key, error = %e, "failed to save cache index");
            }
        }
    }

    async fn remove_files(&self, key: &str) {
        for path in [self.artifact_path(key), self.metadata_path(key)] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "failed to remove cache file");
                }
            }
        }
    }
}

/// True if `stored` is still the representation `basis` described.
fn same_representation(stored: &Metadata, basis: &Metadata) -> bool {
    stored.created_at == basis.created_at
        && stored.size == basis.size
        && stored.etag() == basis.etag()
        && stored.last_modified() == basis.last_modified()
}

/// Drops headers outside the persisted subset.
fn normalize(mut metadata: Metadata) -> Metadata {
    metadata.headers = extract_headers(
        metadata
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    metadata
}

async fn write_metadata(path: &Path, metadata: &Metadata) -> Result<()> {
    let bytes =
        serde_json::to_vec(metadata).map_err(|e| ProxyError::storage("encode metadata", e))?;
    fs::write(path, bytes)
        .await
        .map_err(|e| ProxyError::storage("write metadata", e))
}
