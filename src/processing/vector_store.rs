//! Vector cache with on-disk persistence.
//!
//! [`VectorCache`] is the plain keyed map and its file format. [`VectorStore`]
//! wraps it for concurrent use: lookups take a shared lock, and each missing
//! `(id, model_id, fingerprint)` is computed at most once at a time. Callers
//! asking for a key already being computed wait for that result.
//!
//! File format (JSON, written to a temp file then renamed over the target):
//!
//! ```json
//! { "version": 1, "entries": [ { "id": "...", "model_id": "...", "fingerprint": "blake3:...",
//!   "dimension": 256, "values": [ ... ], "created_at": "2025-01-01T00:00:00Z" } ] }
//! ```

use crate::error::{JobMatcherError, Result};
use crate::input::record::TextRecord;
use crate::processing::embeddings::{
    encode_blocking, validate_records, EmbeddingProvider, EmbeddingVector, SharedProvider,
};
use crate::processing::fingerprint;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKey {
    id: String,
    model_id: String,
}

#[derive(Debug, Clone)]
struct CachedVector {
    fingerprint: String,
    vector: EmbeddingVector,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    id: String,
    model_id: String,
    fingerprint: String,
    dimension: usize,
    values: Vec<f32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache<E> {
    version: u32,
    entries: Vec<E>,
}

impl PersistedEntry {
    fn into_cached(self) -> Result<(CacheKey, CachedVector)> {
        if self.id.trim().is_empty() || self.model_id.trim().is_empty() {
            return Err(JobMatcherError::CacheCorruption("entry has an empty id or model_id".to_string()));
        }
        if !fingerprint::is_well_formed(&self.fingerprint) {
            return Err(JobMatcherError::CacheCorruption(format!(
                "entry '{}' has a malformed fingerprint",
                self.id
            )));
        }
        if self.dimension == 0 || self.values.len() != self.dimension {
            return Err(JobMatcherError::CacheCorruption(format!(
                "entry '{}' declares dimension {} but holds {} values",
                self.id,
                self.dimension,
                self.values.len()
            )));
        }

        let vector = EmbeddingVector::new(&self.id, &self.model_id, self.values)
            .map_err(|e| JobMatcherError::CacheCorruption(e.to_string()))?;

        Ok((
            CacheKey {
                id: self.id,
                model_id: self.model_id,
            },
            CachedVector {
                fingerprint: self.fingerprint,
                vector,
                created_at: self.created_at,
            },
        ))
    }
}

/// `(id, model_id)` → vector plus the fingerprint it was computed from.
///
/// One entry per id and model: storing a vector for changed text replaces
/// the stale one.
#[derive(Debug, Clone, Default)]
pub struct VectorCache {
    entries: BTreeMap<CacheKey, CachedVector>,
}

impl VectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit only when fingerprint and dimension both match what the caller expects.
    pub fn get(&self, id: &str, model_id: &str, fingerprint: &str, dimension: usize) -> Option<&EmbeddingVector> {
        let key = CacheKey {
            id: id.to_string(),
            model_id: model_id.to_string(),
        };
        let entry = self.entries.get(&key)?;

        if entry.fingerprint != fingerprint {
            debug!("Cache entry for '{}' is stale (fingerprint changed)", id);
            return None;
        }
        if entry.vector.dimension() != dimension {
            debug!(
                "Cache entry for '{}' has dimension {}, expected {}",
                id,
                entry.vector.dimension(),
                dimension
            );
            return None;
        }
        Some(&entry.vector)
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, vector: EmbeddingVector) {
        let key = CacheKey {
            id: vector.owner_id().to_string(),
            model_id: vector.model_id().to_string(),
        };
        self.entries.insert(
            key,
            CachedVector {
                fingerprint: fingerprint.into(),
                vector,
                created_at: Utc::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry counts per model id.
    pub fn models(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for key in self.entries.keys() {
            *counts.entry(key.model_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Read a cache file.
    ///
    /// A missing file is an empty cache. Unreadable documents and entries
    /// that fail validation are skipped with a warning, since every vector
    /// can be recomputed. Only I/O failures other than "not found" are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No vector cache at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: PersistedCache<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    "{}",
                    JobMatcherError::CacheCorruption(format!(
                        "cannot parse {}: {}; starting empty",
                        path.display(),
                        e
                    ))
                );
                return Ok(Self::new());
            }
        };

        if document.version != CACHE_FORMAT_VERSION {
            warn!(
                "Vector cache {} has format version {}, expected {}; starting empty",
                path.display(),
                document.version,
                CACHE_FORMAT_VERSION
            );
            return Ok(Self::new());
        }

        let mut cache = Self::new();
        let mut skipped = 0;
        for raw in document.entries {
            let parsed = serde_json::from_value::<PersistedEntry>(raw)
                .map_err(|e| JobMatcherError::CacheCorruption(format!("unreadable entry: {}", e)))
                .and_then(PersistedEntry::into_cached);

            match parsed {
                Ok((key, cached)) => {
                    cache.entries.insert(key, cached);
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping vector cache entry: {}", e);
                }
            }
        }

        info!(
            "Loaded {} cached vectors from {} ({} skipped)",
            cache.len(),
            path.display(),
            skipped
        );
        Ok(cache)
    }

    /// Write the cache next to `path` and atomically rename it into place.
    ///
    /// The previous file stays intact if anything fails before the rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let document = PersistedCache {
            version: CACHE_FORMAT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(key, cached)| PersistedEntry {
                    id: key.id.clone(),
                    model_id: key.model_id.clone(),
                    fingerprint: cached.fingerprint.clone(),
                    dimension: cached.vector.dimension(),
                    values: cached.vector.values().to_vec(),
                    created_at: cached.created_at,
                })
                .collect(),
        };

        let temp = NamedTempFile::new_in(&parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, &document)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| JobMatcherError::Io(e.error))?;

        info!("Persisted {} cached vectors to {}", self.len(), path.display());
        Ok(())
    }
}

/// How a vector was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSource {
    Cached,
    /// Computed by a concurrent caller and shared
    Joined,
    Computed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub joined: usize,
    pub misses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub id: String,
    pub kind: String,
    pub message: String,
}

impl RecordFailure {
    pub fn new(id: &str, error: &JobMatcherError) -> Self {
        Self {
            id: id.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of embedding a set of records: successes in input order plus
/// one failure entry per record that could not be embedded.
#[derive(Debug, Clone, Default)]
pub struct EmbedOutcome {
    pub vectors: Vec<EmbeddingVector>,
    pub failures: Vec<RecordFailure>,
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub concurrency_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency_limit: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InflightKey {
    id: String,
    model_id: String,
    fingerprint: String,
}

impl InflightKey {
    fn new(record: &TextRecord, model_id: &str) -> Self {
        Self {
            id: record.id.clone(),
            model_id: model_id.to_string(),
            fingerprint: record.content_fingerprint(),
        }
    }
}

type InflightMap = HashMap<InflightKey, watch::Receiver<Option<EmbeddingVector>>>;

/// Ownership of one in-flight computation. Dropping it without completing
/// releases the key, and waiters see the channel close and retry.
struct InflightGuard {
    key: InflightKey,
    sender: watch::Sender<Option<EmbeddingVector>>,
    inflight: Arc<Mutex<InflightMap>>,
}

impl InflightGuard {
    fn complete(self, vector: EmbeddingVector) {
        self.sender.send_replace(Some(vector));
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        lock(&self.inflight).remove(&self.key);
    }
}

enum Claim {
    Cached(EmbeddingVector),
    Pending(watch::Receiver<Option<EmbeddingVector>>),
    Owned(InflightGuard),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn wait_for_vector(mut receiver: watch::Receiver<Option<EmbeddingVector>>) -> Option<EmbeddingVector> {
    match receiver.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    }
}

type RecordOutcome = std::result::Result<EmbeddingVector, RecordFailure>;

/// Encode a batch in one call. If the provider rejects the batch, each
/// member is encoded alone so a bad record fails only itself.
async fn encode_isolated(provider: SharedProvider, records: Vec<TextRecord>) -> Vec<RecordOutcome> {
    let batch_error = match encode_blocking(Arc::clone(&provider), records.clone()).await {
        Ok(vectors) => return vectors.into_iter().map(Ok).collect(),
        Err(e) => e,
    };

    if records.len() == 1 {
        return vec![Err(RecordFailure::new(&records[0].id, &batch_error))];
    }

    warn!(
        "Embedding batch of {} records failed ({}), encoding them one at a time",
        records.len(),
        batch_error
    );

    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id.clone();
        let outcome = encode_blocking(Arc::clone(&provider), vec![record])
            .await
            .and_then(|mut vectors| {
                vectors
                    .pop()
                    .ok_or_else(|| JobMatcherError::Embedding(format!("no vector returned for '{}'", id)))
            })
            .map_err(|e| RecordFailure::new(&id, &e));
        outcomes.push(outcome);
    }
    outcomes
}

/// The only owner of the vector cache.
pub struct VectorStore {
    cache: RwLock<VectorCache>,
    inflight: Arc<Mutex<InflightMap>>,
    persist_lock: tokio::sync::Mutex<()>,
    hits: AtomicUsize,
    joined: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new(VectorCache::new())
    }
}

impl VectorStore {
    pub fn new(cache: VectorCache) -> Self {
        Self {
            cache: RwLock::new(cache),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            persist_lock: tokio::sync::Mutex::new(()),
            hits: AtomicUsize::new(0),
            joined: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Load the cache file at `path` (see [`VectorCache::load`]).
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let cache = tokio::task::spawn_blocking(move || VectorCache::load(&path))
            .await
            .map_err(|e| JobMatcherError::Processing(format!("cache load task failed: {}", e)))??;
        Ok(Self::new(cache))
    }

    /// Write a snapshot of the cache to `path`. Concurrent persists are serialised.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || snapshot.persist(&path))
            .await
            .map_err(|e| JobMatcherError::Processing(format!("cache persist task failed: {}", e)))?
    }

    /// Open the cache at `path`, run `work` against it, and persist afterwards
    /// whether or not `work` succeeded. The error from `work` wins over a
    /// persist error.
    pub async fn scoped<F, Fut, T>(path: &Path, work: F) -> Result<T>
    where
        F: FnOnce(Arc<VectorStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let store = Arc::new(Self::open(path).await?);
        let outcome = work(Arc::clone(&store)).await;
        let flushed = store.persist(path).await;

        match (outcome, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(persist_err)) => Err(persist_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(persist_err)) => {
                warn!("Failed to persist vector cache after error: {}", persist_err);
                Err(err)
            }
        }
    }

    pub fn snapshot(&self) -> VectorCache {
        read(&self.cache).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.cache).is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn claim(&self, key: &InflightKey, dimension: usize) -> Claim {
        // checking the cache under the inflight lock closes the gap between
        // an owner storing its vector and releasing its key
        let mut inflight = lock(&self.inflight);

        if let Some(vector) = read(&self.cache).get(&key.id, &key.model_id, &key.fingerprint, dimension) {
            return Claim::Cached(vector.clone());
        }
        if let Some(receiver) = inflight.get(key) {
            return Claim::Pending(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        inflight.insert(key.clone(), receiver);
        Claim::Owned(InflightGuard {
            key: key.clone(),
            sender,
            inflight: Arc::clone(&self.inflight),
        })
    }

    fn fulfil(&self, guard: InflightGuard, vector: EmbeddingVector) {
        write(&self.cache).insert(guard.key.fingerprint.clone(), vector.clone());
        guard.complete(vector);
    }

    /// Cached vector for `record`, computing and storing it on a miss.
    pub async fn get_or_compute(&self, record: &TextRecord, provider: &SharedProvider) -> Result<EmbeddingVector> {
        self.get_or_compute_tracked(record, provider)
            .await
            .map(|(vector, _)| vector)
    }

    pub async fn get_or_compute_tracked(
        &self,
        record: &TextRecord,
        provider: &SharedProvider,
    ) -> Result<(EmbeddingVector, VectorSource)> {
        record.validate()?;
        let key = InflightKey::new(record, provider.model_id());

        loop {
            match self.claim(&key, provider.dimension()) {
                Claim::Cached(vector) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok((vector, VectorSource::Cached));
                }
                Claim::Pending(receiver) => {
                    if let Some(vector) = wait_for_vector(receiver).await {
                        self.joined.fetch_add(1, Ordering::Relaxed);
                        return Ok((vector, VectorSource::Joined));
                    }
                    debug!("Concurrent computation for '{}' was abandoned, retrying", record.id);
                }
                Claim::Owned(guard) => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let vector = encode_blocking(Arc::clone(provider), vec![record.clone()])
                        .await?
                        .pop()
                        .ok_or_else(|| JobMatcherError::Embedding(format!("no vector returned for '{}'", record.id)))?;
                    self.fulfil(guard, vector.clone());
                    return Ok((vector, VectorSource::Computed));
                }
            }
        }
    }

    /// Embed many records: cache hits are served directly, misses are encoded
    /// in batches of `batch_size` with at most `concurrency_limit` batches in
    /// flight.
    ///
    /// Invalid records and failed batches are reported per id in
    /// [`EmbedOutcome::failures`]; the other records still get vectors.
    pub async fn embed_all(
        &self,
        records: &[TextRecord],
        provider: &SharedProvider,
        options: BatchOptions,
    ) -> Result<EmbedOutcome> {
        if options.batch_size == 0 || options.concurrency_limit == 0 {
            return Err(JobMatcherError::Configuration(
                "batch_size and concurrency_limit must be positive".to_string(),
            ));
        }

        let mut slots: Vec<Option<EmbeddingVector>> = vec![None; records.len()];
        let mut failures: Vec<(usize, RecordFailure)> = Vec::new();
        let mut pending = Vec::new();
        let mut owned = Vec::new();
        let mut seen = HashSet::new();
        let (mut hits, mut misses) = (0, 0);

        for (idx, record) in records.iter().enumerate() {
            if let Err(e) = validate_records(std::slice::from_ref(record)) {
                failures.push((idx, RecordFailure::new(&record.id, &e)));
                continue;
            }
            if !seen.insert(record.id.as_str()) {
                let e = JobMatcherError::invalid_input(&record.id, "duplicate record id in one request");
                failures.push((idx, RecordFailure::new(&record.id, &e)));
                continue;
            }

            match self.claim(&InflightKey::new(record, provider.model_id()), provider.dimension()) {
                Claim::Cached(vector) => {
                    hits += 1;
                    slots[idx] = Some(vector);
                }
                Claim::Pending(receiver) => pending.push((idx, receiver)),
                Claim::Owned(guard) => owned.push((idx, guard)),
            }
        }

        self.hits.fetch_add(hits, Ordering::Relaxed);
        debug!(
            "{} records: {} cached, {} to encode, {} already in flight",
            records.len(),
            hits,
            owned.len(),
            pending.len()
        );

        let semaphore = Arc::new(Semaphore::new(options.concurrency_limit));
        let mut tasks = JoinSet::new();
        let mut batches: HashMap<usize, Vec<(usize, InflightGuard)>> = HashMap::new();
        let mut owned = owned.into_iter().peekable();
        let mut batch_idx = 0;

        while owned.peek().is_some() {
            let batch: Vec<(usize, InflightGuard)> = owned.by_ref().take(options.batch_size).collect();
            let batch_records: Vec<TextRecord> = batch.iter().map(|(idx, _)| records[*idx].clone()).collect();
            batches.insert(batch_idx, batch);

            let provider = Arc::clone(provider);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let results = match semaphore.acquire_owned().await {
                    Ok(_permit) => encode_isolated(provider, batch_records).await,
                    Err(e) => {
                        let err = JobMatcherError::Processing(format!("batch scheduler closed: {}", e));
                        batch_records
                            .iter()
                            .map(|record| Err(RecordFailure::new(&record.id, &err)))
                            .collect()
                    }
                };
                (batch_idx, results)
            });
            batch_idx += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            let (batch_idx, results) =
                joined.map_err(|e| JobMatcherError::Embedding(format!("embedding task failed: {}", e)))?;
            let batch = batches.remove(&batch_idx).unwrap_or_default();

            for ((idx, guard), result) in batch.into_iter().zip(results) {
                match result {
                    Ok(vector) => {
                        misses += 1;
                        self.fulfil(guard, vector.clone());
                        slots[idx] = Some(vector);
                    }
                    Err(failure) => {
                        drop(guard);
                        failures.push((idx, failure));
                    }
                }
            }
        }
        self.misses.fetch_add(misses, Ordering::Relaxed);

        for (idx, receiver) in pending {
            if let Some(vector) = wait_for_vector(receiver).await {
                self.joined.fetch_add(1, Ordering::Relaxed);
                hits += 1;
                slots[idx] = Some(vector);
                continue;
            }
            match self.get_or_compute_tracked(&records[idx], provider).await {
                Ok((vector, source)) => {
                    if source == VectorSource::Computed {
                        misses += 1;
                    } else {
                        hits += 1;
                    }
                    slots[idx] = Some(vector);
                }
                Err(e) => failures.push((idx, RecordFailure::new(&records[idx].id, &e))),
            }
        }

        failures.sort_by_key(|(idx, _)| *idx);
        Ok(EmbedOutcome {
            vectors: slots.into_iter().flatten().collect(),
            failures: failures.into_iter().map(|(_, failure)| failure).collect(),
            hits,
            misses,
        })
    }

    /// Drop every cached vector for ids not in `keep`.
    pub fn retain_ids(&self, keep: &HashSet<String>) -> usize {
        let mut cache = write(&self.cache);
        let before = cache.len();
        cache.entries.retain(|key, _| keep.contains(&key.id));
        before - cache.len()
    }

    pub fn clear(&self) {
        write(&self.cache).clear();
    }
}
