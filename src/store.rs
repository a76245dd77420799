//! Durable key-value storage partitioned into named collections.
//!
//! Two backends:
//! - `FileStore`: one file per record under `{data_dir}/{collection}/`,
//!   named by the SHA-256 of the key, written atomically (temp file + rename).
//! - `MemoryStore`: process-local map for tests; can simulate an outage.
//!
//! Neither backend lets an error escape: reads degrade to `None`, writes
//! to `false`, and the failure is logged here.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::StoreError;

const RECORD_EXT: &str = "rec";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Progress,
    AudioCache,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Progress, Collection::AudioCache];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::AudioCache => "audio-cache",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Listing entry: enough to drive size-bounded eviction without reading values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub key: String,
    pub bytes: u64,
    /// Ordering stamp of the last write; larger is newer.
    pub written: u64,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Missing key and storage failure both read as `None`.
    async fn get(&self, collection: Collection, key: &str) -> Option<String>;

    /// Overwrites any existing record under `key`. Returns false on failure.
    async fn put(&self, collection: Collection, key: &str, value: &str) -> bool;

    async fn delete(&self, collection: Collection, key: &str) -> bool;

    async fn list(&self, collection: Collection) -> Vec<RecordMeta>;
}

// --- File backend ---

pub struct FileStore {
    root: PathBuf,
    ready: OnceCell<PathBuf>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ready: OnceCell::new(),
        }
    }

    /// Lazily create the collection directories. Concurrent first callers
    /// share one in-flight init; a failed init is retried on the next call.
    async fn root(&self) -> Result<&Path, StoreError> {
        let root = self
            .ready
            .get_or_try_init(|| async {
                for collection in Collection::ALL {
                    let dir = self.root.join(collection.dir_name());
                    tokio::fs::create_dir_all(&dir)
                        .await
                        .map_err(|e| StoreError::Init(format!("{}: {e}", dir.display())))?;
                }
                info!("Store initialized at {}", self.root.display());
                Ok::<_, StoreError>(self.root.clone())
            })
            .await?;
        Ok(root.as_path())
    }

    async fn record_path(&self, collection: Collection, key: &str) -> Result<PathBuf, StoreError> {
        let root = self.root().await?;
        Ok(root
            .join(collection.dir_name())
            .join(format!("{}.{RECORD_EXT}", key_digest(key))))
    }

    async fn try_get(&self, collection: Collection, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path(collection, key).await?;
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || read_record(&path, &owned_key))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn try_put(&self, collection: Collection, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, key).await?;
        let header = serde_json::to_string(key)?;
        let value = value.to_string();
        tokio::task::spawn_blocking(move || write_record(&path, &header, &value))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn try_delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, key).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_list(&self, collection: Collection) -> Result<Vec<RecordMeta>, StoreError> {
        let dir = self.root().await?.join(collection.dir_name());
        tokio::task::spawn_blocking(move || list_records(&dir))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, collection: Collection, key: &str) -> Option<String> {
        match self.try_get(collection, key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Store read failed [{collection}]: {e}");
                None
            }
        }
    }

    async fn put(&self, collection: Collection, key: &str, value: &str) -> bool {
        match self.try_put(collection, key, value).await {
            Ok(()) => {
                debug!("Stored [{collection}] {} bytes", value.len());
                true
            }
            Err(e) => {
                warn!("Store write failed [{collection}]: {e}");
                false
            }
        }
    }

    async fn delete(&self, collection: Collection, key: &str) -> bool {
        match self.try_delete(collection, key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store delete failed [{collection}]: {e}");
                false
            }
        }
    }

    async fn list(&self, collection: Collection) -> Vec<RecordMeta> {
        match self.try_list(collection).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Store listing failed [{collection}]: {e}");
                Vec::new()
            }
        }
    }
}

fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Record layout: first line is the JSON-encoded key, the rest is the value.
fn read_record(path: &Path, key: &str) -> Result<Option<String>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Some((header, value)) = contents.split_once('\n') else {
        warn!("Discarding truncated record {}", path.display());
        return Ok(None);
    };
    let stored_key: String = serde_json::from_str(header)?;
    if stored_key != key {
        warn!("Digest collision or foreign record at {}", path.display());
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

fn write_record(path: &Path, header: &str, value: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(header.as_bytes())?;
    temp.write_all(b"\n")?;
    temp.write_all(value.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Only a failing `read_dir` fails the listing. Entries that vanish or
/// cannot be read mid-walk are skipped.
fn list_records(dir: &Path) -> Result<Vec<RecordMeta>, StoreError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        match read_meta(&path) {
            Ok(meta) => entries.push(meta),
            Err(e) => debug!("Skipping record {}: {e}", path.display()),
        }
    }
    Ok(entries)
}

fn read_meta(path: &Path) -> Result<RecordMeta, StoreError> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(StoreError::NotRecord(path.display().to_string()));
    }
    let written = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut header = String::new();
    BufReader::new(std::fs::File::open(path)?).read_line(&mut header)?;
    let key = serde_json::from_str::<String>(header.trim_end())?;
    Ok(RecordMeta {
        key,
        bytes: metadata.len(),
        written,
    })
}

// --- Memory backend ---

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(Collection, String), (String, u64)>>,
    clock: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unusable backend: reads miss and writes fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Option<String> {
        if self.is_unavailable() {
            warn!("Store read failed [{collection}]: backend unavailable");
            return None;
        }
        let records = self.records.read().ok()?;
        records
            .get(&(collection, key.to_string()))
            .map(|(value, _)| value.clone())
    }

    async fn put(&self, collection: Collection, key: &str, value: &str) -> bool {
        if self.is_unavailable() {
            warn!("Store write failed [{collection}]: backend unavailable");
            return false;
        }
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        match self.records.write() {
            Ok(mut records) => {
                records.insert((collection, key.to_string()), (value.to_string(), stamp));
                true
            }
            Err(_) => false,
        }
    }

    async fn delete(&self, collection: Collection, key: &str) -> bool {
        if self.is_unavailable() {
            return false;
        }
        match self.records.write() {
            Ok(mut records) => {
                records.remove(&(collection, key.to_string()));
                true
            }
            Err(_) => false,
        }
    }

    async fn list(&self, collection: Collection) -> Vec<RecordMeta> {
        if self.is_unavailable() {
            return Vec::new();
        }
        let Ok(records) = self.records.read() else {
            return Vec::new();
        };
        records
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|((_, key), (value, stamp))| RecordMeta {
                key: key.clone(),
                bytes: value.len() as u64,
                written: *stamp,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn file_store_missing_key_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get(Collection::Progress, "nope").await, None);
    }

    #[tokio::test]
    async fn file_store_overwrites_and_partitions_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.put(Collection::AudioCache, "כּתב", "first").await);
        assert!(store.put(Collection::AudioCache, "כּתב", "second\nline").await);
        assert!(store.put(Collection::Progress, "כּתב", "other").await);

        assert_eq!(
            store.get(Collection::AudioCache, "כּתב").await.as_deref(),
            Some("second\nline")
        );
        assert_eq!(store.get(Collection::Progress, "כּתב").await.as_deref(), Some("other"));

        let listed = store.list(Collection::AudioCache).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "כּתב");
    }

    #[tokio::test]
    async fn file_store_keys_are_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put(Collection::AudioCache, "כתב", "plain").await;
        assert_eq!(store.get(Collection::AudioCache, "כּתב").await, None);
    }

    #[tokio::test]
    async fn file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put(Collection::AudioCache, "a", "1").await;
        assert!(store.delete(Collection::AudioCache, "a").await);
        assert!(store.delete(Collection::AudioCache, "a").await);
        assert_eq!(store.get(Collection::AudioCache, "a").await, None);
    }

    #[tokio::test]
    async fn concurrent_first_use_initializes_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("nested/data")));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .put(Collection::AudioCache, &format!("key-{i}"), &format!("value-{i}"))
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(store.list(Collection::AudioCache).await.len(), 16);
    }

    #[tokio::test]
    async fn unusable_root_degrades_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = FileStore::new(&blocker);
        assert!(!store.put(Collection::Progress, "k", "v").await);
        assert_eq!(store.get(Collection::Progress, "k").await, None);
        assert!(store.list(Collection::Progress).await.is_empty());
    }

    #[tokio::test]
    async fn listing_skips_entries_that_are_not_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put(Collection::AudioCache, "a", "1").await;

        let cache_dir = dir.path().join(Collection::AudioCache.dir_name());
        std::fs::create_dir(cache_dir.join("stray.rec")).unwrap();
        std::fs::write(cache_dir.join("broken.rec"), "not json\nvalue").unwrap();
        store.put(Collection::AudioCache, "b", "22").await;

        let mut keys: Vec<String> = store
            .list(Collection::AudioCache)
            .await
            .into_iter()
            .map(|m| m.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn memory_store_unavailable_mode() {
        let store = MemoryStore::new();
        assert!(store.put(Collection::Progress, "k", "v").await);
        store.set_unavailable(true);
        assert_eq!(store.get(Collection::Progress, "k").await, None);
        assert!(!store.put(Collection::Progress, "k", "w").await);
        store.set_unavailable(false);
        assert_eq!(store.get(Collection::Progress, "k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn memory_store_write_stamps_increase() {
        let store = MemoryStore::new();
        store.put(Collection::AudioCache, "a", "x").await;
        store.put(Collection::AudioCache, "b", "yy").await;
        let mut listed = store.list(Collection::AudioCache).await;
        listed.sort_by_key(|m| m.written);
        assert_eq!(listed[0].key, "a");
        assert_eq!(listed[1].bytes, 2);
    }
}
