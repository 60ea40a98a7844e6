// ============================================================================
// RESULT CACHE — content-addressed store of generated images
// ============================================================================
//
// Keys are lowercase SHA-256 hex fingerprints of a request. On disk each entry
// is `<key>.bin`, a bincode `CacheRecord` holding the mime type and raw bytes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::Artifact;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt cache record: {0}")]
    Corrupt(#[from] bincode::Error),
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(data.as_ref());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Eviction limits. The lookup contract is unaffected: an evicted or expired
/// entry is simply a miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: usize,
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheRecord {
    mime_type: String,
    bytes: Vec<u8>,
    /// Unix seconds.
    created_at: u64,
}

enum Backend {
    Memory(HashMap<String, CacheRecord>),
    Disk(PathBuf),
}

struct Index {
    backend: Backend,
    /// key → (last access tick, created_at)
    entries: HashMap<String, (u64, u64)>,
    tick: u64,
}

impl Index {
    fn touch(&mut self, key: &str, created_at: u64) {
        self.tick += 1;
        self.entries.insert(key.to_string(), (self.tick, created_at));
    }

    fn least_recent(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, (tick, _))| *tick)
            .map(|(k, _)| k.clone())
    }
}

/// Thread-safe result cache. Concurrent writers for the same key write the
/// same bytes, so races are harmless.
pub struct CacheStore {
    index: Mutex<Index>,
    policy: CachePolicy,
}

impl CacheStore {
    pub fn in_memory(policy: CachePolicy) -> Self {
        Self {
            index: Mutex::new(Index {
                backend: Backend::Memory(HashMap::new()),
                entries: HashMap::new(),
                tick: 0,
            }),
            policy,
        }
    }

    /// Open (creating if needed) a directory-backed cache. Existing entries are
    /// indexed oldest-first by modification time.
    pub fn open(dir: impl Into<PathBuf>, policy: CachePolicy) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut found: Vec<(String, u64)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if !valid_key(key) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            found.push((key.to_string(), modified));
        }
        found.sort_by_key(|(_, m)| *m);

        let mut index = Index {
            backend: Backend::Disk(dir),
            entries: HashMap::new(),
            tick: 0,
        };
        for (key, modified) in found {
            index.touch(&key, modified);
        }
        let store = Self {
            index: Mutex::new(index),
            policy,
        };
        {
            let mut index = store.lock();
            store.evict_over_capacity(&mut index);
        }
        Ok(store)
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn dir(&self) -> Option<PathBuf> {
        match &self.lock().backend {
            Backend::Disk(dir) => Some(dir.clone()),
            Backend::Memory(_) => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Result<Option<Artifact>, CacheError> {
        if !valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        let mut index = self.lock();
        let record = match &index.backend {
            Backend::Memory(map) => map.get(key).cloned(),
            Backend::Disk(dir) => read_record(&record_path(dir, key))?,
        };
        let Some(record) = record else {
            index.entries.remove(key);
            return Ok(None);
        };

        if let Some(ttl) = self.policy.ttl
            && now_secs().saturating_sub(record.created_at) > ttl.as_secs()
        {
            remove_locked(&mut index, key)?;
            return Ok(None);
        }

        index.touch(key, record.created_at);
        Ok(Some(Artifact::new(
            format!("cached-{}.{}", &key[..12], crate::io::extension_for_mime(&record.mime_type)),
            record.mime_type,
            record.bytes,
        )))
    }

    /// [`get`](Self::get) on the blocking pool. Disk reads never stall the
    /// async caller.
    pub async fn fetch(self: &Arc<Self>, key: &str) -> Result<Option<Artifact>, CacheError> {
        let store = Arc::clone(self);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.get(&key)).await?
    }

    /// [`put`](Self::put) on the blocking pool.
    pub async fn store(self: &Arc<Self>, key: &str, artifact: Artifact) -> Result<(), CacheError> {
        let store = Arc::clone(self);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.put(&key, &artifact)).await?
    }

    pub fn contains(&self, key: &str) -> bool {
        valid_key(key) && self.lock().entries.contains_key(key)
    }

    pub fn put(&self, key: &str, artifact: &Artifact) -> Result<(), CacheError> {
        if !valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        let record = CacheRecord {
            mime_type: artifact.mime_type().to_string(),
            bytes: artifact.bytes().to_vec(),
            created_at: now_secs(),
        };
        let mut index = self.lock();
        match &mut index.backend {
            Backend::Memory(map) => {
                map.insert(key.to_string(), record.clone());
            }
            Backend::Disk(dir) => write_record(dir, key, &record)?,
        }
        index.touch(key, record.created_at);
        self.evict_over_capacity(&mut index);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        if !valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        remove_locked(&mut self.lock(), key)
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut index = self.lock();
        let keys: Vec<String> = index.entries.keys().cloned().collect();
        for key in keys {
            remove_locked(&mut index, &key)?;
        }
        if let Backend::Memory(map) = &mut index.backend {
            map.clear();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_over_capacity(&self, index: &mut Index) {
        while index.entries.len() > self.policy.max_entries.max(1) {
            let Some(oldest) = index.least_recent() else { break };
            if let Err(e) = remove_locked(index, &oldest) {
                log_warn!("cache: failed to evict {}: {}", oldest, e);
                index.entries.remove(&oldest);
            }
        }
    }
}

fn remove_locked(index: &mut Index, key: &str) -> Result<(), CacheError> {
    index.entries.remove(key);
    match &mut index.backend {
        Backend::Memory(map) => {
            map.remove(key);
        }
        Backend::Disk(dir) => match fs::remove_file(record_path(dir, key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn record_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.bin"))
}

fn read_record(path: &Path) -> Result<Option<CacheRecord>, CacheError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a temp file + rename so readers never see a torn record.
fn write_record(dir: &Path, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
    let bytes = bincode::serialize(record)?;
    let tmp = dir.join(format!("{key}.{}.tmp", Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, record_path(dir, key)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(tag: u8) -> Artifact {
        Artifact::new("r.png", "image/png", vec![tag; 32])
    }

    fn key(n: u8) -> String {
        sha256_hex([n])
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn memory_put_then_get() {
        let cache = CacheStore::in_memory(CachePolicy::default());
        assert!(cache.get(&key(1)).unwrap().is_none());
        cache.put(&key(1), &art(7)).unwrap();
        let hit = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(hit.bytes(), art(7).bytes());
        assert_eq!(hit.mime_type(), "image/png");
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn rejects_non_fingerprint_keys() {
        let cache = CacheStore::in_memory(CachePolicy::default());
        assert!(matches!(cache.put("../etc/passwd", &art(1)), Err(CacheError::InvalidKey(_))));
        assert!(matches!(cache.get("ABC"), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = CacheStore::in_memory(CachePolicy {
            max_entries: 2,
            ttl: None,
        });
        cache.put(&key(1), &art(1)).unwrap();
        cache.put(&key(2), &art(2)).unwrap();
        // Touch 1 so 2 becomes the eviction candidate
        cache.get(&key(1)).unwrap();
        cache.put(&key(3), &art(3)).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.get(&key(2)).unwrap().is_none());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = CacheStore::in_memory(CachePolicy {
            max_entries: 8,
            ttl: Some(Duration::from_secs(3600)),
        });
        cache.put(&key(1), &art(1)).unwrap();
        // Backdate the record past the TTL
        {
            let mut index = cache.lock();
            if let Backend::Memory(map) = &mut index.backend {
                map.get_mut(&key(1)).unwrap().created_at -= 7200;
            }
        }
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn disk_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = CacheStore::open(dir.path(), CachePolicy::default()).unwrap();
            cache.put(&key(5), &Artifact::new("x", "image/webp", vec![1, 2, 3])).unwrap();
        }
        let cache = CacheStore::open(dir.path(), CachePolicy::default()).unwrap();
        assert_eq!(cache.len(), 1);
        let hit = cache.get(&key(5)).unwrap().unwrap();
        assert_eq!(hit.mime_type(), "image/webp");
        assert_eq!(hit.bytes(), &[1, 2, 3]);
        // No temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.bin", key(5))]);
    }

    #[test]
    fn clear_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path(), CachePolicy::default()).unwrap();
        cache.put(&key(1), &art(1)).unwrap();
        cache.put(&key(2), &art(2)).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn async_access_goes_through_the_same_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::open(dir.path(), CachePolicy::default()).unwrap());
        assert!(cache.fetch(&key(4)).await.unwrap().is_none());
        cache.store(&key(4), art(4)).await.unwrap();
        assert!(dir.path().join(format!("{}.bin", key(4))).exists());
        let hit = cache.fetch(&key(4)).await.unwrap().unwrap();
        assert_eq!(hit.bytes(), art(4).bytes());
        assert!(matches!(cache.fetch("nope").await, Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn corrupt_record_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("{}.bin", key(9))), b"\xff").unwrap();
        let cache = CacheStore::open(dir.path(), CachePolicy::default()).unwrap();
        assert!(matches!(cache.get(&key(9)), Err(CacheError::Corrupt(_))));
    }
}
