use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{CacheKey, CachedResolution, ResolutionCache};
use crate::error::{CacheError, CacheResult};

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    value: CachedResolution,
}

/// Filesystem-backed cache with git-style 2-char sharding.
///
/// Layout: `<root>/entries/<first 2 hex chars>/<remaining hex chars>.json`
pub struct FsCache {
    entries_dir: PathBuf,
}

impl FsCache {
    /// Create a cache rooted at `root`. Directories are created lazily on
    /// the first write, so a missing root simply reads as empty.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            entries_dir: root.as_ref().join("entries"),
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.digest();
        self.entries_dir
            .join(&hex[..2])
            .join(format!("{}.json", &hex[2..]))
    }
}

impl ResolutionCache for FsCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResolution>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e)),
        };
        let stored: StoredEntry = serde_json::from_slice(&raw)?;
        if &stored.key != key {
            return Ok(None);
        }
        Ok(Some(stored.value))
    }

    fn put(&self, key: &CacheKey, value: &CachedResolution) -> CacheResult<()> {
        let path = self.entry_path(key);
        let Some(shard_dir) = path.parent() else {
            return Ok(());
        };
        fs::create_dir_all(shard_dir)?;

        let stored = StoredEntry {
            key: key.clone(),
            value: value.clone(),
        };
        let data = serde_json::to_vec(&stored)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.entries_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn make_cache() -> (tempfile::TempDir, FsCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        (dir, cache)
    }

    fn key(seed: &str) -> CacheKey {
        let seeds: BTreeSet<String> = [seed.to_string()].into_iter().collect();
        CacheKey::new("project", "44136fa3", &seeds, &BTreeSet::new())
    }

    fn value() -> CachedResolution {
        CachedResolution {
            sorted: vec!["core.Main".into(), "core.Module".into()],
            seeds: ["core.Module".to_string()].into_iter().collect(),
            unsatisfied: Vec::new(),
        }
    }

    #[test]
    fn entry_roundtrip() {
        let (_dir, cache) = make_cache();
        cache.put(&key("core.Module"), &value()).unwrap();
        assert_eq!(cache.get(&key("core.Module")).unwrap(), Some(value()));
    }

    #[test]
    fn missing_root_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path().join("never-created"));
        assert_eq!(cache.get(&key("x")).unwrap(), None);
    }

    #[test]
    fn corrupt_entry_is_an_error_not_a_panic() {
        let (_dir, cache) = make_cache();
        let k = key("core.Module");
        cache.put(&k, &value()).unwrap();
        std::fs::write(cache.entry_path(&k), b"{ not json").unwrap();
        assert!(matches!(cache.get(&k), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn overwrite_is_atomic_and_single_file() {
        let (dir, cache) = make_cache();
        let k = key("core.Module");
        cache.put(&k, &value()).unwrap();
        cache.put(&k, &value()).unwrap();
        let hex = k.digest();
        let shard = dir.path().join("entries").join(&hex[..2]);
        let entries: Vec<_> = std::fs::read_dir(shard).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn clear_wipes_store_and_is_idempotent() {
        let (dir, cache) = make_cache();
        cache.put(&key("a.A"), &value()).unwrap();
        cache.clear().unwrap();
        assert!(!dir.path().join("entries").exists());
        assert_eq!(cache.get(&key("a.A")).unwrap(), None);
        cache.clear().unwrap();
    }
}
