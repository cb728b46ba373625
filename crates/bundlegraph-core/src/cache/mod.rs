//! Memoization of resolution results.
//!
//! A [`ResolutionCache`] maps a [`CacheKey`] (project-set identity,
//! permutation checksum, seed-set identity, exclusion-set identity) to a
//! [`CachedResolution`]. Backends report their own failures through
//! [`CacheResult`]; callers treat every failure as a miss.

pub mod fs;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheResult;
use crate::resolver::UnsatisfiedDependency;

/// Canonical cache key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub project_set: String,
    pub permutation: String,
    pub seeds: String,
    pub excluded: String,
}

impl CacheKey {
    pub fn new(
        project_set: &str,
        permutation: &str,
        seeds: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Self {
        Self {
            project_set: project_set.to_string(),
            permutation: permutation.to_string(),
            seeds: set_identity(seeds),
            excluded: set_identity(excluded),
        }
    }

    /// SHA-256 hex digest of the whole tuple, used as storage address.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            &self.project_set,
            &self.permutation,
            &self.seeds,
            &self.excluded,
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest()[..12])
    }
}

/// Digest of a sorted, de-duplicated name set.
pub fn set_identity(names: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// What a cache entry remembers about one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResolution {
    /// The closure in load order.
    pub sorted: Vec<String>,
    /// Seeds that survived exclusion.
    pub seeds: BTreeSet<String>,
    #[serde(default)]
    pub unsatisfied: Vec<UnsatisfiedDependency>,
}

/// Minimal key/value contract for resolution caches.
pub trait ResolutionCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResolution>>;

    fn put(&self, key: &CacheKey, value: &CachedResolution) -> CacheResult<()>;

    /// Drop every entry. Idempotent.
    fn clear(&self) -> CacheResult<()>;
}

/// In-memory cache backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CachedResolution>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResolutionCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResolution>> {
        // A poisoned lock only means another writer panicked; treat as miss.
        Ok(self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, key: &CacheKey, value: &CachedResolution) -> CacheResult<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        Ok(())
    }
}
