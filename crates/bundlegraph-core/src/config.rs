//! Build configuration (`bundlegraph.toml`).
//!
//! ```toml
//! projects = ["core/project.toml", "app/project.json"]
//! permutate = ["es5", "engine"]
//! cache_dir = ".bundlegraph/cache"
//! jobs = 4
//!
//! [fields]
//! debug = false
//!
//! [kernel]
//! name = "kernel"
//! seeds = ["core.Boot"]
//!
//! [[artifacts]]
//! name = "app"
//! seeds = ["app.Main"]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::build::{default_jobs, ArtifactSpec, KernelSpec};
use crate::cache::fs::FsCache;
use crate::cache::{MemoryCache, ResolutionCache};
use crate::error::{BuildResult, LoadError, LoadResult};
use crate::field::FieldValue;
use crate::obs;
use crate::project::Project;
use crate::session::Session;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE: &str = "bundlegraph.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project manifest paths, in registration order.
    #[serde(default)]
    pub projects: Vec<PathBuf>,
    /// Fields enumerated into permutations.
    #[serde(default)]
    pub permutate: Vec<String>,
    /// Fields pinned to one value.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// On-disk cache root. Absent means an in-memory cache.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub kernel: Option<KernelSpec>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl BuildConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::debug!(
            path = %path.display(),
            projects = config.projects.len(),
            artifacts = config.artifacts.len(),
            "loaded build config"
        );
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> LoadResult<Self> {
        let config: BuildConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LoadResult<()> {
        if self.jobs == Some(0) {
            return Err(LoadError::InvalidManifest("jobs must be at least 1".into()));
        }
        let mut names = std::collections::HashSet::new();
        if let Some(kernel) = &self.kernel {
            names.insert(kernel.name.as_str());
        }
        for artifact in &self.artifacts {
            if artifact.name.trim().is_empty() {
                return Err(LoadError::InvalidManifest("artifact name is empty".into()));
            }
            if artifact.seeds.is_empty() {
                return Err(LoadError::InvalidManifest(format!(
                    "artifact '{}' has no seeds",
                    artifact.name
                )));
            }
            if !names.insert(artifact.name.as_str()) {
                return Err(LoadError::InvalidManifest(format!(
                    "artifact name '{}' used twice",
                    artifact.name
                )));
            }
        }
        Ok(())
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Worker count, falling back to the number of available cores.
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(default_jobs)
    }

    pub fn project_paths(&self) -> Vec<PathBuf> {
        self.projects.iter().map(|p| self.resolve_path(p)).collect()
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|p| self.resolve_path(p))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn cache(&self) -> Arc<dyn ResolutionCache> {
        match self.cache_path() {
            Some(root) => Arc::new(FsCache::new(root)),
            None => Arc::new(MemoryCache::new()),
        }
    }

    /// A session with every project loaded and every field configured.
    pub fn open_session(&self) -> BuildResult<Session> {
        let mut session = Session::with_cache(self.cache());
        for path in self.project_paths() {
            session.add_project(Project::load(&path)?)?;
        }
        for name in &self.permutate {
            session.permutate_field(name.as_str());
        }
        for (name, value) in &self.fields {
            session.set_field(name.as_str(), value.clone());
        }
        obs::emit_session_opened(session.projects().len(), session.database().len());
        Ok(session)
    }
}
