//! Error taxonomy for resolution, loading and caching.

use std::path::PathBuf;

use thiserror::Error;

/// Resolution-time failures, each tied to one permutation and seed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A seed or dependency name is absent from every project.
    ///
    /// `chain` is the traversal path from the seed that pulled the name in,
    /// ending with the missing name itself.
    #[error("class not found: {name} (required via {})", chain.join(" -> "))]
    ClassNotFound { name: String, chain: Vec<String> },

    /// The same class name is defined by two projects.
    #[error("class {name} is defined by both project '{first}' and project '{second}'")]
    DuplicateClass {
        name: String,
        first: String,
        second: String,
    },

    /// A load-order cycle exists inside a resolved closure.
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A field operation referenced a field no project declares.
    #[error("unknown field: {name}")]
    UnknownField { name: String },

    /// A field was fixed to a value outside its declared domain.
    #[error("invalid value {value} for field {field} (allowed: {})", allowed.join(", "))]
    InvalidFieldValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// The optional-dependency fixed point did not settle within its bound.
    #[error("optional dependencies did not converge after {passes} passes")]
    UnstableClosure { passes: usize },
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Failures while reading project manifests or build configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML document: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid class name: {0:?}")]
    InvalidClassName(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Result type for loading operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Cache backing-store failures. Never surfaced through resolution.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type for cache backing-store operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Failures of the build driver: loading, resolution, workers and sinks.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("artifact {artifact} permutation {checksum}: {source}")]
    Permutation {
        artifact: String,
        checksum: String,
        #[source]
        source: ResolveError,
    },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("failed to write {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize plan: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for build operations.
pub type BuildResult<T> = std::result::Result<T, BuildError>;
