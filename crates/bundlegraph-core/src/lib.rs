//! bundlegraph core library
//!
//! Resolves the transitive closure of namespaced classes, orders it for
//! loading, and enumerates build-time field permutations so one artifact
//! can be planned per variant.

pub mod assets;
pub mod build;
pub mod bundle;
pub mod cache;
pub mod class;
pub mod config;
pub mod database;
pub mod error;
pub mod field;
pub mod metrics;
pub mod obs;
pub mod permutation;
pub mod project;
pub mod resolver;
pub mod session;
pub mod sorter;
pub mod telemetry;

pub use error::{
    BuildError, BuildResult, CacheError, CacheResult, LoadError, LoadResult, ResolveError, Result,
};

pub use class::{validate_class_name, ClassMeta, ConditionalDependency};
pub use database::ClassDatabase;
pub use field::{FieldDecl, FieldDomains, FieldRegistry, FieldState, FieldValue};
pub use permutation::{enumerate, fixed_permutation, Permutation, CHECKSUM_LEN};
pub use project::Project;

pub use resolver::{Resolution, Resolver, UnsatisfiedDependency};
pub use sorter::Sorter;

pub use cache::fs::FsCache;
pub use cache::{CacheKey, CachedResolution, MemoryCache, ResolutionCache};
pub use session::{resolve_cached, Session};

pub use assets::{AssetExporter, DeclaredAssetExporter, NoAssets};
pub use build::{
    default_jobs, ArtifactReport, ArtifactSpec, BuildReport, BuildSummary, Builder, FailurePolicy,
    KernelSpec, PermutationOutcome,
};
pub use bundle::{
    artifact_file_name, kernel_file_name, ArtifactKind, ArtifactPlan, BundleSink, PlanFileSink,
};
pub use config::{BuildConfig, CONFIG_FILE};

pub use metrics::METRICS;
pub use obs::SessionSpan;
pub use telemetry::init_tracing;

/// bundlegraph version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
