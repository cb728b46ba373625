//! Artifact plans and the output sink boundary.
//!
//! An [`ArtifactPlan`] is everything a bundler needs to turn a resolved
//! closure into bytes: the load order, the active field assignment, the
//! checksum naming the variant, and the opaque asset description.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::field::FieldValue;
use crate::obs;
use crate::resolver::UnsatisfiedDependency;

/// Whether a plan is the shared bootstrap or one permutation's variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Kernel,
    Permutation,
}

/// Output description of one artifact for one permutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub artifact: String,
    pub kind: ArtifactKind,
    /// Field assignment the closure was resolved under.
    pub permutation: BTreeMap<String, FieldValue>,
    pub checksum: String,
    /// Classes in load order.
    pub classes: Vec<String>,
    #[serde(default)]
    pub assets: serde_json::Value,
    /// Dependencies on excluded classes that an earlier artifact must supply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsatisfied: Vec<UnsatisfiedDependency>,
    pub file_name: String,
}

/// `<artifact>-<checksum>.js`
pub fn artifact_file_name(artifact: &str, checksum: &str) -> String {
    format!("{artifact}-{checksum}.js")
}

/// `<artifact>.js`
pub fn kernel_file_name(artifact: &str) -> String {
    format!("{artifact}.js")
}

/// Receives finished plans. Writing is decoupled from resolution, so a slow
/// sink never holds up graph work.
#[async_trait]
pub trait BundleSink: Send + Sync {
    /// Persist `plan`, returning where it went.
    async fn store(&self, plan: &ArtifactPlan) -> BuildResult<PathBuf>;
}

/// Writes each plan as pretty JSON to `<out>/<file_name>.json`.
#[derive(Debug, Clone)]
pub struct PlanFileSink {
    out_dir: PathBuf,
}

impl PlanFileSink {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn path_for(&self, plan: &ArtifactPlan) -> PathBuf {
        self.out_dir.join(format!("{}.json", plan.file_name))
    }
}

#[async_trait]
impl BundleSink for PlanFileSink {
    async fn store(&self, plan: &ArtifactPlan) -> BuildResult<PathBuf> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|source| BuildError::Sink {
                path: self.out_dir.clone(),
                source,
            })?;
        let path = self.path_for(plan);
        let body = serde_json::to_vec_pretty(plan)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| BuildError::Sink {
                path: path.clone(),
                source,
            })?;
        obs::emit_artifact_stored(&plan.file_name, plan.classes.len());
        Ok(path)
    }
}
