//! Build driver: a kernel plan plus per-permutation artifact plans.
//!
//! Permutations of one artifact are resolved concurrently. Each one runs on
//! the blocking pool, gated by a semaphore of `jobs` permits, and reports
//! its own outcome; a broken permutation never disturbs its siblings.
//! Plans reach the [`BundleSink`] only after resolution has finished.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::assets::{AssetExporter, DeclaredAssetExporter};
use crate::bundle::{artifact_file_name, kernel_file_name, ArtifactKind, ArtifactPlan, BundleSink};
use crate::cache::ResolutionCache;
use crate::database::ClassDatabase;
use crate::error::{BuildError, BuildResult, ResolveError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::permutation::Permutation;
use crate::session::{resolve_cached, Session};

fn default_true() -> bool {
    true
}

fn default_kernel_name() -> String {
    "kernel".to_string()
}

/// Worker count used when none is configured: one per available core.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// The bootstrap artifact shared by every permutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    #[serde(default = "default_kernel_name")]
    pub name: String,
    pub seeds: Vec<String>,
}

/// One artifact built once per permutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub seeds: Vec<String>,
    /// Leave out every class already shipped by the kernel.
    #[serde(default = "default_true")]
    pub exclude_kernel: bool,
}

impl ArtifactSpec {
    pub fn new<I, S>(name: impl Into<String>, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            seeds: seeds.into_iter().map(Into::into).collect(),
            exclude_kernel: true,
        }
    }

    pub fn include_kernel(mut self) -> Self {
        self.exclude_kernel = false;
        self
    }
}

/// What to do when one permutation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the build with the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep building the other permutations.
    Continue,
}

/// Result of one permutation of one artifact.
#[derive(Debug)]
pub struct PermutationOutcome {
    pub checksum: String,
    pub result: std::result::Result<ArtifactPlan, ResolveError>,
}

/// Every permutation outcome of one artifact, in enumeration order.
#[derive(Debug)]
pub struct ArtifactReport {
    pub artifact: String,
    pub outcomes: Vec<PermutationOutcome>,
}

impl ArtifactReport {
    pub fn plans(&self) -> impl Iterator<Item = &ArtifactPlan> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResolveError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.checksum.as_str(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Outcome of a whole build.
#[derive(Debug)]
pub struct BuildReport {
    pub generated_at: DateTime<Utc>,
    pub kernel: Option<ArtifactPlan>,
    pub artifacts: Vec<ArtifactReport>,
}

impl BuildReport {
    pub fn failure_count(&self) -> usize {
        self.artifacts.iter().map(|a| a.failures().count()).sum()
    }

    pub fn plan_count(&self) -> usize {
        self.kernel.iter().count() + self.artifacts.iter().map(|a| a.plans().count()).sum::<usize>()
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            generated_at: self.generated_at,
            kernel: self.kernel.as_ref().map(|k| k.file_name.clone()),
            artifacts: self
                .artifacts
                .iter()
                .map(|a| ArtifactSummary {
                    artifact: a.artifact.clone(),
                    built: a.plans().map(|p| p.file_name.clone()).collect(),
                    failed: a
                        .failures()
                        .map(|(checksum, e)| FailedPermutation {
                            checksum: checksum.to_string(),
                            error: e.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a [`BuildReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub generated_at: DateTime<Utc>,
    pub kernel: Option<String>,
    pub artifacts: Vec<ArtifactSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact: String,
    pub built: Vec<String>,
    pub failed: Vec<FailedPermutation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPermutation {
    pub checksum: String,
    pub error: String,
}

/// Drives kernel and artifact planning for a session.
pub struct Builder {
    jobs: usize,
    policy: FailurePolicy,
    exporter: Arc<dyn AssetExporter>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new(default_jobs())
    }
}

impl Builder {
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            policy: FailurePolicy::default(),
            exporter: Arc::new(DeclaredAssetExporter),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn AssetExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Resolve the kernel under the fixed-only permutation. Detection
    /// classes of every variable field are added to its seeds.
    pub fn plan_kernel(&self, session: &Session, spec: &KernelSpec) -> Result<ArtifactPlan> {
        let fixed = session.fixed_permutation()?;
        let mut seeds: BTreeSet<String> = spec.seeds.iter().cloned().collect();
        seeds.extend(session.detect_classes()?);

        let resolved = session.resolve(Some(&fixed), &seeds, &BTreeSet::new())?;
        let assets = self.exporter.export(session.database(), &resolved.sorted);
        Ok(ArtifactPlan {
            artifact: spec.name.clone(),
            kind: ArtifactKind::Kernel,
            permutation: fixed.values().clone(),
            checksum: fixed.checksum().to_string(),
            classes: resolved.sorted,
            assets,
            unsatisfied: resolved.unsatisfied,
            file_name: kernel_file_name(&spec.name),
        })
    }

    /// Plan `spec` for every permutation of the session.
    ///
    /// Outcomes come back in enumeration order. Under
    /// [`FailurePolicy::FailFast`] a failure cancels every later
    /// permutation, and the failure earliest in enumeration order is
    /// returned as [`BuildError::Permutation`], whichever finished first.
    pub async fn build_artifact(
        &self,
        session: &mut Session,
        spec: &ArtifactSpec,
        kernel: Option<&ArtifactPlan>,
    ) -> BuildResult<ArtifactReport> {
        let permutations = session.permutations()?.to_vec();

        let seeds: Arc<BTreeSet<String>> = Arc::new(spec.seeds.iter().cloned().collect());
        let excluded: Arc<BTreeSet<String>> = Arc::new(match kernel {
            Some(k) if spec.exclude_kernel => k.classes.iter().cloned().collect(),
            _ => BTreeSet::new(),
        });

        let sem = Arc::new(Semaphore::new(self.jobs));
        let mut join_set = JoinSet::new();
        let mut handles = Vec::with_capacity(permutations.len());
        for (idx, permutation) in permutations.iter().cloned().enumerate() {
            let sem = Arc::clone(&sem);
            let db = Arc::clone(session.database());
            let cache = Arc::clone(session.cache());
            let exporter = Arc::clone(&self.exporter);
            let seeds = Arc::clone(&seeds);
            let excluded = Arc::clone(&excluded);
            let artifact = spec.name.clone();

            handles.push(join_set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| BuildError::Worker(e.to_string()))?;
                let checksum = permutation.checksum().to_string();
                let result = tokio::task::spawn_blocking(move || {
                    plan_permutation(
                        &db,
                        cache.as_ref(),
                        exporter.as_ref(),
                        &artifact,
                        &permutation,
                        &seeds,
                        &excluded,
                    )
                })
                .await
                .map_err(|e| BuildError::Worker(format!("permutation {checksum}: {e}")))?;
                Ok::<_, BuildError>((idx, result))
            }));
        }

        let mut slots: Vec<Option<PermutationOutcome>> =
            (0..permutations.len()).map(|_| None).collect();
        let mut first_failure: Option<usize> = None;
        while let Some(joined) = join_set.join_next().await {
            let (idx, result) = match joined {
                Ok(done) => done?,
                Err(e) if e.is_cancelled() && first_failure.is_some() => continue,
                Err(e) => return Err(BuildError::Worker(format!("join error: {e}"))),
            };
            let checksum = permutations[idx].checksum().to_string();
            match &result {
                Ok(_) => METRICS.inc_permutations_built(),
                Err(e) => {
                    obs::emit_permutation_failed(&spec.name, &checksum, e);
                    if self.policy == FailurePolicy::FailFast
                        && !matches!(first_failure, Some(f) if f < idx)
                    {
                        first_failure = Some(idx);
                        for handle in &handles[idx + 1..] {
                            handle.abort();
                        }
                    }
                }
            }
            slots[idx] = Some(PermutationOutcome { checksum, result });
        }

        if let Some(idx) = first_failure {
            if let Some(PermutationOutcome {
                checksum,
                result: Err(source),
            }) = slots[idx].take()
            {
                return Err(BuildError::Permutation {
                    artifact: spec.name.clone(),
                    checksum,
                    source,
                });
            }
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for (slot, permutation) in slots.into_iter().zip(&permutations) {
            let outcome = slot.ok_or_else(|| {
                BuildError::Worker(format!(
                    "missing result for permutation {}",
                    permutation.checksum()
                ))
            })?;
            outcomes.push(outcome);
        }

        Ok(ArtifactReport {
            artifact: spec.name.clone(),
            outcomes,
        })
    }

    /// Plan the kernel (when given) and every artifact, then hand all
    /// successful plans to `sink`.
    pub async fn build(
        &self,
        session: &mut Session,
        kernel: Option<&KernelSpec>,
        artifacts: &[ArtifactSpec],
        sink: &dyn BundleSink,
    ) -> BuildResult<BuildReport> {
        let kernel_plan = match kernel {
            Some(spec) => Some(self.plan_kernel(session, spec)?),
            None => None,
        };

        let mut reports = Vec::with_capacity(artifacts.len());
        for spec in artifacts {
            reports.push(self.build_artifact(session, spec, kernel_plan.as_ref()).await?);
        }

        if let Some(plan) = &kernel_plan {
            sink.store(plan).await?;
        }
        for report in &reports {
            for plan in report.plans() {
                sink.store(plan).await?;
            }
        }

        let report = BuildReport {
            generated_at: Utc::now(),
            kernel: kernel_plan,
            artifacts: reports,
        };
        tracing::info!(
            plans = report.plan_count(),
            failures = report.failure_count(),
            "build finished"
        );
        Ok(report)
    }
}

fn plan_permutation(
    db: &ClassDatabase,
    cache: &dyn ResolutionCache,
    exporter: &dyn AssetExporter,
    artifact: &str,
    permutation: &Permutation,
    seeds: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> Result<ArtifactPlan> {
    let resolved = resolve_cached(db, cache, Some(permutation), seeds, excluded)?;
    let assets = exporter.export(db, &resolved.sorted);
    Ok(ArtifactPlan {
        artifact: artifact.to_string(),
        kind: ArtifactKind::Permutation,
        permutation: permutation.values().clone(),
        checksum: permutation.checksum().to_string(),
        classes: resolved.sorted,
        assets,
        unsatisfied: resolved.unsatisfied,
        file_name: artifact_file_name(artifact, permutation.checksum()),
    })
}
