//! Build session: projects, field configuration and the resolution cache.
//!
//! A [`Session`] is created explicitly, configured, used, and torn down with
//! [`Session::close`]. Dropping a session that was never closed performs the
//! same teardown, so cache handles are released on every exit path.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::{CacheKey, CachedResolution, MemoryCache, ResolutionCache};
use crate::database::ClassDatabase;
use crate::error::Result;
use crate::field::{FieldRegistry, FieldValue};
use crate::metrics::METRICS;
use crate::obs;
use crate::permutation::{self, Permutation};
use crate::project::Project;
use crate::resolver::Resolver;
use crate::sorter::Sorter;

/// One build invocation's state.
pub struct Session {
    projects: Vec<Project>,
    database: Arc<ClassDatabase>,
    fields: FieldRegistry,
    cache: Arc<dyn ResolutionCache>,
    permutations: Option<Vec<Permutation>>,
    closed: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session with an in-memory cache.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(MemoryCache::new()))
    }

    /// Session backed by `cache`.
    pub fn with_cache(cache: Arc<dyn ResolutionCache>) -> Self {
        Self {
            projects: Vec::new(),
            database: Arc::new(ClassDatabase::new()),
            fields: FieldRegistry::new(),
            cache,
            permutations: None,
            closed: false,
        }
    }

    /// Register a project. Class names clashing with an already registered
    /// project fail here with `DuplicateClass`, leaving the session as it was.
    pub fn add_project(&mut self, project: Project) -> Result<()> {
        Arc::make_mut(&mut self.database).add_project(&project)?;
        tracing::debug!(
            project = %project.name,
            classes = project.classes.len(),
            "project added"
        );
        self.projects.push(project);
        self.permutations = None;
        Ok(())
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Shared handle to the union of all registered projects.
    pub fn database(&self) -> &Arc<ClassDatabase> {
        &self.database
    }

    pub fn cache(&self) -> &Arc<dyn ResolutionCache> {
        &self.cache
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Mark `name` as variable: every domain value gets its own permutation.
    pub fn permutate_field(&mut self, name: impl Into<String>) -> &mut Self {
        self.fields.declare_variable(name);
        self.permutations = None;
        self
    }

    /// Pin `name` to `value` for every permutation.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.fix(name, value);
        self.permutations = None;
        self
    }

    /// All permutations of the current field configuration, computed once
    /// per configuration.
    pub fn permutations(&mut self) -> Result<&[Permutation]> {
        if self.permutations.is_none() {
            let domains = self.database.fields();
            let perms = permutation::enumerate(&self.fields, domains)?;
            let variable = self.fields.variable_fields(domains)?.len();
            obs::emit_permutations_enumerated(perms.len(), variable);
            self.permutations = Some(perms);
        }
        Ok(self.permutations.as_deref().unwrap_or_default())
    }

    /// The permutation holding only fixed values; variable fields take
    /// their defaults under it.
    pub fn fixed_permutation(&self) -> Result<Permutation> {
        permutation::fixed_permutation(&self.fields, self.database.fields())
    }

    /// Detection classes of every variable field, sorted.
    pub fn detect_classes(&self) -> Result<Vec<String>> {
        let domains = self.database.fields();
        let detect: BTreeSet<String> = self
            .fields
            .variable_fields(domains)?
            .into_iter()
            .filter_map(|decl| decl.detect.clone())
            .collect();
        Ok(detect.into_iter().collect())
    }

    /// An uncached resolver over this session's classes.
    pub fn resolver<'s>(&'s self, permutation: Option<&'s Permutation>) -> Resolver<'s> {
        match permutation {
            Some(p) => Resolver::with_permutation(&self.database, p),
            None => Resolver::new(&self.database),
        }
    }

    /// Cached resolve-and-sort for one permutation.
    pub fn resolve(
        &self,
        permutation: Option<&Permutation>,
        seeds: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<CachedResolution> {
        resolve_cached(&self.database, self.cache.as_ref(), permutation, seeds, excluded)
    }

    /// Closure of `seeds` in load order, served from the cache when possible.
    pub fn sorted_classes(
        &self,
        permutation: Option<&Permutation>,
        seeds: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        Ok(self.resolve(permutation, seeds, excluded)?.sorted)
    }

    /// Closure of `seeds` without ordering.
    pub fn included_classes(
        &self,
        permutation: Option<&Permutation>,
        seeds: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .resolve(permutation, seeds, excluded)?
            .sorted
            .into_iter()
            .collect())
    }

    /// Purge every memoized result and the backing store. Idempotent.
    pub fn clear_cache(&self) {
        if let Err(e) = self.cache.clear() {
            tracing::warn!(error = %e, "cache clear failed");
        }
        obs::emit_cache_cleared();
    }

    /// Tear the session down, flushing metrics and releasing the cache.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.permutations = None;
        METRICS.flush();
        obs::emit_session_closed(self.projects.len());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resolve and sort through `cache`. Backing-store failures degrade to a
/// recomputation; resolution errors are returned and never cached.
pub fn resolve_cached(
    db: &ClassDatabase,
    cache: &dyn ResolutionCache,
    permutation: Option<&Permutation>,
    seeds: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> Result<CachedResolution> {
    let unconditioned;
    let active = match permutation {
        Some(p) => p,
        None => {
            unconditioned = Permutation::empty();
            &unconditioned
        }
    };
    let key = CacheKey::new(db.identity(), active.checksum(), seeds, excluded);
    let label = key.to_string();

    match cache.get(&key) {
        Ok(Some(hit)) => {
            METRICS.inc_cache_hits();
            obs::emit_cache_hit(&label);
            obs::emit_resolve_finished(active.checksum(), hit.sorted.len(), true);
            return Ok(hit);
        }
        Ok(None) => {
            METRICS.inc_cache_misses();
            obs::emit_cache_miss(&label, None);
        }
        Err(e) => {
            METRICS.inc_cache_misses();
            obs::emit_cache_miss(&label, Some(&e));
        }
    }

    let mut resolver = Resolver::with_permutation(db, active);
    for seed in seeds {
        resolver.add_class_name(seed.as_str());
    }
    resolver.exclude_classes(excluded.iter().cloned());
    let resolution = resolver.resolve()?;
    let sorted = Sorter::new(&resolution).sorted_classes()?;
    METRICS.inc_resolutions();

    let value = CachedResolution {
        sorted,
        seeds: resolution.seeds().clone(),
        unsatisfied: resolution.unsatisfied().to_vec(),
    };
    if let Err(e) = cache.put(&key, &value) {
        obs::emit_cache_write_failed(&label, &e);
    }
    obs::emit_resolve_finished(active.checksum(), value.sorted.len(), false);
    Ok(value)
}
