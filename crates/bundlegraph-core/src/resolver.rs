//! Dependency closure computation.
//!
//! A [`Resolver`] collects seed class names and an exclusion set, then
//! walks the [`ClassDatabase`] from the seeds:
//!
//! - `requires` and `breaks` are always followed,
//! - `conditional` entries are followed when the guarding field has the
//!   guarded value (taken from the active [`Permutation`], falling back to
//!   the field's declared default),
//! - `optional` entries are never followed; once the closure is known they
//!   become load-order edges for targets that made it in anyway, unless the
//!   edge would close a cycle, in which case it is dropped.
//!
//! Excluded classes are traversed like any other (they must exist and take
//! part in cycle detection) and are removed from the result at the end.
//! A kept class whose required dependency was excluded is reported through
//! [`Resolution::unsatisfied`] and a warning, never as an error: the
//! excluded class is expected to ship in an earlier artifact such as the
//! kernel.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::class::ClassMeta;
use crate::database::ClassDatabase;
use crate::error::{ResolveError, Result};
use crate::field::FieldValue;
use crate::obs;
use crate::permutation::Permutation;
use crate::sorter::{self, Sorter};

/// A kept class whose hard dependency was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsatisfiedDependency {
    pub class: String,
    pub dependency: String,
}

/// Outcome of one closure computation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    classes: BTreeSet<String>,
    seeds: BTreeSet<String>,
    excluded: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
    unsatisfied: Vec<UnsatisfiedDependency>,
}

impl Resolution {
    /// The closure, exclusions removed.
    pub fn classes(&self) -> &BTreeSet<String> {
        &self.classes
    }

    /// Seeds that survived exclusion.
    pub fn seeds(&self) -> &BTreeSet<String> {
        &self.seeds
    }

    /// Excluded names the traversal reached.
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// Load-order edges (`class -> classes it loads after`) within the closure.
    pub fn edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.edges
    }

    pub fn unsatisfied(&self) -> &[UnsatisfiedDependency] {
        &self.unsatisfied
    }

    /// `true` when `name` is in the closure but is not itself a seed.
    pub fn is_dependency_only(&self, name: &str) -> bool {
        self.classes.contains(name) && !self.seeds.contains(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Builder for one closure computation against one field assignment.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    db: &'a ClassDatabase,
    permutation: Option<&'a Permutation>,
    seeds: Vec<String>,
    excluded: BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    /// Unconditioned resolver: conditional dependencies use field defaults.
    pub fn new(db: &'a ClassDatabase) -> Self {
        Self {
            db,
            permutation: None,
            seeds: Vec::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// Resolver bound to one permutation's field assignment.
    pub fn with_permutation(db: &'a ClassDatabase, permutation: &'a Permutation) -> Self {
        Self {
            permutation: Some(permutation),
            ..Self::new(db)
        }
    }

    /// Register a seed. Existence is checked when resolving.
    pub fn add_class_name(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.seeds.contains(&name) {
            self.seeds.push(name);
        }
        self
    }

    /// Remove `names` from the eventual closure unconditionally.
    pub fn exclude_classes<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn permutation(&self) -> Option<&'a Permutation> {
        self.permutation
    }

    /// Seeds, sorted and de-duplicated.
    pub fn seed_set(&self) -> BTreeSet<String> {
        self.seeds.iter().cloned().collect()
    }

    pub fn exclusion_set(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// The closure of the seeds, before ordering.
    pub fn included_classes(&self) -> Result<BTreeSet<String>> {
        Ok(self.resolve()?.classes)
    }

    /// The closure in load order.
    pub fn sorted_classes(&self) -> Result<Vec<String>> {
        let resolution = self.resolve()?;
        Sorter::new(&resolution).sorted_classes()
    }

    /// Compute the closure, its load-order edges and exclusion report.
    pub fn resolve(&self) -> Result<Resolution> {
        let visited = self.traverse()?;

        // Load-order edges over everything visited, so cycles through
        // excluded classes are still caught.
        let mut all_edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, meta) in &visited {
            let mut deps = self.hard_dependencies(meta)?;
            deps.remove(name);
            all_edges.insert(name.clone(), deps);
        }
        let nodes: BTreeSet<String> = visited.keys().cloned().collect();
        if let Some(cycle) = sorter::find_cycle(&nodes, &all_edges) {
            return Err(ResolveError::CyclicDependency { cycle });
        }
        self.settle_optional(&visited, &mut all_edges)?;

        let classes: BTreeSet<String> = nodes
            .iter()
            .filter(|n| !self.excluded.contains(*n))
            .cloned()
            .collect();
        let excluded: BTreeSet<String> = nodes
            .iter()
            .filter(|n| self.excluded.contains(*n))
            .cloned()
            .collect();

        let mut unsatisfied = Vec::new();
        let mut edges = BTreeMap::new();
        for class in &classes {
            let meta = visited[class];
            for dep in self.hard_dependencies(meta)? {
                if excluded.contains(&dep) {
                    unsatisfied.push(UnsatisfiedDependency {
                        class: class.clone(),
                        dependency: dep,
                    });
                }
            }
            let kept: BTreeSet<String> = all_edges
                .remove(class)
                .unwrap_or_default()
                .into_iter()
                .filter(|d| classes.contains(d))
                .collect();
            edges.insert(class.clone(), kept);
        }
        if let Some(first) = unsatisfied.first() {
            obs::emit_exclusion_unsatisfied(unsatisfied.len(), &first.class, &first.dependency);
        }

        let seeds = self
            .seeds
            .iter()
            .filter(|s| !self.excluded.contains(*s))
            .cloned()
            .collect();

        tracing::debug!(
            seeds = self.seeds.len(),
            closure = classes.len(),
            excluded = excluded.len(),
            permutation = self.permutation.map(Permutation::checksum).unwrap_or("-"),
            "closure resolved"
        );

        Ok(Resolution {
            classes,
            seeds,
            excluded,
            edges,
            unsatisfied,
        })
    }

    /// Breadth-first walk from the seeds. Seeds are visited in sorted order
    /// so the parent chain reported for a missing class is deterministic.
    fn traverse(&self) -> Result<BTreeMap<String, &'a ClassMeta>> {
        let mut visited: BTreeMap<String, &'a ClassMeta> = BTreeMap::new();
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut queue: VecDeque<String> = self.seed_set().into_iter().collect();

        while let Some(name) = queue.pop_front() {
            if visited.contains_key(&name) {
                continue;
            }
            let meta = self.db.get(&name).ok_or_else(|| ResolveError::ClassNotFound {
                chain: chain_to(&name, &parent),
                name: name.clone(),
            })?;
            visited.insert(name.clone(), meta);

            let mut next = self.hard_dependencies(meta)?;
            next.extend(meta.breaks.iter().cloned());
            for dep in next {
                if !visited.contains_key(&dep) && !parent.contains_key(&dep) && dep != name {
                    parent.insert(dep.clone(), name.clone());
                    queue.push_back(dep);
                }
            }
        }

        Ok(visited)
    }

    /// Add optional edges whose target is in the closure to `edges`.
    ///
    /// Optional targets are never traversed, so the closure is final before
    /// this runs: the first pass activates every edge that will ever be
    /// active and the second confirms nothing changed. An edge that would
    /// close a cycle with the edges already present is dropped; optional
    /// dependencies only order, they never fail a resolution.
    fn settle_optional(
        &self,
        visited: &BTreeMap<String, &'a ClassMeta>,
        edges: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> Result<()> {
        const PASSES: usize = 2;
        let mut dropped: BTreeSet<(&str, &str)> = BTreeSet::new();

        for pass in 1..=PASSES {
            let mut changed = false;
            for (name, meta) in visited {
                for target in &meta.optional {
                    if target == name
                        || !visited.contains_key(target)
                        || dropped.contains(&(name.as_str(), target.as_str()))
                        || edges.get(name).is_some_and(|deps| deps.contains(target))
                    {
                        continue;
                    }
                    if sorter::reaches(edges, target, name) {
                        tracing::debug!(
                            class = %name,
                            optional = %target,
                            "optional dependency dropped, it would close a cycle"
                        );
                        dropped.insert((name.as_str(), target.as_str()));
                        continue;
                    }
                    edges.entry(name.clone()).or_default().insert(target.clone());
                    changed = true;
                }
            }
            if !changed {
                tracing::trace!(passes = pass, "optional dependencies settled");
                return Ok(());
            }
        }

        Err(ResolveError::UnstableClosure { passes: PASSES })
    }

    /// `requires` plus every conditional dependency whose guard matches.
    fn hard_dependencies(&self, meta: &ClassMeta) -> Result<BTreeSet<String>> {
        let mut deps: BTreeSet<String> = meta.requires.iter().cloned().collect();
        for cond in &meta.conditional {
            if self.field_value(&cond.field)? == cond.value {
                deps.insert(cond.class.clone());
            }
        }
        Ok(deps)
    }

    fn field_value(&self, field: &str) -> Result<FieldValue> {
        if let Some(value) = self.permutation.and_then(|p| p.get(field)) {
            return Ok(value.clone());
        }
        self.db
            .fields()
            .default_of(field)
            .ok_or_else(|| ResolveError::UnknownField {
                name: field.to_string(),
            })
    }
}

fn chain_to(name: &str, parent: &HashMap<String, String>) -> Vec<String> {
    let mut chain = vec![name.to_string()];
    let mut current = name;
    while let Some(p) = parent.get(current) {
        chain.push(p.clone());
        current = p;
    }
    chain.reverse();
    chain
}
