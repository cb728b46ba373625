//! Session lifecycle and cache behaviour, in memory and on disk.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bundlegraph_core::{
    CacheKey, CacheResult, CachedResolution, ClassMeta, FieldDecl, FsCache, MemoryCache, Project,
    ResolutionCache, ResolveError, Session,
};

/// Wraps a cache and counts hits.
struct Counting<C> {
    inner: C,
    hits: AtomicUsize,
    puts: AtomicUsize,
}

impl<C> Counting<C> {
    fn new(inner: C) -> Self {
        Self {
            inner,
            hits: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }
}

impl<C: ResolutionCache> ResolutionCache for Counting<C> {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedResolution>> {
        let found = self.inner.get(key)?;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    fn put(&self, key: &CacheKey, value: &CachedResolution) -> CacheResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value)
    }

    fn clear(&self) -> CacheResult<()> {
        self.inner.clear()
    }
}

fn project() -> Project {
    Project::new("core")
        .with_field(FieldDecl::boolean("es5"))
        .with_class(ClassMeta::new("core.Main"))
        .with_class(ClassMeta::new("fix.Array"))
        .with_class(
            ClassMeta::new("app.Main")
                .requires(["core.Main"])
                .when("es5", false, "fix.Array"),
        )
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn second_resolution_is_served_from_cache() {
    let cache = Arc::new(Counting::new(MemoryCache::new()));
    let mut session = Session::with_cache(cache.clone());
    session.add_project(project()).unwrap();

    let seeds = names(&["app.Main"]);
    let first = session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();
    let second = session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();

    assert_eq!(first, second);
    assert_eq!(cache.hits.load(Ordering::SeqCst), 1);
    assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    session.close();
}

#[test]
fn clear_cache_then_resolve_gives_same_sequence_for_every_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::with_cache(Arc::new(FsCache::new(dir.path())));
    session.add_project(project()).unwrap();
    session.permutate_field("es5");
    let perms = session.permutations().unwrap().to_vec();
    assert_eq!(perms.len(), 2);

    let seeds = names(&["app.Main"]);
    let before: Vec<Vec<String>> = perms
        .iter()
        .map(|p| session.sorted_classes(Some(p), &seeds, &BTreeSet::new()).unwrap())
        .collect();
    assert_ne!(before[0], before[1]);

    session.clear_cache();
    assert!(!dir.path().join("entries").exists());

    let after: Vec<Vec<String>> = perms
        .iter()
        .map(|p| session.sorted_classes(Some(p), &seeds, &BTreeSet::new()).unwrap())
        .collect();
    assert_eq!(before, after);
    session.close();
}

#[test]
fn clear_cache_is_idempotent_without_prior_entries() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::with_cache(Arc::new(FsCache::new(dir.path().join("never-created"))));
    session.clear_cache();
    session.clear_cache();
    session.close();
}

#[test]
fn disk_cache_is_shared_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let seeds = names(&["app.Main"]);

    let mut first = Session::with_cache(Arc::new(FsCache::new(dir.path())));
    first.add_project(project()).unwrap();
    let expected = first.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();
    first.close();

    let cache = Arc::new(Counting::new(FsCache::new(dir.path())));
    let mut second = Session::with_cache(cache.clone());
    second.add_project(project()).unwrap();
    let got = second.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();

    assert_eq!(got, expected);
    assert_eq!(cache.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_disk_entries_fall_back_to_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let seeds = names(&["app.Main"]);
    let mut session = Session::with_cache(Arc::new(FsCache::new(dir.path())));
    session.add_project(project()).unwrap();
    let expected = session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();

    for shard in std::fs::read_dir(dir.path().join("entries")).unwrap() {
        for entry in std::fs::read_dir(shard.unwrap().path()).unwrap() {
            std::fs::write(entry.unwrap().path(), b"{ not json").unwrap();
        }
    }

    let got = session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();
    assert_eq!(got, expected);
}

#[test]
fn changing_projects_changes_cache_identity() {
    let cache = Arc::new(Counting::new(MemoryCache::new()));
    let seeds = names(&["app.Main"]);

    let mut session = Session::with_cache(cache.clone());
    session.add_project(project()).unwrap();
    session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();

    session
        .add_project(Project::new("extra").with_class(ClassMeta::new("extra.Thing")))
        .unwrap();
    session.sorted_classes(None, &seeds, &BTreeSet::new()).unwrap();

    assert_eq!(cache.hits.load(Ordering::SeqCst), 0);
    assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_resolution_is_not_cached() {
    let cache = Arc::new(Counting::new(MemoryCache::new()));
    let mut session = Session::with_cache(cache.clone());
    session.add_project(project()).unwrap();

    let seeds = names(&["app.Missing"]);
    for _ in 0..2 {
        assert!(matches!(
            session.sorted_classes(None, &seeds, &BTreeSet::new()),
            Err(ResolveError::ClassNotFound { .. })
        ));
    }
    assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_permutated_field_surfaces_on_enumeration() {
    let mut session = Session::new();
    session.add_project(project()).unwrap();
    session.permutate_field("engine");
    assert_eq!(
        session.permutations().unwrap_err(),
        ResolveError::UnknownField {
            name: "engine".into()
        }
    );
}

#[test]
fn fixed_value_outside_domain_is_rejected() {
    let mut session = Session::new();
    session.add_project(project()).unwrap();
    session.set_field("es5", "sometimes");
    assert!(matches!(
        session.permutations(),
        Err(ResolveError::InvalidFieldValue { .. })
    ));
}
