//! Closure, ordering and permutation properties over whole class databases.

use std::collections::{BTreeSet, HashSet};

use bundlegraph_core::{
    enumerate, ClassDatabase, ClassMeta, FieldDecl, FieldRegistry, LoadError, Permutation,
    Project, ResolveError, Resolver,
};

fn abcd() -> ClassDatabase {
    let project = Project::new("p")
        .with_class(ClassMeta::new("A").requires(["B", "C"]))
        .with_class(ClassMeta::new("B").requires(["D"]))
        .with_class(ClassMeta::new("C"))
        .with_class(ClassMeta::new("D"));
    ClassDatabase::from_projects([&project]).unwrap()
}

/// A small but layered library: ui and net share core, app uses both.
fn layered() -> ClassDatabase {
    let core = Project::new("core")
        .with_field(FieldDecl::boolean("debug").with_default(false))
        .with_class(ClassMeta::new("core.Main"))
        .with_class(ClassMeta::new("core.Class").requires(["core.Main"]))
        .with_class(ClassMeta::new("core.Assert").requires(["core.Main"]))
        .with_class(ClassMeta::new("core.Json").requires(["core.Class"]))
        .with_class(
            ClassMeta::new("core.Event")
                .requires(["core.Class"])
                .when("debug", true, "core.Assert"),
        );
    let lib = Project::new("lib")
        .with_class(ClassMeta::new("net.Request").requires(["core.Event", "core.Json"]))
        .with_class(ClassMeta::new("ui.Widget").requires(["core.Event"]))
        .with_class(ClassMeta::new("ui.Button").requires(["ui.Widget"]))
        .with_class(ClassMeta::new("app.Main").requires(["ui.Button", "net.Request"]))
        .with_class(ClassMeta::new("app.Unused").requires(["core.Main"]));
    ClassDatabase::from_projects([&core, &lib]).unwrap()
}

fn sorted(db: &ClassDatabase, perm: Option<&Permutation>, seeds: &[&str], excluded: &[&str]) -> Vec<String> {
    let mut resolver = match perm {
        Some(p) => Resolver::with_permutation(db, p),
        None => Resolver::new(db),
    };
    for seed in seeds {
        resolver.add_class_name(*seed);
    }
    resolver.exclude_classes(excluded.iter().copied());
    resolver.sorted_classes().unwrap()
}

#[test]
fn example_scenario_has_canonical_order() {
    let db = abcd();
    let order = sorted(&db, None, &["A"], &[]);
    assert_eq!(order, vec!["C", "D", "B", "A"]);
}

#[test]
fn closure_contains_seeds_and_only_reachable_classes() {
    let db = layered();
    let order = sorted(&db, None, &["ui.Button"], &[]);
    let set: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let expected: BTreeSet<&str> = [
        "ui.Button",
        "ui.Widget",
        "core.Event",
        "core.Class",
        "core.Main",
    ]
    .into_iter()
    .collect();
    assert_eq!(set, expected);
}

#[test]
fn every_required_dependency_precedes_its_dependent() {
    let db = layered();
    let debug = Permutation::new([("debug".to_string(), true.into())].into_iter().collect());
    let order = sorted(&db, Some(&debug), &["app.Main", "app.Unused"], &[]);
    let pos = |name: &str| order.iter().position(|c| c == name).unwrap();

    for class in &order {
        let meta = db.get(class).unwrap();
        for dep in &meta.requires {
            assert!(pos(dep) < pos(class), "{dep} must load before {class}");
        }
    }
    assert!(order.contains(&"core.Assert".to_string()));
}

#[test]
fn seed_insertion_order_never_changes_output() {
    let db = layered();
    let forward = sorted(&db, None, &["app.Main", "app.Unused", "core.Json"], &[]);
    let backward = sorted(&db, None, &["core.Json", "app.Unused", "app.Main"], &[]);
    let repeated = sorted(&db, None, &["app.Unused", "core.Json", "app.Main", "app.Main"], &[]);
    assert_eq!(forward, backward);
    assert_eq!(forward, repeated);
}

#[test]
fn resolution_is_deterministic_across_calls() {
    let first = sorted(&layered(), None, &["app.Main"], &[]);
    for _ in 0..5 {
        assert_eq!(sorted(&layered(), None, &["app.Main"], &[]), first);
    }
}

#[test]
fn excluded_dependency_is_absent_and_reported() {
    let db = layered();
    let mut resolver = Resolver::new(&db);
    resolver
        .add_class_name("ui.Button")
        .exclude_classes(["core.Event", "core.Class", "core.Main"]);
    let resolution = resolver.resolve().unwrap();

    assert!(!resolution.contains("core.Event"));
    assert!(resolution.contains("ui.Widget"));
    assert_eq!(resolution.unsatisfied().len(), 1);
    assert_eq!(resolution.unsatisfied()[0].class, "ui.Widget");
    assert_eq!(resolution.unsatisfied()[0].dependency, "core.Event");
    assert_eq!(resolver.sorted_classes().unwrap(), vec!["ui.Widget", "ui.Button"]);
}

#[test]
fn two_by_three_fields_give_six_distinct_permutations() {
    let project = Project::new("p")
        .with_field(FieldDecl::boolean("debug"))
        .with_field(FieldDecl::enumerated(
            "engine",
            vec!["gecko".into(), "webkit".into(), "trident".into()],
        ));
    let db = ClassDatabase::from_projects([&project]).unwrap();
    let mut registry = FieldRegistry::new();
    registry.declare_variable("debug");
    registry.declare_variable("engine");

    let perms = enumerate(&registry, db.fields()).unwrap();
    assert_eq!(perms.len(), 6);
    let checksums: HashSet<&str> = perms.iter().map(Permutation::checksum).collect();
    assert_eq!(checksums.len(), 6);

    let again = enumerate(&registry, db.fields()).unwrap();
    assert_eq!(perms, again);
}

#[test]
fn every_member_of_a_cycle_fails_resolution() {
    let project = Project::new("p")
        .with_class(ClassMeta::new("A").requires(["B"]))
        .with_class(ClassMeta::new("B").requires(["C"]))
        .with_class(ClassMeta::new("C").requires(["A"]))
        .with_class(ClassMeta::new("Outside"));
    let db = ClassDatabase::from_projects([&project]).unwrap();

    for seed in ["A", "B", "C"] {
        let mut resolver = Resolver::new(&db);
        resolver.add_class_name(seed);
        match resolver.sorted_classes() {
            Err(ResolveError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("seed {seed}: expected cycle, got {other:?}"),
        }
    }

    let mut resolver = Resolver::new(&db);
    resolver.add_class_name("Outside");
    assert_eq!(resolver.sorted_classes().unwrap(), vec!["Outside"]);
}

#[test]
fn missing_dependency_reports_requesting_chain() {
    let project = Project::new("p")
        .with_class(ClassMeta::new("app.Main").requires(["app.View"]))
        .with_class(ClassMeta::new("app.View").requires(["app.Gone"]));
    let db = ClassDatabase::from_projects([&project]).unwrap();
    let mut resolver = Resolver::new(&db);
    resolver.add_class_name("app.Main");

    assert_eq!(
        resolver.resolve().unwrap_err(),
        ResolveError::ClassNotFound {
            name: "app.Gone".into(),
            chain: vec!["app.Main".into(), "app.View".into(), "app.Gone".into()],
        }
    );
}

/// `chain.c0 -> chain.c1 -> ... -> chain.c{n-1}`, optionally closed back to `chain.c0`.
fn chain(n: usize, closed: bool) -> ClassDatabase {
    let mut project = Project::new("chain");
    for i in 0..n {
        let next = if i + 1 < n {
            Some(format!("chain.c{}", i + 1))
        } else if closed {
            Some("chain.c0".to_string())
        } else {
            None
        };
        let meta = ClassMeta::new(format!("chain.c{i}"));
        project = project.with_class(match next {
            Some(dep) => meta.requires([dep]),
            None => meta,
        });
    }
    ClassDatabase::from_projects([&project]).unwrap()
}

#[test]
fn deep_dependency_chain_resolves_without_exhausting_the_stack() {
    let n = 100_000;
    let db = chain(n, false);
    let order = sorted(&db, None, &["chain.c0"], &[]);
    assert_eq!(order.len(), n);
    assert_eq!(order[0], format!("chain.c{}", n - 1));
    assert_eq!(order[n - 1], "chain.c0");
}

#[test]
fn deep_cycle_is_reported_as_an_error() {
    let n = 100_000;
    let db = chain(n, true);
    let mut resolver = Resolver::new(&db);
    resolver.add_class_name("chain.c0");
    match resolver.included_classes() {
        Err(ResolveError::CyclicDependency { cycle }) => {
            assert_eq!(cycle.len(), n + 1);
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected cycle, got {:?}", other.map(|c| c.len())),
    }
}

#[test]
fn optional_dependency_never_turns_into_a_cycle() {
    let project = Project::new("p")
        .with_class(ClassMeta::new("ui.Theme").optional(["ui.Widget"]))
        .with_class(ClassMeta::new("ui.Widget").requires(["ui.Theme"]))
        .with_class(ClassMeta::new("ui.Button").requires(["ui.Widget"]));
    let db = ClassDatabase::from_projects([&project]).unwrap();

    // The required edge wins; the optional one pointing back is dropped.
    let cases: [&[&str]; 3] = [&["ui.Widget"], &["ui.Button"], &["ui.Theme", "ui.Button"]];
    for seeds in cases {
        let order = sorted(&db, None, seeds, &[]);
        let pos = |name: &str| order.iter().position(|c| c == name).unwrap();
        assert!(pos("ui.Theme") < pos("ui.Widget"), "{seeds:?}: {order:?}");
    }
}

#[test]
fn optional_dependency_orders_when_it_does_not_conflict() {
    let project = Project::new("p")
        .with_class(ClassMeta::new("log.Console").optional(["log.Format"]))
        .with_class(ClassMeta::new("log.Format"))
        .with_class(ClassMeta::new("app.Main").requires(["log.Console", "log.Format"]));
    let db = ClassDatabase::from_projects([&project]).unwrap();
    assert_eq!(
        sorted(&db, None, &["app.Main"], &[]),
        vec!["log.Format", "log.Console", "app.Main"]
    );
}

#[test]
fn repeated_domain_values_are_rejected_in_manifests() {
    let raw = r#"
name = "p"

[[fields]]
name = "locale"
values = ["en", "de", "en"]
"#;
    assert!(matches!(
        Project::from_toml(raw),
        Err(LoadError::InvalidManifest(_))
    ));
}

#[test]
fn repeated_domain_values_never_duplicate_checksums() {
    let project = Project::new("p").with_field(FieldDecl::enumerated(
        "locale",
        vec!["en".into(), "en".into(), "de".into()],
    ));
    let db = ClassDatabase::from_projects([&project]).unwrap();
    let mut registry = FieldRegistry::new();
    registry.declare_variable("locale");

    let perms = enumerate(&registry, db.fields()).unwrap();
    let checksums: HashSet<&str> = perms.iter().map(Permutation::checksum).collect();
    assert_eq!(perms.len(), 2);
    assert_eq!(checksums.len(), 2);
}
