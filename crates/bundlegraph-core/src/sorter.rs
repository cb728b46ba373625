//! Deterministic topological ordering of a resolved closure.
//!
//! Kahn's algorithm over the closure's induced subgraph. Among classes whose
//! dependencies are all satisfied, the alphabetically smallest is emitted
//! first, so for `A:[B,C]`, `B:[D]` the order is `[C, D, B, A]`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{ResolveError, Result};
use crate::resolver::Resolution;

/// Orders a [`Resolution`] into a load sequence.
pub struct Sorter<'r> {
    resolution: &'r Resolution,
}

impl<'r> Sorter<'r> {
    pub fn new(resolution: &'r Resolution) -> Self {
        Self { resolution }
    }

    /// Every class of the closure, dependencies before dependents.
    pub fn sorted_classes(&self) -> Result<Vec<String>> {
        sort(self.resolution.classes(), self.resolution.edges())
    }
}

/// Topologically sort `nodes`, where `edges[c]` lists the classes `c` must
/// load after. Edges pointing outside `nodes` are ignored.
pub fn sort(
    nodes: &BTreeSet<String>,
    edges: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in nodes {
        for dep in edges.get(node).into_iter().flatten() {
            if dep == node || !nodes.contains(dep) {
                continue;
            }
            *in_degree.entry(node.as_str()).or_default() += 1;
            dependents.entry(dep.as_str()).or_default().push(node.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        sorted.push(next.to_string());
        for &dependent in dependents.get(next).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if sorted.len() != nodes.len() {
        let placed: HashSet<&str> = sorted.iter().map(String::as_str).collect();
        let remaining: BTreeSet<String> = nodes
            .iter()
            .filter(|n| !placed.contains(n.as_str()))
            .cloned()
            .collect();
        let cycle = find_cycle(&remaining, edges).unwrap_or_else(|| remaining.into_iter().collect());
        return Err(ResolveError::CyclicDependency { cycle });
    }

    Ok(sorted)
}

type Deps<'a> = std::iter::Flatten<std::option::IntoIter<&'a BTreeSet<String>>>;

fn deps_of<'a>(edges: &'a BTreeMap<String, BTreeSet<String>>, node: &str) -> Deps<'a> {
    edges.get(node).into_iter().flatten()
}

/// Find one cycle inside `nodes`, returned as a closed path
/// (`[A, B, C, A]`). Self-edges are ignored, as in [`sort`].
///
/// Depth-first with an explicit stack, so chain length is bounded by the
/// heap rather than the thread stack.
pub fn find_cycle(
    nodes: &BTreeSet<String>,
    edges: &BTreeMap<String, BTreeSet<String>>,
) -> Option<Vec<String>> {
    let mut done: HashSet<&str> = HashSet::new();
    for start in nodes {
        if done.contains(start.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = vec![start.as_str()];
        let mut on_path: HashMap<&str, usize> = HashMap::from([(start.as_str(), 0)]);
        let mut stack: Vec<Deps<'_>> = vec![deps_of(edges, start)];

        while let Some(deps) = stack.last_mut() {
            let Some(dep) = deps.next() else {
                stack.pop();
                if let Some(node) = path.pop() {
                    on_path.remove(node);
                    done.insert(node);
                }
                continue;
            };
            let current = path[path.len() - 1];
            if dep == current || !nodes.contains(dep) || done.contains(dep.as_str()) {
                continue;
            }
            if let Some(&pos) = on_path.get(dep.as_str()) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            on_path.insert(dep.as_str(), path.len());
            path.push(dep.as_str());
            stack.push(deps_of(edges, dep));
        }
    }
    None
}

/// `true` when `to` is reachable from `from` along `edges`.
pub fn reaches(edges: &BTreeMap<String, BTreeSet<String>>, from: &str, to: &str) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        stack.extend(deps_of(edges, node).map(String::as_str));
    }
    false
}
