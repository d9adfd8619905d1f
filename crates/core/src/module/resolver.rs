//! Transitive closure of `requires` edges

use super::finder::ModuleFinder;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

/// The path of requires edges that led from a root to a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyChain(Vec<String>);

impl DependencyChain {
    pub fn modules(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for DependencyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

/// Outcome of a resolution.
///
/// `reachable` holds only modules whose descriptor was found, so it is
/// disjoint from `unresolved`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    reachable: BTreeSet<String>,
    unresolved: BTreeMap<String, DependencyChain>,
}

impl Resolution {
    pub fn reachable(&self) -> &BTreeSet<String> {
        &self.reachable
    }

    pub fn unresolved(&self) -> &BTreeMap<String, DependencyChain> {
        &self.unresolved
    }

    pub fn is_success(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Compute every module reachable from `roots` through `requires` edges,
/// including static ones.
///
/// Missing modules do not stop the walk: each one is recorded with the
/// chain that reached it and the remaining modules are still visited.
pub fn resolve_requires<I, S>(finder: &dyn ModuleFinder, roots: I) -> Resolution
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut found: HashSet<String> = HashSet::new();
    // child -> the module whose requires enqueued it; chains are only
    // materialized for unresolved modules
    let mut parents: HashMap<String, String> = HashMap::new();
    let mut work: VecDeque<String> = VecDeque::new();

    for root in roots {
        let root = root.into();
        if found.contains(&root) {
            continue;
        }
        found.insert(root.clone());
        work.push_back(root);
    }

    let mut resolution = Resolution::default();
    while let Some(name) = work.pop_front() {
        let Some(descriptor) = finder.find(&name) else {
            let chain = chain_to(&name, &parents);
            warn!("Module {} not found, required by {}", name, chain);
            resolution.unresolved.insert(name, chain);
            continue;
        };
        for required in descriptor.requires().keys() {
            if found.contains(required) {
                continue;
            }
            debug!("{} requires {}", name, required);
            found.insert(required.clone());
            parents.insert(required.clone(), name.clone());
            work.push_back(required.clone());
        }
        resolution.reachable.insert(name);
    }
    resolution
}

fn chain_to(name: &str, parents: &HashMap<String, String>) -> DependencyChain {
    let mut chain = vec![name.to_string()];
    let mut current = name;
    while let Some(parent) = parents.get(current) {
        chain.push(parent.clone());
        current = parent;
    }
    chain.reverse();
    DependencyChain(chain)
}
