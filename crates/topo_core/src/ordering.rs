//! Deployment ordering: topological sort over resource reference edges.
//!
//! A resource must be deployed after every resource its configuration
//! references (function environment refs, queue dead-letter targets).
//! Grants, event bindings, and routes are separate artifact sections applied
//! by the deployment engine once both endpoints exist, so they contribute no
//! ordering edges. Resources with no ordering constraint between them keep
//! their declaration order, which makes renders reproducible across runs for
//! identical input.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::builder::ResourceEntry;
use crate::errors::TopologyError;

/// Compute the deployment order. Edges to ids that are no longer declared
/// are skipped; callers run reference validation first, so a missing
/// endpoint here was already reported.
pub(crate) fn deployment_order(
    resources: &BTreeMap<String, ResourceEntry>,
) -> Result<Vec<String>, TopologyError> {
    // dependent -> set of dependencies, both restricted to declared ids
    let mut dependencies: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (id, entry) in resources {
        let deps: BTreeSet<&str> = entry
            .config
            .referenced_ids()
            .into_iter()
            .filter(|referenced| *referenced != id.as_str() && resources.contains_key(*referenced))
            .collect();
        dependencies.insert(id.as_str(), deps);
    }

    // Kahn's algorithm; the ready heap is keyed by declaration sequence so
    // unconstrained resources surface first-declared-first.
    let mut dependents_of: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    for (dependent, deps) in &dependencies {
        indegree.insert(*dependent, deps.len());
        for dependency in deps {
            dependents_of
                .entry(*dependency)
                .or_default()
                .push(*dependent);
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse((resources[*id].declared_at, *id)))
        .collect();

    let mut order = Vec::with_capacity(resources.len());
    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id.to_string());
        if let Some(dependents) = dependents_of.get(id) {
            for dependent in dependents {
                let degree = indegree
                    .get_mut(dependent)
                    .expect("every dependent is a declared resource");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((resources[*dependent].declared_at, *dependent)));
                }
            }
        }
    }

    if order.len() < resources.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let members: Vec<String> = resources
            .keys()
            .filter(|id| !placed.contains(id.as_str()))
            .cloned()
            .collect();
        return Err(TopologyError::CyclicDependency { members });
    }

    Ok(order)
}
