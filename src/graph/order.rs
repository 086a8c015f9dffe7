use crate::error::GraphError;
use ahash::{AHashMap, AHashSet};
use regent_manifest::Catalog;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Dependency edges between a selected set of modules.
///
/// Built per load operation and discarded afterwards. An edge `dependency ->
/// dependent` means the dependency must be loaded first.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    dependents: AHashMap<String, Vec<String>>,
    depends: AHashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph over `names`; every dependency of a node must itself be a node.
    pub fn build(catalog: &Catalog, names: &BTreeSet<String>) -> Result<Self, GraphError> {
        let unknown: Vec<String> = names
            .iter()
            .filter(|name| !catalog.contains(name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(GraphError::UnknownModules(unknown));
        }

        let mut dependents: AHashMap<String, Vec<String>> = AHashMap::default();
        let mut depends: AHashMap<String, Vec<String>> = AHashMap::default();

        for name in names {
            let Some(module) = catalog.get(name) else {
                continue;
            };
            for dep in &module.depends {
                if !names.contains(dep) {
                    return Err(GraphError::MissingDependency {
                        module: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                dependents.entry(dep.clone()).or_default().push(name.clone());
            }
            depends.insert(name.clone(), module.depends.clone());
        }

        Ok(Self {
            nodes: names.clone(),
            dependents,
            depends,
        })
    }

    /// Topological order using Kahn's algorithm.
    ///
    /// Among modules that are ready at the same time the alphabetically smallest
    /// goes first, so the order is stable across runs.
    pub fn order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: AHashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|name| {
                let deps = self.depends.get(name).map_or(0, Vec::len);
                (name.as_str(), deps)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<&str>> = in_degree
            .iter()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(name, _)| Reverse(*name))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(name)) = ready.pop() {
            sorted.push(name.to_string());
            let Some(dependents) = self.dependents.get(name) else {
                continue;
            };
            for dependent in dependents {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse(dependent.as_str()));
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let emitted: AHashSet<&str> = sorted.iter().map(String::as_str).collect();
            return Err(GraphError::Cycle {
                modules: self.find_cycle(&emitted),
            });
        }

        Ok(sorted)
    }

    /// Walk unresolved dependencies from the smallest blocked module until a
    /// module repeats; the repeated segment is a cycle.
    fn find_cycle(&self, emitted: &AHashSet<&str>) -> Vec<String> {
        let Some(start) = self
            .nodes
            .iter()
            .find(|name| !emitted.contains(name.as_str()))
        else {
            return Vec::new();
        };

        let mut path: Vec<&str> = Vec::new();
        let mut current = start.as_str();
        loop {
            if let Some(pos) = path.iter().position(|seen| *seen == current) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(current.to_string());
                return cycle;
            }
            path.push(current);

            // A blocked module always has at least one blocked dependency.
            let next = self
                .depends
                .get(current)
                .and_then(|deps| {
                    deps.iter()
                        .filter(|dep| !emitted.contains(dep.as_str()))
                        .min()
                });
            match next {
                Some(dep) => current = dep.as_str(),
                None => return path.iter().map(|s| (*s).to_string()).collect(),
            }
        }
    }
}
