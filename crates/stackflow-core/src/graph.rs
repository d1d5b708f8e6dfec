//! Dependency resolver
//!
//! Orders the resources of a [`Stack`] into waves with Kahn's algorithm.
//! Every resource in wave N depends only on resources in waves < N, so the
//! members of a wave can be reconciled concurrently. Within a wave,
//! resources keep their declaration order.

use crate::error::{Result, StackError};
use crate::model::Stack;
use std::collections::BTreeSet;

/// Resource names that can be processed concurrently
pub type Wave = Vec<String>;

/// Index-based view of the dependency edges of a stack
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// `dependencies[i]`: resources that resource `i` depends on
    dependencies: Vec<Vec<usize>>,
    /// `dependents[i]`: resources that depend on resource `i`
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph from a parsed stack.
    ///
    /// The parser has already rejected dangling references; an unknown
    /// dependency here means the stack was assembled by hand.
    pub fn new(stack: &Stack) -> Result<Self> {
        let names: Vec<String> = stack.resources.keys().cloned().collect();
        let mut dependencies = vec![Vec::new(); names.len()];
        let mut dependents = vec![Vec::new(); names.len()];

        for (index, resource) in stack.resources.values().enumerate() {
            for dependency in &resource.dependencies {
                if dependency == &resource.name {
                    return Err(StackError::SelfReference(resource.name.clone()));
                }
                let target = stack.resource_index(dependency).ok_or_else(|| {
                    StackError::Reference {
                        owner: format!("resource '{}'", resource.name),
                        target: dependency.clone(),
                    }
                })?;
                if !dependencies[index].contains(&target) {
                    dependencies[index].push(target);
                    dependents[target].push(index);
                }
            }
        }

        Ok(Self {
            names,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Waves in apply order (Kahn's algorithm)
    pub fn waves(&self) -> Result<Vec<Wave>> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: Vec<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut waves = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            ready.sort_unstable();
            let mut next = Vec::new();
            for &node in &ready {
                for &dependent in &self.dependents[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            placed += ready.len();
            waves.push(ready.iter().map(|&i| self.names[i].clone()).collect());
            ready = next;
        }

        if placed < self.len() {
            let blocked: BTreeSet<usize> =
                (0..self.len()).filter(|&i| in_degree[i] > 0).collect();
            return Err(StackError::Cycle(self.cycle_members(blocked)));
        }

        Ok(waves)
    }

    /// Waves in delete order: dependents before their dependencies
    pub fn reverse_waves(&self) -> Result<Vec<Wave>> {
        let mut waves = self.waves()?;
        waves.reverse();
        Ok(waves)
    }

    /// Every resource that directly or transitively depends on `name`,
    /// in declaration order
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let Some(start) = self.index_of(name) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dependent in &self.dependents[node] {
                if seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        seen.into_iter().map(|i| self.names[i].clone()).collect()
    }

    /// Direct dependents of `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.index_of(name)
            .map(|i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.names[d].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Narrow the nodes Kahn's algorithm could not place down to the ones on
    /// a cycle: nodes that only sit downstream of a cycle are peeled off by
    /// repeatedly dropping blocked nodes no other blocked node depends on.
    fn cycle_members(&self, mut blocked: BTreeSet<usize>) -> Vec<String> {
        loop {
            let leaves: Vec<usize> = blocked
                .iter()
                .copied()
                .filter(|&node| !self.dependents[node].iter().any(|d| blocked.contains(d)))
                .collect();
            if leaves.is_empty() {
                break;
            }
            for leaf in leaves {
                blocked.remove(&leaf);
            }
        }
        blocked.into_iter().map(|i| self.names[i].clone()).collect()
    }
}

/// Convenience wrapper: build the graph and compute its waves
pub fn resolve_waves(stack: &Stack) -> Result<Vec<Wave>> {
    DependencyGraph::new(stack)?.waves()
}
