//! Adjacency-list dependency graph with maintained reverse edges.
//!
//! Forward edges (`dependencies`) may name ids that are not in the graph yet;
//! reverse edges (`dependents`) only ever connect two present nodes. Every
//! mutation keeps both directions in sync, and [`DependencyGraph::check_consistency`]
//! verifies it.

use anyhow::{Result, bail};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Node<T> {
    pub weight: T,
    dependencies: Vec<String>,
    dependents: BTreeSet<String>,
}

impl<T> Node<T> {
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn dependents(&self) -> impl Iterator<Item = &String> {
        self.dependents.iter()
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    nodes: HashMap<String, Node<T>>,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
}

impl<T> DependencyGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node.
    ///
    /// Replacing keeps the node's dependents and swaps its forward edges.
    /// Self-references and duplicate dependencies are dropped. Returns the
    /// previous weight, if any.
    pub fn add_node(&mut self, id: &str, weight: T, dependencies: Vec<String>) -> Option<T> {
        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if dep != id && !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        let (previous, dependents) = match self.nodes.remove(id) {
            Some(old) => {
                self.detach_forward_edges(id, &old.dependencies);
                (Some(old.weight), old.dependents)
            }
            None => {
                let waiting = self
                    .nodes
                    .iter()
                    .filter(|(_, node)| node.dependencies.iter().any(|d| d == id))
                    .map(|(other, _)| other.clone())
                    .collect();
                (None, waiting)
            }
        };

        for dep in &deps {
            if let Some(target) = self.nodes.get_mut(dep) {
                target.dependents.insert(id.to_string());
            }
        }

        self.nodes.insert(
            id.to_string(),
            Node {
                weight,
                dependencies: deps,
                dependents,
            },
        );
        previous
    }

    /// Remove a node and every edge touching it, in both directions
    pub fn remove_node(&mut self, id: &str) -> Option<T> {
        let node = self.nodes.remove(id)?;
        self.detach_forward_edges(id, &node.dependencies);

        for dependent in &node.dependents {
            if let Some(other) = self.nodes.get_mut(dependent) {
                other.dependencies.retain(|d| d != id);
            }
        }

        Some(node.weight)
    }

    fn detach_forward_edges(&mut self, id: &str, dependencies: &[String]) {
        for dep in dependencies {
            if let Some(target) = self.nodes.get_mut(dep) {
                target.dependents.remove(id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.weight)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.weight)
    }

    pub fn node(&self, id: &str) -> Option<&Node<T>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|node| node.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|node| node.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node<T>)> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Number of reverse edges, i.e. dependency edges between present nodes
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.dependents.len()).sum()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Verify that forward and reverse edges mirror each other
    pub fn check_consistency(&self) -> Result<()> {
        for (id, node) in &self.nodes {
            for dependent in &node.dependents {
                let Some(other) = self.nodes.get(dependent) else {
                    bail!("{} has a reverse edge to missing node {}", id, dependent);
                };
                if !other.dependencies.iter().any(|d| d == id) {
                    bail!(
                        "{} lists {} as dependent, but {} does not depend on it",
                        id,
                        dependent,
                        dependent
                    );
                }
            }
            for dep in &node.dependencies {
                if dep == id {
                    bail!("{} depends on itself", id);
                }
                if let Some(target) = self.nodes.get(dep)
                    && !target.dependents.contains(id)
                {
                    bail!("{} depends on {} without a reverse edge", id, dep);
                }
            }
        }
        Ok(())
    }
}
