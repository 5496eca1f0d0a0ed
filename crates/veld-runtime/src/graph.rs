//! Dependency graph construction and apply-order planning.
//!
//! The graph is rebuilt from scratch for every reconciliation pass: nodes
//! are the artifact names discovered in this pass, edges point from a
//! dependency to its dependent, so a topological sort yields
//! dependency-first apply order (drops use the reverse).
//!
//! Ordering is deterministic: ties are broken by node insertion order,
//! which callers feed from the repository listing order, so repeated passes
//! over unchanged input produce identical plans.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Outcome of planning the apply order for one pass.
///
/// Nodes that form a cycle, and nodes that transitively depend on one,
/// cannot be ordered; they are excluded from `ordered` and reported
/// separately so the reconciler can attribute an error to each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoOutcome {
    /// Orderable nodes, dependency-first, insertion-order tie-broken.
    pub ordered: Vec<String>,
    /// Nodes participating in at least one cycle.
    pub cycle_members: Vec<String>,
    /// Nodes outside any cycle that transitively depend on one.
    pub cycle_dependents: Vec<String>,
}

/// A directed dependency graph over artifact names.
///
/// Names are compared case-insensitively; the original spelling of the
/// first insertion is preserved in results.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    // lowercased name -> node index
    index: HashMap<String, NodeIndex>,
    // insertion position per node, for deterministic tie-breaking
    position: HashMap<NodeIndex, usize>,
    insertion_order: Vec<NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. No-op if the name (case-insensitive) already exists.
    pub fn add_node(&mut self, name: &str) {
        let key = name.to_lowercase();
        if self.index.contains_key(&key) {
            return;
        }
        let idx = self.graph.add_node(name.to_string());
        self.position.insert(idx, self.insertion_order.len());
        self.insertion_order.push(idx);
        self.index.insert(key, idx);
    }

    /// Returns true if the name is a node in this graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Records that `dependent` reads from `dependency`.
    ///
    /// Edges to names outside the graph are ignored: a dependency on an
    /// object not part of this pass does not constrain ordering (missing
    /// dependencies are diagnosed by the caller before planning).
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let Some(&dep_idx) = self.index.get(&dependency.to_lowercase()) else {
            return;
        };
        let Some(&node_idx) = self.index.get(&dependent.to_lowercase()) else {
            return;
        };
        if dep_idx == node_idx {
            // Self-references come from aliasing noise, never real cycles.
            return;
        }
        if !self.graph.contains_edge(dep_idx, node_idx) {
            self.graph.add_edge(dep_idx, node_idx, ());
        }
    }

    /// Computes the dependency-first apply order.
    ///
    /// Uses Kahn's algorithm with insertion-order tie-breaking. Nodes left
    /// unresolved by a cycle are classified via strongly connected
    /// components into cycle members and their transitive dependents.
    #[must_use]
    pub fn toposort(&self) -> TopoOutcome {
        let node_count = self.graph.node_count();

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(node_count);
        for idx in self.graph.node_indices() {
            in_degree.insert(idx, 0);
        }
        for edge in self.graph.edge_references() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .insertion_order
            .iter()
            .filter(|&&idx| in_degree.get(&idx).copied().unwrap_or(0) == 0)
            .copied()
            .collect();

        let mut ordered = Vec::with_capacity(node_count);
        let mut resolved: HashMap<NodeIndex, bool> = HashMap::with_capacity(node_count);

        while let Some(idx) = queue.pop_front() {
            if let Some(name) = self.graph.node_weight(idx) {
                ordered.push(name.clone());
            }
            resolved.insert(idx, true);

            let mut neighbors: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Outgoing)
                .collect();
            neighbors.sort_by_key(|n| self.position.get(n).copied().unwrap_or(usize::MAX));

            for neighbor in neighbors {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if ordered.len() == node_count {
            return TopoOutcome {
                ordered,
                cycle_members: Vec::new(),
                cycle_dependents: Vec::new(),
            };
        }

        // Classify leftovers: SCCs of size > 1 are the cycles themselves;
        // everything else unresolved sits downstream of one.
        let mut in_cycle: HashMap<NodeIndex, bool> = HashMap::new();
        for component in petgraph::algo::tarjan_scc(&self.graph) {
            if component.len() > 1 {
                for idx in component {
                    in_cycle.insert(idx, true);
                }
            }
        }

        let mut cycle_members = Vec::new();
        let mut cycle_dependents = Vec::new();
        for &idx in &self.insertion_order {
            if resolved.get(&idx).copied().unwrap_or(false) {
                continue;
            }
            let Some(name) = self.graph.node_weight(idx) else {
                continue;
            };
            if in_cycle.get(&idx).copied().unwrap_or(false) {
                cycle_members.push(name.clone());
            } else {
                cycle_dependents.push(name.clone());
            }
        }

        TopoOutcome {
            ordered,
            cycle_members,
            cycle_dependents,
        }
    }
}
