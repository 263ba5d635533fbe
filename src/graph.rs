//! Dependency graph module.
//!
//! Provides `DependencyGraph`, a petgraph view of observer edges between
//! stats. The arena lists are the source of truth; this graph is built on
//! demand, either for one cascade's downstream subgraph or for the whole
//! `StatGraph` (diagnostics).

use crate::error::StatError;
use crate::handle::StatHandle;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Directed graph of stat dependencies.
///
/// An edge runs from an observed stat to the stat observing it, which is
/// the direction changes propagate in.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatGraph};
///
/// let mut stats: StatGraph = StatGraph::default();
/// let hero = stats.create_owner([("Strength", 10.0), ("Attack", 0.0)]).unwrap();
/// let strength = stats.stat(hero, "Strength").unwrap();
/// let attack = stats.stat(hero, "Attack").unwrap();
/// stats
///     .add_modifier(attack, Modifier::AddFromStat { stat: strength, factor: 2.0 })
///     .unwrap();
///
/// let graph = stats.dependency_graph();
/// assert!(graph.observers_of(strength).contains(&attack));
/// assert!(graph.detect_cycles().is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<StatHandle, ()>,
    node_map: HashMap<StatHandle, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't exist and return its index.
    pub fn add_node(&mut self, stat: StatHandle) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&stat) {
            idx
        } else {
            let idx = self.graph.add_node(stat);
            self.node_map.insert(stat, idx);
            idx
        }
    }

    /// Record that `observer` reads `observed`.
    ///
    /// Both nodes are added if missing. Duplicate edges are ignored.
    pub fn add_edge(&mut self, observer: StatHandle, observed: StatHandle) {
        let from = self.add_node(observed);
        let to = self.add_node(observer);
        self.graph.update_edge(from, to, ());
    }

    /// Check if a node exists in the graph.
    pub fn contains_node(&self, stat: StatHandle) -> bool {
        self.node_map.contains_key(&stat)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Stats that read `stat`.
    pub fn observers_of(&self, stat: StatHandle) -> Vec<StatHandle> {
        self.neighbors(stat, Direction::Outgoing)
    }

    /// Stats that `stat` reads.
    pub fn observed_by(&self, stat: StatHandle) -> Vec<StatHandle> {
        self.neighbors(stat, Direction::Incoming)
    }

    fn neighbors(&self, stat: StatHandle, direction: Direction) -> Vec<StatHandle> {
        match self.node_map.get(&stat) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Detect cycles in the graph.
    ///
    /// Depth-first search with an explicit stack, so arbitrarily long
    /// chains are fine. On failure the error carries the cycle path,
    /// starting and ending with the same stat.
    pub fn detect_cycles(&self) -> Result<(), StatError> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();

        for root in self.graph.node_indices() {
            if !visited.insert(root) {
                continue;
            }
            on_path.insert(root);
            let mut stack = vec![(root, self.graph.neighbors_directed(root, Direction::Outgoing))];

            while let Some((node, neighbors)) = stack.last_mut() {
                let node = *node;
                let Some(next) = neighbors.next() else {
                    on_path.remove(&node);
                    stack.pop();
                    continue;
                };
                if on_path.contains(&next) {
                    let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    let mut path: Vec<StatHandle> =
                        stack[from..].iter().map(|(n, _)| self.graph[*n]).collect();
                    path.push(self.graph[next]);
                    return Err(StatError::Cycle { path });
                }
                if visited.insert(next) {
                    on_path.insert(next);
                    stack.push((next, self.graph.neighbors_directed(next, Direction::Outgoing)));
                }
            }
        }

        Ok(())
    }

    /// Strongly-connected components in propagation order: every
    /// component comes after all components it reads from.
    ///
    /// Acyclic graphs yield singleton components, i.e. a topological
    /// order. A component with more than one stat (or a stat observing
    /// itself) is a cycle.
    pub fn propagation_order(&self) -> Vec<Vec<StatHandle>> {
        // kosaraju_scc is iterative and yields components in reverse
        // topological order.
        let mut components = kosaraju_scc(&self.graph);
        components.reverse();
        components
            .into_iter()
            .map(|component| component.into_iter().map(|idx| self.graph[idx]).collect())
            .collect()
    }

    /// Whether `stat` observes itself directly.
    pub fn has_self_loop(&self, stat: StatHandle) -> bool {
        self.node_map
            .get(&stat)
            .is_some_and(|&idx| self.graph.contains_edge(idx, idx))
    }
}
