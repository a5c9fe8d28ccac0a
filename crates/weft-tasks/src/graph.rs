//! Explicit dependency graph over todo ids.
//!
//! Edges point from an item to each item it depends on. Cycle detection is a
//! depth-first search with two sets: `visited` (fully explored) and `on_path`
//! (the current DFS stack). Reaching a node that is still on the path closes
//! a cycle.

use std::collections::HashMap;

use crate::types::TodoItem;

/// Directed graph of `item -> dependency` edges.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
    dangling: Vec<(String, String)>,
}

impl DependencyGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over one sibling list. Subtasks are not included.
    #[must_use]
    pub fn from_items(items: &[TodoItem]) -> Self {
        let mut graph = Self::new();
        for item in items {
            let _ = graph.add_node(&item.id);
        }
        for item in items {
            for dep in &item.dependencies {
                graph.add_edge(&item.id, dep);
            }
        }
        graph
    }

    /// Add a node if absent. Returns its index.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(id.to_string());
        self.edges.push(Vec::new());
        let _ = self.index.insert(id.to_string(), i);
        i
    }

    /// Add `from -> to`. An edge to an unknown node is kept aside as dangling.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_idx = self.add_node(from);
        match self.index.get(to) {
            Some(&to_idx) => self.edges[from_idx].push(to_idx),
            None => self.dangling.push((from.to_string(), to.to_string())),
        }
    }

    /// Edges whose target is not a node, as `(from, to)`.
    #[must_use]
    pub fn dangling_edges(&self) -> &[(String, String)] {
        &self.dangling
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First cycle found, as the id path with its start repeated at the end
    /// (`[a, b, a]`). Nodes are explored in insertion order.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut on_path = vec![false; self.nodes.len()];
        let mut path = Vec::new();
        for start in 0..self.nodes.len() {
            if visited[start] {
                continue;
            }
            if let Some(cycle) = self.dfs(start, &mut visited, &mut on_path, &mut path) {
                return Some(cycle.into_iter().map(|i| self.nodes[i].clone()).collect());
            }
        }
        None
    }

    /// Whether any cycle exists.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    fn dfs(
        &self,
        node: usize,
        visited: &mut [bool],
        on_path: &mut [bool],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        visited[node] = true;
        on_path[node] = true;
        path.push(node);
        for &next in &self.edges[node] {
            if on_path[next] {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            if !visited[next] {
                if let Some(cycle) = self.dfs(next, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }
        let _ = path.pop();
        on_path[node] = false;
        None
    }
}
