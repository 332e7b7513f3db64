use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An undirected neighbor graph over collection positions.
///
/// Backed by a sorted adjacency map so iteration, component labelling and
/// edge listing are deterministic. Isolated nodes are first-class: a node
/// added without edges still participates in component labelling, which is
/// what merge operations rely on to preserve untouched members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborGraph {
    adjacency: BTreeMap<usize, BTreeSet<usize>>,
}

impl NeighborGraph {
    /// Construct an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a graph with isolated nodes `0..n`.
    pub fn with_nodes(n: usize) -> Self {
        Self { adjacency: (0..n).map(|i| (i, BTreeSet::new())).collect() }
    }

    /// Construct a graph from an edge list. Self-loops are ignored.
    pub fn from_edges(edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in edges {
            graph.add_edge(a, b);
        }
        graph
    }

    /// Construct a graph from an adjacency mapping. Every key becomes a node
    /// even when its neighbor list is empty.
    pub fn from_adjacency(adjacency: BTreeMap<usize, Vec<usize>>) -> Self {
        let mut graph = Self::new();
        for (node, neighbors) in adjacency {
            graph.add_node(node);
            for neighbor in neighbors {
                graph.add_edge(node, neighbor);
            }
        }
        graph
    }

    /// Add an isolated node (no-op if present).
    pub fn add_node(&mut self, node: usize) {
        self.adjacency.entry(node).or_default();
    }

    /// Add an undirected edge. Self-loops are ignored.
    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Check if an undirected edge exists.
    pub fn contains_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    /// Get the number of nodes in the graph.
    #[inline] pub fn node_count(&self) -> usize { self.adjacency.len() }

    /// Get the number of undirected edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Check if the graph has no edges.
    pub fn is_edgeless(&self) -> bool {
        self.adjacency.values().all(|n| n.is_empty())
    }

    /// Iterate over nodes in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.keys().copied()
    }

    /// Iterate over the neighbors of a node in ascending order.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.get(&node).into_iter().flat_map(|n| n.iter().copied())
    }

    /// List unique undirected edges as `(low, high)` pairs in ascending order.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.adjacency.iter()
            .flat_map(|(&a, neighbors)| neighbors.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect()
    }

    /// Edge-set difference: edges present in `self` but not in `other`,
    /// over `self`'s node set.
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for node in self.nodes() {
            out.add_node(node);
        }
        for (a, b) in self.edges() {
            if !other.contains_edge(a, b) {
                out.add_edge(a, b);
            }
        }
        out
    }

    /// Assign a connected-component label to every node via BFS, labels
    /// issued in ascending first-seen node order.
    pub fn component_labels(&self) -> BTreeMap<usize, usize> {
        let mut labels = BTreeMap::new();
        let mut next = 0;
        for start in self.nodes() {
            if labels.contains_key(&start) {
                continue;
            }
            labels.insert(start, next);
            let mut queue = VecDeque::from([start]);
            while let Some(u) = queue.pop_front() {
                for v in self.neighbors(u) {
                    if !labels.contains_key(&v) {
                        labels.insert(v, next);
                        queue.push_back(v);
                    }
                }
            }
            next += 1;
        }
        labels
    }

    /// List connected components as sorted node lists, ordered by their
    /// smallest member.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let labels = self.component_labels();
        let count = labels.values().max().map_or(0, |&m| m + 1);
        let mut components = vec![Vec::new(); count];
        for (node, label) in labels {
            components[label].push(node);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_graph() -> NeighborGraph {
        // 0-1-2 form a path, 3 is isolated, 4-5 form a pair.
        let mut graph = NeighborGraph::with_nodes(6);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(4, 5);
        graph
    }

    #[test]
    fn construction_and_counts() {
        let graph = make_test_graph();
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 3);
        assert!(!graph.is_edgeless());
        assert!(graph.contains_edge(1, 0));
        assert!(!graph.contains_edge(0, 2));
        assert_eq!(graph.edges(), vec![(0, 1), (1, 2), (4, 5)]);
    }

    #[test]
    fn self_loops_are_ignored() {
        let graph = NeighborGraph::from_edges([(0, 0), (0, 1), (1, 1)]);
        assert_eq!(graph.edges(), vec![(0, 1)]);
    }

    #[test]
    fn from_adjacency_keeps_isolated_nodes() {
        let adjacency = BTreeMap::from([(0, vec![1]), (1, vec![]), (2, vec![])]);
        let graph = NeighborGraph::from_adjacency(adjacency);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edges(), vec![(0, 1)]);
    }

    #[test]
    fn component_labels_are_first_seen_order() {
        let graph = make_test_graph();
        let labels = graph.component_labels();
        assert_eq!(labels[&0], 0);
        assert_eq!(labels[&1], 0);
        assert_eq!(labels[&2], 0);
        assert_eq!(labels[&3], 1);
        assert_eq!(labels[&4], 2);
        assert_eq!(labels[&5], 2);
    }

    #[test]
    fn components_are_sorted() {
        let graph = make_test_graph();
        assert_eq!(graph.components(), vec![vec![0, 1, 2], vec![3], vec![4, 5]]);
    }

    #[test]
    fn difference_drops_shared_edges() {
        let full = make_test_graph();
        let partial = NeighborGraph::from_edges([(0, 1)]);
        let diff = full.difference(&partial);
        assert_eq!(diff.edges(), vec![(1, 2), (4, 5)]);
        // Node set follows the left operand.
        assert_eq!(diff.node_count(), 6);
    }

    #[test]
    fn difference_with_self_is_edgeless() {
        let graph = make_test_graph();
        assert!(graph.difference(&graph).is_edgeless());
    }

    #[test]
    fn empty_graph_is_valid() {
        let graph = NeighborGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.is_edgeless());
        assert!(graph.components().is_empty());
    }
}
