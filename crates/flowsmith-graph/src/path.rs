//! Path queries: every node and edge on any simple directed path between two
//! nodes.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::edge::{Edge, EdgeId};
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathResult {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl PathResult {
    /// `true` when no path connects the two ends.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Union of all simple paths from `start` to `end`.
///
/// Explores every branch instead of stopping at the first hit, so parallel
/// routes (a diamond) are all reported. `start == end` yields that node alone.
pub fn find_all_paths(edges: &[Edge], start: &str, end: &str) -> PathResult {
    let mut result = PathResult::default();
    if start == end {
        result.nodes.insert(start.to_string());
        return result;
    }

    let mut adjacency: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push((edge.target.as_str(), edge.id.as_str()));
    }

    struct Walk<'a> {
        adjacency: HashMap<&'a str, Vec<(&'a str, &'a str)>>,
        end: &'a str,
        on_path: HashSet<&'a str>,
        node_path: Vec<&'a str>,
        edge_path: Vec<&'a str>,
    }

    impl<'a> Walk<'a> {
        fn visit(&mut self, node: &'a str, result: &mut PathResult) {
            let Some(neighbors) = self.adjacency.get(node).cloned() else {
                return;
            };
            for (next, edge) in neighbors {
                if next == self.end {
                    result.nodes.extend(self.node_path.iter().map(|n| n.to_string()));
                    result.nodes.insert(next.to_string());
                    result.edges.extend(self.edge_path.iter().map(|e| e.to_string()));
                    result.edges.insert(edge.to_string());
                    continue;
                }
                if self.on_path.contains(next) {
                    continue;
                }
                self.on_path.insert(next);
                self.node_path.push(next);
                self.edge_path.push(edge);
                self.visit(next, result);
                self.edge_path.pop();
                self.node_path.pop();
                self.on_path.remove(next);
            }
        }
    }

    let mut walk = Walk {
        adjacency,
        end,
        on_path: HashSet::from([start]),
        node_path: vec![start],
        edge_path: Vec::new(),
    };
    walk.visit(start, &mut result);
    result
}

/// Start/end pair of an interactive path query, independent of selection.
#[derive(Debug, Clone, Default)]
pub struct PathQuery {
    pub mode: bool,
    pub start: Option<NodeId>,
    pub end: Option<NodeId>,
    /// `None` until both ends are set.
    pub result: Option<PathResult>,
}

impl PathQuery {
    pub fn set_mode(&mut self, enabled: bool) {
        self.mode = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub fn set_start(&mut self, node: Option<NodeId>, edges: &[Edge]) {
        self.start = node;
        self.recompute(edges);
    }

    pub fn set_end(&mut self, node: Option<NodeId>, edges: &[Edge]) {
        self.end = node;
        self.recompute(edges);
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
        self.result = None;
    }

    /// Recompute after a graph change; ends that no longer exist are kept so
    /// the host can clear them explicitly.
    pub fn recompute(&mut self, edges: &[Edge]) {
        self.result = match (&self.start, &self.end) {
            (Some(s), Some(e)) => Some(find_all_paths(edges, s, e)),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Connection, SourceHandle};

    fn edge(s: &str, t: &str) -> Edge {
        Edge::new(&Connection::new(s, SourceHandle::Next, t), 1)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diamond_reports_both_branches() {
        let edges = vec![edge("A", "B"), edge("A", "C"), edge("B", "D"), edge("C", "D"), edge("D", "E")];
        let r = find_all_paths(&edges, "A", "D");
        assert_eq!(r.nodes, set(&["A", "B", "C", "D"]));
        assert_eq!(r.edges, set(&["A_next_B", "A_next_C", "B_next_D", "C_next_D"]));
    }

    #[test]
    fn same_start_and_end() {
        let r = find_all_paths(&[edge("A", "B")], "A", "A");
        assert_eq!(r.nodes, set(&["A"]));
        assert!(r.edges.is_empty());
    }

    #[test]
    fn unreachable_is_empty() {
        let r = find_all_paths(&[edge("A", "B"), edge("C", "A")], "A", "C");
        assert!(r.is_empty());
    }

    #[test]
    fn cycles_terminate_and_dead_ends_excluded() {
        let edges = vec![edge("A", "B"), edge("B", "A"), edge("B", "C"), edge("B", "X")];
        let r = find_all_paths(&edges, "A", "C");
        assert_eq!(r.nodes, set(&["A", "B", "C"]));
        assert!(!r.edges.contains("B_next_X"));
    }

    #[test]
    fn query_computes_when_both_ends_set() {
        let edges = vec![edge("A", "B")];
        let mut q = PathQuery::default();
        q.set_mode(true);
        q.set_start(Some("A".into()), &edges);
        assert!(q.result.is_none());
        q.set_end(Some("B".into()), &edges);
        assert_eq!(q.result.as_ref().map(|r| r.nodes.len()), Some(2));
        q.set_end(Some("Z".into()), &edges);
        assert!(q.result.as_ref().unwrap().is_empty());
        q.set_mode(false);
        assert!(q.start.is_none() && q.result.is_none());
    }
}
