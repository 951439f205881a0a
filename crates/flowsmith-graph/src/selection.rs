//! Selection views derived from the graph's per-item selection flags.
//!
//! Two views are kept: the immediate one, recomputed after every change, and
//! a settled one that the editor copies over once changes stop for the
//! debounce window. Consumers doing expensive work (panels, previews) read
//! the settled view.

use crate::edge::EdgeId;
use crate::graph::GraphModel;
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionView {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// The single node being inspected.
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    current: SelectionView,
    settled: SelectionView,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &SelectionView {
        &self.current
    }

    pub fn settled(&self) -> &SelectionView {
        &self.settled
    }

    /// Recompute the immediate view. Returns whether it changed.
    ///
    /// The target follows a single selected node unless that node is being
    /// dragged and a target already exists; any other selection size clears it.
    pub fn update(&mut self, graph: &GraphModel) -> bool {
        let nodes = graph.selected_node_ids();
        let edges = graph.selected_edge_ids();
        let target = match nodes.as_slice() {
            [only] => {
                let dragging = graph.node(only).is_some_and(|n| n.dragging);
                if !dragging || self.current.target.is_none() {
                    Some(only.clone())
                } else {
                    self.current.target.clone()
                }
            }
            _ => None,
        };
        let next = SelectionView { nodes, edges, target };
        if next == self.current {
            return false;
        }
        self.current = next;
        true
    }

    /// Point the target at `node` regardless of the selection. Returns whether
    /// it changed.
    pub fn set_target(&mut self, node: Option<NodeId>) -> bool {
        if self.current.target == node {
            return false;
        }
        self.current.target = node;
        true
    }

    /// Empty both views at once.
    pub fn clear(&mut self) {
        self.current = SelectionView::default();
        self.settled = SelectionView::default();
    }

    /// Copy the immediate view into the settled view. Returns whether the
    /// settled view changed.
    pub fn settle(&mut self) -> bool {
        if self.settled == self.current {
            return false;
        }
        self.settled = self.current.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NewNode, NodeChange};
    use crate::node::NodeKind;
    use flowsmith_doc::Position;

    #[test]
    fn single_selection_sets_target() {
        let mut g = GraphModel::new();
        let a = g.add_node(NewNode::new(NodeKind::Pipeline));
        let mut t = SelectionTracker::new();
        assert!(t.update(&g));
        assert_eq!(t.current().target.as_deref(), Some(a.as_str()));
        assert!(t.settled().target.is_none());
        assert!(t.settle());
        assert_eq!(t.settled(), t.current());
    }

    #[test]
    fn multi_selection_clears_target() {
        let mut g = GraphModel::new();
        let a = g.add_node(NewNode::new(NodeKind::Pipeline));
        g.add_node(NewNode::new(NodeKind::Pipeline));
        g.apply_node_changes(vec![NodeChange::Select { id: a, selected: true }]).unwrap();
        let mut t = SelectionTracker::new();
        t.update(&g);
        assert_eq!(t.current().nodes.len(), 2);
        assert!(t.current().target.is_none());
    }

    #[test]
    fn dragging_keeps_existing_target() {
        let mut g = GraphModel::new();
        let a = g.add_node(NewNode::new(NodeKind::Pipeline));
        let b = g.add_node(NewNode::new(NodeKind::Pipeline).unselected());
        let mut t = SelectionTracker::new();
        t.update(&g);
        assert_eq!(t.current().target.as_deref(), Some(a.as_str()));
        // select b while it is being dragged: target stays on a
        g.deselect_all();
        g.apply_node_changes(vec![
            NodeChange::Select { id: b.clone(), selected: true },
            NodeChange::Position { id: b.clone(), position: Position { x: 5.0, y: 5.0 }, dragging: true },
        ])
        .unwrap();
        t.update(&g);
        assert_eq!(t.current().target.as_deref(), Some(a.as_str()));
        // drag ends: target follows
        g.apply_node_changes(vec![NodeChange::Position {
            id: b.clone(),
            position: Position { x: 6.0, y: 6.0 },
            dragging: false,
        }])
        .unwrap();
        t.update(&g);
        assert_eq!(t.current().target.as_deref(), Some(b.as_str()));
    }

    #[test]
    fn clear_empties_both_views() {
        let mut g = GraphModel::new();
        g.add_node(NewNode::new(NodeKind::Pipeline));
        let mut t = SelectionTracker::new();
        t.update(&g);
        t.settle();
        t.clear();
        assert_eq!(t.current(), &SelectionView::default());
        assert_eq!(t.settled(), &SelectionView::default());
    }
}
