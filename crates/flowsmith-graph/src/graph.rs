//! Canonical node and edge storage.
//!
//! [`GraphModel`] enforces the structural invariants of a pipeline graph:
//! unique node ids, unique edge ids, no conflicting handles on the same node
//! pair, and contiguous `1..N` sibling order inside every
//! `(source, handle group)`. Every mutator either applies completely or
//! returns an error and leaves the graph unchanged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use flowsmith_doc::Position;
use flowsmith_types::{FlowError, Result};

use crate::edge::{Connection, Edge, EdgeAttr, EdgeId, HandleGroup, SourceHandle};
use crate::node::{FieldUpdate, Node, NodeData, NodeId, NodeKind, PipelineData, Section};
use crate::params::FieldValue;

/// Structural content of a graph: what history stores and compares.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Request for [`GraphModel::add_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub kind: NodeKind,
    /// Initial pipeline data; its label is replaced by the generated one.
    pub data: Option<PipelineData>,
    pub position: Position,
    /// Make the new node the only selected node.
    pub select: bool,
    /// Connect every selected pipeline node to the new node with a `next` edge.
    pub link: bool,
}

impl NewNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            data: None,
            position: Position::default(),
            select: true,
            link: false,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_data(mut self, data: PipelineData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn linked(mut self) -> Self {
        self.link = true;
        self
    }

    pub fn unselected(mut self) -> Self {
        self.select = false;
        self
    }
}

/// A low-level node change as produced by interactive drag and select.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Position {
        id: NodeId,
        position: Position,
        dragging: bool,
    },
    Select {
        id: NodeId,
        selected: bool,
    },
    Remove {
        id: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Select { id: EdgeId, selected: bool },
    Remove { id: EdgeId },
}

/// What a batch of changes touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    pub moved: bool,
    pub selection: bool,
    pub removed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    next_id: u64,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// First node of any kind carrying `label`.
    pub fn find_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label() == label)
    }

    pub fn pipeline_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind() == NodeKind::Pipeline)
    }

    /// Edges of one `(source, group)` sorted by sibling order.
    pub fn siblings(&self, source: &str, group: HandleGroup) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.iter().filter(|e| e.in_group(source, group)).collect();
        edges.sort_by_key(|e| e.order);
        edges
    }

    pub fn outgoing(&self, source: &str) -> impl Iterator<Item = &Edge> {
        let source = source.to_string();
        self.edges.iter().filter(move |e| e.source == source)
    }

    pub fn selected_node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().filter(|n| n.selected).map(|n| n.id.clone()).collect()
    }

    pub fn selected_edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().filter(|e| e.selected).map(|e| e.id.clone()).collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    fn require_node(&self, id: &str) -> Result<&Node> {
        self.node(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))
    }

    fn edge_index(&self, id: &str) -> Result<usize> {
        self.edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| FlowError::EdgeNotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Add a node with a fresh id and a generated label unique across all
    /// node kinds.
    pub fn add_node(&mut self, request: NewNode) -> NodeId {
        let base = request.kind.label_base();
        let mut counter = self.next_id;
        let (id, label) = loop {
            let id = counter.to_string();
            let label = format!("{base}{counter}");
            if self.find_by_label(&label).is_none() && self.node(&id).is_none() {
                break (id, label);
            }
            counter += 1;
        };
        self.next_id = counter + 1;

        let data = match request.kind {
            NodeKind::Pipeline => {
                let mut data = request.data.unwrap_or_default();
                data.label = label;
                NodeData::Pipeline(data)
            }
            NodeKind::External => NodeData::External { label },
            NodeKind::Anchor => NodeData::Anchor { label },
        };

        let link_from: Vec<NodeId> = if request.link {
            self.nodes
                .iter()
                .filter(|n| n.selected && n.has_outputs())
                .map(|n| n.id.clone())
                .collect()
        } else {
            Vec::new()
        };

        if request.select {
            for node in &mut self.nodes {
                node.selected = false;
            }
            for edge in &mut self.edges {
                edge.selected = false;
            }
        }
        let mut node = Node::new(id.clone(), data, request.position);
        node.selected = request.select;
        self.nodes.push(node);

        for source in link_from {
            let conn = Connection::new(source, SourceHandle::Next, id.clone());
            if let Err(e) = self.add_edge(conn, true) {
                tracing::debug!(node = %id, error = %e, "Auto-link skipped");
            }
        }
        tracing::debug!(node = %id, kind = %request.kind, "Node added");
        id
    }

    /// Insert fully built nodes, as done by paste and import. Ids must be free.
    pub fn insert_node(&mut self, node: Node) -> Result<()> {
        if self.node(&node.id).is_some() {
            return Err(FlowError::Validation(format!("node id '{}' already in use", node.id)));
        }
        if let Ok(n) = node.id.parse::<u64>() {
            self.next_id = self.next_id.max(n + 1);
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let touching: Vec<EdgeId> = self.edges.iter().filter(|e| e.touches(id)).map(|e| e.id.clone()).collect();
        for edge_id in touching {
            self.remove_edge(&edge_id)?;
        }
        tracing::debug!(node = %id, "Node removed");
        Ok(self.nodes.remove(index))
    }

    pub fn set_node_field(&mut self, id: &str, section: Section, key: &str, value: FieldValue) -> Result<()> {
        self.set_node_fields(id, vec![FieldUpdate { section, key: key.to_string(), value }])
    }

    /// Apply several field edits to one node; all of them or none.
    pub fn set_node_fields(&mut self, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let mut node = self.nodes[index].clone();
        for update in updates {
            node.set_field(update.section, &update.key, update.value)?;
        }
        self.nodes[index] = node;
        Ok(())
    }

    /// Apply interactive changes as one batch. Unknown ids are skipped.
    pub fn apply_node_changes(&mut self, changes: Vec<NodeChange>) -> Result<ChangeSummary> {
        let mut summary = ChangeSummary::default();
        for change in changes {
            match change {
                NodeChange::Position { id, position, dragging } => {
                    if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
                        node.position = position;
                        node.dragging = dragging;
                        summary.moved = true;
                    }
                }
                NodeChange::Select { id, selected } => {
                    if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
                        summary.selection |= node.selected != selected;
                        node.selected = selected;
                    }
                }
                NodeChange::Remove { id } => {
                    if self.node(&id).is_some() {
                        self.remove_node(&id)?;
                        summary.removed = true;
                    }
                }
            }
        }
        Ok(summary)
    }

    pub fn apply_edge_changes(&mut self, changes: Vec<EdgeChange>) -> Result<ChangeSummary> {
        let mut summary = ChangeSummary::default();
        for change in changes {
            match change {
                EdgeChange::Select { id, selected } => {
                    if let Some(edge) = self.edges.iter_mut().find(|e| e.id == id) {
                        summary.selection |= edge.selected != selected;
                        edge.selected = selected;
                    }
                }
                EdgeChange::Remove { id } => {
                    if self.edge(&id).is_some() {
                        self.remove_edge(&id)?;
                        summary.removed = true;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Deselect everything. Returns whether anything was selected.
    pub fn deselect_all(&mut self) -> bool {
        let mut changed = false;
        for node in &mut self.nodes {
            changed |= node.selected;
            node.selected = false;
        }
        for edge in &mut self.edges {
            changed |= edge.selected;
            edge.selected = false;
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Connect two nodes, appending the edge at the end of its sibling group.
    pub fn add_edge(&mut self, conn: Connection, check_conflicts: bool) -> Result<EdgeId> {
        let source = self.require_node(&conn.source)?;
        if !source.has_outputs() {
            return Err(FlowError::Validation(format!(
                "{} node '{}' has no outputs",
                source.kind(),
                conn.source
            )));
        }
        self.require_node(&conn.target)?;

        if conn.source_handle == SourceHandle::Error && conn.source == conn.target {
            return Err(FlowError::SelfLoop { node: conn.source });
        }
        let id = conn.edge_id();
        if self.edge(&id).is_some() {
            return Err(FlowError::DuplicateEdge {
                from: conn.source,
                to: conn.target,
                handle: conn.source_handle.key().into(),
            });
        }
        if check_conflicts {
            if let Some(existing) = self.edges.iter().find(|e| {
                e.source == conn.source && e.target == conn.target && conn.source_handle.conflicts_with(e.source_handle)
            }) {
                return Err(FlowError::EdgeConflict {
                    from: conn.source.clone(),
                    to: conn.target.clone(),
                    handle: conn.source_handle.key().into(),
                    existing: existing.source_handle.key().into(),
                });
            }
        }

        let group = conn.source_handle.group();
        let order = self.edges.iter().filter(|e| e.in_group(&conn.source, group)).count() as u32 + 1;
        self.edges.push(Edge::new(&conn, order));
        tracing::debug!(edge = %id, order, "Edge added");
        Ok(id)
    }

    /// Insert a fully built edge as import does, without order recomputation.
    pub(crate) fn insert_edge_raw(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Remove an edge and close the gap in its sibling group.
    pub fn remove_edge(&mut self, id: &str) -> Result<Edge> {
        let index = self.edge_index(id)?;
        let removed = self.edges.remove(index);
        let group = removed.group();
        for edge in &mut self.edges {
            if edge.in_group(&removed.source, group) && edge.order > removed.order {
                edge.order -= 1;
            }
        }
        tracing::debug!(edge = %id, "Edge removed");
        Ok(removed)
    }

    /// Move an edge to `new_order` within its group, shifting the siblings in
    /// between. Returns `false` when the order is unchanged.
    pub fn reorder_edge(&mut self, id: &str, new_order: u32) -> Result<bool> {
        let index = self.edge_index(id)?;
        let (source, group, old) = {
            let e = &self.edges[index];
            (e.source.clone(), e.group(), e.order)
        };
        let count = self.edges.iter().filter(|e| e.in_group(&source, group)).count() as u32;
        if new_order == 0 || new_order > count {
            return Err(FlowError::Validation(format!(
                "order {new_order} out of range 1..={count} for edge '{id}'"
            )));
        }
        if new_order == old {
            return Ok(false);
        }
        for (i, edge) in self.edges.iter_mut().enumerate() {
            if i == index || !edge.in_group(&source, group) {
                continue;
            }
            if new_order < old && edge.order >= new_order && edge.order < old {
                edge.order += 1;
            } else if new_order > old && edge.order > old && edge.order <= new_order {
                edge.order -= 1;
            }
        }
        self.edges[index].order = new_order;
        Ok(true)
    }

    /// Set (`Some(true)`) or clear (`None` / `Some(false)`) an edge attribute.
    pub fn set_edge_attribute(&mut self, id: &str, attr: EdgeAttr, value: Option<bool>) -> Result<()> {
        let index = self.edge_index(id)?;
        let on = value.unwrap_or(false);
        let edge = &mut self.edges[index];
        match attr {
            EdgeAttr::JumpBack => edge.attributes.jump_back = on,
            EdgeAttr::Anchor => edge.attributes.anchor = on,
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Wholesale
    // -----------------------------------------------------------------------

    /// Replace all content. View flags are reset; the id counter is advanced
    /// past every numeric id.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        for node in &mut self.nodes {
            node.selected = false;
            node.dragging = false;
        }
        for edge in &mut self.edges {
            edge.selected = false;
        }
        let max_id = self.nodes.iter().filter_map(|n| n.id.parse::<u64>().ok()).max();
        self.next_id = self.next_id.max(max_id.map_or(0, |m| m + 1));
    }

    /// Sibling groups whose orders are not exactly `1..N`.
    pub fn order_gaps(&self) -> Vec<(NodeId, HandleGroup)> {
        let mut seen = HashSet::new();
        let mut gaps = Vec::new();
        for edge in &self.edges {
            let key = (edge.source.clone(), edge.group());
            if !seen.insert(key.clone()) {
                continue;
            }
            let mut orders: Vec<u32> = self.siblings(&key.0, key.1).iter().map(|e| e.order).collect();
            orders.sort_unstable();
            if orders.iter().enumerate().any(|(i, o)| *o != i as u32 + 1) {
                gaps.push(key);
            }
        }
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with(n: usize) -> (GraphModel, Vec<NodeId>) {
        let mut g = GraphModel::new();
        let ids = (0..n).map(|_| g.add_node(NewNode::new(NodeKind::Pipeline))).collect();
        (g, ids)
    }

    fn orders(g: &GraphModel, source: &str, group: HandleGroup) -> Vec<(String, u32)> {
        g.siblings(source, group).iter().map(|e| (e.target.clone(), e.order)).collect()
    }

    #[test]
    fn add_node_generates_unique_labels() {
        let (g, ids) = graph_with(5);
        let labels: HashSet<_> = g.nodes().iter().map(|n| n.label().to_string()).collect();
        assert_eq!(labels.len(), 5);
        assert_eq!(g.node(&ids[0]).unwrap().label(), "NewNode0");
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn add_node_skips_taken_labels() {
        let mut g = GraphModel::new();
        g.insert_node(Node::pipeline("a", "NewNode0", Position::default())).unwrap();
        g.insert_node(Node::external("b", "NewNode1", Position::default())).unwrap();
        let id = g.add_node(NewNode::new(NodeKind::Pipeline));
        assert_eq!(g.node(&id).unwrap().label(), "NewNode2");
    }

    #[test]
    fn new_node_is_selected_alone_and_linked() {
        let (mut g, ids) = graph_with(3);
        g.deselect_all();
        g.apply_node_changes(vec![
            NodeChange::Select { id: ids[0].clone(), selected: true },
            NodeChange::Select { id: ids[2].clone(), selected: true },
        ])
        .unwrap();
        let id = g.add_node(NewNode::new(NodeKind::Pipeline).linked());
        assert_eq!(g.selected_node_ids(), vec![id.clone()]);
        let sources: Vec<_> = g.edges().iter().map(|e| e.source.clone()).collect();
        assert_eq!(sources, vec![ids[0].clone(), ids[2].clone()]);
        assert!(g.edges().iter().all(|e| e.target == id && e.order == 1));
    }

    #[test]
    fn auto_link_skips_external_sources() {
        let mut g = GraphModel::new();
        let ext = g.add_node(NewNode::new(NodeKind::External));
        let id = g.add_node(NewNode::new(NodeKind::Pipeline).linked());
        assert!(g.edges().is_empty());
        assert!(g.node(&ext).is_some() && g.node(&id).is_some());
    }

    #[test]
    fn edge_order_counts_group() {
        let (mut g, ids) = graph_with(4);
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[1]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::JumpBack, &ids[2]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[3]), true).unwrap();
        assert_eq!(orders(&g, &ids[0], HandleGroup::Next), vec![(ids[1].clone(), 1), (ids[2].clone(), 2)]);
        assert_eq!(orders(&g, &ids[0], HandleGroup::Error), vec![(ids[3].clone(), 1)]);
    }

    #[test]
    fn conflicts_and_self_loops_rejected() {
        let (mut g, ids) = graph_with(2);
        g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[1]), true).unwrap();
        let err = g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[1]), true).unwrap_err();
        assert!(matches!(err, FlowError::EdgeConflict { .. }));
        let err = g.add_edge(Connection::new(&ids[0], SourceHandle::JumpBack, &ids[1]), true).unwrap_err();
        assert!(matches!(err, FlowError::EdgeConflict { .. }));
        g.add_edge(Connection::new(&ids[0], SourceHandle::Interrupt, &ids[1]), true).unwrap();
        let err = g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[0]), true).unwrap_err();
        assert!(matches!(err, FlowError::SelfLoop { .. }));
        let err = g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[1]), true).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateEdge { .. }));
        assert_eq!(g.edges().len(), 2);
        // Next self-loops are allowed.
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[0]), true).unwrap();
    }

    #[test]
    fn unchecked_add_allows_conflicting_pair() {
        let (mut g, ids) = graph_with(2);
        g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[1]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[1]), false).unwrap();
        assert_eq!(g.edges().len(), 2);
    }

    #[test]
    fn remove_edge_renumbers() {
        let (mut g, ids) = graph_with(4);
        let e1 = g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[1]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[2]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[3]), true).unwrap();
        g.remove_edge(&e1).unwrap();
        assert_eq!(orders(&g, &ids[0], HandleGroup::Next), vec![(ids[2].clone(), 1), (ids[3].clone(), 2)]);
    }

    #[test]
    fn remove_node_cascades() {
        let (mut g, ids) = graph_with(3);
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[1]), true).unwrap();
        g.add_edge(Connection::new(&ids[0], SourceHandle::Next, &ids[2]), true).unwrap();
        g.add_edge(Connection::new(&ids[1], SourceHandle::Next, &ids[2]), true).unwrap();
        g.remove_node(&ids[1]).unwrap();
        assert_eq!(g.edges().len(), 1);
        assert_eq!(orders(&g, &ids[0], HandleGroup::Next), vec![(ids[2].clone(), 1)]);
        assert!(g.order_gaps().is_empty());
    }

    #[test]
    fn reorder_shifts_between() {
        let (mut g, ids) = graph_with(5);
        let mut edges = Vec::new();
        for t in &ids[1..] {
            edges.push(g.add_edge(Connection::new(&ids[0], SourceHandle::Next, t), true).unwrap());
        }
        // move the last edge to the front
        assert!(g.reorder_edge(&edges[3], 1).unwrap());
        let got: Vec<_> = orders(&g, &ids[0], HandleGroup::Next).into_iter().map(|(t, _)| t).collect();
        assert_eq!(got, vec![ids[4].clone(), ids[1].clone(), ids[2].clone(), ids[3].clone()]);
        // and the first one to the back
        assert!(g.reorder_edge(&edges[3], 4).unwrap());
        let got: Vec<_> = orders(&g, &ids[0], HandleGroup::Next).into_iter().map(|(t, _)| t).collect();
        assert_eq!(got, ids[1..].to_vec());
        assert!(!g.reorder_edge(&edges[0], 1).unwrap());
        assert!(g.reorder_edge(&edges[0], 9).unwrap_err().is_validation());
        assert!(g.order_gaps().is_empty());
    }

    #[test]
    fn edge_attributes_clear_on_false() {
        let (mut g, ids) = graph_with(2);
        let e = g.add_edge(Connection::new(&ids[0], SourceHandle::Error, &ids[1]), true).unwrap();
        g.set_edge_attribute(&e, EdgeAttr::JumpBack, Some(true)).unwrap();
        assert!(g.edge(&e).unwrap().attributes.jump_back);
        g.set_edge_attribute(&e, EdgeAttr::JumpBack, None).unwrap();
        assert!(g.edge(&e).unwrap().attributes.is_empty());
    }

    #[test]
    fn batch_field_edit_is_atomic() {
        let (mut g, ids) = graph_with(1);
        let err = g
            .set_node_fields(
                &ids[0],
                vec![
                    FieldUpdate::new(Section::Root, "label", json!("Renamed")),
                    FieldUpdate::new(Section::Others, "enabled", json!("nope")),
                ],
            )
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(g.node(&ids[0]).unwrap().label(), "NewNode0");
    }

    #[test]
    fn replace_advances_id_counter() {
        let mut g = GraphModel::new();
        g.replace(Snapshot {
            nodes: vec![Node::pipeline("7", "Seven", Position::default())],
            edges: vec![],
        });
        let id = g.add_node(NewNode::new(NodeKind::Anchor));
        assert_eq!(id, "8");
        assert_eq!(g.node(&id).unwrap().label(), "Anchor8");
    }
}
