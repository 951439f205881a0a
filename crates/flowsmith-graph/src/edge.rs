//! Edges, source handles and sibling groups.

use serde::{Deserialize, Serialize};

use flowsmith_doc::LinkField;

use crate::node::NodeId;

pub type EdgeId = String;

/// Output port an edge leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHandle {
    Next,
    /// A `next` entry the runtime returns from once the target chain ends.
    JumpBack,
    Interrupt,
    #[serde(rename = "on_error")]
    Error,
}

/// Edges sharing a group are ordered together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleGroup {
    Next,
    Interrupt,
    Error,
}

impl SourceHandle {
    pub const ALL: [SourceHandle; 4] = [
        SourceHandle::Next,
        SourceHandle::JumpBack,
        SourceHandle::Interrupt,
        SourceHandle::Error,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SourceHandle::Next => "next",
            SourceHandle::JumpBack => "jump_back",
            SourceHandle::Interrupt => "interrupt",
            SourceHandle::Error => "on_error",
        }
    }

    pub fn group(self) -> HandleGroup {
        match self {
            SourceHandle::Next | SourceHandle::JumpBack => HandleGroup::Next,
            SourceHandle::Interrupt => HandleGroup::Interrupt,
            SourceHandle::Error => HandleGroup::Error,
        }
    }

    /// Whether two handles may not both connect the same ordered node pair.
    pub fn conflicts_with(self, other: SourceHandle) -> bool {
        use SourceHandle::*;
        matches!(
            (self, other),
            (Next, Error) | (Error, Next) | (Next, JumpBack) | (JumpBack, Next) | (JumpBack, Error) | (Error, JumpBack)
        )
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl HandleGroup {
    pub const ALL: [HandleGroup; 3] = [HandleGroup::Next, HandleGroup::Interrupt, HandleGroup::Error];

    /// Document field the group is written to.
    pub fn link_field(self) -> LinkField {
        match self {
            HandleGroup::Next => LinkField::Next,
            HandleGroup::Interrupt => LinkField::Interrupt,
            HandleGroup::Error => LinkField::OnError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHandle {
    #[default]
    Target,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Flags that change how an edge is written without changing its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeAttributes {
    #[serde(default, skip_serializing_if = "is_false")]
    pub jump_back: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub anchor: bool,
}

impl EdgeAttributes {
    pub fn is_empty(&self) -> bool {
        !self.jump_back && !self.anchor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeAttr {
    JumpBack,
    Anchor,
}

/// Request to connect two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub source_handle: SourceHandle,
    pub target: NodeId,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, source_handle: SourceHandle, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            source_handle,
            target: target.into(),
        }
    }

    pub fn edge_id(&self) -> EdgeId {
        edge_id(&self.source, self.source_handle, &self.target)
    }
}

pub fn edge_id(source: &str, handle: SourceHandle, target: &str) -> EdgeId {
    format!("{}_{}_{}", source, handle.key(), target)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub source_handle: SourceHandle,
    pub target: NodeId,
    #[serde(default)]
    pub target_handle: TargetHandle,
    /// 1-based position among the source's edges of the same group.
    #[serde(rename = "label")]
    pub order: u32,
    #[serde(default, skip_serializing_if = "EdgeAttributes::is_empty")]
    pub attributes: EdgeAttributes,
    #[serde(skip)]
    pub selected: bool,
}

impl Edge {
    pub fn new(connection: &Connection, order: u32) -> Self {
        Self {
            id: connection.edge_id(),
            source: connection.source.clone(),
            source_handle: connection.source_handle,
            target: connection.target.clone(),
            target_handle: TargetHandle::Target,
            order,
            attributes: EdgeAttributes::default(),
            selected: false,
        }
    }

    pub fn group(&self) -> HandleGroup {
        self.source_handle.group()
    }

    pub fn in_group(&self, source: &str, group: HandleGroup) -> bool {
        self.source == source && self.group() == group
    }

    pub fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups() {
        assert_eq!(SourceHandle::JumpBack.group(), HandleGroup::Next);
        assert_eq!(SourceHandle::Interrupt.group(), HandleGroup::Interrupt);
        assert_eq!(HandleGroup::Error.link_field(), LinkField::OnError);
    }

    #[test]
    fn conflict_pairs_are_symmetric() {
        for a in SourceHandle::ALL {
            for b in SourceHandle::ALL {
                assert_eq!(a.conflicts_with(b), b.conflicts_with(a), "{a} / {b}");
            }
        }
        assert!(!SourceHandle::Interrupt.conflicts_with(SourceHandle::Next));
        assert!(!SourceHandle::Next.conflicts_with(SourceHandle::Next));
    }

    #[test]
    fn edge_serialization() {
        let edge = Edge::new(&Connection::new("1", SourceHandle::Error, "2"), 1);
        assert_eq!(edge.id, "1_on_error_2");
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["label"], 1);
        assert_eq!(value["source_handle"], "on_error");
        assert_eq!(value["target_handle"], "target");
        assert!(value.get("attributes").is_none());
        assert!(value.get("selected").is_none());
    }
}
