//! Graph nodes and node field edits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowsmith_doc::{LinkField, Position};
use flowsmith_types::{FlowError, Result};

use crate::params::{
    Action, ActionKind, FieldValue, Others, ParamRecord, Recognition, RecognitionKind,
};

pub type NodeId = String;

/// Key that, in the recognition or action section, switches the algorithm type.
pub const TYPE_CHANGE_KEY: &str = "__type_change__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Pipeline,
    External,
    Anchor,
}

impl NodeKind {
    /// Base of generated labels.
    pub fn label_base(self) -> &'static str {
        match self {
            NodeKind::Pipeline => "NewNode",
            NodeKind::External => "External",
            NodeKind::Anchor => "Anchor",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NodeKind::Pipeline => "pipeline",
            NodeKind::External => "external",
            NodeKind::Anchor => "anchor",
        })
    }
}

/// Section addressed by a field edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Recognition,
    Action,
    Others,
    Root,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Section::Recognition => "recognition",
            Section::Action => "action",
            Section::Others => "others",
            Section::Root => "root",
        }
    }
}

/// One entry of a batch field edit.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub section: Section,
    pub key: String,
    pub value: FieldValue,
}

impl FieldUpdate {
    pub fn new(section: Section, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            section,
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineData {
    pub label: String,
    #[serde(default)]
    pub recognition: Recognition,
    #[serde(default)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Others::is_empty")]
    pub others: Others,
    /// Entry keys the editor does not model, written back verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl PipelineData {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    fn set_field(&mut self, section: Section, key: &str, value: FieldValue) -> Result<()> {
        match section {
            Section::Recognition if key == TYPE_CHANGE_KEY => {
                let kind = RecognitionKind::parse_or_err(type_name(section, &value)?)?;
                self.recognition = self.recognition.convert_to(kind);
            }
            Section::Recognition => self.recognition.set_field(key, value)?,
            Section::Action if key == TYPE_CHANGE_KEY => {
                let kind = ActionKind::parse_or_err(type_name(section, &value)?)?;
                self.action = self.action.convert_to(kind);
            }
            Section::Action => self.action.set_field(key, value)?,
            Section::Others => self.others = self.others.with_field("others", key, value)?,
            Section::Root => self.set_root_field(key, value)?,
        }
        Ok(())
    }

    fn set_root_field(&mut self, key: &str, value: FieldValue) -> Result<()> {
        match key {
            "label" => self.label = label_value(value)?,
            "extras" => match value {
                FieldValue::Set(Value::Object(map)) => self.extras = map,
                FieldValue::Delete => self.extras.clear(),
                FieldValue::Set(_) => return Err(invalid(Section::Root, key, "expected an object")),
            },
            "recognition" | "action" => {
                return Err(invalid(Section::Root, key, "edit through its own section"));
            }
            k if LinkField::is_link_key(k) => {
                return Err(invalid(Section::Root, key, "links are edges, not fields"));
            }
            k if Others::KEYS.contains(&k) => {
                return Err(invalid(Section::Root, key, "edit through the others section"));
            }
            _ => match value {
                FieldValue::Set(v) => {
                    self.extras.insert(key.to_string(), v);
                }
                FieldValue::Delete => {
                    self.extras.shift_remove(key);
                }
            },
        }
        Ok(())
    }
}

fn invalid(section: Section, key: &str, message: &str) -> FlowError {
    FlowError::InvalidField {
        section: section.name().into(),
        key: key.into(),
        message: message.into(),
    }
}

fn type_name(section: Section, value: &FieldValue) -> Result<&str> {
    match value {
        FieldValue::Set(Value::String(name)) => Ok(name),
        _ => Err(invalid(section, TYPE_CHANGE_KEY, "expected a type name")),
    }
}

fn label_value(value: FieldValue) -> Result<String> {
    match value {
        FieldValue::Set(Value::String(label)) => Ok(label),
        _ => Err(invalid(Section::Root, "label", "expected a string")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Pipeline(PipelineData),
    /// A node defined in another document.
    External { label: String },
    /// A label resolved by the runtime when the node runs.
    Anchor { label: String },
}

/// A graph node. `selected` and `dragging` are view state and never part of
/// a snapshot or an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
    #[serde(skip)]
    pub selected: bool,
    #[serde(skip)]
    pub dragging: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, data: NodeData, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            data,
            selected: false,
            dragging: false,
        }
    }

    pub fn pipeline(id: impl Into<NodeId>, label: impl Into<String>, position: Position) -> Self {
        Self::new(id, NodeData::Pipeline(PipelineData::new(label)), position)
    }

    pub fn external(id: impl Into<NodeId>, label: impl Into<String>, position: Position) -> Self {
        Self::new(id, NodeData::External { label: label.into() }, position)
    }

    pub fn anchor(id: impl Into<NodeId>, label: impl Into<String>, position: Position) -> Self {
        Self::new(id, NodeData::Anchor { label: label.into() }, position)
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Pipeline(_) => NodeKind::Pipeline,
            NodeData::External { .. } => NodeKind::External,
            NodeData::Anchor { .. } => NodeKind::Anchor,
        }
    }

    pub fn label(&self) -> &str {
        match &self.data {
            NodeData::Pipeline(data) => &data.label,
            NodeData::External { label } | NodeData::Anchor { label } => label,
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineData> {
        match &self.data {
            NodeData::Pipeline(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_pipeline_mut(&mut self) -> Option<&mut PipelineData> {
        match &mut self.data {
            NodeData::Pipeline(data) => Some(data),
            _ => None,
        }
    }

    /// Whether edges may start at this node.
    pub fn has_outputs(&self) -> bool {
        self.kind() == NodeKind::Pipeline
    }

    /// Apply a single field edit. On error the node is unchanged.
    pub fn set_field(&mut self, section: Section, key: &str, value: FieldValue) -> Result<()> {
        let kind = self.kind();
        match &mut self.data {
            NodeData::Pipeline(data) => {
                let mut next = data.clone();
                next.set_field(section, key, value)?;
                *data = next;
                Ok(())
            }
            NodeData::External { label } | NodeData::Anchor { label } => {
                if section == Section::Root && key == "label" {
                    *label = label_value(value)?;
                    Ok(())
                } else {
                    Err(FlowError::InvalidField {
                        section: section.name().into(),
                        key: key.into(),
                        message: format!("{kind} nodes only carry a label"),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin() -> Position {
        Position::default()
    }

    #[test]
    fn view_flags_are_not_serialized() {
        let mut node = Node::pipeline("1", "Start", origin());
        node.selected = true;
        node.dragging = true;
        let value = serde_json::to_value(&node).unwrap();
        assert!(value.get("selected").is_none());
        assert!(value.get("dragging").is_none());
        assert_eq!(value["data"]["type"], json!("pipeline"));
        let back: Node = serde_json::from_value(value).unwrap();
        assert!(!back.selected);
        assert_eq!(back.label(), "Start");
    }

    #[test]
    fn type_change_through_field_edit() {
        let mut node = Node::pipeline("1", "Start", origin());
        node.set_field(Section::Recognition, TYPE_CHANGE_KEY, FieldValue::Set(json!("ocr")))
            .unwrap();
        let data = node.as_pipeline().unwrap();
        assert_eq!(data.recognition.kind(), RecognitionKind::Ocr);
        assert_eq!(data.recognition.param()["expected"], json!([""]));
    }

    #[test]
    fn unknown_type_name_rejected() {
        let mut node = Node::pipeline("1", "Start", origin());
        let err = node
            .set_field(Section::Action, TYPE_CHANGE_KEY, FieldValue::Set(json!("Teleport")))
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownType { .. }));
        assert_eq!(node.as_pipeline().unwrap().action.kind(), ActionKind::DoNothing);
    }

    #[test]
    fn root_fields() {
        let mut node = Node::pipeline("1", "Start", origin());
        node.set_field(Section::Root, "label", FieldValue::Set(json!("Begin"))).unwrap();
        node.set_field(Section::Root, "doc", FieldValue::Set(json!("entry point"))).unwrap();
        assert_eq!(node.label(), "Begin");
        assert_eq!(node.as_pipeline().unwrap().extras["doc"], json!("entry point"));
        node.set_field(Section::Root, "doc", FieldValue::Delete).unwrap();
        assert!(node.as_pipeline().unwrap().extras.is_empty());
        assert!(node.set_field(Section::Root, "next", FieldValue::Set(json!(["A"]))).is_err());
        assert!(node.set_field(Section::Root, "timeout", FieldValue::Set(json!(1))).is_err());
    }

    #[test]
    fn external_nodes_only_take_a_label() {
        let mut node = Node::external("2", "Other", origin());
        node.set_field(Section::Root, "label", FieldValue::Set(json!("Elsewhere"))).unwrap();
        assert_eq!(node.label(), "Elsewhere");
        assert!(node
            .set_field(Section::Recognition, "roi", FieldValue::Set(json!([0, 0, 1, 1])))
            .is_err());
        assert!(!node.has_outputs());
    }
}
