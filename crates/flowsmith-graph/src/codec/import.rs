//! Document → graph.
//!
//! Pass 1 creates one node per entry in declaration order; pass 2 walks the
//! `next`, `interrupt` and `on_error` arrays of every pipeline entry and
//! connects them, sibling order being the array position.

use std::collections::HashMap;

use serde_json::{Map, Value};

use flowsmith_doc::{
    is_mark_key, read_links, read_mark, EntryKey, FileConfig, LinkField, NodeRef, PipelineDocument, Position,
};
use flowsmith_types::{FlowError, Result};

use crate::edge::{Connection, EdgeAttr, SourceHandle};
use crate::graph::GraphModel;
use crate::node::{Node, NodeData, NodeId, PipelineData};
use crate::params::{Action, ActionKind, Others, ParamRecord, Recognition, RecognitionKind};

/// Vertical distance between imported nodes that carry no position mark.
const LAYOUT_STEP: f64 = 150.0;

/// What to do with a link whose target is not defined in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTargetPolicy {
    /// Fail the import with [`FlowError::UnknownTarget`].
    #[default]
    Reject,
    /// Treat the name as a node of another document and create an external
    /// node for it.
    External,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Key prefix to strip from labels; defaults to the config header's.
    ///
    /// A document exported with a prefix but without the config header does
    /// not say which prefix it used, so the caller has to pass it here or
    /// the labels keep it (`P_A` instead of `A`).
    pub prefix: Option<String>,
    /// File name used to decode layout entry keys; defaults to the header's.
    pub file_name: Option<String>,
    pub unknown_targets: UnknownTargetPolicy,
}

#[derive(Debug, Clone)]
pub struct ImportedGraph {
    pub graph: GraphModel,
    /// The config header, when the document had one.
    pub file_config: Option<FileConfig>,
    /// Prefix that was stripped from the node keys.
    pub prefix: String,
}

/// Layout of a node entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFormat {
    /// `"recognition": "OCR"` with parameters at the entry root.
    V1,
    /// `"recognition": {"type": "OCR", "param": {..}}`.
    V2,
}

/// Decide the layout of an entry. Explicit section shapes win; otherwise
/// root-level parameter keys mean v1.
pub fn detect_format(entry: &Map<String, Value>) -> NodeFormat {
    let sections = [entry.get("recognition"), entry.get("action")];
    if sections.iter().flatten().any(|v| v.get("type").is_some()) {
        return NodeFormat::V2;
    }
    if sections.iter().flatten().any(|v| v.is_string()) {
        return NodeFormat::V1;
    }
    let reco_keys = RecognitionKind::all_keys();
    let action_keys = ActionKind::all_keys();
    let has_root_params = entry
        .keys()
        .any(|k| reco_keys.contains(&k.as_str()) || action_keys.contains(&k.as_str()));
    if has_root_params {
        NodeFormat::V1
    } else {
        NodeFormat::V2
    }
}

/// Build a graph from a document. Nothing is shared with any existing graph;
/// the caller swaps the result in.
pub fn document_to_graph(doc: &PipelineDocument, options: &ImportOptions) -> Result<ImportedGraph> {
    let file_config = doc.file_config();
    let prefix = options
        .prefix
        .clone()
        .or_else(|| file_config.as_ref().map(|c| c.prefix.clone()))
        .unwrap_or_default();
    let file_name = options
        .file_name
        .clone()
        .or_else(|| file_config.as_ref().map(|c| c.filename.clone()).filter(|f| !f.is_empty()));

    let mut builder = Builder {
        graph: GraphModel::new(),
        next_id: 1,
        by_key: HashMap::new(),
        externals: HashMap::new(),
        anchors: HashMap::new(),
    };

    // Pass 1: nodes
    let mut pipeline_entries: Vec<(&str, &Map<String, Value>)> = Vec::new();
    for (index, (key, value)) in doc.entries.iter().enumerate() {
        let hint = Position {
            x: 0.0,
            y: index as f64 * LAYOUT_STEP,
        };
        match EntryKey::classify(key, file_name.as_deref()) {
            EntryKey::ConfigHeader { .. } => {}
            EntryKey::External { label } => {
                let position = entry_position(value).unwrap_or(hint);
                builder.external(label, position)?;
            }
            EntryKey::Anchor { label } => {
                let position = entry_position(value).unwrap_or(hint);
                builder.anchor(label, position)?;
            }
            EntryKey::Node { name } => {
                let entry = value.as_object().ok_or_else(|| {
                    FlowError::Import(format!("node '{name}' must be an object"))
                })?;
                let label = strip_prefix(name, &prefix);
                let data = parse_pipeline_data(label, entry)?;
                let position = read_mark(entry).and_then(|m| m.position).unwrap_or(hint);
                let id = builder.insert(NodeData::Pipeline(data), position)?;
                builder.by_key.insert(name.to_string(), id);
                pipeline_entries.push((name, entry));
            }
        }
    }

    // Pass 2: links
    for (name, entry) in pipeline_entries {
        let source = builder.by_key.get(name).cloned().ok_or_else(|| FlowError::NodeNotFound(name.into()))?;
        for field in LinkField::ALL {
            for reference in read_links(entry, field)? {
                let target = builder.resolve(name, &reference, options.unknown_targets)?;
                let handle = match field {
                    LinkField::Next if reference.jump_back => SourceHandle::JumpBack,
                    LinkField::Next => SourceHandle::Next,
                    LinkField::Interrupt => SourceHandle::Interrupt,
                    LinkField::OnError => SourceHandle::Error,
                };
                let edge = match builder.graph.add_edge(Connection::new(source.clone(), handle, target), false) {
                    Ok(edge) => edge,
                    Err(err @ (FlowError::DuplicateEdge { .. } | FlowError::SelfLoop { .. })) => {
                        tracing::warn!(node = %name, field = field.key(), target = %reference.name, error = %err, "Link skipped");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                if reference.jump_back && handle != SourceHandle::JumpBack {
                    builder.graph.set_edge_attribute(&edge, EdgeAttr::JumpBack, Some(true))?;
                }
            }
        }
    }

    tracing::info!(
        nodes = builder.graph.nodes().len(),
        edges = builder.graph.edges().len(),
        prefix = %prefix,
        "Document imported"
    );
    Ok(ImportedGraph {
        graph: builder.graph,
        file_config,
        prefix,
    })
}

fn entry_position(value: &Value) -> Option<Position> {
    read_mark(value.as_object()?)?.position
}

fn strip_prefix<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return name;
    }
    name.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('_')).unwrap_or(name)
}

struct Builder {
    graph: GraphModel,
    next_id: u64,
    /// Full document key → node id.
    by_key: HashMap<String, NodeId>,
    externals: HashMap<String, NodeId>,
    anchors: HashMap<String, NodeId>,
}

impl Builder {
    fn insert(&mut self, data: NodeData, position: Position) -> Result<NodeId> {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.graph.insert_node(Node::new(id.clone(), data, position))?;
        Ok(id)
    }

    fn external(&mut self, label: &str, position: Position) -> Result<NodeId> {
        if let Some(id) = self.externals.get(label) {
            return Ok(id.clone());
        }
        let id = self.insert(NodeData::External { label: label.into() }, position)?;
        self.externals.insert(label.into(), id.clone());
        Ok(id)
    }

    fn anchor(&mut self, label: &str, position: Position) -> Result<NodeId> {
        if let Some(id) = self.anchors.get(label) {
            return Ok(id.clone());
        }
        let id = self.insert(NodeData::Anchor { label: label.into() }, position)?;
        self.anchors.insert(label.into(), id.clone());
        Ok(id)
    }

    /// Node id a reference from `source` points at, creating anchor and
    /// (by policy) external nodes on first use.
    fn resolve(&mut self, source: &str, reference: &NodeRef, policy: UnknownTargetPolicy) -> Result<NodeId> {
        let near = self.position_near(source);
        if reference.anchor {
            return self.anchor(&reference.name, near);
        }
        if let Some(id) = self.by_key.get(&reference.name) {
            return Ok(id.clone());
        }
        if let Some(id) = self.externals.get(&reference.name) {
            return Ok(id.clone());
        }
        match policy {
            UnknownTargetPolicy::Reject => Err(FlowError::UnknownTarget {
                node: source.into(),
                target: reference.name.clone(),
            }),
            UnknownTargetPolicy::External => {
                tracing::debug!(node = %source, target = %reference.name, "Unknown target imported as external node");
                self.external(&reference.name, near)
            }
        }
    }

    fn position_near(&self, key: &str) -> Position {
        self.by_key
            .get(key)
            .and_then(|id| self.graph.node(id))
            .map(|n| Position {
                x: n.position.x + LAYOUT_STEP * 2.0,
                y: n.position.y,
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Node entries
// ---------------------------------------------------------------------------

/// Keys of an entry that are never parameters, others or extras.
fn is_structural_key(key: &str) -> bool {
    key == "recognition" || key == "action" || LinkField::is_link_key(key) || is_mark_key(key)
}

fn parse_pipeline_data(label: &str, entry: &Map<String, Value>) -> Result<PipelineData> {
    let format = detect_format(entry);
    let reco_kind = section_kind(entry.get("recognition"), "recognition", RecognitionKind::parse_or_err)?
        .unwrap_or(RecognitionKind::DirectHit);
    let action_kind = section_kind(entry.get("action"), "action", ActionKind::parse_or_err)?
        .unwrap_or(ActionKind::DoNothing);

    let mut reco_param = section_param(entry.get("recognition"));
    let mut action_param = section_param(entry.get("action"));
    let mut others = Map::new();
    let mut extras = Map::new();

    for (key, value) in entry {
        if is_structural_key(key) {
            continue;
        }
        let k = key.as_str();
        if format == NodeFormat::V1 && reco_kind.keys().contains(&k) {
            reco_param.insert(key.clone(), value.clone());
        } else if format == NodeFormat::V1 && action_kind.keys().contains(&k) {
            action_param.insert(key.clone(), value.clone());
        } else if Others::KEYS.contains(&k) {
            others.insert(key.clone(), value.clone());
        } else {
            extras.insert(key.clone(), value.clone());
        }
    }

    Ok(PipelineData {
        label: label.to_string(),
        recognition: Recognition::from_parts(reco_kind, reco_param),
        action: Action::from_parts(action_kind, action_param),
        others: Others::from_map_lenient(others),
        extras,
    })
}

/// Kind named by a section, whether written as `"OCR"` or `{"type": "OCR"}`.
fn section_kind<K>(
    section: Option<&Value>,
    name: &str,
    parse: impl Fn(&str) -> Result<K>,
) -> Result<Option<K>> {
    match section {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(kind)) => parse(kind).map(Some),
        Some(Value::Object(obj)) => match obj.get("type") {
            None => Ok(None),
            Some(Value::String(kind)) => parse(kind).map(Some),
            Some(other) => Err(FlowError::Import(format!("`{name}.type` must be a string, found {other}"))),
        },
        Some(other) => Err(FlowError::Import(format!(
            "`{name}` must be a type name or an object, found {other}"
        ))),
    }
}

fn section_param(section: Option<&Value>) -> Map<String, Value> {
    section
        .and_then(|s| s.get("param"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
