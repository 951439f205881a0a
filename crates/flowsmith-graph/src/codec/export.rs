//! Graph → document.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use flowsmith_doc::{
    anchor_key, config_header_key, external_key, FileConfig, NodeMark, NodeRef, PipelineDocument, CONFIG_MARK,
};
use flowsmith_types::{EditorConfig, NodeAttrStyle, Result};

use crate::edge::{HandleGroup, SourceHandle};
use crate::graph::GraphModel;
use crate::node::{Node, NodeData, NodeKind, PipelineData};
use crate::params::ParamRecord;
use crate::validation::validate_or_raise;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Prepended to pipeline node labels as `<prefix>_<label>`.
    pub prefix: String,
    pub file_name: String,
    pub node_attr_style: NodeAttrStyle,
    /// Write the config header, position marks and external/anchor layout
    /// entries.
    pub export_editor_config: bool,
    pub version: Option<String>,
}

impl ExportOptions {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            file_name: config.file_name.clone(),
            node_attr_style: config.node_attr_style,
            export_editor_config: config.export_editor_config,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }

    /// Document key of a pipeline node.
    pub fn key_for(&self, label: &str) -> String {
        if self.prefix.is_empty() {
            label.to_string()
        } else {
            format!("{}_{}", self.prefix, label)
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

/// Export the whole graph.
///
/// Fails with a validation error when two pipeline nodes share a label or a
/// label is empty; the graph is only read.
pub fn graph_to_document(graph: &GraphModel, options: &ExportOptions) -> Result<PipelineDocument> {
    export(graph, None, options)
}

/// Export only the nodes in `ids`. Links are written only when both ends are
/// in the subset, so the result is a self-contained document.
pub fn graph_to_document_subset(graph: &GraphModel, ids: &[String], options: &ExportOptions) -> Result<PipelineDocument> {
    let subset: HashSet<&str> = ids.iter().map(String::as_str).collect();
    export(graph, Some(&subset), options)
}

fn export(graph: &GraphModel, subset: Option<&HashSet<&str>>, options: &ExportOptions) -> Result<PipelineDocument> {
    validate_or_raise(graph)?;
    let included = |id: &str| subset.map_or(true, |s| s.contains(id));

    let mut doc = PipelineDocument::new();
    if options.export_editor_config {
        let header = FileConfig {
            prefix: options.prefix.clone(),
            filename: options.file_name.clone(),
            version: options.version.clone(),
            saved_viewport: None,
        };
        doc.insert(
            config_header_key(&options.file_name),
            json!({ CONFIG_MARK: serde_json::to_value(header)? }),
        );
    }

    // External and anchor nodes always get an entry so links to them resolve
    // on import. Without a header the file suffix is left empty, since
    // nothing in the document would tell the importer where the label ends.
    let layout_file = if options.export_editor_config {
        options.file_name.as_str()
    } else {
        ""
    };
    let layout_entry = |mark: Value| {
        if options.export_editor_config {
            json!({ CONFIG_MARK: mark })
        } else {
            json!({})
        }
    };

    for node in graph.nodes().iter().filter(|n| included(&n.id)) {
        let mark = NodeMark::at(node.position).to_value();
        match &node.data {
            NodeData::Pipeline(data) => {
                let mut entry = pipeline_entry(graph, node, data, options, &included)?;
                if options.export_editor_config {
                    entry.insert(CONFIG_MARK.into(), mark);
                }
                doc.insert(options.key_for(&data.label), Value::Object(entry));
            }
            NodeData::External { label } => {
                doc.insert(external_key(label, layout_file), layout_entry(mark));
            }
            NodeData::Anchor { label } => {
                doc.insert(anchor_key(label, layout_file), layout_entry(mark));
            }
        }
    }

    tracing::debug!(entries = doc.len(), subset = subset.is_some(), "Document exported");
    Ok(doc)
}

fn pipeline_entry(
    graph: &GraphModel,
    node: &Node,
    data: &PipelineData,
    options: &ExportOptions,
    included: &dyn Fn(&str) -> bool,
) -> Result<Map<String, Value>> {
    let mut entry = Map::new();
    entry.insert("recognition".into(), serde_json::to_value(&data.recognition)?);
    entry.insert("action".into(), serde_json::to_value(&data.action)?);

    for group in HandleGroup::ALL {
        let refs: Vec<Value> = graph
            .siblings(&node.id, group)
            .into_iter()
            .filter(|e| included(&e.target))
            .filter_map(|edge| {
                let Some(target) = graph.node(&edge.target) else {
                    tracing::warn!(edge = %edge.id, "Edge target missing; link skipped");
                    return None;
                };
                let name = match target.kind() {
                    NodeKind::Pipeline => options.key_for(target.label()),
                    NodeKind::External | NodeKind::Anchor => target.label().to_string(),
                };
                let reference = NodeRef {
                    name,
                    anchor: target.kind() == NodeKind::Anchor || edge.attributes.anchor,
                    jump_back: edge.source_handle == SourceHandle::JumpBack || edge.attributes.jump_back,
                };
                Some(reference.to_value(options.node_attr_style))
            })
            .collect();
        if !refs.is_empty() {
            entry.insert(group.link_field().key().into(), Value::Array(refs));
        }
    }

    entry.extend(data.others.to_map());
    for (key, value) in &data.extras {
        if entry.contains_key(key) {
            tracing::debug!(node = %node.id, key = %key, "Extra key shadowed by a modelled field");
            continue;
        }
        entry.insert(key.clone(), value.clone());
    }
    Ok(entry)
}
