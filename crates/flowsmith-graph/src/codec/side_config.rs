//! Layout metadata kept beside the pipeline file.
//!
//! [`split_document`] moves the config header, position marks and
//! external/anchor layout entries out of a document into a [`SideConfig`];
//! [`merge_document_and_side_config`] puts them back. Only layout travels
//! through the side file, and the pipeline document wins every conflict.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use flowsmith_doc::{
    anchor_key, config_header_key, external_key, is_mark_key, mark_key, read_mark, EntryKey, FileConfig, NodeMark,
    PipelineDocument, Position, CONFIG_MARK,
};
use flowsmith_types::{FlowError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SideConfig {
    #[serde(default)]
    pub file_config: FileConfig,
    /// Keyed by the full document key of the node entry.
    #[serde(default)]
    pub node_configs: BTreeMap<String, NodeMark>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_nodes: Vec<LayoutEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchor_nodes: Vec<LayoutEntry>,
}

impl SideConfig {
    /// Parse side config text (comments allowed).
    pub fn parse(text: &str) -> Result<Self> {
        let value = flowsmith_doc::parse(text)?;
        serde_json::from_value(value).map_err(|e| FlowError::Import(format!("invalid side config: {e}")))
    }

    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Side config file name for a pipeline file: `foo.json` → `.foo.mpe.json`.
pub fn side_config_file_name(pipeline_file: &str) -> String {
    let base = pipeline_file
        .strip_suffix(".jsonc")
        .or_else(|| pipeline_file.strip_suffix(".json"))
        .unwrap_or(pipeline_file);
    format!(".{base}.mpe.json")
}

/// Strip layout metadata from `doc`, returning the clean document and the
/// extracted side config.
pub fn split_document(doc: &PipelineDocument) -> (PipelineDocument, SideConfig) {
    let file_config = doc.file_config().unwrap_or_default();
    let file_name = Some(file_config.filename.as_str()).filter(|f| !f.is_empty());
    let mut side = SideConfig {
        file_config: file_config.clone(),
        ..SideConfig::default()
    };
    let mut clean = PipelineDocument::new();

    for (key, value) in &doc.entries {
        match EntryKey::classify(key, file_name) {
            EntryKey::ConfigHeader { .. } => {}
            EntryKey::External { label } => side.external_nodes.push(LayoutEntry {
                label: label.to_string(),
                position: layout_position(value),
            }),
            EntryKey::Anchor { label } => side.anchor_nodes.push(LayoutEntry {
                label: label.to_string(),
                position: layout_position(value),
            }),
            EntryKey::Node { .. } => match value {
                Value::Object(entry) => {
                    if let Some(mark) = read_mark(entry) {
                        side.node_configs.insert(key.clone(), mark);
                    }
                    let stripped: Map<String, Value> =
                        entry.iter().filter(|(k, _)| !is_mark_key(k)).map(|(k, v)| (k.clone(), v.clone())).collect();
                    clean.insert(key.clone(), Value::Object(stripped));
                }
                other => clean.insert(key.clone(), other.clone()),
            },
        }
    }

    tracing::debug!(
        nodes = side.node_configs.len(),
        externals = side.external_nodes.len(),
        anchors = side.anchor_nodes.len(),
        "Document split"
    );
    (clean, side)
}

fn layout_position(value: &Value) -> Option<Position> {
    read_mark(value.as_object()?)?.position
}

/// Merge `side` into `doc`.
///
/// Output order: config header, external and anchor layout entries, then the
/// document's own entries. A position already present in the document is
/// kept; side config keys with no matching node entry are dropped with a
/// warning.
pub fn merge_document_and_side_config(doc: &PipelineDocument, side: &SideConfig) -> Result<PipelineDocument> {
    let doc_config = doc.file_config();
    let file_name = doc_config
        .as_ref()
        .map(|c| c.filename.clone())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| side.file_config.filename.clone());

    let mut merged = PipelineDocument::new();
    let header = doc
        .entries
        .iter()
        .find(|(k, _)| matches!(EntryKey::classify(k, None), EntryKey::ConfigHeader { .. }));
    match header {
        Some((key, value)) => merged.insert(key.clone(), value.clone()),
        None if side.file_config != FileConfig::default() => {
            let config = FileConfig {
                filename: file_name.clone(),
                ..side.file_config.clone()
            };
            merged.insert(config_header_key(&file_name), json!({ CONFIG_MARK: serde_json::to_value(config)? }));
        }
        None => {}
    }

    for (entries, key_of) in [
        (&side.external_nodes, external_key as fn(&str, &str) -> String),
        (&side.anchor_nodes, anchor_key as fn(&str, &str) -> String),
    ] {
        for layout in entries {
            let key = key_of(&layout.label, &file_name);
            let mark = NodeMark { position: layout.position };
            merged.insert(key, json!({ CONFIG_MARK: mark.to_value() }));
        }
    }

    let mut matched = 0usize;
    for (key, value) in &doc.entries {
        let classified = EntryKey::classify(key, Some(&file_name));
        if matches!(classified, EntryKey::ConfigHeader { .. }) {
            continue;
        }
        let mut value = value.clone();
        if let (EntryKey::Node { .. }, Value::Object(entry)) = (&classified, &mut value) {
            if let Some(mark) = side.node_configs.get(key) {
                matched += 1;
                merge_mark(entry, mark);
            }
        }
        // Layout entries already in the document replace the side config's.
        merged.insert(key.clone(), value);
    }

    for key in side.node_configs.keys().filter(|k| doc.get(k).is_none()) {
        tracing::warn!(key = %key, "Side config entry has no matching node; dropped");
    }
    tracing::debug!(matched, entries = merged.len(), "Side config merged");
    Ok(merged)
}

/// Fill the entry's mark from the side config without overwriting anything
/// the entry already has.
fn merge_mark(entry: &mut Map<String, Value>, mark: &NodeMark) {
    let side_value = mark.to_value();
    let key = mark_key(entry).unwrap_or(CONFIG_MARK);
    match entry.get_mut(key) {
        Some(Value::Object(existing)) => {
            if let Value::Object(side_fields) = side_value {
                for (k, v) in side_fields {
                    existing.entry(k).or_insert(v);
                }
            }
        }
        Some(_) => {}
        None => {
            entry.insert(CONFIG_MARK.into(), side_value);
        }
    }
}
