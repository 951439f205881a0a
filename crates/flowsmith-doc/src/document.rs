use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowsmith_types::{FlowError, NodeAttrStyle, Result};

/// Key holding editor metadata inside a node entry or config header.
pub const CONFIG_MARK: &str = "$__mpe_code";
/// Metadata keys written by older editor releases, accepted on import.
pub const LEGACY_CONFIG_MARKS: &[&str] = &["__mpe_code", "__yamaape"];
/// Prefix of the document-level config header key.
pub const CONFIG_HEADER_PREFIX: &str = "$__mpe_config_";
pub const LEGACY_CONFIG_HEADER_PREFIXES: &[&str] = &["__mpe_config_", "__yamaape_config_"];
/// Prefix of entries that only carry the position of an external node.
pub const EXTERNAL_PREFIX: &str = "$__mpe_external_";
/// Prefix of entries that only carry the position of an anchor node.
pub const ANCHOR_PREFIX: &str = "$__mpe_anchor_";

const ANCHOR_TAG: &str = "[Anchor]";
const JUMP_BACK_TAG: &str = "[JumpBack]";

static REF_TAGS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^((?:\[(?:Anchor|JumpBack)\])+)(.*)$").ok());

// ---------------------------------------------------------------------------
// Link kinds and node references
// ---------------------------------------------------------------------------

/// Adjacency field of a node entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkField {
    Next,
    Interrupt,
    OnError,
}

impl LinkField {
    pub const ALL: [LinkField; 3] = [LinkField::Next, LinkField::Interrupt, LinkField::OnError];

    pub fn key(self) -> &'static str {
        match self {
            LinkField::Next => "next",
            LinkField::Interrupt => "interrupt",
            LinkField::OnError => "on_error",
        }
    }

    pub fn is_link_key(key: &str) -> bool {
        Self::ALL.iter().any(|f| f.key() == key)
    }
}

/// One target in an adjacency array.
///
/// Written either as a plain name, a tag-prefixed name
/// (`"[Anchor][JumpBack]Name"`) or an object (`{"name": .., "anchor": true}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub name: String,
    pub anchor: bool,
    pub jump_back: bool,
}

impl NodeRef {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            anchor: false,
            jump_back: false,
        }
    }

    /// Parse a reference from its JSON form. Returns `None` for values that
    /// are neither a string nor an object with a string `name`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::from_tagged(s)),
            Value::Object(obj) => {
                let name = obj.get("name")?.as_str()?;
                let flag = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);
                let mut r = Self::from_tagged(name);
                r.anchor |= flag("anchor");
                r.jump_back |= flag("jump_back");
                Some(r)
            }
            _ => None,
        }
    }

    fn from_tagged(s: &str) -> Self {
        match REF_TAGS.as_ref().and_then(|re| re.captures(s)) {
            Some(caps) => {
                let tags = caps.get(1).map_or("", |m| m.as_str());
                let name = caps.get(2).map_or("", |m| m.as_str());
                Self {
                    name: name.to_string(),
                    anchor: tags.contains(ANCHOR_TAG),
                    jump_back: tags.contains(JUMP_BACK_TAG),
                }
            }
            None => Self::plain(s),
        }
    }

    pub fn has_attrs(&self) -> bool {
        self.anchor || self.jump_back
    }

    /// Render in the requested style. References without attributes are
    /// always plain strings.
    pub fn to_value(&self, style: NodeAttrStyle) -> Value {
        if !self.has_attrs() {
            return Value::String(self.name.clone());
        }
        match style {
            NodeAttrStyle::Prefix => {
                let mut s = String::new();
                if self.anchor {
                    s.push_str(ANCHOR_TAG);
                }
                if self.jump_back {
                    s.push_str(JUMP_BACK_TAG);
                }
                s.push_str(&self.name);
                Value::String(s)
            }
            NodeAttrStyle::Object => {
                let mut obj = Map::new();
                obj.insert("name".into(), Value::String(self.name.clone()));
                if self.anchor {
                    obj.insert("anchor".into(), Value::Bool(true));
                }
                if self.jump_back {
                    obj.insert("jump_back".into(), Value::Bool(true));
                }
                Value::Object(obj)
            }
        }
    }
}

/// Read an adjacency field. A single reference is treated as a one-element list.
pub fn read_links(entry: &Map<String, Value>, field: LinkField) -> Result<Vec<NodeRef>> {
    let Some(value) = entry.get(field.key()) else {
        return Ok(Vec::new());
    };
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };
    items
        .into_iter()
        .map(|v| {
            NodeRef::from_value(v).ok_or_else(|| {
                FlowError::Import(format!("invalid `{}` reference: {}", field.key(), v))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Editor metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Document-level header written when editor metadata export is enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub prefix: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_viewport: Option<Value>,
}

/// Per-entry editor metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMark {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeMark {
    pub fn at(position: Position) -> Self {
        Self {
            position: Some(position),
        }
    }

    /// JSON form with coordinates rounded to whole pixels.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if let Some(p) = self.position {
            obj.insert(
                "position".into(),
                serde_json::json!({ "x": p.x.round() as i64, "y": p.y.round() as i64 }),
            );
        }
        Value::Object(obj)
    }
}

/// Returns the metadata key used in `entry`, if any.
pub fn mark_key(entry: &Map<String, Value>) -> Option<&'static str> {
    std::iter::once(CONFIG_MARK)
        .chain(LEGACY_CONFIG_MARKS.iter().copied())
        .find(|k| entry.contains_key(*k))
}

pub fn is_mark_key(key: &str) -> bool {
    key == CONFIG_MARK || LEGACY_CONFIG_MARKS.contains(&key)
}

/// Read the editor mark of a node entry. Malformed marks are ignored.
pub fn read_mark(entry: &Map<String, Value>) -> Option<NodeMark> {
    let key = mark_key(entry)?;
    serde_json::from_value(entry.get(key)?.clone()).ok()
}

// ---------------------------------------------------------------------------
// Document keys
// ---------------------------------------------------------------------------

/// Classification of a top-level document key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey<'a> {
    /// `$__mpe_config_<file>`
    ConfigHeader { file: &'a str },
    /// `$__mpe_external_<label>_<file>`; the file suffix is stripped using the
    /// known file name when available.
    External { label: &'a str },
    /// `$__mpe_anchor_<label>_<file>`
    Anchor { label: &'a str },
    Node { name: &'a str },
}

impl<'a> EntryKey<'a> {
    pub fn classify(key: &'a str, file_name: Option<&str>) -> Self {
        for prefix in std::iter::once(CONFIG_HEADER_PREFIX).chain(LEGACY_CONFIG_HEADER_PREFIXES.iter().copied()) {
            if let Some(file) = key.strip_prefix(prefix) {
                return EntryKey::ConfigHeader { file };
            }
        }
        if let Some(rest) = key.strip_prefix(EXTERNAL_PREFIX) {
            return EntryKey::External {
                label: strip_file_suffix(rest, file_name),
            };
        }
        if let Some(rest) = key.strip_prefix(ANCHOR_PREFIX) {
            return EntryKey::Anchor {
                label: strip_file_suffix(rest, file_name),
            };
        }
        EntryKey::Node { name: key }
    }
}

fn strip_file_suffix<'a>(rest: &'a str, file_name: Option<&str>) -> &'a str {
    file_name
        .and_then(|f| rest.strip_suffix(f))
        .and_then(|r| r.strip_suffix('_'))
        .or_else(|| rest.rsplit_once('_').map(|(l, _)| l))
        .unwrap_or(rest)
}

pub fn config_header_key(file_name: &str) -> String {
    format!("{}{}", CONFIG_HEADER_PREFIX, file_name)
}

pub fn external_key(label: &str, file_name: &str) -> String {
    format!("{}{}_{}", EXTERNAL_PREFIX, label, file_name)
}

pub fn anchor_key(label: &str, file_name: &str) -> String {
    format!("{}{}_{}", ANCHOR_PREFIX, label, file_name)
}

// ---------------------------------------------------------------------------
// PipelineDocument
// ---------------------------------------------------------------------------

/// Order-preserving mapping from node name to node definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDocument {
    pub entries: Map<String, Value>,
}

impl PipelineDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse document text (JSON with comments allowed).
    pub fn parse(text: &str) -> Result<Self> {
        match crate::parser::parse(text)? {
            Value::Object(entries) => {
                tracing::debug!(entries = entries.len(), "Pipeline document parsed");
                Ok(Self { entries })
            }
            other => Err(FlowError::Import(format!(
                "pipeline document must be an object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Render with four-space indentation.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.entries.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(|e| FlowError::Other(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// The config header, if present and well-formed.
    pub fn file_config(&self) -> Option<FileConfig> {
        self.entries.iter().find_map(|(k, v)| match EntryKey::classify(k, None) {
            EntryKey::ConfigHeader { .. } => {
                let obj = v.as_object()?;
                let key = mark_key(obj)?;
                serde_json::from_value(obj.get(key)?.clone()).ok()
            }
            _ => None,
        })
    }

    /// Node entries in declaration order, skipping header, external and
    /// anchor entries.
    pub fn node_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().filter_map(|(k, v)| match EntryKey::classify(k, None) {
            EntryKey::Node { name } => Some((name, v)),
            _ => None,
        })
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
