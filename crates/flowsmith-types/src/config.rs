//! Editor configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides:
//!
//! ```
//! let cfg = flowsmith_types::EditorConfig::from_json_str(r#"{ "prefix": "Daily" }"#).unwrap();
//! assert_eq!(cfg.prefix, "Daily");
//! assert_eq!(cfg.history_limit, 100);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// How anchor / jump-back references are written into adjacency arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAttrStyle {
    /// `"[Anchor][JumpBack]Target"`
    #[default]
    Prefix,
    /// `{"name": "Target", "anchor": true, "jump_back": true}`
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of history snapshots kept.
    pub history_limit: usize,
    /// Snapshot delay for structural edits (add/remove node or edge).
    pub history_delay_ms: u64,
    /// Snapshot delay after a node field edit.
    pub field_edit_delay_ms: u64,
    /// Snapshot delay after an edge attribute edit.
    pub edge_edit_delay_ms: u64,
    /// Snapshot delay while a node is being dragged.
    pub drag_delay_ms: u64,
    /// Coalescing window of the debounced selection view.
    pub selection_debounce_ms: u64,

    /// Document key prefix; entries are keyed `{prefix}_{label}`.
    pub prefix: String,
    /// File name recorded in the export header and side configuration.
    pub file_name: String,
    pub node_attr_style: NodeAttrStyle,
    /// Emit position marks, external node entries and the config header.
    pub export_editor_config: bool,

    pub start_timeout_ms: u64,
    pub screenshot_timeout_ms: u64,
    pub ocr_timeout_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            history_delay_ms: 0,
            field_edit_delay_ms: 1000,
            edge_edit_delay_ms: 500,
            drag_delay_ms: 1000,
            selection_debounce_ms: 400,
            prefix: String::new(),
            file_name: "main_pipeline.json".into(),
            node_attr_style: NodeAttrStyle::Prefix,
            export_editor_config: false,
            start_timeout_ms: 10_000,
            screenshot_timeout_ms: 10_000,
            ocr_timeout_ms: 15_000,
        }
    }
}

impl EditorConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        let config: EditorConfig = serde_json::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), "Editor config loaded");
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The document key for a pipeline node label under the configured prefix.
    pub fn prefixed(&self, label: &str) -> String {
        if self.prefix.is_empty() {
            label.to_string()
        } else {
            format!("{}_{}", self.prefix, label)
        }
    }

    fn check(&self) -> crate::Result<()> {
        if self.history_limit == 0 {
            return Err(crate::FlowError::Validation(
                "history_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_editor_behaviour() {
        let cfg = EditorConfig::default();
        assert_eq!(cfg.history_limit, 100);
        assert_eq!(cfg.selection_debounce_ms, 400);
        assert_eq!(cfg.field_edit_delay_ms, 1000);
        assert_eq!(cfg.edge_edit_delay_ms, 500);
        assert_eq!(cfg.node_attr_style, NodeAttrStyle::Prefix);
        assert!(!cfg.export_editor_config);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EditorConfig::from_json_str(
            r#"{ "history_limit": 5, "node_attr_style": "object" }"#,
        )
        .unwrap();
        assert_eq!(cfg.history_limit, 5);
        assert_eq!(cfg.node_attr_style, NodeAttrStyle::Object);
        assert_eq!(cfg.ocr_timeout_ms, 15_000);
    }

    #[test]
    fn zero_history_limit_rejected() {
        let err = EditorConfig::from_json_str(r#"{ "history_limit": 0 }"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn prefixed_keys() {
        let mut cfg = EditorConfig::default();
        assert_eq!(cfg.prefixed("Start"), "Start");
        cfg.prefix = "Daily".into();
        assert_eq!(cfg.prefixed("Start"), "Daily_Start");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowsmith.json");
        let cfg = EditorConfig {
            prefix: "Quest".into(),
            export_editor_config: true,
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        let loaded = EditorConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }
}
