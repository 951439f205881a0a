//! Pipeline graph model, derived views, document codec and editing facade.
//!
//! This crate holds the editor's state engine: node/edge storage with its
//! structural invariants, typed recognition and action parameters, selection
//! and path views, bounded undo history, lint rules, the two-way transform to
//! pipeline documents, and the [`FlowEditor`] that owns all of it.

pub mod codec;
pub mod edge;
pub mod editor;
pub mod events;
pub mod graph;
pub mod history;
pub mod node;
pub mod params;
pub mod path;
pub mod scheduler;
pub mod selection;
pub mod validation;

pub use codec::{
    document_to_graph, graph_to_document, graph_to_document_subset, merge_document_and_side_config,
    side_config_file_name, split_document, ExportOptions, ImportOptions, ImportedGraph, SideConfig,
    UnknownTargetPolicy,
};
pub use edge::{Connection, Edge, EdgeAttr, EdgeAttributes, EdgeId, HandleGroup, SourceHandle};
pub use editor::{FlowEditor, HistoryDelay};
pub use events::{EventEmitter, GraphEvent};
pub use graph::{ChangeSummary, EdgeChange, GraphModel, NewNode, NodeChange, Snapshot};
pub use history::HistoryEngine;
pub use node::{FieldUpdate, Node, NodeData, NodeId, NodeKind, PipelineData, Section, TYPE_CHANGE_KEY};
pub use params::{Action, ActionKind, FieldValue, Others, Recognition, RecognitionKind};
pub use path::{find_all_paths, PathQuery, PathResult};
pub use selection::{SelectionTracker, SelectionView};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
