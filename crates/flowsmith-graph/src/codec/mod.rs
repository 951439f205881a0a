//! Two-way transform between a [`GraphModel`](crate::graph::GraphModel) and a
//! [`PipelineDocument`](flowsmith_doc::PipelineDocument).
//!
//! - [`export`]: graph → document, with sibling order becoming array order.
//! - [`import`]: document → graph in two passes (nodes, then links).
//! - [`side_config`]: moves layout metadata between a document and its
//!   `.<name>.mpe.json` companion file.
//!
//! Re-importing an exported document yields the same labels, adjacency and
//! sibling order.

pub mod export;
pub mod import;
pub mod side_config;

pub use export::{graph_to_document, graph_to_document_subset, ExportOptions};
pub use import::{detect_format, document_to_graph, ImportOptions, ImportedGraph, NodeFormat, UnknownTargetPolicy};
pub use side_config::{
    merge_document_and_side_config, side_config_file_name, split_document, LayoutEntry, SideConfig,
};
