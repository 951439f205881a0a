//! Document layer for Flowsmith pipeline files.
//!
//! Pipeline files are JSON objects that may carry `//` and `/* */` comments
//! and trailing commas. [`parse`] turns such text into an order-preserving
//! [`serde_json::Value`]; [`PipelineDocument`] adds the typed view used by the
//! codec: node references, adjacency fields, and editor metadata keys.
//!
//! # Example
//! ```
//! let text = r#"{
//!     // entry point
//!     "Start": { "next": ["Click", "[JumpBack]Back"], },
//! }"#;
//! let doc = flowsmith_doc::PipelineDocument::parse(text).unwrap();
//! assert_eq!(doc.len(), 1);
//! ```

pub mod document;
mod parser;

pub use document::*;
pub use parser::parse;
