//! Shared types for the Flowsmith pipeline editor core.
//!
//! This crate provides the foundational pieces used by every other Flowsmith crate:
//! - `FlowError` — unified error taxonomy
//! - `EditorConfig` — tunables for history, debouncing, export and remote requests
//! - `Clock` — millisecond time source driving debounced work

pub mod config;

pub use config::{EditorConfig, NodeAttrStyle};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Unified error type for all Flowsmith subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    // === Validation Errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Edge {handle} from '{from}' to '{to}' conflicts with existing {existing} edge")]
    EdgeConflict {
        from: String,
        to: String,
        handle: String,
        existing: String,
    },

    #[error("Edge {handle} from '{from}' to '{to}' already exists")]
    DuplicateEdge {
        from: String,
        to: String,
        handle: String,
    },

    #[error("Error edge may not loop back to its own source '{node}'")]
    SelfLoop { node: String },

    #[error("Duplicate node label '{label}'")]
    DuplicateLabel { label: String },

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Edge '{0}' not found")]
    EdgeNotFound(String),

    #[error("Unknown {section} type '{name}'")]
    UnknownType { section: String, name: String },

    #[error("Invalid {section} field '{key}': {message}")]
    InvalidField {
        section: String,
        key: String,
        message: String,
    },

    // === Import Errors ===
    #[error("JSON parse error at line {line}, col {col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Node '{node}' references unknown node '{target}'")]
    UnknownTarget { node: String, target: String },

    // === Session / Transport Errors ===
    #[error("Debug session error: {0}")]
    Session(String),

    #[error("Entry node '{name}' does not match any pipeline node")]
    EntryNotFound { name: String },

    #[error("Transport refused message on route {route}")]
    Transport { route: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Returns `true` for errors raised synchronously at an edit boundary.
    ///
    /// The graph is left unchanged when one of these is returned.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FlowError::Validation(_)
                | FlowError::EdgeConflict { .. }
                | FlowError::DuplicateEdge { .. }
                | FlowError::SelfLoop { .. }
                | FlowError::DuplicateLabel { .. }
                | FlowError::NodeNotFound(_)
                | FlowError::EdgeNotFound(_)
                | FlowError::UnknownType { .. }
                | FlowError::InvalidField { .. }
        )
    }

    /// Returns `true` if the error aborts a document import.
    pub fn is_import(&self) -> bool {
        matches!(
            self,
            FlowError::Parse { .. }
                | FlowError::Import(_)
                | FlowError::UnknownTarget { .. }
                | FlowError::Json(_)
        )
    }

    /// Returns `true` if an awaited remote request produced no answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout { .. })
    }
}

/// A convenience alias for `Result<T, FlowError>`.
pub type Result<T> = std::result::Result<T, FlowError>;

// ---------------------------------------------------------------------------
// Clock — millisecond time source for debounced work
// ---------------------------------------------------------------------------

/// Monotonic millisecond time source.
///
/// Debounce windows (history snapshots, selection views) are measured against
/// a `Clock` instead of wall time so hosts and tests can drive them explicitly.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Clock backed by [`Instant`], counting from its creation.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_edge_conflict() {
        let err = FlowError::EdgeConflict {
            from: "1".into(),
            to: "2".into(),
            handle: "next".into(),
            existing: "on_error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Edge next from '1' to '2' conflicts with existing on_error edge"
        );
    }

    #[test]
    fn error_display_parse_error() {
        let err = FlowError::Parse {
            line: 3,
            col: 7,
            message: "expected ':'".into(),
            source_snippet: None,
        };
        assert_eq!(
            err.to_string(),
            "JSON parse error at line 3, col 7: expected ':'"
        );
    }

    #[test]
    fn error_display_timeout() {
        let err = FlowError::Timeout {
            operation: "screenshot request".into(),
            timeout_ms: 10_000,
        };
        assert_eq!(err.to_string(), "screenshot request timed out after 10000ms");
        assert!(err.is_timeout());
        assert!(!err.is_validation());
    }

    #[test]
    fn validation_classification() {
        assert!(FlowError::SelfLoop { node: "a".into() }.is_validation());
        assert!(FlowError::NodeNotFound("x".into()).is_validation());
        assert!(FlowError::UnknownType {
            section: "recognition".into(),
            name: "Foo".into()
        }
        .is_validation());
        assert!(!FlowError::Import("bad".into()).is_validation());
    }

    #[test]
    fn import_classification() {
        let err = FlowError::UnknownTarget {
            node: "A".into(),
            target: "Missing".into(),
        };
        assert!(err.is_import());
        assert_eq!(err.to_string(), "Node 'A' references unknown node 'Missing'");
        assert!(!FlowError::Session("x".into()).is_import());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FlowError = io.into();
        assert!(matches!(err, FlowError::Io(_)));
    }

    #[test]
    fn manual_clock_advances_and_shares_state() {
        let clock = ManualClock::new();
        let other = clock.clone();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(250);
        assert_eq!(other.now_ms(), 250);
        other.set(1000);
        assert_eq!(clock.now_ms(), 1000);
        clock.set(10);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
