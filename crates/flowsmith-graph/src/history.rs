//! Bounded undo/redo stack of graph snapshots.
//!
//! The engine only stores and navigates snapshots; debouncing of captures is
//! done by the editor's scheduler. Captures identical to the last stored one
//! (by serialized form) are ignored, so view-only changes never add entries.

use crate::graph::Snapshot;

#[derive(Debug, Clone)]
pub struct HistoryEngine {
    stack: Vec<Snapshot>,
    index: Option<usize>,
    limit: usize,
    last_serialized: Option<String>,
}

impl HistoryEngine {
    pub fn new(limit: usize) -> Self {
        Self {
            stack: Vec::new(),
            index: None,
            limit: limit.max(1),
            last_serialized: None,
        }
    }

    /// Discard everything and seed `snapshot` as the baseline.
    pub fn init(&mut self, snapshot: Snapshot) {
        self.clear();
        self.push(snapshot);
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.index = None;
        self.last_serialized = None;
    }

    /// Store `snapshot` unless it equals the last stored one. Returns whether
    /// an entry was added.
    pub fn record(&mut self, snapshot: Snapshot) -> bool {
        self.push(snapshot)
    }

    fn push(&mut self, snapshot: Snapshot) -> bool {
        let serialized = match serde_json::to_string(&snapshot) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "History snapshot skipped: not serializable");
                return false;
            }
        };
        if self.last_serialized.as_deref() == Some(serialized.as_str()) {
            return false;
        }
        if let Some(index) = self.index {
            self.stack.truncate(index + 1);
        }
        self.stack.push(snapshot);
        if self.stack.len() > self.limit {
            self.stack.remove(0);
        }
        self.index = Some(self.stack.len() - 1);
        self.last_serialized = Some(serialized);
        tracing::debug!(entries = self.stack.len(), "History snapshot stored");
        true
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.index, Some(i) if i > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.index, Some(i) if i + 1 < self.stack.len())
    }

    /// Step back and return the snapshot to restore.
    pub fn undo(&mut self) -> Option<Snapshot> {
        let index = self.index.filter(|i| *i > 0)? - 1;
        self.move_to(index)
    }

    pub fn redo(&mut self) -> Option<Snapshot> {
        let index = self.index? + 1;
        if index >= self.stack.len() {
            return None;
        }
        self.move_to(index)
    }

    fn move_to(&mut self, index: usize) -> Option<Snapshot> {
        let snapshot = self.stack.get(index)?.clone();
        self.index = Some(index);
        self.last_serialized = serde_json::to_string(&snapshot).ok();
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Position of the current entry, `None` before the first capture.
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use flowsmith_doc::Position;

    fn snap(labels: &[&str]) -> Snapshot {
        Snapshot {
            nodes: labels
                .iter()
                .enumerate()
                .map(|(i, l)| Node::pipeline(i.to_string(), *l, Position::default()))
                .collect(),
            edges: vec![],
        }
    }

    #[test]
    fn identical_snapshots_collapse() {
        let mut h = HistoryEngine::new(10);
        h.init(snap(&[]));
        assert!(h.record(snap(&["A"])));
        assert!(!h.record(snap(&["A"])));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn view_flags_do_not_count() {
        let mut h = HistoryEngine::new(10);
        let mut s = snap(&["A"]);
        h.init(s.clone());
        s.nodes[0].selected = true;
        assert!(!h.record(s));
    }

    #[test]
    fn undo_redo_walk() {
        let mut h = HistoryEngine::new(10);
        h.init(snap(&[]));
        h.record(snap(&["A"]));
        h.record(snap(&["A", "B"]));
        assert!(h.can_undo());
        assert!(!h.can_redo());
        assert_eq!(h.undo(), Some(snap(&["A"])));
        assert_eq!(h.undo(), Some(snap(&[])));
        assert_eq!(h.undo(), None);
        assert!(h.can_redo());
        assert_eq!(h.redo(), Some(snap(&["A"])));
        assert_eq!(h.index(), Some(1));
    }

    #[test]
    fn new_capture_truncates_redo_tail() {
        let mut h = HistoryEngine::new(10);
        h.init(snap(&[]));
        h.record(snap(&["A"]));
        h.record(snap(&["A", "B"]));
        h.undo();
        h.undo();
        assert!(h.record(snap(&["C"])));
        assert_eq!(h.len(), 2);
        assert!(!h.can_redo());
    }

    #[test]
    fn restored_state_is_not_recaptured() {
        let mut h = HistoryEngine::new(10);
        h.init(snap(&[]));
        h.record(snap(&["A"]));
        let restored = h.undo().unwrap();
        assert!(!h.record(restored));
        assert!(h.can_redo());
    }

    #[test]
    fn cap_evicts_oldest() {
        let mut h = HistoryEngine::new(3);
        h.init(snap(&[]));
        for l in ["A", "B", "C", "D"] {
            h.record(snap(&[l]));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.index(), Some(2));
        assert_eq!(h.undo(), Some(snap(&["C"])));
        assert_eq!(h.undo(), Some(snap(&["B"])));
        assert!(!h.can_undo());
    }

    #[test]
    fn cleared_history_cannot_undo() {
        let mut h = HistoryEngine::new(3);
        h.init(snap(&[]));
        h.record(snap(&["A"]));
        h.clear();
        assert!(!h.can_undo());
        assert_eq!(h.index(), None);
        assert!(h.undo().is_none() && h.redo().is_none());
    }
}
