//! Editor event system.
//!
//! Emits [`GraphEvent`]s via a [`tokio::sync::broadcast`] channel so renderers
//! and panels can follow graph, selection and history changes without
//! holding a reference to the editor.

use serde::{Deserialize, Serialize};

use crate::edge::EdgeId;
use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodesChanged {
        count: usize,
    },
    EdgesChanged {
        count: usize,
    },
    SelectionChanged {
        nodes: Vec<NodeId>,
        edges: Vec<EdgeId>,
        target: Option<NodeId>,
    },
    /// The settled selection view caught up with the immediate one.
    SelectionSettled {
        nodes: Vec<NodeId>,
        edges: Vec<EdgeId>,
        target: Option<NodeId>,
    },
    HistoryChanged {
        can_undo: bool,
        can_redo: bool,
    },
    PathChanged {
        nodes: Vec<NodeId>,
        edges: Vec<EdgeId>,
    },
    DocumentImported {
        nodes: usize,
        edges: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<GraphEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: GraphEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GraphEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(GraphEvent::HistoryChanged {
            can_undo: true,
            can_redo: false,
        });

        match rx.recv().await.unwrap() {
            GraphEvent::HistoryChanged { can_undo, can_redo } => {
                assert!(can_undo);
                assert!(!can_redo);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(GraphEvent::NodesChanged { count: 2 }).unwrap();
        assert_eq!(json["event"], "nodes_changed");
        assert_eq!(json["count"], 2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(GraphEvent::EdgesChanged { count: 0 });
    }
}
