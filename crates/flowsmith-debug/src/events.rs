//! Debug session updates for panels and the canvas highlight layer.

use serde::{Deserialize, Serialize};

use flowsmith_graph::NodeId;

use crate::session::{DebugStatus, Phase, TestVerdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugUpdate {
    StatusChanged {
        status: DebugStatus,
        session_id: Option<String>,
    },
    CurrentNode {
        node_id: Option<NodeId>,
        phase: Phase,
    },
    NodeFinished {
        node_id: NodeId,
        succeeded: bool,
    },
    Verdict(TestVerdict),
    Error {
        message: String,
    },
}

/// Broadcast sender for [`DebugUpdate`]s.
#[derive(Clone)]
pub struct DebugEmitter {
    sender: tokio::sync::broadcast::Sender<DebugUpdate>,
}

impl DebugEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Dropped silently when nobody listens.
    pub fn emit(&self, update: DebugUpdate) {
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DebugUpdate> {
        self.sender.subscribe()
    }
}

impl Default for DebugEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for DebugEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
