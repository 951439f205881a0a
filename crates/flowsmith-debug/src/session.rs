//! Debug session state machine.
//!
//! Reconciles execution events pushed by the runtime with graph identities.
//! Status moves `idle → preparing → running → {paused, completed}`; while
//! running the current node is in the `recognition`, `action` or `none`
//! phase.
//!
//! The machine never fails on a bad event. Events from another session,
//! events naming nodes the graph does not know, and events arriving while
//! paused are logged and dropped; the returned [`EventOutcome`] says which.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use flowsmith_graph::{GraphModel, NodeId};
use flowsmith_types::{FlowError, Result};

use crate::events::{DebugEmitter, DebugUpdate};
use crate::protocol::{DebugEventKind, EventPayload, StartPayload};

// ---------------------------------------------------------------------------
// Status and records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugStatus {
    #[default]
    Idle,
    Preparing,
    Running,
    Paused,
    Completed,
}

impl DebugStatus {
    /// Preparing, running or paused.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparing | Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DebugStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    None,
    Recognition,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

/// One run of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub node_id: NodeId,
    /// Name the runtime used for the node.
    pub name: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: ExecutionStatus,
    pub recognition: Option<Value>,
    pub recognition_hit: Option<bool>,
    pub action: Option<Value>,
    pub action_succeeded: Option<bool>,
    pub error: Option<String>,
}

impl NodeExecutionRecord {
    fn started(node_id: NodeId, name: &str, at: i64) -> Self {
        Self {
            node_id,
            name: name.to_string(),
            started_at: at,
            ended_at: None,
            status: ExecutionStatus::Running,
            recognition: None,
            recognition_hit: None,
            action: None,
            action_succeeded: None,
            error: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionStatus {
    Running,
    Hit,
    Miss,
}

/// One recognition attempt, keyed by the raw name the runtime reported.
/// Sub-recognitions of `And`/`Or` nodes have no graph node, so `node_id` is
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionRecord {
    pub name: String,
    pub node_id: Option<NodeId>,
    /// Node that was running when the recognition started.
    pub parent: Option<NodeId>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub status: RecognitionStatus,
    pub detail: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    Recognition,
    Action,
    Node,
}

/// Outcome of a single-node test session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub mode: TestMode,
    pub node_id: NodeId,
    pub passed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugSession {
    /// Local id of this start attempt.
    pub run_id: String,
    /// Assigned by the runtime when it accepts the start request.
    pub session_id: Option<String>,
    pub status: DebugStatus,
    pub current_node: Option<NodeId>,
    pub phase: Phase,
    pub entry: String,
    pub entry_node: Option<NodeId>,
    pub resource_paths: Vec<String>,
    pub controller_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub execution_history: Vec<NodeExecutionRecord>,
    pub recognition_records: Vec<RecognitionRecord>,
    pub executed_nodes: BTreeSet<NodeId>,
    pub error: Option<String>,
    pub test_mode: Option<TestMode>,
    pub verdict: Option<TestVerdict>,
    #[serde(skip)]
    step_mode: bool,
}

impl DebugSession {
    /// Whether the next `node_starting` pauses the session.
    pub fn step_mode(&self) -> bool {
        self.step_mode
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub resource_paths: Vec<String>,
    /// Entry node label or document key.
    pub entry: String,
    pub controller_id: String,
    pub test_mode: Option<TestMode>,
}

impl StartRequest {
    pub fn new(resource_paths: Vec<String>, entry: impl Into<String>, controller_id: impl Into<String>) -> Self {
        Self {
            resource_paths,
            entry: entry.into(),
            controller_id: controller_id.into(),
            test_mode: None,
        }
    }

    /// Run only the entry node and judge the result on completion.
    pub fn testing(mut self, mode: TestMode) -> Self {
        self.test_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint,
    Step,
    /// The runtime reported `debug_paused`.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session is running.
    NoSession,
    /// The event belongs to another session.
    SessionMismatch,
    WhilePaused,
    UnresolvedNode,
    UnknownEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Paused { node_id: Option<NodeId>, reason: PauseReason },
    Ignored(IgnoreReason),
}

// ---------------------------------------------------------------------------
// Node index
// ---------------------------------------------------------------------------

/// Maps runtime node names back to graph ids.
///
/// The runtime reports document keys (`{prefix}_{label}`); lookup strips the
/// prefix first and falls back to the bare name.
#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    prefix: String,
    by_label: HashMap<String, NodeId>,
    labels: HashMap<NodeId, String>,
}

impl NodeIndex {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Index every pipeline node of `graph`. With duplicate labels the first
    /// node wins.
    pub fn from_graph(graph: &GraphModel, prefix: &str) -> Self {
        let mut index = Self::new(prefix);
        for node in graph.pipeline_nodes() {
            index.insert(&node.id, node.label());
        }
        tracing::debug!(nodes = index.len(), prefix = %prefix, "Debug node index built");
        index
    }

    pub fn insert(&mut self, id: &str, label: &str) {
        if self.by_label.contains_key(label) {
            tracing::warn!(label = %label, node = %id, "Duplicate label; keeping the first node");
            return;
        }
        self.by_label.insert(label.to_string(), id.to_string());
        self.labels.insert(id.to_string(), label.to_string());
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<&NodeId> {
        if !self.prefix.is_empty() {
            let stripped = name.strip_prefix(self.prefix.as_str()).and_then(|rest| rest.strip_prefix('_'));
            if let Some(id) = stripped.and_then(|label| self.by_label.get(label)) {
                return Some(id);
            }
        }
        self.by_label.get(name)
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Document key of a node.
    pub fn key_for(&self, id: &str) -> Option<String> {
        let label = self.label(id)?;
        Some(if self.prefix.is_empty() {
            label.to_string()
        } else {
            format!("{}_{}", self.prefix, label)
        })
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DebugSessionMachine {
    index: NodeIndex,
    session: DebugSession,
    breakpoints: BTreeSet<NodeId>,
    events: DebugEmitter,
}

impl DebugSessionMachine {
    pub fn new(index: NodeIndex) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Swap in an index rebuilt after graph edits. The running session is
    /// kept; later events resolve against the new index.
    pub fn refresh_index(&mut self, index: NodeIndex) {
        self.index = index;
    }

    pub fn index(&self) -> &NodeIndex {
        &self.index
    }

    pub fn session(&self) -> &DebugSession {
        &self.session
    }

    pub fn status(&self) -> DebugStatus {
        self.session.status
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DebugUpdate> {
        self.events.subscribe()
    }

    // -- Breakpoints ---------------------------------------------------------

    pub fn breakpoints(&self) -> &BTreeSet<NodeId> {
        &self.breakpoints
    }

    pub fn set_breakpoint(&mut self, node_id: &str) -> bool {
        self.breakpoints.insert(node_id.to_string())
    }

    pub fn remove_breakpoint(&mut self, node_id: &str) -> bool {
        self.breakpoints.remove(node_id)
    }

    /// Returns whether the breakpoint is now set.
    pub fn toggle_breakpoint(&mut self, node_id: &str) -> bool {
        if self.breakpoints.remove(node_id) {
            false
        } else {
            self.breakpoints.insert(node_id.to_string());
            true
        }
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Begin a session. The entry must name a pipeline node; otherwise the
    /// machine stays idle and nothing should be sent to the runtime.
    pub fn start(&mut self, request: StartRequest) -> Result<StartPayload> {
        if self.session.status.is_active() {
            return Err(FlowError::Session(format!("a session is already {}", self.session.status)));
        }
        let Some(node_id) = self.index.resolve(&request.entry).cloned() else {
            tracing::warn!(entry = %request.entry, "Entry node not found; session not started");
            return Err(FlowError::EntryNotFound { name: request.entry });
        };
        let entry = self.index.key_for(&node_id).unwrap_or_else(|| request.entry.clone());

        self.session = DebugSession {
            run_id: uuid::Uuid::new_v4().to_string(),
            status: DebugStatus::Preparing,
            entry: entry.clone(),
            entry_node: Some(node_id),
            resource_paths: request.resource_paths.clone(),
            controller_id: request.controller_id.clone(),
            started_at: Some(Utc::now()),
            test_mode: request.test_mode,
            ..DebugSession::default()
        };
        tracing::info!(run = %self.session.run_id, entry = %entry, "Debug session preparing");
        self.emit_status();

        Ok(StartPayload {
            resource_path: request.resource_paths,
            entry,
            controller_id: request.controller_id,
        })
    }

    /// The runtime accepted the start request.
    pub fn on_started(&mut self, session_id: &str) -> bool {
        if self.session.status != DebugStatus::Preparing {
            tracing::warn!(session = %session_id, status = %self.session.status, "Unexpected start acknowledgement ignored");
            return false;
        }
        self.session.session_id = Some(session_id.to_string());
        self.session.status = DebugStatus::Running;
        tracing::info!(session = %session_id, "Debug session running");
        self.emit_status();
        true
    }

    /// The start request was rejected, refused or timed out.
    pub fn fail_start(&mut self, error: &str) -> bool {
        if self.session.status != DebugStatus::Preparing {
            return false;
        }
        tracing::warn!(error = %error, "Debug session failed to start");
        self.session.status = DebugStatus::Idle;
        self.session.error = Some(error.to_string());
        self.emit_status();
        self.events.emit(DebugUpdate::Error { message: error.to_string() });
        true
    }

    /// Client-side pause. Returns the session id for the pause request.
    pub fn pause(&mut self) -> Result<String> {
        let id = self.require(DebugStatus::Running)?;
        self.session.status = DebugStatus::Paused;
        self.emit_status();
        Ok(id)
    }

    /// Continue a paused session.
    pub fn resume(&mut self) -> Result<String> {
        let id = self.require(DebugStatus::Paused)?;
        self.session.status = DebugStatus::Running;
        self.emit_status();
        Ok(id)
    }

    /// Continue a paused session and pause again at the next node.
    pub fn step(&mut self) -> Result<String> {
        let id = self.resume()?;
        self.session.step_mode = true;
        Ok(id)
    }

    /// Stop immediately, without waiting for the runtime. Returns the id of
    /// the stopped session, if the runtime had assigned one.
    pub fn stop(&mut self) -> Option<String> {
        if !self.session.status.is_active() {
            return None;
        }
        let id = self.reset_to_idle();
        tracing::info!(session = ?id, "Debug session stopped");
        id
    }

    /// The transport dropped; whatever was running is gone.
    pub fn disconnect(&mut self) {
        if self.session.status.is_active() {
            tracing::warn!(session = ?self.session.session_id, "Transport disconnected; debug session reset");
            self.reset_to_idle();
            self.session.error = Some("transport disconnected".into());
        }
    }

    pub fn on_completed(&mut self, session_id: &str) -> EventOutcome {
        if let Err(reason) = self.check_session(session_id) {
            return self.ignore("debug_completed", session_id, reason);
        }
        self.session.status = DebugStatus::Completed;
        self.session.current_node = None;
        self.session.phase = Phase::None;
        self.session.step_mode = false;
        tracing::info!(session = %session_id, nodes = self.session.executed_nodes.len(), "Debug session completed");
        self.emit_status();

        if let Some(mode) = self.session.test_mode {
            let verdict = self.verdict(mode);
            tracing::info!(passed = verdict.passed, reason = %verdict.reason, "Node test finished");
            self.session.verdict = Some(verdict.clone());
            self.events.emit(DebugUpdate::Verdict(verdict));
        }
        EventOutcome::Applied
    }

    /// A runtime error. Without a session id the error applies to whatever
    /// session is active.
    pub fn on_error(&mut self, session_id: Option<&str>, error: &str) -> EventOutcome {
        if self.session.status == DebugStatus::Preparing && session_id.is_none() {
            self.fail_start(error);
            return EventOutcome::Applied;
        }
        let checked = match session_id {
            Some(id) => self.check_session(id),
            None if self.session.status.is_active() => Ok(()),
            None => Err(IgnoreReason::NoSession),
        };
        if let Err(reason) = checked {
            return self.ignore("debug_error", session_id.unwrap_or_default(), reason);
        }
        tracing::warn!(session = ?session_id, error = %error, "Debug session error");
        self.reset_to_idle();
        self.session.error = Some(error.to_string());
        self.events.emit(DebugUpdate::Error { message: error.to_string() });
        EventOutcome::Applied
    }

    // -- Execution events ----------------------------------------------------

    pub fn handle_event(&mut self, event: &EventPayload) -> EventOutcome {
        if let Err(reason) = self.check_session(&event.task_id) {
            return self.ignore(&event.event_name, &event.task_id, reason);
        }
        if self.session.status == DebugStatus::Paused {
            return self.ignore(&event.event_name, &event.task_id, IgnoreReason::WhilePaused);
        }
        let Some(kind) = DebugEventKind::parse(&event.event_name) else {
            return self.ignore(&event.event_name, &event.task_id, IgnoreReason::UnknownEvent);
        };
        tracing::debug!(event = %kind, node = %event.node_id, "Debug event");

        match kind {
            DebugEventKind::NodeStarting => self.node_starting(event),
            DebugEventKind::NodeSucceeded => self.node_finished(event, true),
            DebugEventKind::NodeFailed => self.node_finished(event, false),
            DebugEventKind::RecoStarting => self.reco_starting(event),
            DebugEventKind::RecoSucceeded => self.reco_finished(event, true),
            DebugEventKind::RecoFailed => self.reco_finished(event, false),
            DebugEventKind::ActionStarting => {
                self.set_phase(Phase::Action);
                EventOutcome::Applied
            }
            DebugEventKind::ActionSucceeded => self.action_finished(event, true),
            DebugEventKind::ActionFailed => self.action_finished(event, false),
            DebugEventKind::DebugPaused => self.pause_at(PauseReason::Remote),
        }
    }

    fn node_starting(&mut self, event: &EventPayload) -> EventOutcome {
        let Some(node_id) = self.index.resolve(&event.node_id).cloned() else {
            return self.ignore(&event.event_name, &event.task_id, IgnoreReason::UnresolvedNode);
        };
        self.session
            .execution_history
            .push(NodeExecutionRecord::started(node_id.clone(), &event.node_id, event.timestamp));
        self.session.current_node = Some(node_id.clone());
        self.set_phase(Phase::None);

        if std::mem::take(&mut self.session.step_mode) {
            self.pause_at(PauseReason::Step)
        } else if self.breakpoints.contains(&node_id) {
            self.pause_at(PauseReason::Breakpoint)
        } else {
            EventOutcome::Applied
        }
    }

    fn node_finished(&mut self, event: &EventPayload, succeeded: bool) -> EventOutcome {
        let Some(node_id) = self.index.resolve(&event.node_id).cloned() else {
            return self.ignore(&event.event_name, &event.task_id, IgnoreReason::UnresolvedNode);
        };
        let error = (!succeeded).then(|| detail_error(&event.detail, "node failed"));
        let status = if succeeded { ExecutionStatus::Succeeded } else { ExecutionStatus::Failed };

        match self.open_record(&node_id) {
            Some(record) => {
                record.ended_at = Some(event.timestamp);
                record.status = status;
                record.error = error;
            }
            None => {
                tracing::debug!(node = %node_id, "Finish without a start event; recorded on its own");
                let mut record = NodeExecutionRecord::started(node_id.clone(), &event.node_id, event.timestamp);
                record.ended_at = Some(event.timestamp);
                record.status = status;
                record.error = error;
                self.session.execution_history.push(record);
            }
        }
        self.session.executed_nodes.insert(node_id.clone());
        if succeeded && self.session.current_node.as_deref() == Some(node_id.as_str()) {
            self.session.current_node = None;
        }
        self.events.emit(DebugUpdate::NodeFinished { node_id, succeeded });
        self.set_phase(Phase::None);
        EventOutcome::Applied
    }

    fn reco_starting(&mut self, event: &EventPayload) -> EventOutcome {
        let record = RecognitionRecord {
            name: event.node_id.clone(),
            node_id: self.index.resolve(&event.node_id).cloned(),
            parent: self.session.current_node.clone(),
            started_at: event.timestamp,
            ended_at: None,
            status: RecognitionStatus::Running,
            detail: Value::Null,
        };
        self.session.recognition_records.push(record);
        self.set_phase(Phase::Recognition);
        EventOutcome::Applied
    }

    fn reco_finished(&mut self, event: &EventPayload, hit: bool) -> EventOutcome {
        let status = if hit { RecognitionStatus::Hit } else { RecognitionStatus::Miss };
        let node_id = self.index.resolve(&event.node_id).cloned();
        let open = self
            .session
            .recognition_records
            .iter_mut()
            .rev()
            .find(|r| r.name == event.node_id && r.status == RecognitionStatus::Running);
        match open {
            Some(record) => {
                record.ended_at = Some(event.timestamp);
                record.status = status;
                record.detail = event.detail.clone();
            }
            None => self.session.recognition_records.push(RecognitionRecord {
                name: event.node_id.clone(),
                node_id: node_id.clone(),
                parent: self.session.current_node.clone(),
                started_at: event.timestamp,
                ended_at: Some(event.timestamp),
                status,
                detail: event.detail.clone(),
            }),
        }

        // Sub-recognitions only land in the recognition log.
        let current = self.session.current_node.clone();
        if let Some(id) = node_id.filter(|id| current.as_ref() == Some(id)) {
            if let Some(record) = self.open_record(&id) {
                record.recognition = Some(event.detail.clone());
                record.recognition_hit = Some(hit);
            }
            self.set_phase(if hit { Phase::Action } else { Phase::None });
        }
        EventOutcome::Applied
    }

    fn action_finished(&mut self, event: &EventPayload, succeeded: bool) -> EventOutcome {
        let node_id = self
            .index
            .resolve(&event.node_id)
            .cloned()
            .or_else(|| self.session.current_node.clone());
        let Some(node_id) = node_id else {
            return self.ignore(&event.event_name, &event.task_id, IgnoreReason::UnresolvedNode);
        };
        match self.open_record(&node_id) {
            Some(record) => {
                record.action = Some(event.detail.clone());
                record.action_succeeded = Some(succeeded);
                if !succeeded {
                    record.error = Some(detail_error(&event.detail, "action failed"));
                }
            }
            None => tracing::debug!(node = %node_id, "Action result for a node that is not running"),
        }
        self.set_phase(Phase::None);
        EventOutcome::Applied
    }

    // -- Helpers -------------------------------------------------------------

    fn check_session(&self, session_id: &str) -> std::result::Result<(), IgnoreReason> {
        if !matches!(self.session.status, DebugStatus::Running | DebugStatus::Paused) {
            return Err(IgnoreReason::NoSession);
        }
        if self.session.session_id.as_deref() != Some(session_id) {
            return Err(IgnoreReason::SessionMismatch);
        }
        Ok(())
    }

    fn ignore(&self, event: &str, session_id: &str, reason: IgnoreReason) -> EventOutcome {
        match reason {
            IgnoreReason::WhilePaused => {
                tracing::debug!(event = %event, "Event discarded while paused");
            }
            _ => tracing::warn!(
                event = %event,
                session = %session_id,
                current = ?self.session.session_id,
                reason = ?reason,
                "Debug event dropped"
            ),
        }
        EventOutcome::Ignored(reason)
    }

    fn require(&self, status: DebugStatus) -> Result<String> {
        match (&self.session.session_id, self.session.status == status) {
            (Some(id), true) => Ok(id.clone()),
            _ => Err(FlowError::Session(format!(
                "expected a {status} session, found {}",
                self.session.status
            ))),
        }
    }

    fn open_record(&mut self, node_id: &str) -> Option<&mut NodeExecutionRecord> {
        self.session
            .execution_history
            .iter_mut()
            .rev()
            .find(|r| r.node_id == node_id && r.ended_at.is_none())
    }

    fn pause_at(&mut self, reason: PauseReason) -> EventOutcome {
        self.session.status = DebugStatus::Paused;
        tracing::info!(node = ?self.session.current_node, reason = ?reason, "Debug session paused");
        self.emit_status();
        EventOutcome::Paused {
            node_id: self.session.current_node.clone(),
            reason,
        }
    }

    fn reset_to_idle(&mut self) -> Option<String> {
        let id = self.session.session_id.take();
        self.session.status = DebugStatus::Idle;
        self.session.current_node = None;
        self.session.phase = Phase::None;
        self.session.step_mode = false;
        self.emit_status();
        id
    }

    fn set_phase(&mut self, phase: Phase) {
        self.session.phase = phase;
        self.events.emit(DebugUpdate::CurrentNode {
            node_id: self.session.current_node.clone(),
            phase,
        });
    }

    fn emit_status(&self) {
        self.events.emit(DebugUpdate::StatusChanged {
            status: self.session.status,
            session_id: self.session.session_id.clone(),
        });
    }

    fn verdict(&self, mode: TestMode) -> TestVerdict {
        let node_id = self.session.entry_node.clone().unwrap_or_default();
        let record = self.session.execution_history.iter().rev().find(|r| r.node_id == node_id);
        let (passed, reason) = match mode {
            TestMode::Recognition => {
                let reco = self
                    .session
                    .recognition_records
                    .iter()
                    .rev()
                    .find(|r| r.node_id.as_deref() == Some(node_id.as_str()));
                match reco.map(|r| r.status) {
                    Some(RecognitionStatus::Hit) => (true, "recognition hit".to_string()),
                    Some(RecognitionStatus::Miss) => (false, "recognition missed".to_string()),
                    _ => (false, "recognition did not finish".to_string()),
                }
            }
            TestMode::Action => match record.and_then(|r| r.action_succeeded) {
                Some(true) => (true, "action succeeded".to_string()),
                Some(false) => (false, "action failed".to_string()),
                None => (false, "action did not run".to_string()),
            },
            TestMode::Node => match record.map(|r| (r.status, r.error.clone())) {
                Some((ExecutionStatus::Succeeded, _)) => (true, "node succeeded".to_string()),
                Some((ExecutionStatus::Failed, error)) => (false, error.unwrap_or_else(|| "node failed".into())),
                _ => (false, "node did not finish".to_string()),
            },
        };
        TestVerdict {
            mode,
            node_id,
            passed,
            reason,
        }
    }
}

fn detail_error(detail: &Value, fallback: &str) -> String {
    detail
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
