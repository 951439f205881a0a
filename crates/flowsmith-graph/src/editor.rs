//! The editing facade.
//!
//! [`FlowEditor`] owns the graph together with everything derived from it:
//! selection views, undo history, the path query, the debounce scheduler and
//! the event channel. Every mutating method is a small transaction: apply the
//! change to the [`GraphModel`], then a private `commit` step recomputes the
//! selection, refreshes the path result, schedules a history snapshot and
//! emits events. Nothing outside this type mutates the graph.
//!
//! Time is read from a [`Clock`]; the host calls [`FlowEditor::poll`] when
//! [`FlowEditor::next_deadline`] passes (or [`FlowEditor::flush`] before
//! saving) to run the debounced work.

use std::sync::Arc;

use flowsmith_doc::PipelineDocument;
use flowsmith_types::{Clock, EditorConfig, Result, SystemClock};

use crate::codec::{
    document_to_graph, graph_to_document, graph_to_document_subset, merge_document_and_side_config, ExportOptions,
    ImportOptions, SideConfig,
};
use crate::edge::{Connection, EdgeAttr, EdgeId};
use crate::events::{EventEmitter, GraphEvent};
use crate::graph::{ChangeSummary, EdgeChange, GraphModel, NewNode, NodeChange, Snapshot};
use crate::history::HistoryEngine;
use crate::node::{FieldUpdate, NodeId, Section};
use crate::params::FieldValue;
use crate::path::{PathQuery, PathResult};
use crate::scheduler::Scheduler;
use crate::selection::{SelectionTracker, SelectionView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Task {
    HistorySnapshot,
    SelectionSettle,
}

/// How long a mutation waits before its history snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDelay {
    /// Removals are captured right away.
    Immediate,
    Drag,
    FieldEdit,
    EdgeEdit,
    Structural,
}

/// Which collections a mutation touched.
#[derive(Debug, Clone, Copy, Default)]
struct Touched {
    nodes: bool,
    edges: bool,
}

impl Touched {
    const NODES: Touched = Touched { nodes: true, edges: false };
    const EDGES: Touched = Touched { nodes: false, edges: true };
    const BOTH: Touched = Touched { nodes: true, edges: true };
}

#[derive(Debug)]
pub struct FlowEditor {
    config: EditorConfig,
    clock: Arc<dyn Clock>,
    graph: GraphModel,
    selection: SelectionTracker,
    history: HistoryEngine,
    path: PathQuery,
    scheduler: Scheduler<Task>,
    events: EventEmitter,
}

impl FlowEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: EditorConfig, clock: Arc<dyn Clock>) -> Self {
        let mut editor = Self {
            history: HistoryEngine::new(config.history_limit),
            config,
            clock,
            graph: GraphModel::new(),
            selection: SelectionTracker::new(),
            path: PathQuery::default(),
            scheduler: Scheduler::new(),
            events: EventEmitter::default(),
        };
        editor.history.init(editor.graph.snapshot());
        editor
    }

    // -----------------------------------------------------------------------
    // Read views
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    /// Immediate selection view.
    pub fn selection(&self) -> &SelectionView {
        self.selection.current()
    }

    /// Selection view as of the end of the last debounce window.
    pub fn settled_selection(&self) -> &SelectionView {
        self.selection.settled()
    }

    pub fn path(&self) -> &PathQuery {
        &self.path
    }

    /// `None` until both path ends are set.
    pub fn path_result(&self) -> Option<&PathResult> {
        self.path.result.as_ref()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub fn add_node(&mut self, request: NewNode) -> NodeId {
        let linked = request.link;
        let id = self.graph.add_node(request);
        let touched = if linked { Touched::BOTH } else { Touched::NODES };
        self.commit(touched, HistoryDelay::Structural);
        id
    }

    pub fn remove_node(&mut self, id: &str) -> Result<()> {
        self.graph.remove_node(id)?;
        self.commit(Touched::BOTH, HistoryDelay::Immediate);
        Ok(())
    }

    /// Remove several nodes as one transition. Unknown ids are skipped.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<()> {
        let changes = ids.iter().map(|id| NodeChange::Remove { id: id.clone() }).collect();
        self.update_many(changes).map(|_| ())
    }

    pub fn set_node_field(&mut self, id: &str, section: Section, key: &str, value: FieldValue) -> Result<()> {
        self.graph.set_node_field(id, section, key, value)?;
        self.commit(Touched::NODES, HistoryDelay::FieldEdit);
        Ok(())
    }

    /// Apply several field edits to one node; all or none.
    pub fn set_node_fields(&mut self, id: &str, updates: Vec<FieldUpdate>) -> Result<()> {
        self.graph.set_node_fields(id, updates)?;
        self.commit(Touched::NODES, HistoryDelay::FieldEdit);
        Ok(())
    }

    /// Apply a batch of interactive node changes as one transition. On error
    /// the graph is left as it was before the batch.
    pub fn update_many(&mut self, changes: Vec<NodeChange>) -> Result<ChangeSummary> {
        let backup = self.graph.clone();
        let summary = match self.graph.apply_node_changes(changes) {
            Ok(summary) => summary,
            Err(e) => {
                self.graph = backup;
                return Err(e);
            }
        };
        let delay = if summary.removed {
            HistoryDelay::Immediate
        } else if summary.moved {
            HistoryDelay::Drag
        } else {
            HistoryDelay::Structural
        };
        let touched = if summary.removed { Touched::BOTH } else { Touched::NODES };
        self.commit(touched, delay);
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Connect two nodes with conflict checking.
    pub fn add_edge(&mut self, connection: Connection) -> Result<EdgeId> {
        let id = self.graph.add_edge(connection, true)?;
        self.commit(Touched::EDGES, HistoryDelay::Structural);
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<()> {
        self.graph.remove_edge(id)?;
        self.commit(Touched::EDGES, HistoryDelay::Immediate);
        Ok(())
    }

    /// Remove several edges, one at a time, renumbering after each.
    pub fn remove_edges(&mut self, ids: &[EdgeId]) -> Result<()> {
        let changes = ids.iter().map(|id| EdgeChange::Remove { id: id.clone() }).collect();
        self.update_edges(changes).map(|_| ())
    }

    pub fn update_edges(&mut self, changes: Vec<EdgeChange>) -> Result<ChangeSummary> {
        let backup = self.graph.clone();
        let summary = match self.graph.apply_edge_changes(changes) {
            Ok(summary) => summary,
            Err(e) => {
                self.graph = backup;
                return Err(e);
            }
        };
        let delay = if summary.removed {
            HistoryDelay::Immediate
        } else {
            HistoryDelay::Structural
        };
        self.commit(Touched::EDGES, delay);
        Ok(summary)
    }

    pub fn reorder_edge(&mut self, id: &str, new_order: u32) -> Result<bool> {
        let changed = self.graph.reorder_edge(id, new_order)?;
        if changed {
            self.commit(Touched::EDGES, HistoryDelay::Structural);
        }
        Ok(changed)
    }

    pub fn set_edge_attribute(&mut self, id: &str, attr: EdgeAttr, value: Option<bool>) -> Result<()> {
        self.graph.set_edge_attribute(id, attr, value)?;
        self.commit(Touched::EDGES, HistoryDelay::EdgeEdit);
        Ok(())
    }

    /// Replace all nodes and edges.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.graph.replace(snapshot);
        self.commit(Touched::BOTH, HistoryDelay::Structural);
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Schedule a snapshot `delay_ms` from now, replacing any pending one.
    pub fn save_history(&mut self, delay_ms: u64) {
        self.scheduler.schedule(Task::HistorySnapshot, self.clock.now_ms(), delay_ms);
    }

    /// Seed a single baseline from the current graph, discarding the stack.
    pub fn init_history(&mut self) {
        self.scheduler.cancel(Task::HistorySnapshot);
        self.history.init(self.graph.snapshot());
        self.emit_history();
    }

    pub fn clear_history(&mut self) {
        self.scheduler.cancel(Task::HistorySnapshot);
        self.history.clear();
        self.emit_history();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    /// Step back one snapshot. A snapshot still waiting in the debounce
    /// window is stored first, so the edit being undone is the latest one.
    pub fn undo(&mut self) -> bool {
        self.flush_history();
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.flush_history();
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Swap in a stored snapshot without scheduling a new capture.
    fn restore(&mut self, snapshot: Snapshot) {
        self.graph.replace(snapshot);
        self.clear_selection_views();
        self.path.recompute(self.graph.edges());
        self.emit_graph(Touched::BOTH);
        self.emit_path();
        self.emit_history();
    }

    fn flush_history(&mut self) {
        if self.scheduler.cancel(Task::HistorySnapshot) {
            self.capture_history();
        }
    }

    fn capture_history(&mut self) {
        if self.history.record(self.graph.snapshot()) {
            self.emit_history();
        }
    }

    // -----------------------------------------------------------------------
    // Selection and path
    // -----------------------------------------------------------------------

    pub fn set_target_node(&mut self, id: Option<NodeId>) {
        if self.selection.set_target(id) {
            self.emit_selection();
            self.schedule_settle();
        }
    }

    /// Deselect everything and empty both selection views right away.
    pub fn clear_selection(&mut self) {
        self.graph.deselect_all();
        self.clear_selection_views();
    }

    fn clear_selection_views(&mut self) {
        self.selection.clear();
        self.scheduler.cancel(Task::SelectionSettle);
        self.emit_selection();
        let view = self.selection.settled().clone();
        self.events.emit(GraphEvent::SelectionSettled {
            nodes: view.nodes,
            edges: view.edges,
            target: view.target,
        });
    }

    pub fn set_path_mode(&mut self, enabled: bool) {
        self.path.set_mode(enabled);
        self.emit_path();
    }

    pub fn set_path_start(&mut self, id: Option<NodeId>) {
        self.path.set_start(id, self.graph.edges());
        self.emit_path();
    }

    pub fn set_path_end(&mut self, id: Option<NodeId>) {
        self.path.set_end(id, self.graph.edges());
        self.emit_path();
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
        self.emit_path();
    }

    // -----------------------------------------------------------------------
    // Scheduled work
    // -----------------------------------------------------------------------

    /// Run the tasks whose deadline has passed. Returns how many ran.
    pub fn poll(&mut self) -> usize {
        let due = self.scheduler.take_due(self.clock.now_ms());
        let count = due.len();
        for task in due {
            self.run(task);
        }
        count
    }

    /// Run every pending task now.
    pub fn flush(&mut self) -> usize {
        let pending = self.scheduler.drain();
        let count = pending.len();
        for task in pending {
            self.run(task);
        }
        count
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::HistorySnapshot => self.capture_history(),
            Task::SelectionSettle => {
                if self.selection.settle() {
                    let view = self.selection.settled().clone();
                    self.events.emit(GraphEvent::SelectionSettled {
                        nodes: view.nodes,
                        edges: view.edges,
                        target: view.target,
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::from_config(&self.config)
    }

    pub fn export_document(&self) -> Result<PipelineDocument> {
        graph_to_document(&self.graph, &self.export_options())
    }

    pub fn export_nodes(&self, ids: &[NodeId]) -> Result<PipelineDocument> {
        graph_to_document_subset(&self.graph, ids, &self.export_options())
    }

    /// Load a document. All or nothing: on error the current graph, history
    /// and selection are untouched. On success history restarts from the
    /// imported graph and the prefix and file name from the config header
    /// are adopted.
    pub fn import_document(&mut self, doc: &PipelineDocument, options: &ImportOptions) -> Result<()> {
        // The new graph is built on the side; the current one is only
        // replaced once the whole document has been read.
        let imported = match document_to_graph(doc, options) {
            Ok(imported) => imported,
            Err(e) => {
                tracing::warn!(error = %e, "Import failed; graph kept");
                return Err(e);
            }
        };

        self.config.prefix = imported.prefix;
        if let Some(file_config) = imported.file_config.filter(|c| !c.filename.is_empty()) {
            self.config.file_name = file_config.filename;
        }
        self.graph.replace(imported.graph.snapshot());
        self.scheduler.cancel(Task::HistorySnapshot);
        self.clear_selection_views();
        self.path.clear();
        self.history.init(self.graph.snapshot());

        self.events.emit(GraphEvent::DocumentImported {
            nodes: self.graph.nodes().len(),
            edges: self.graph.edges().len(),
        });
        self.emit_graph(Touched::BOTH);
        self.emit_path();
        self.emit_history();
        Ok(())
    }

    /// Merge a side config into `doc`, then import the result.
    pub fn import_with_side_config(
        &mut self,
        doc: &PipelineDocument,
        side: &SideConfig,
        options: &ImportOptions,
    ) -> Result<()> {
        let merged = merge_document_and_side_config(doc, side)?;
        self.import_document(&merged, options)
    }

    // -----------------------------------------------------------------------
    // Transaction plumbing
    // -----------------------------------------------------------------------

    /// End of every mutation.
    fn commit(&mut self, touched: Touched, delay: HistoryDelay) {
        if self.selection.update(&self.graph) {
            self.emit_selection();
            self.schedule_settle();
        }
        if self.path.result.is_some() {
            self.path.recompute(self.graph.edges());
            self.emit_path();
        }
        let delay_ms = self.delay_ms(delay);
        self.save_history(delay_ms);
        self.emit_graph(touched);
    }

    fn delay_ms(&self, delay: HistoryDelay) -> u64 {
        match delay {
            HistoryDelay::Immediate => 0,
            HistoryDelay::Drag => self.config.drag_delay_ms,
            HistoryDelay::FieldEdit => self.config.field_edit_delay_ms,
            HistoryDelay::EdgeEdit => self.config.edge_edit_delay_ms,
            HistoryDelay::Structural => self.config.history_delay_ms,
        }
    }

    fn schedule_settle(&mut self) {
        self.scheduler
            .schedule(Task::SelectionSettle, self.clock.now_ms(), self.config.selection_debounce_ms);
    }

    fn emit_graph(&self, touched: Touched) {
        if touched.nodes {
            self.events.emit(GraphEvent::NodesChanged {
                count: self.graph.nodes().len(),
            });
        }
        if touched.edges {
            self.events.emit(GraphEvent::EdgesChanged {
                count: self.graph.edges().len(),
            });
        }
    }

    fn emit_selection(&self) {
        let view = self.selection.current();
        self.events.emit(GraphEvent::SelectionChanged {
            nodes: view.nodes.clone(),
            edges: view.edges.clone(),
            target: view.target.clone(),
        });
    }

    fn emit_history(&self) {
        self.events.emit(GraphEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }

    fn emit_path(&self) {
        let (nodes, edges) = match &self.path.result {
            Some(r) => (r.nodes.iter().cloned().collect(), r.edges.iter().cloned().collect()),
            None => (Vec::new(), Vec::new()),
        };
        self.events.emit(GraphEvent::PathChanged { nodes, edges });
    }
}

impl Default for FlowEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}
