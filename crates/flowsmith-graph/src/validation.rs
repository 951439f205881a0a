//! Graph validation: lint rules and diagnostics.
//!
//! Provides 5 built-in rules over a [`GraphModel`]. Call [`validate`] for
//! advisory diagnostics or [`validate_or_raise`] to fail when any
//! `Error`-severity issue is found. Export runs the latter so a document is
//! never written with ambiguous node keys.

use std::collections::{HashMap, HashSet};

use crate::edge::SourceHandle;
use crate::graph::GraphModel;
use crate::node::NodeKind;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub edge: Option<(String, String)>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Two pipeline nodes with the same label would export to the same key.
struct DuplicateLabelRule;
impl LintRule for DuplicateLabelRule {
    fn name(&self) -> &str { "duplicate_label" }
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut diags = Vec::new();
        for node in graph.pipeline_nodes() {
            let label = node.label();
            if let Some(first) = seen.get(label) {
                diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!("Duplicate node label '{label}' (nodes {first} and {})", node.id),
                    node_id: Some(node.id.clone()),
                    edge: None,
                    fix: Some("Rename one of the nodes".into()),
                });
            } else {
                seen.insert(label, &node.id);
            }
        }
        diags
    }
}

struct EmptyLabelRule;
impl LintRule for EmptyLabelRule {
    fn name(&self) -> &str { "empty_label" }
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic> {
        graph
            .nodes()
            .iter()
            .filter(|n| n.label().trim().is_empty())
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("{} node {} has an empty label", n.kind(), n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some("Give the node a name".into()),
            })
            .collect()
    }
}

struct DanglingEdgeRule;
impl LintRule for DanglingEdgeRule {
    fn name(&self) -> &str { "dangling_edge" }
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic> {
        let ids: HashSet<&str> = graph.nodes().iter().map(|n| n.id.as_str()).collect();
        let mut diags = Vec::new();
        for edge in graph.edges() {
            for (end, id) in [("source", &edge.source), ("target", &edge.target)] {
                if !ids.contains(id.as_str()) {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: format!("Edge {} references nonexistent {end} node '{id}'", edge.id),
                        node_id: None,
                        edge: Some((edge.source.clone(), edge.target.clone())),
                        fix: None,
                    });
                }
            }
        }
        let sourceless = graph
            .edges()
            .iter()
            .filter(|e| graph.node(&e.source).is_some_and(|n| n.kind() != NodeKind::Pipeline));
        for edge in sourceless {
            diags.push(Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Edge {} starts at a node without outputs", edge.id),
                node_id: Some(edge.source.clone()),
                edge: Some((edge.source.clone(), edge.target.clone())),
                fix: Some("Remove the edge".into()),
            });
        }
        diags
    }
}

/// Orders inside a sibling group must read `1..N`. Export renumbers anyway,
/// so this is a warning.
struct SiblingOrderRule;
impl LintRule for SiblingOrderRule {
    fn name(&self) -> &str { "sibling_order" }
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic> {
        graph
            .order_gaps()
            .into_iter()
            .map(|(source, group)| {
                let orders: Vec<String> = graph.siblings(&source, group).iter().map(|e| e.order.to_string()).collect();
                Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Warning,
                    message: format!(
                        "Node {source} has non-contiguous `{}` orders: {}",
                        group.link_field().key(),
                        orders.join(", ")
                    ),
                    node_id: Some(source),
                    edge: None,
                    fix: Some("Reorder the edges".into()),
                }
            })
            .collect()
    }
}

/// Conflicting handles between the same ordered pair. Documents may contain
/// them, so this stays a warning.
struct EdgeConflictRule;
impl LintRule for EdgeConflictRule {
    fn name(&self) -> &str { "edge_conflict" }
    fn apply(&self, graph: &GraphModel) -> Vec<Diagnostic> {
        let edges = graph.edges();
        let mut diags = Vec::new();
        for (i, a) in edges.iter().enumerate() {
            for b in &edges[i + 1..] {
                if a.source == b.source && a.target == b.target && a.source_handle.conflicts_with(b.source_handle) {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Warning,
                        message: format!(
                            "Edges {} and {} connect the same nodes with conflicting handles",
                            a.id, b.id
                        ),
                        node_id: None,
                        edge: Some((a.source.clone(), a.target.clone())),
                        fix: Some("Keep only one of the edges".into()),
                    });
                }
            }
        }
        for edge in edges.iter().filter(|e| e.source_handle == SourceHandle::Error && e.source == e.target) {
            diags.push(Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Error edge {} loops back to its own node", edge.id),
                node_id: Some(edge.source.clone()),
                edge: Some((edge.source.clone(), edge.target.clone())),
                fix: None,
            });
        }
        diags
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules against the graph.
pub fn validate(graph: &GraphModel) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(DuplicateLabelRule),
        Box::new(EmptyLabelRule),
        Box::new(DanglingEdgeRule),
        Box::new(SiblingOrderRule),
        Box::new(EdgeConflictRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &GraphModel) -> flowsmith_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(flowsmith_types::FlowError::Validation(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
