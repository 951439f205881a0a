//! Command implementations. Each returns the text to print so the binary
//! stays a thin dispatcher.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use flowsmith_doc::PipelineDocument;
use flowsmith_graph::{
    document_to_graph, find_all_paths, graph_to_document, merge_document_and_side_config, side_config_file_name,
    split_document, validate, ExportOptions, GraphModel, HandleGroup, ImportOptions, ImportedGraph, NodeKind,
    Severity, SideConfig, UnknownTargetPolicy,
};
use flowsmith_types::{EditorConfig, NodeAttrStyle};

pub fn load_config(path: Option<&Path>, prefix: Option<&str>) -> anyhow::Result<EditorConfig> {
    let mut config = match path {
        Some(path) => EditorConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => EditorConfig::default(),
    };
    if let Some(prefix) = prefix {
        config.prefix = prefix.to_string();
    }
    Ok(config)
}

pub fn read_document(path: &Path) -> anyhow::Result<PipelineDocument> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    PipelineDocument::parse(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Import leniently: names defined in other files become external nodes.
pub fn load_graph(path: &Path, config: &EditorConfig) -> anyhow::Result<ImportedGraph> {
    let doc = read_document(path)?;
    let options = ImportOptions {
        prefix: Some(config.prefix.clone()).filter(|p| !p.is_empty()),
        file_name: None,
        unknown_targets: UnknownTargetPolicy::External,
    };
    let imported = document_to_graph(&doc, &options).with_context(|| format!("importing {}", path.display()))?;
    tracing::debug!(nodes = imported.graph.nodes().len(), edges = imported.graph.edges().len(), "Pipeline loaded");
    Ok(imported)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Diagnostic lines and whether any of them is an error.
pub fn validate_report(graph: &GraphModel) -> (Vec<String>, bool) {
    let diagnostics = validate(graph);
    let mut has_error = false;
    let lines = diagnostics
        .iter()
        .map(|diag| {
            let severity = match diag.severity {
                Severity::Error => {
                    has_error = true;
                    "ERROR"
                }
                Severity::Warning => "WARN",
            };
            format!("[{}] {}: {}", severity, diag.rule, diag.message)
        })
        .collect();
    (lines, has_error)
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

pub fn info_report(path: &Path, imported: &ImportedGraph) -> String {
    let graph = &imported.graph;
    let count = |kind: NodeKind| graph.nodes().iter().filter(|n| n.kind() == kind).count();
    let mut out = vec![format!("Pipeline: {}", file_name(path))];
    if !imported.prefix.is_empty() {
        out.push(format!("Prefix: {}", imported.prefix));
    }
    if let Some(version) = imported.file_config.as_ref().and_then(|c| c.version.as_deref()) {
        out.push(format!("Saved by: {version}"));
    }
    out.push(format!("Nodes: {}", count(NodeKind::Pipeline)));
    out.push(format!("External: {}", count(NodeKind::External)));
    out.push(format!("Anchors: {}", count(NodeKind::Anchor)));
    out.push(format!("Edges: {}", graph.edges().len()));

    out.push(String::new());
    out.push("Nodes:".into());
    for node in graph.nodes() {
        let mut line = match node.as_pipeline() {
            Some(data) => format!(
                "  {} [{}] recognition={} action={}",
                node.id,
                data.label,
                data.recognition.kind(),
                data.action.kind()
            ),
            None => format!("  {} [{}] {:?}", node.id, node.label(), node.kind()),
        };
        for group in HandleGroup::ALL {
            let targets: Vec<&str> = graph
                .siblings(&node.id, group)
                .iter()
                .filter_map(|e| graph.node(&e.target))
                .map(|n| n.label())
                .collect();
            if !targets.is_empty() {
                line.push_str(&format!(" {}=[{}]", group.link_field().key(), targets.join(", ")));
            }
        }
        out.push(line);
    }
    out.join("\n")
}

// ---------------------------------------------------------------------------
// format
// ---------------------------------------------------------------------------

/// Re-export a document in canonical form.
pub fn format_document(
    path: &Path,
    imported: &ImportedGraph,
    config: &EditorConfig,
    style: Option<NodeAttrStyle>,
) -> anyhow::Result<String> {
    let mut options = ExportOptions::from_config(config);
    options.prefix = imported.prefix.clone();
    options.file_name = imported
        .file_config
        .as_ref()
        .map(|c| c.filename.clone())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| file_name(path));
    options.export_editor_config |= imported.file_config.is_some();
    if let Some(style) = style {
        options.node_attr_style = style;
    }
    let doc = graph_to_document(&imported.graph, &options)?;
    Ok(doc.to_pretty_string()?)
}

// ---------------------------------------------------------------------------
// split / merge
// ---------------------------------------------------------------------------

fn side_path(path: &Path) -> PathBuf {
    path.with_file_name(side_config_file_name(&file_name(path)))
}

/// Move layout metadata out of `path` into its side config file. Returns the
/// written pipeline and side config paths.
pub fn split_file(path: &Path, output: Option<&Path>) -> anyhow::Result<(PathBuf, PathBuf)> {
    let doc = read_document(path)?;
    let (clean, side) = split_document(&doc);
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
    let side_out = side_path(&output);
    std::fs::write(&output, clean.to_pretty_string()?).with_context(|| format!("writing {}", output.display()))?;
    std::fs::write(&side_out, side.to_pretty_string()?).with_context(|| format!("writing {}", side_out.display()))?;
    tracing::info!(pipeline = %output.display(), side = %side_out.display(), "Split written");
    Ok((output, side_out))
}

/// Merge `path` with its side config (`side`, or the conventional file next
/// to it).
pub fn merge_files(path: &Path, side: Option<&Path>) -> anyhow::Result<String> {
    let doc = read_document(path)?;
    let side_file = side.map(Path::to_path_buf).unwrap_or_else(|| side_path(path));
    let text = std::fs::read_to_string(&side_file).with_context(|| format!("reading {}", side_file.display()))?;
    let side = SideConfig::parse(&text).with_context(|| format!("parsing {}", side_file.display()))?;
    let merged = merge_document_and_side_config(&doc, &side)?;
    Ok(merged.to_pretty_string()?)
}

// ---------------------------------------------------------------------------
// path
// ---------------------------------------------------------------------------

pub fn path_report(graph: &GraphModel, from: &str, to: &str) -> anyhow::Result<String> {
    let Some(start) = graph.find_by_label(from) else {
        bail!("no node labelled '{from}'");
    };
    let Some(end) = graph.find_by_label(to) else {
        bail!("no node labelled '{to}'");
    };
    let result = find_all_paths(graph.edges(), &start.id, &end.id);
    if result.is_empty() {
        return Ok(format!("No path from {from} to {to}"));
    }
    let mut labels: Vec<&str> = result
        .nodes
        .iter()
        .filter_map(|id| graph.node(id))
        .map(|n| n.label())
        .collect();
    labels.sort_unstable();
    Ok(format!("Nodes: {}\nEdges: {}", labels.join(", "), result.edges.len()))
}
