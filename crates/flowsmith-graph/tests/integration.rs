//! End-to-end tests for the graph engine.
//!
//! Each test drives the public surface: build a graph through the editor or
//! the model, export/import documents, and check the structural contracts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use flowsmith_doc::{PipelineDocument, Position, CONFIG_MARK};
use flowsmith_graph::{
    document_to_graph, find_all_paths, graph_to_document, merge_document_and_side_config, side_config_file_name,
    split_document, Connection, EdgeAttr, ExportOptions, FieldValue, FlowEditor, GraphModel, HandleGroup,
    ImportOptions, NewNode, NodeKind, RecognitionKind, Section, SideConfig, SourceHandle, TYPE_CHANGE_KEY,
};
use flowsmith_types::{EditorConfig, FlowError, ManualClock, NodeAttrStyle};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn editor() -> (FlowEditor, ManualClock) {
    let clock = ManualClock::new();
    (FlowEditor::with_clock(EditorConfig::default(), Arc::new(clock.clone())), clock)
}

fn labelled(g: &mut GraphModel, label: &str) -> String {
    let id = g.add_node(NewNode::new(NodeKind::Pipeline).unselected());
    g.set_node_field(&id, Section::Root, "label", json!(label).into()).unwrap();
    id
}

/// Adjacency by label: (source, group) -> [(target, order)].
fn adjacency(g: &GraphModel) -> BTreeMap<(String, String), Vec<(String, u32)>> {
    let mut out = BTreeMap::new();
    for node in g.nodes() {
        for group in HandleGroup::ALL {
            let siblings = g.siblings(&node.id, group);
            if siblings.is_empty() {
                continue;
            }
            let targets = siblings
                .iter()
                .map(|e| (g.node(&e.target).unwrap().label().to_string(), e.order))
                .collect();
            out.insert((node.label().to_string(), format!("{group:?}")), targets);
        }
    }
    out
}

fn assert_contiguous(g: &GraphModel) {
    assert!(g.order_gaps().is_empty(), "order gaps: {:?}", g.order_gaps());
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn chain_with_error_edge_round_trips() {
    let mut g = GraphModel::new();
    let a = labelled(&mut g, "A");
    let b = labelled(&mut g, "B");
    let c = labelled(&mut g, "C");
    g.add_edge(Connection::new(&a, SourceHandle::Next, &b), true).unwrap();
    g.add_edge(Connection::new(&b, SourceHandle::Next, &c), true).unwrap();
    g.add_edge(Connection::new(&a, SourceHandle::Error, &c), true).unwrap();

    let doc = graph_to_document(&g, &ExportOptions::default()).unwrap();
    assert_eq!(doc.get("A").unwrap()["next"], json!(["B"]));
    assert_eq!(doc.get("A").unwrap()["on_error"], json!(["C"]));

    let reimported = document_to_graph(&doc, &ImportOptions::default()).unwrap().graph;
    assert_eq!(adjacency(&reimported), adjacency(&g));
}

#[test]
fn rich_graph_round_trips_through_text() {
    let mut g = GraphModel::new();
    let a = labelled(&mut g, "A");
    let b = labelled(&mut g, "B");
    let c = labelled(&mut g, "C");
    let anchor = g.add_node(NewNode::new(NodeKind::Anchor).unselected());
    let ext = g.add_node(NewNode::new(NodeKind::External).unselected());
    g.add_edge(Connection::new(&a, SourceHandle::Next, &c), true).unwrap();
    g.add_edge(Connection::new(&a, SourceHandle::JumpBack, &b), true).unwrap();
    g.add_edge(Connection::new(&a, SourceHandle::Next, &anchor), true).unwrap();
    g.add_edge(Connection::new(&a, SourceHandle::Interrupt, &ext), true).unwrap();
    let err = g.add_edge(Connection::new(&b, SourceHandle::Error, &c), true).unwrap();
    g.set_edge_attribute(&err, EdgeAttr::JumpBack, Some(true)).unwrap();
    g.set_node_fields(
        &a,
        vec![
            flowsmith_graph::FieldUpdate::new(Section::Recognition, TYPE_CHANGE_KEY, json!("OCR")),
            flowsmith_graph::FieldUpdate::new(Section::Recognition, "expected", json!(["Go"])),
            flowsmith_graph::FieldUpdate::new(Section::Others, "rate_limit", json!(500)),
            flowsmith_graph::FieldUpdate::new(Section::Root, "note", json!({ "kept": true })),
        ],
    )
    .unwrap();

    for style in [NodeAttrStyle::Prefix, NodeAttrStyle::Object] {
        let options = ExportOptions {
            prefix: "Run".into(),
            node_attr_style: style,
            export_editor_config: true,
            file_name: "run.json".into(),
            ..ExportOptions::default()
        };
        let text = graph_to_document(&g, &options).unwrap().to_pretty_string().unwrap();
        let doc = PipelineDocument::parse(&text).unwrap();
        let imported = document_to_graph(&doc, &ImportOptions::default()).unwrap();
        assert_eq!(imported.prefix, "Run");
        let back = imported.graph;
        assert_eq!(adjacency(&back), adjacency(&g), "style {style:?}");

        let a_back = back.find_by_label("A").unwrap().as_pipeline().unwrap();
        let a_orig = g.node(&a).unwrap().as_pipeline().unwrap();
        assert_eq!(a_back, a_orig);
        let err_back = back.edges().iter().find(|e| e.source_handle == SourceHandle::Error).unwrap();
        assert!(err_back.attributes.jump_back);
        for node in g.nodes() {
            assert_eq!(back.find_by_label(node.label()).unwrap().position, node.position);
        }
    }
}

fn layout_node(g: &mut GraphModel, kind: NodeKind, label: &str) -> String {
    let id = g.add_node(NewNode::new(kind).unselected());
    g.set_node_field(&id, Section::Root, "label", json!(label).into()).unwrap();
    id
}

#[test]
fn external_and_anchor_nodes_round_trip_with_default_options() {
    let mut g = GraphModel::new();
    let a = labelled(&mut g, "A");
    let ext = layout_node(&mut g, NodeKind::External, "Other_Flow");
    layout_node(&mut g, NodeKind::Anchor, "Loose");
    g.add_edge(Connection::new(&a, SourceHandle::Next, &ext), true).unwrap();

    let text = graph_to_document(&g, &ExportOptions::default())
        .unwrap()
        .to_pretty_string()
        .unwrap();
    let doc = PipelineDocument::parse(&text).unwrap();
    let back = document_to_graph(&doc, &ImportOptions::default()).unwrap().graph;

    assert_eq!(back.nodes().len(), 3);
    assert_eq!(back.find_by_label("Other_Flow").unwrap().kind(), NodeKind::External);
    assert_eq!(back.find_by_label("Loose").unwrap().kind(), NodeKind::Anchor);
    assert_eq!(adjacency(&back), adjacency(&g));
}

#[test]
fn prefix_without_header_is_supplied_by_the_caller() {
    let mut g = GraphModel::new();
    let a = labelled(&mut g, "A");
    let b = labelled(&mut g, "B");
    g.add_edge(Connection::new(&a, SourceHandle::Next, &b), true).unwrap();
    let options = ExportOptions {
        prefix: "P".into(),
        ..ExportOptions::default()
    };
    let doc = graph_to_document(&g, &options).unwrap();

    let bare = document_to_graph(&doc, &ImportOptions::default()).unwrap().graph;
    assert!(bare.find_by_label("P_A").is_some());

    let imported = document_to_graph(
        &doc,
        &ImportOptions {
            prefix: Some("P".into()),
            ..ImportOptions::default()
        },
    )
    .unwrap();
    assert_eq!(imported.prefix, "P");
    assert_eq!(adjacency(&imported.graph), adjacency(&g));
}

#[test]
fn jsonc_document_imports() {
    let text = r#"
    {
        // entry point
        "Start": {
            "recognition": "OCR",
            "expected": ["Start"],
            "next": ["Wait", /* second */ "Done"],
        },
        "Wait": { "post_delay": 500, "next": "Done" },
        "Done": {},
    }"#;
    let doc = PipelineDocument::parse(text).unwrap();
    let g = document_to_graph(&doc, &ImportOptions::default()).unwrap().graph;
    let start = g.find_by_label("Start").unwrap();
    assert_eq!(start.as_pipeline().unwrap().recognition.kind(), RecognitionKind::Ocr);
    let adj = adjacency(&g);
    assert_eq!(
        adj[&("Start".to_string(), "Next".to_string())],
        vec![("Wait".into(), 1), ("Done".into(), 2)]
    );
}

// ---------------------------------------------------------------------------
// Structural invariants
// ---------------------------------------------------------------------------

#[test]
fn sibling_orders_stay_contiguous() {
    let mut g = GraphModel::new();
    let src = labelled(&mut g, "S");
    let targets: Vec<String> = (0..6).map(|i| labelled(&mut g, &format!("T{i}"))).collect();
    let mut edges: Vec<String> = targets
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let handle = if i % 3 == 2 { SourceHandle::JumpBack } else { SourceHandle::Next };
            g.add_edge(Connection::new(&src, handle, t), true).unwrap()
        })
        .collect();
    assert_contiguous(&g);

    // deterministic shuffle of reorders and removals
    let mut seed: u64 = 7;
    for step in 0..20 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        if edges.is_empty() {
            break;
        }
        let pick = (seed >> 33) as usize % edges.len();
        if step % 6 == 5 {
            let removed = edges.remove(pick);
            g.remove_edge(&removed).unwrap();
        } else {
            let count = g.siblings(&src, HandleGroup::Next).len() as u32;
            let new_order = (seed >> 40) as u32 % count + 1;
            g.reorder_edge(&edges[pick], new_order).unwrap();
        }
        assert_contiguous(&g);
    }

    g.remove_node(&targets[0]).unwrap();
    assert_contiguous(&g);
    let first = g.edges()[0].id.clone();
    let err = g.reorder_edge(&first, 99).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn batch_edge_removal_keeps_orders() {
    let (mut ed, _clock) = editor();
    let s = ed.add_node(NewNode::new(NodeKind::Pipeline));
    let ts: Vec<String> = (0..4).map(|_| ed.add_node(NewNode::new(NodeKind::Pipeline))).collect();
    let ids: Vec<String> = ts
        .iter()
        .map(|t| ed.add_edge(Connection::new(&s, SourceHandle::Next, t)).unwrap())
        .collect();
    ed.remove_edges(&[ids[0].clone(), ids[2].clone()]).unwrap();
    let orders: Vec<u32> = ed.graph().siblings(&s, HandleGroup::Next).iter().map(|e| e.order).collect();
    assert_eq!(orders, vec![1, 2]);
}

#[test]
fn conflicts_and_self_loops_are_rejected() {
    let mut g = GraphModel::new();
    let a = labelled(&mut g, "A");
    let b = labelled(&mut g, "B");

    g.add_edge(Connection::new(&a, SourceHandle::Error, &b), true).unwrap();
    let before = g.edges().to_vec();
    let err = g.add_edge(Connection::new(&a, SourceHandle::Next, &b), true).unwrap_err();
    assert!(matches!(err, FlowError::EdgeConflict { .. }));
    assert_eq!(g.edges(), before.as_slice());

    let mut g2 = GraphModel::new();
    let a2 = labelled(&mut g2, "A");
    let b2 = labelled(&mut g2, "B");
    g2.add_edge(Connection::new(&a2, SourceHandle::Next, &b2), true).unwrap();
    assert!(g2.add_edge(Connection::new(&a2, SourceHandle::Error, &b2), true).is_err());
    // reverse direction is a different ordered pair
    assert!(g2.add_edge(Connection::new(&b2, SourceHandle::Error, &a2), true).is_ok());

    let err = g.add_edge(Connection::new(&a, SourceHandle::Error, &a), true).unwrap_err();
    assert!(matches!(err, FlowError::SelfLoop { .. }));
    assert!(g.add_edge(Connection::new(&a, SourceHandle::Next, &a), true).is_ok());
}

#[test]
fn repeated_add_node_never_duplicates_labels() {
    let mut g = GraphModel::new();
    for _ in 0..50 {
        g.add_node(NewNode::new(NodeKind::Pipeline));
    }
    let mut labels: Vec<&str> = g.nodes().iter().map(|n| n.label()).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), 50);
}

#[test]
fn type_change_fills_required_keys() {
    let (mut ed, _clock) = editor();
    let id = ed.add_node(NewNode::new(NodeKind::Pipeline));
    ed.set_node_field(&id, Section::Recognition, TYPE_CHANGE_KEY, json!("ColorMatch").into())
        .unwrap();
    let param = ed.graph().node(&id).unwrap().as_pipeline().unwrap().recognition.param();
    assert_eq!(param["lower"], json!([[0, 0, 0]]));
    ed.set_node_field(&id, Section::Recognition, "lower", FieldValue::Delete).unwrap();
    let param = ed.graph().node(&id).unwrap().as_pipeline().unwrap().recognition.param();
    assert!(!param.contains_key("lower"));
    let err = ed
        .set_node_field(&id, Section::Recognition, "upper", json!("bright").into())
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidField { .. }));
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[test]
fn saving_twice_without_changes_stores_once() {
    let (mut ed, _clock) = editor();
    ed.add_node(NewNode::new(NodeKind::Pipeline));
    ed.flush();
    let len = ed.history().len();
    ed.save_history(0);
    ed.flush();
    ed.save_history(0);
    ed.flush();
    assert_eq!(ed.history().len(), len);

    // selection-only changes do not add entries either
    ed.clear_selection();
    ed.save_history(0);
    ed.flush();
    assert_eq!(ed.history().len(), len);
}

#[test]
fn k_undos_restore_the_start_and_redos_return() {
    let (mut ed, clock) = editor();
    let a = ed.add_node(NewNode::new(NodeKind::Pipeline));
    ed.init_history();
    let start = ed.graph().snapshot();

    let b = ed.add_node(NewNode::new(NodeKind::Pipeline).at(100.0, 0.0));
    ed.flush();
    ed.add_edge(Connection::new(&a, SourceHandle::Next, &b)).unwrap();
    ed.flush();
    ed.set_node_field(&b, Section::Others, "timeout", json!(100).into()).unwrap();
    clock.advance(2_000);
    ed.poll();
    ed.remove_node(&a).unwrap();
    ed.flush();
    let end = ed.graph().snapshot();

    let k = 4;
    for _ in 0..k {
        assert!(ed.undo());
    }
    assert!(!ed.can_undo());
    assert_eq!(ed.graph().snapshot().nodes.len(), start.nodes.len());
    assert_eq!(serde_json::to_value(ed.graph().snapshot()).unwrap(), serde_json::to_value(&start).unwrap());

    for _ in 0..k {
        assert!(ed.redo());
    }
    assert_eq!(serde_json::to_value(ed.graph().snapshot()).unwrap(), serde_json::to_value(&end).unwrap());
    assert!(!ed.can_redo());
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn diamond_path_includes_both_branches() {
    let mut g = GraphModel::new();
    let [a, b, c, d] = ["A", "B", "C", "D"].map(|l| labelled(&mut g, l));
    let ab = g.add_edge(Connection::new(&a, SourceHandle::Next, &b), true).unwrap();
    let ac = g.add_edge(Connection::new(&a, SourceHandle::Next, &c), true).unwrap();
    let bd = g.add_edge(Connection::new(&b, SourceHandle::Next, &d), true).unwrap();
    let cd = g.add_edge(Connection::new(&c, SourceHandle::Error, &d), true).unwrap();

    let result = find_all_paths(g.edges(), &a, &d);
    assert_eq!(result.nodes.len(), 4);
    for edge in [&ab, &ac, &bd, &cd] {
        assert!(result.edges.contains(edge));
    }
}

// ---------------------------------------------------------------------------
// Import contract and side config
// ---------------------------------------------------------------------------

#[test]
fn failed_import_restores_previous_graph() {
    let (mut ed, _clock) = editor();
    let a = ed.add_node(NewNode::new(NodeKind::Pipeline));
    ed.flush();
    let before = ed.graph().snapshot();
    let history = ed.history().len();

    let doc = PipelineDocument::parse(r#"{ "A": { "next": ["B"] }, "C": {} }"#).unwrap();
    let err = ed.import_document(&doc, &ImportOptions::default()).unwrap_err();
    assert!(err.is_import());
    assert_eq!(ed.graph().snapshot(), before);
    assert_eq!(ed.history().len(), history);
    assert!(ed.graph().node(&a).is_some());

    assert!(PipelineDocument::parse("{ \"A\": ").unwrap_err().is_import());
}

#[test]
fn side_config_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut g = GraphModel::new();
    let a = g.add_node(NewNode::new(NodeKind::Pipeline).at(40.0, 80.0).unselected());
    let b = g.add_node(NewNode::new(NodeKind::Pipeline).at(240.0, 80.0).unselected());
    g.add_edge(Connection::new(&a, SourceHandle::Next, &b), true).unwrap();
    let options = ExportOptions {
        export_editor_config: true,
        file_name: "main.json".into(),
        ..ExportOptions::default()
    };
    let full = graph_to_document(&g, &options).unwrap();

    let (clean, side) = split_document(&full);
    let pipeline_path = dir.path().join("main.json");
    let side_path = dir.path().join(side_config_file_name("main.json"));
    std::fs::write(&pipeline_path, clean.to_pretty_string().unwrap()).unwrap();
    std::fs::write(&side_path, side.to_pretty_string().unwrap()).unwrap();
    assert!(side_path.ends_with(".main.mpe.json"));

    let pipeline_text = std::fs::read_to_string(&pipeline_path).unwrap();
    assert!(!pipeline_text.contains(CONFIG_MARK));
    let clean = PipelineDocument::parse(&pipeline_text).unwrap();
    let side = SideConfig::parse(&std::fs::read_to_string(&side_path).unwrap()).unwrap();
    let merged = merge_document_and_side_config(&clean, &side).unwrap();

    let back = document_to_graph(&merged, &ImportOptions::default()).unwrap().graph;
    let a_label = g.node(&a).unwrap().label();
    assert_eq!(back.find_by_label(a_label).unwrap().position, Position { x: 40.0, y: 80.0 });
    assert_eq!(adjacency(&back), adjacency(&g));
}
