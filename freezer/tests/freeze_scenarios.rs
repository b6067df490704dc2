// End-to-end freezing scenarios: resolve overrides against a graph, splice,
// then evaluate the finalized graph with the reference engine and compare
// against expected values.
//
// Each scenario mirrors a real model shape (elementwise add/mul/and, select,
// and a three-input chain that is cut in the middle).

use std::collections::BTreeMap;

use freezer::engine::{InferenceEngine, ReferenceEngine};
use freezer::error::{ErrorKind, FreezeError};
use freezer::graph::{Graph, GraphBuilder, OpKind, Shape};
use freezer::options::FreezeOptions;
use freezer::pipeline::{freeze, FreezeOutput};
use freezer::reconcile::InputMode;
use freezer::report::{NoopReporter, RecordingReporter};
use freezer::tensor::{ElemType, Tensor};

// ── Test helpers ────────────────────────────────────────────────────────────

fn binary(op: OpKind, name: &str, dtype: ElemType, dims: &[u64]) -> Graph {
    GraphBuilder::new()
        .placeholder("in1", dtype, Shape::fixed(dims))
        .placeholder("in2", dtype, Shape::fixed(dims))
        .op(name, op, &["in1", "in2"])
        .output(name)
        .build()
        .unwrap()
}

/// `where(cond, in1, in2)` with a scalar condition.
fn select_graph() -> Graph {
    select_over(Shape::scalar(), Shape::fixed(&[3]))
}

fn select_dynamic_graph() -> Graph {
    let dynamic = || Shape::Ranked(vec![freezer::graph::Dim::Dynamic]);
    select_over(dynamic(), dynamic())
}

fn select_over(cond: Shape, branch: Shape) -> Graph {
    GraphBuilder::new()
        .placeholder("cond", ElemType::Bool, cond)
        .placeholder("in1", ElemType::F32, branch.clone())
        .placeholder("in2", ElemType::F32, branch)
        .op("select", OpKind::Select, &["cond", "in1", "in2"])
        .output("select")
        .build()
        .unwrap()
}

fn three_inputs() -> Graph {
    GraphBuilder::new()
        .placeholder("x", ElemType::F32, Shape::fixed(&[3]))
        .placeholder("y", ElemType::F32, Shape::fixed(&[3]))
        .placeholder("z", ElemType::F32, Shape::fixed(&[3]))
        .op("add", OpKind::Add, &["x", "y"])
        .op("multiply", OpKind::Mul, &["add", "z"])
        .output("multiply")
        .build()
        .unwrap()
}

fn run_freeze(graph: &Graph, options: FreezeOptions) -> FreezeOutput {
    freeze(graph, &options, &mut NoopReporter)
        .unwrap_or_else(|e| panic!("freeze failed: {}", e.to_diagnostic()))
}

fn freeze_err(graph: &Graph, options: FreezeOptions) -> FreezeError {
    match freeze(graph, &options, &mut NoopReporter) {
        Ok(out) => panic!("expected an error, got graph:\n{}", out.graph),
        Err(e) => e,
    }
}

fn feeds(entries: Vec<(&str, Tensor)>) -> BTreeMap<String, Tensor> {
    entries
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect()
}

/// Evaluate and return the single graph output.
fn infer_one(graph: &Graph, feeds: BTreeMap<String, Tensor>) -> Tensor {
    let mut outputs = ReferenceEngine
        .infer(graph, &feeds)
        .unwrap_or_else(|e| panic!("inference failed: {e}\n{graph}"));
    assert_eq!(outputs.len(), 1, "expected one output");
    outputs.pop_first().unwrap().1
}

fn input_names(graph: &Graph) -> Vec<String> {
    graph.placeholders().map(|n| n.name.clone()).collect()
}

// ── Add, f32 [2,2] ──────────────────────────────────────────────────────────

#[test]
fn add_both_frozen_with_reshape() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let out = run_freeze(
        &g,
        FreezeOptions::default()
            .with_input("in1[1 4]->[1.0 2.0 3.0 4.0],in2[1 4]{f32}->[1.0 2.0 3.0 4.0]"),
    );
    assert!(input_names(&out.graph).is_empty());
    let result = infer_one(&out.graph, BTreeMap::new());
    assert_eq!(result.shape, vec![1, 4]);
    assert!(result.allclose(&[2.0, 4.0, 6.0, 8.0]));
}

#[test]
fn add_one_frozen_with_integer_literals() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let out = run_freeze(&g, FreezeOptions::default().with_input("in2{f32}->[0 0 0 0]"));
    assert_eq!(input_names(&out.graph), vec!["in1"]);
    let frozen = out.inputs.iter().find(|i| i.name == "in2").unwrap();
    match &frozen.mode {
        InputMode::Constant(t) => assert_eq!(t.shape, vec![2, 2]),
        other => panic!("expected a constant, got {other:?}"),
    }
    let x = Tensor::f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let result = infer_one(&out.graph, feeds(vec![("in1", x)]));
    assert!(result.allclose(&[1.0, 2.0, 3.0, 4.0]));
}

#[test]
fn add_one_frozen_with_declared_type() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let out = run_freeze(&g, FreezeOptions::default().with_input("in2->[1.0 15.0 15.5 1.0]"));
    let x = Tensor::f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let result = infer_one(&out.graph, feeds(vec![("in1", x)]));
    assert!(result.allclose(&[2.0, 17.0, 18.5, 5.0]));
}

#[test]
fn add_retyped_to_i32() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let out = run_freeze(
        &g,
        FreezeOptions::default().with_input("in1{i32}[1 4]->[1 2 3 4],in2{i32}[1 4]->[1 2 3 4]"),
    );
    let result = infer_one(&out.graph, BTreeMap::new());
    assert_eq!(result.elem_type(), ElemType::I32);
    assert_eq!(result, Tensor::i32(vec![1, 4], vec![2, 4, 6, 8]).unwrap());
}

// ── Mul, i32 [2,3] ──────────────────────────────────────────────────────────

#[test]
fn mul_i32_one_frozen() {
    let g = binary(OpKind::Mul, "mul", ElemType::I32, &[2, 3]);
    let out = run_freeze(&g, FreezeOptions::default().with_freeze("in1->[1 2 3 4 5 6]"));
    let y = Tensor::i32(vec![2, 3], vec![2, 2, 2, 3, 3, 3]).unwrap();
    let result = infer_one(&out.graph, feeds(vec![("in2", y)]));
    assert_eq!(result, Tensor::i32(vec![2, 3], vec![2, 4, 6, 12, 15, 18]).unwrap());
}

#[test]
fn mul_rejects_fractional_literal() {
    let g = binary(OpKind::Mul, "mul", ElemType::I32, &[2, 3]);
    let err = freeze_err(&g, FreezeOptions::default().with_input("in1->[1 2 3 4 5 6.5]"));
    assert_eq!(err.kind, ErrorKind::TypeCoercion);
    assert_eq!(err.target.as_deref(), Some("in1"));
}

// ── LogicalAnd, bool [2,3] ──────────────────────────────────────────────────

#[test]
fn and_both_frozen_reshaped() {
    let g = binary(OpKind::LogicalAnd, "and", ElemType::Bool, &[2, 3]);
    let out = run_freeze(
        &g,
        FreezeOptions::default().with_input("in1[2]->[True False],in2[2]->[True True]"),
    );
    let result = infer_one(&out.graph, BTreeMap::new());
    assert_eq!(result, Tensor::bool(vec![2], vec![true, false]).unwrap());
}

#[test]
fn and_one_frozen_full_shape() {
    let g = binary(OpKind::LogicalAnd, "and", ElemType::Bool, &[2, 3]);
    let out = run_freeze(
        &g,
        FreezeOptions::default().with_input("in2[2,3]->[True True False True False True]"),
    );
    let x = Tensor::bool(vec![2, 3], vec![true; 6]).unwrap();
    let result = infer_one(&out.graph, feeds(vec![("in1", x)]));
    assert_eq!(
        result,
        Tensor::bool(vec![2, 3], vec![true, true, false, true, false, true]).unwrap()
    );
}

#[test]
fn and_scalar_broadcasts() {
    let g = binary(OpKind::LogicalAnd, "and", ElemType::Bool, &[2, 3]);
    let out = run_freeze(&g, FreezeOptions::default().with_input("in2[]->True"));
    let x = Tensor::bool(vec![2, 3], vec![true, false, true, false, true, false]).unwrap();
    let result = infer_one(&out.graph, feeds(vec![("in1", x.clone())]));
    assert_eq!(result, x);
}

// ── Select ──────────────────────────────────────────────────────────────────

#[test]
fn select_condition_frozen_false() {
    let out = run_freeze(&select_graph(), FreezeOptions::default().with_freeze("cond->False"));
    assert_eq!(input_names(&out.graph), vec!["in1", "in2"]);
    let result = infer_one(
        &out.graph,
        feeds(vec![
            ("in1", Tensor::f32(vec![3], vec![2.0, 4.0, 6.0]).unwrap()),
            ("in2", Tensor::f32(vec![3], vec![1.0, 3.0, 5.0]).unwrap()),
        ]),
    );
    assert!(result.allclose(&[1.0, 3.0, 5.0]));
}

#[test]
fn select_shape_goes_to_sole_open_input() {
    let out = run_freeze(
        &select_graph(),
        FreezeOptions::default()
            .with_freeze("in1->[2.0 4.0 6.0],cond->True")
            .with_input_shape("[3]"),
    );
    assert_eq!(input_names(&out.graph), vec!["in2"]);
    let in2 = out.inputs.iter().find(|i| i.name == "in2").unwrap();
    assert_eq!(in2.shape, Shape::fixed(&[3]));
    let result = infer_one(
        &out.graph,
        feeds(vec![("in2", Tensor::f32(vec![3], vec![1.0, 3.0, 5.0]).unwrap())]),
    );
    assert!(result.allclose(&[2.0, 4.0, 6.0]));
}

#[test]
fn select_shape_without_sole_input_is_rejected() {
    let err = freeze_err(
        &select_graph(),
        FreezeOptions::default()
            .with_freeze("cond->True")
            .with_input_shape("[3]"),
    );
    assert_eq!(err.kind, ErrorKind::InvalidShape);
}

#[test]
fn select_dynamic_inputs_take_shape_from_values() {
    let out = run_freeze(
        &select_dynamic_graph(),
        FreezeOptions::default()
            .with_freeze("in1->[2.0 4.0 6.0],cond->[True False True]")
            .with_input_shape("[3]"),
    );
    assert_eq!(input_names(&out.graph), vec!["in2"]);
    let in2 = out.inputs.iter().find(|i| i.name == "in2").unwrap();
    assert_eq!(in2.shape, Shape::fixed(&[3]));
    let result = infer_one(
        &out.graph,
        feeds(vec![("in2", Tensor::f32(vec![3], vec![1.0, 3.0, 5.0]).unwrap())]),
    );
    assert!(result.allclose(&[2.0, 3.0, 6.0]));
}

#[test]
fn select_scalar_condition_rejects_vector_value() {
    let err = freeze_err(&select_graph(), FreezeOptions::default().with_freeze("cond->[True False True]"));
    assert_eq!(err.kind, ErrorKind::ShapeMismatch);
}

#[test]
fn select_numeric_condition_is_rejected() {
    let err = freeze_err(&select_graph(), FreezeOptions::default().with_freeze("cond->[1 0 1]"));
    assert_eq!(err.kind, ErrorKind::TypeCoercion);
}

// ── Cut in the middle of a chain ────────────────────────────────────────────

#[test]
fn cut_replaces_upstream_subgraph() {
    let mut rec = RecordingReporter::new();
    let out = freeze(
        &three_inputs(),
        &FreezeOptions::default().with_input("add:0[3],z"),
        &mut rec,
    )
    .unwrap();
    assert_eq!(input_names(&out.graph), vec!["z", "add:0"]);
    assert_eq!(out.pruned, vec!["x", "y", "add"]);
    assert_eq!(rec.events_for("cut").len(), 1);

    let result = infer_one(
        &out.graph,
        feeds(vec![
            ("add:0", Tensor::f32(vec![3], vec![4.0, 5.0, 6.0]).unwrap()),
            ("z", Tensor::f32(vec![3], vec![1.0, 2.0, 3.0]).unwrap()),
        ]),
    );
    assert!(result.allclose(&[4.0, 10.0, 18.0]));
}

#[test]
fn cut_retyped_flows_to_output() {
    let out = run_freeze(
        &three_inputs(),
        FreezeOptions::default().with_input("add:0{i32}[3],z{i32}"),
    );
    let result = infer_one(
        &out.graph,
        feeds(vec![
            ("add:0", Tensor::i32(vec![3], vec![4, 5, 6]).unwrap()),
            ("z", Tensor::i32(vec![3], vec![1, 2, 3]).unwrap()),
        ]),
    );
    assert_eq!(result, Tensor::i32(vec![3], vec![4, 10, 18]).unwrap());
}

#[test]
fn cut_type_mismatch_downstream_is_a_splice_error() {
    let err = freeze_err(&three_inputs(), FreezeOptions::default().with_input("add:0{i32}[3]"));
    assert_eq!(err.kind, ErrorKind::GraphSplice);
}

// ── Errors and identity ─────────────────────────────────────────────────────

#[test]
fn duplicate_override_in_one_list() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let err = freeze_err(&g, FreezeOptions::default().with_input("in1->[1],in1->[2]"));
    assert_eq!(err.kind, ErrorKind::DuplicateOverride);
    assert_eq!(err.target.as_deref(), Some("in1"));
}

#[test]
fn duplicate_override_across_options() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let err = freeze_err(
        &g,
        FreezeOptions::default()
            .with_input("in1->[1 2 3 4]")
            .with_freeze("in1:0->[5 6 7 8]"),
    );
    assert_eq!(err.kind, ErrorKind::DuplicateOverride);
}

#[test]
fn unknown_input_lists_declared_inputs() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let err = freeze_err(&g, FreezeOptions::default().with_input("in3"));
    assert_eq!(err.kind, ErrorKind::UnknownInput);
    assert!(err.message.contains("in1, in2"), "{}", err.message);
}

#[test]
fn value_count_mismatch() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let err = freeze_err(&g, FreezeOptions::default().with_input("in1->[1 2 3]"));
    assert_eq!(err.kind, ErrorKind::ShapeMismatch);
}

#[test]
fn malformed_text_is_a_syntax_error() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let err = freeze_err(&g, FreezeOptions::default().with_input("in1[2 2->[1]"));
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.span.is_some());
}

#[test]
fn no_options_leaves_graph_unchanged() {
    let g = three_inputs();
    let out = run_freeze(&g, FreezeOptions::default());
    assert_eq!(out.graph.to_string(), g.to_string());
    assert!(out.pruned.is_empty());
    assert!(out.warnings.is_empty());
    assert!(out.inputs.iter().all(|i| i.mode == InputMode::PassThrough));
}

#[test]
fn caller_graph_is_not_modified() {
    let g = binary(OpKind::Add, "add", ElemType::F32, &[2, 2]);
    let before = g.to_string();
    run_freeze(&g, FreezeOptions::default().with_input("in1->[1 2 3 4]"));
    assert_eq!(g.to_string(), before);
}
