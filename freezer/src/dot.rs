// dot.rs — Graphviz DOT output for computation graphs
//
// Transforms a Graph into DOT format suitable for rendering with `dot`,
// `neato`, or other Graphviz layout engines.
//
// Preconditions: `graph` is a propagated Graph.
// Postconditions: returns a valid DOT string representing the graph.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::graph::*;

/// Constants with more elements than this are labelled by shape only.
const MAX_INLINE_VALUES: usize = 8;

/// Emit the graph as a Graphviz DOT string.
pub fn emit_dot(graph: &Graph) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph freezer {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    writeln!(buf).unwrap();
    for node in graph.nodes() {
        let attrs = node_attrs(node);
        writeln!(buf, "    n{} [{attrs}];", node.id.0).unwrap();
    }

    writeln!(buf).unwrap();
    for node in graph.nodes() {
        for input in &node.inputs {
            let label = edge_label(graph, *input);
            writeln!(
                buf,
                "    n{} -> n{} [label=\"{label}\"];",
                input.node.0, node.id.0
            )
            .unwrap();
        }
    }

    // Graph outputs as sink markers
    if !graph.outputs().is_empty() {
        writeln!(buf).unwrap();
        for (i, output) in graph.outputs().iter().enumerate() {
            let name = escape(&graph.tensor_name(*output));
            writeln!(
                buf,
                "    out{i} [shape=doublecircle, style=filled, fillcolor=lightgreen, label=\"{name}\"];"
            )
            .unwrap();
            writeln!(buf, "    n{} -> out{i};", output.node.0).unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Escape a string for use inside a quoted DOT label.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Return the node label: name, op, and metadata (or values for small constants).
fn node_label(node: &Node) -> String {
    let name = escape(&node.name);
    match &node.op {
        OpKind::Const(tensor) if tensor.len() <= MAX_INLINE_VALUES => {
            let values: Vec<String> = tensor.to_f64_vec().iter().map(|v| format!("{v}")).collect();
            format!("{name}\\nConst [{}]", values.join(" "))
        }
        OpKind::Split { parts } => format!("{name}\\nSplit<{parts}>"),
        op => {
            let infos: Vec<String> = node.outputs.iter().map(|i| i.to_string()).collect();
            format!("{name}\\n{}\\n{}", op.name(), infos.join(", "))
        }
    }
}

/// Return DOT attributes string for a node.
fn node_attrs(node: &Node) -> String {
    let (shape, color) = match node.op {
        OpKind::Placeholder => ("invhouse", "lightsalmon"),
        OpKind::Const(_) => ("box", "lightyellow"),
        _ => ("box", "lightblue"),
    };
    let label = node_label(node);
    format!("shape={shape}, style=filled, fillcolor={color}, label=\"{label}\"")
}

/// Edge label: slot suffix for multi-output producers, then tensor metadata.
fn edge_label(graph: &Graph, tensor: TensorRef) -> String {
    let info = graph
        .tensor_info(tensor)
        .map(|i| i.to_string())
        .unwrap_or_default();
    if graph.node(tensor.node).outputs.len() > 1 {
        format!(":{} {}", tensor.slot, info)
    } else {
        info
    }
}
