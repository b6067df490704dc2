// splice.rs — Apply resolved inputs to a copy of the graph
//
// Freezes placeholders into constants, retypes/renames placeholders, injects
// new placeholders (or constants) at cut points, removes everything that no
// longer reaches an output, and re-propagates types and shapes.
//
// Preconditions: `inputs` were produced by `reconcile` against `original`.
// Postconditions: the returned graph's inputs are exactly the non-constant
//                 resolved inputs that still reach an output; `original` is
//                 never modified.
// Failure modes: GraphSplice when a cut sits on a graph output or only feeds
//                outputs through another injection point. Also when a name
//                collides with a surviving node or propagation rejects the
//                new input types.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::diag::{codes, Diagnostic};
use crate::error::{ErrorKind, FreezeError, Result};
use crate::graph::{Graph, NodeId, OpKind, TensorInfo, TensorRef};
use crate::infer;
use crate::reconcile::{InputMode, ResolvedInput};

#[derive(Debug, Clone)]
pub struct SpliceResult {
    pub graph: Graph,
    /// Names of nodes removed because they no longer reach an output.
    pub pruned: Vec<String>,
    pub warnings: Vec<Diagnostic>,
}

pub fn splice(original: &Graph, inputs: &[ResolvedInput]) -> Result<SpliceResult> {
    check_cuts(original, inputs)?;

    let mut graph = original.clone();
    // Injected nodes get a scratch name until pruning has settled which
    // original nodes survive.
    let mut provisional: HashMap<String, String> = HashMap::new();
    let mut renames: Vec<(String, String)> = Vec::new();

    for input in inputs {
        let node = original.node(input.target.node);
        let is_placeholder = node.op.is_placeholder();
        match (&input.mode, is_placeholder) {
            (InputMode::PassThrough, _) => {}
            (InputMode::Renamed { original: name }, _) => {
                let id = input.target.node;
                graph.node_mut(id).outputs = vec![TensorInfo::new(input.dtype, input.shape.clone())];
                if input.name != *name {
                    renames.push((name.clone(), input.name.clone()));
                }
            }
            (InputMode::Constant(tensor), true) => {
                let frozen = graph.node_mut(input.target.node);
                frozen.outputs = vec![TensorInfo::of_tensor(tensor)];
                frozen.op = OpKind::Const(tensor.clone());
            }
            (InputMode::Constant(tensor), false) => {
                let op = OpKind::Const(tensor.clone());
                let info = TensorInfo::of_tensor(tensor);
                inject(&mut graph, input, op, info, &mut provisional)?;
            }
            (InputMode::CutInjected { .. }, _) => {
                let info = TensorInfo::new(input.dtype, input.shape.clone());
                inject(&mut graph, input, OpKind::Placeholder, info, &mut provisional)?;
            }
        }
    }

    let live_placeholders: Vec<String> = graph.placeholders().map(|n| n.name.clone()).collect();
    let removed = graph.prune();
    let mut warnings = Vec::new();
    let mut pruned = Vec::with_capacity(removed.len());
    for removed_name in removed {
        let was_input = live_placeholders.contains(&removed_name);
        let name = provisional.get(&removed_name).cloned().unwrap_or(removed_name);
        if pruned.contains(&name) {
            continue;
        }
        if was_input {
            warnings.push(
                Diagnostic::warning(format!("input '{name}' no longer reaches any output"))
                    .with_code(codes::PLACEHOLDER_PRUNED)
                    .with_hint("it was removed from the graph"),
            );
        }
        pruned.push(name);
    }

    for (scratch, name) in &provisional {
        if let Some(id) = graph.find(scratch) {
            rename(&mut graph, id, name)?;
        }
    }
    for (from, to) in &renames {
        if let Some(id) = graph.find(from) {
            rename(&mut graph, id, to)?;
        }
    }

    infer::propagate(&mut graph).map_err(|e| {
        FreezeError::new(ErrorKind::GraphSplice, format!("overrides do not type-check: {e}"))
    })?;

    Ok(SpliceResult {
        graph,
        pruned,
        warnings,
    })
}

/// Every injection point must sit on an internal tensor that is not a graph
/// output and that still feeds an output once all other injections are in
/// place. A cut upstream of another cut would otherwise be pruned.
fn check_cuts(original: &Graph, inputs: &[ResolvedInput]) -> Result<()> {
    let injected: Vec<&ResolvedInput> = inputs.iter().filter(|i| i.is_cut(original)).collect();
    for input in &injected {
        if original.outputs().contains(&input.target) {
            return Err(splice_error(
                input,
                format!("'{}' is a graph output and cannot be cut", input.name),
            ));
        }
    }

    let targets: HashSet<TensorRef> = injected.iter().map(|i| i.target).collect();
    let reached = reached_targets(original, &targets);
    for input in &injected {
        if reached.contains(&input.target) {
            continue;
        }
        let shadowed_by = injected
            .iter()
            .filter(|other| other.target != input.target)
            .find(|other| upstream_of(original, input.target, other.target));
        let message = match shadowed_by {
            Some(other) => format!(
                "'{}' only feeds outputs through '{}', which is also replaced",
                input.name, other.name
            ),
            None => format!("'{}' does not feed any graph output", input.name),
        };
        return Err(splice_error(input, message));
    }
    Ok(())
}

fn splice_error(input: &ResolvedInput, message: String) -> FreezeError {
    let err = FreezeError::new(ErrorKind::GraphSplice, message).with_target(input.name.clone());
    match input.span {
        Some(span) => err.with_span(span),
        None => err,
    }
}

/// Injection targets reached walking backward from the outputs, where the
/// walk stops at every target (its producer is replaced there).
fn reached_targets(graph: &Graph, targets: &HashSet<TensorRef>) -> HashSet<TensorRef> {
    let mut reached = HashSet::new();
    let mut seen = vec![false; graph.len()];
    let mut stack: Vec<TensorRef> = graph.outputs().to_vec();
    while let Some(tensor) = stack.pop() {
        if targets.contains(&tensor) {
            reached.insert(tensor);
            continue;
        }
        if std::mem::replace(&mut seen[tensor.node.index()], true) {
            continue;
        }
        stack.extend(graph.node(tensor.node).inputs.iter().copied());
    }
    reached
}

/// Whether `downstream` depends on `tensor`.
fn upstream_of(graph: &Graph, tensor: TensorRef, downstream: TensorRef) -> bool {
    let mut seen = vec![false; graph.len()];
    let mut stack = vec![downstream.node];
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut seen[id.index()], true) {
            continue;
        }
        for input in &graph.node(id).inputs {
            if *input == tensor {
                return true;
            }
            stack.push(input.node);
        }
    }
    false
}

/// Add a source node standing in for `input.target` and rewire its uses.
fn inject(
    graph: &mut Graph,
    input: &ResolvedInput,
    op: OpKind,
    info: TensorInfo,
    provisional: &mut HashMap<String, String>,
) -> Result<()> {
    let scratch = scratch_name(graph, provisional.len());
    let id = graph
        .add_node(scratch.clone(), op, Vec::new(), vec![info])
        .map_err(|e| FreezeError::new(ErrorKind::GraphSplice, e.to_string()))?;
    graph.replace_uses(input.target, TensorRef::new(id, 0));
    provisional.insert(scratch, input.name.clone());
    Ok(())
}

fn scratch_name(graph: &Graph, mut n: usize) -> String {
    loop {
        let name = format!("__cut{n}");
        if graph.find(&name).is_none() {
            return name;
        }
        n += 1;
    }
}

fn rename(graph: &mut Graph, id: NodeId, name: &str) -> Result<()> {
    graph.rename_node(id, name.to_string()).map_err(|_| {
        FreezeError::new(
            ErrorKind::GraphSplice,
            format!("input name '{name}' is already used by a node that is still live"),
        )
        .with_target(name.to_string())
    })
}
