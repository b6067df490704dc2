// infer.rs — Output type/shape propagation
//
// Recomputes the output metadata of every computed node in topological
// order, so that retyped or reshaped inputs flow through to the graph
// outputs. Placeholders keep their declared metadata; constants report the
// metadata of their value.
//
// Preconditions: `graph` satisfies the arena invariants of graph.rs.
// Postconditions: every node's `outputs` is consistent with its inputs.
// Failure modes: operand type or shape conflicts → `GraphError::Propagation`.
// Side effects: mutates node output metadata in place.

use crate::graph::{Dim, Graph, GraphError, OpKind, Shape, TensorInfo};
use crate::tensor::ElemType;

pub fn propagate(graph: &mut Graph) -> Result<(), GraphError> {
    for id in graph.topo_order() {
        let node = graph.node(id);
        let args: Vec<TensorInfo> = node
            .inputs
            .iter()
            .map(|t| graph.tensor_info(*t).cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| GraphError::Propagation {
                node: node.name.clone(),
                message: "dangling input".into(),
            })?;
        let outputs = infer_node(&node.op, &args).map_err(|message| GraphError::Propagation {
            node: node.name.clone(),
            message,
        })?;
        if let Some(outputs) = outputs {
            graph.node_mut(id).outputs = outputs;
        }
    }
    Ok(())
}

/// Output metadata for one node; `None` keeps the stored metadata.
fn infer_node(op: &OpKind, args: &[TensorInfo]) -> Result<Option<Vec<TensorInfo>>, String> {
    let info = match op {
        OpKind::Placeholder => return Ok(None),
        OpKind::Const(tensor) => TensorInfo::of_tensor(tensor),
        OpKind::Identity => {
            expect_arity(op, args, 1)?;
            args[0].clone()
        }
        OpKind::Add | OpKind::Sub | OpKind::Mul => {
            expect_arity(op, args, 2)?;
            let (a, b) = (&args[0], &args[1]);
            if a.dtype != b.dtype {
                return Err(format!(
                    "{} operands have different types: {} vs {}",
                    op.name(),
                    a.dtype,
                    b.dtype
                ));
            }
            if !a.dtype.is_numeric() {
                return Err(format!("{} needs numeric operands, got {}", op.name(), a.dtype));
            }
            TensorInfo::new(a.dtype, broadcast(&a.shape, &b.shape)?)
        }
        OpKind::LogicalAnd => {
            expect_arity(op, args, 2)?;
            for arg in args {
                if arg.dtype != ElemType::Bool {
                    return Err(format!("LogicalAnd needs bool operands, got {}", arg.dtype));
                }
            }
            TensorInfo::new(ElemType::Bool, broadcast(&args[0].shape, &args[1].shape)?)
        }
        OpKind::Select => {
            expect_arity(op, args, 3)?;
            let (cond, x, y) = (&args[0], &args[1], &args[2]);
            if cond.dtype != ElemType::Bool {
                return Err(format!("Select condition must be bool, got {}", cond.dtype));
            }
            if x.dtype != y.dtype {
                return Err(format!(
                    "Select branches have different types: {} vs {}",
                    x.dtype, y.dtype
                ));
            }
            let shape = broadcast(&broadcast(&cond.shape, &x.shape)?, &y.shape)?;
            TensorInfo::new(x.dtype, shape)
        }
        OpKind::IsFinite => {
            expect_arity(op, args, 1)?;
            if !args[0].dtype.is_numeric() {
                return Err(format!("IsFinite needs a numeric operand, got {}", args[0].dtype));
            }
            TensorInfo::new(ElemType::Bool, args[0].shape.clone())
        }
        OpKind::Split { parts } => {
            expect_arity(op, args, 1)?;
            return split_outputs(&args[0], *parts).map(Some);
        }
    };
    Ok(Some(vec![info]))
}

fn expect_arity(op: &OpKind, args: &[TensorInfo], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!("{} takes {} inputs, got {}", op.name(), n, args.len()));
    }
    Ok(())
}

fn split_outputs(input: &TensorInfo, parts: usize) -> Result<Vec<TensorInfo>, String> {
    if parts == 0 {
        return Err("Split needs at least one part".into());
    }
    let shape = match &input.shape {
        Shape::Unknown => Shape::Unknown,
        Shape::Ranked(dims) => {
            let Some(first) = dims.first() else {
                return Err("cannot split a scalar".into());
            };
            let head = match first {
                Dim::Fixed(n) if n % parts as u64 != 0 => {
                    return Err(format!("dimension {n} is not divisible into {parts} parts"));
                }
                Dim::Fixed(n) => Dim::Fixed(n / parts as u64),
                Dim::Dynamic => Dim::Dynamic,
            };
            let mut out = vec![head];
            out.extend_from_slice(&dims[1..]);
            Shape::Ranked(out)
        }
    };
    Ok(vec![TensorInfo::new(input.dtype, shape); parts])
}

/// Numpy-style broadcast of two declared shapes.
pub fn broadcast(a: &Shape, b: &Shape) -> Result<Shape, String> {
    let (Shape::Ranked(a_dims), Shape::Ranked(b_dims)) = (a, b) else {
        return Ok(Shape::Unknown);
    };
    let rank = a_dims.len().max(b_dims.len());
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let x = dim_from_right(a_dims, rank, i);
        let y = dim_from_right(b_dims, rank, i);
        let d = match (x, y) {
            (Dim::Fixed(1), other) | (other, Dim::Fixed(1)) => other,
            (Dim::Fixed(p), Dim::Fixed(q)) if p == q => Dim::Fixed(p),
            (Dim::Fixed(p), Dim::Fixed(q)) => {
                return Err(format!("shapes {a} and {b} do not broadcast ({p} vs {q})"));
            }
            (Dim::Fixed(n), Dim::Dynamic) | (Dim::Dynamic, Dim::Fixed(n)) => Dim::Fixed(n),
            (Dim::Dynamic, Dim::Dynamic) => Dim::Dynamic,
        };
        out.push(d);
    }
    Ok(Shape::Ranked(out))
}

fn dim_from_right(dims: &[Dim], rank: usize, i: usize) -> Dim {
    let offset = rank - dims.len();
    if i < offset {
        Dim::Fixed(1)
    } else {
        dims[i - offset]
    }
}
