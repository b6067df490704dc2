// engine.rs — Execution seam and reference interpreter
//
// `InferenceEngine` is the boundary to whatever runs a finalized graph.
// `ReferenceEngine` evaluates the supported operator set directly on host
// tensors so that resolution results can be checked numerically.
//
// Preconditions: `graph` has been propagated (output metadata is current).
// Postconditions: one tensor per graph output, keyed by tensor name.
// Failure modes: missing/unexpected/mismatched feeds, kernel errors.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::graph::{Graph, OpKind, TensorInfo};
use crate::tensor::{element_count, Tensor, TensorData};

/// Runs a finalized graph.
pub trait InferenceEngine {
    /// Evaluate `graph` with `feeds` keyed by input name. Returns graph
    /// outputs keyed by tensor name (`node` or `node:slot`).
    fn infer(
        &self,
        graph: &Graph,
        feeds: &BTreeMap<String, Tensor>,
    ) -> Result<BTreeMap<String, Tensor>, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    MissingFeed(String),
    UnexpectedFeed(String),
    FeedMismatch {
        name: String,
        expected: TensorInfo,
        found: TensorInfo,
    },
    Kernel { node: String, message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MissingFeed(name) => write!(f, "no value fed for input '{name}'"),
            EngineError::UnexpectedFeed(name) => {
                write!(f, "'{name}' is not an input of the graph")
            }
            EngineError::FeedMismatch {
                name,
                expected,
                found,
            } => write!(f, "input '{name}' expects {expected}, got {found}"),
            EngineError::Kernel { node, message } => write!(f, "node '{node}': {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Host interpreter for the operator set of `OpKind`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceEngine;

impl InferenceEngine for ReferenceEngine {
    fn infer(
        &self,
        graph: &Graph,
        feeds: &BTreeMap<String, Tensor>,
    ) -> Result<BTreeMap<String, Tensor>, EngineError> {
        for name in feeds.keys() {
            let is_input = graph
                .find(name)
                .is_some_and(|id| graph.node(id).op.is_placeholder());
            if !is_input {
                return Err(EngineError::UnexpectedFeed(name.clone()));
            }
        }

        let mut values: Vec<Option<Vec<Tensor>>> = vec![None; graph.len()];
        for id in graph.topo_order() {
            let node = graph.node(id);
            let kernel_err = |message: String| EngineError::Kernel {
                node: node.name.clone(),
                message,
            };
            let mut args = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                let tensor = values[input.node.index()]
                    .as_ref()
                    .and_then(|outs| outs.get(input.slot as usize))
                    .ok_or_else(|| kernel_err("input evaluated out of order".into()))?;
                args.push(tensor);
            }
            let outputs = match &node.op {
                OpKind::Placeholder => {
                    let fed = feeds
                        .get(&node.name)
                        .ok_or_else(|| EngineError::MissingFeed(node.name.clone()))?;
                    check_feed(&node.name, &node.outputs[0], fed)?;
                    vec![fed.clone()]
                }
                op => eval(op, &args).map_err(kernel_err)?,
            };
            values[id.index()] = Some(outputs);
        }

        let mut results = BTreeMap::new();
        for output in graph.outputs() {
            let tensor = values[output.node.index()]
                .as_ref()
                .and_then(|outs| outs.get(output.slot as usize))
                .ok_or_else(|| EngineError::Kernel {
                    node: graph.tensor_name(*output),
                    message: "output was not evaluated".into(),
                })?;
            results.insert(graph.tensor_name(*output), tensor.clone());
        }
        Ok(results)
    }
}

fn check_feed(name: &str, declared: &TensorInfo, fed: &Tensor) -> Result<(), EngineError> {
    if fed.elem_type() != declared.dtype || !declared.shape.accepts(&fed.shape) {
        return Err(EngineError::FeedMismatch {
            name: name.to_string(),
            expected: declared.clone(),
            found: TensorInfo::of_tensor(fed),
        });
    }
    Ok(())
}

// ── Kernels ─────────────────────────────────────────────────────────────────

fn eval(op: &OpKind, args: &[&Tensor]) -> Result<Vec<Tensor>, String> {
    let out = match (op, args) {
        (OpKind::Const(value), []) => value.clone(),
        (OpKind::Identity, [x]) => (*x).clone(),
        (OpKind::Add, [a, b]) => arith(a, b, Arith::Add)?,
        (OpKind::Sub, [a, b]) => arith(a, b, Arith::Sub)?,
        (OpKind::Mul, [a, b]) => arith(a, b, Arith::Mul)?,
        (OpKind::LogicalAnd, [a, b]) => match (&a.data, &b.data) {
            (TensorData::Bool(x), TensorData::Bool(y)) => {
                let (shape, v) = zip_broadcast(x, &a.shape, y, &b.shape, |p: bool, q: bool| p && q)?;
                tensor(shape, TensorData::Bool(v))?
            }
            _ => return Err("LogicalAnd needs bool operands".into()),
        },
        (OpKind::Select, [c, x, y]) => select(c, x, y)?,
        (OpKind::IsFinite, [x]) => {
            let v = match &x.data {
                TensorData::F32(v) => v.iter().map(|e| e.is_finite()).collect(),
                TensorData::F64(v) => v.iter().map(|e| e.is_finite()).collect(),
                TensorData::I32(_) | TensorData::I64(_) => vec![true; x.len()],
                TensorData::Bool(_) => return Err("IsFinite needs a numeric operand".into()),
            };
            tensor(x.shape.clone(), TensorData::Bool(v))?
        }
        (OpKind::Split { parts }, [x]) => return split(x, *parts),
        (op, args) => {
            return Err(format!("{} cannot take {} inputs", op.name(), args.len()));
        }
    };
    Ok(vec![out])
}

fn tensor(shape: Vec<usize>, data: TensorData) -> Result<Tensor, String> {
    Tensor::new(shape, data).map_err(|e| e.to_string())
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
}

macro_rules! arith_kernel {
    ($x:expr, $xs:expr, $y:expr, $ys:expr, $op:expr, $add:expr, $sub:expr, $mul:expr) => {
        match $op {
            Arith::Add => zip_broadcast($x, $xs, $y, $ys, $add),
            Arith::Sub => zip_broadcast($x, $xs, $y, $ys, $sub),
            Arith::Mul => zip_broadcast($x, $xs, $y, $ys, $mul),
        }
    };
}

/// Elementwise arithmetic; integer kinds wrap on overflow.
fn arith(a: &Tensor, b: &Tensor, op: Arith) -> Result<Tensor, String> {
    let (shape, data) = match (&a.data, &b.data) {
        (TensorData::F32(x), TensorData::F32(y)) => {
            let (s, v) = arith_kernel!(
                x,
                &a.shape,
                y,
                &b.shape,
                op,
                |p: f32, q: f32| p + q,
                |p: f32, q: f32| p - q,
                |p: f32, q: f32| p * q
            )?;
            (s, TensorData::F32(v))
        }
        (TensorData::F64(x), TensorData::F64(y)) => {
            let (s, v) = arith_kernel!(
                x,
                &a.shape,
                y,
                &b.shape,
                op,
                |p: f64, q: f64| p + q,
                |p: f64, q: f64| p - q,
                |p: f64, q: f64| p * q
            )?;
            (s, TensorData::F64(v))
        }
        (TensorData::I32(x), TensorData::I32(y)) => {
            let (s, v) = arith_kernel!(
                x,
                &a.shape,
                y,
                &b.shape,
                op,
                i32::wrapping_add,
                i32::wrapping_sub,
                i32::wrapping_mul
            )?;
            (s, TensorData::I32(v))
        }
        (TensorData::I64(x), TensorData::I64(y)) => {
            let (s, v) = arith_kernel!(
                x,
                &a.shape,
                y,
                &b.shape,
                op,
                i64::wrapping_add,
                i64::wrapping_sub,
                i64::wrapping_mul
            )?;
            (s, TensorData::I64(v))
        }
        _ => {
            return Err(format!(
                "operand types differ or are not numeric: {} and {}",
                a.elem_type(),
                b.elem_type()
            ))
        }
    };
    tensor(shape, data)
}

fn select(c: &Tensor, x: &Tensor, y: &Tensor) -> Result<Tensor, String> {
    let TensorData::Bool(cond) = &c.data else {
        return Err(format!("Select condition must be bool, got {}", c.elem_type()));
    };
    let shape = broadcast_shape(&broadcast_shape(&c.shape, &x.shape)?, &y.shape)?;
    let pick = |i: usize| cond[source_index(i, &shape, &c.shape)];
    let xi = |i: usize| source_index(i, &shape, &x.shape);
    let yi = |i: usize| source_index(i, &shape, &y.shape);
    let n = element_count(&shape);
    let data = match (&x.data, &y.data) {
        (TensorData::F32(p), TensorData::F32(q)) => {
            TensorData::F32((0..n).map(|i| if pick(i) { p[xi(i)] } else { q[yi(i)] }).collect())
        }
        (TensorData::F64(p), TensorData::F64(q)) => {
            TensorData::F64((0..n).map(|i| if pick(i) { p[xi(i)] } else { q[yi(i)] }).collect())
        }
        (TensorData::I32(p), TensorData::I32(q)) => {
            TensorData::I32((0..n).map(|i| if pick(i) { p[xi(i)] } else { q[yi(i)] }).collect())
        }
        (TensorData::I64(p), TensorData::I64(q)) => {
            TensorData::I64((0..n).map(|i| if pick(i) { p[xi(i)] } else { q[yi(i)] }).collect())
        }
        (TensorData::Bool(p), TensorData::Bool(q)) => {
            TensorData::Bool((0..n).map(|i| if pick(i) { p[xi(i)] } else { q[yi(i)] }).collect())
        }
        _ => {
            return Err(format!(
                "Select branches have different types: {} vs {}",
                x.elem_type(),
                y.elem_type()
            ))
        }
    };
    tensor(shape, data)
}

fn split(x: &Tensor, parts: usize) -> Result<Vec<Tensor>, String> {
    let Some(&lead) = x.shape.first() else {
        return Err("cannot split a scalar".into());
    };
    if parts == 0 || lead % parts != 0 {
        return Err(format!("dimension {lead} is not divisible into {parts} parts"));
    }
    let mut shape = x.shape.clone();
    shape[0] = lead / parts;
    let chunk = element_count(&shape);
    let pieces = |i: usize| i * chunk..(i + 1) * chunk;
    (0..parts)
        .map(|i| {
            let data = match &x.data {
                TensorData::F32(v) => TensorData::F32(v[pieces(i)].to_vec()),
                TensorData::F64(v) => TensorData::F64(v[pieces(i)].to_vec()),
                TensorData::I32(v) => TensorData::I32(v[pieces(i)].to_vec()),
                TensorData::I64(v) => TensorData::I64(v[pieces(i)].to_vec()),
                TensorData::Bool(v) => TensorData::Bool(v[pieces(i)].to_vec()),
            };
            tensor(shape.clone(), data)
        })
        .collect()
}

// ── Broadcasting ────────────────────────────────────────────────────────────

fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, String> {
    let rank = a.len().max(b.len());
    let pad = |s: &[usize], i: usize| {
        let offset = rank - s.len();
        if i < offset {
            1
        } else {
            s[i - offset]
        }
    };
    (0..rank)
        .map(|i| match (pad(a, i), pad(b, i)) {
            (1, d) | (d, 1) => Ok(d),
            (p, q) if p == q => Ok(p),
            (p, q) => Err(format!("shapes {a:?} and {b:?} do not broadcast ({p} vs {q})")),
        })
        .collect()
}

/// Flat index into a source of shape `src` for flat output index `flat`.
fn source_index(flat: usize, out: &[usize], src: &[usize]) -> usize {
    let offset = out.len() - src.len();
    let mut rem = flat;
    let mut index = 0;
    let mut stride = 1;
    for axis in (0..out.len()).rev() {
        let coord = rem % out[axis];
        rem /= out[axis];
        if axis >= offset {
            let dim = src[axis - offset];
            if dim != 1 {
                index += coord * stride;
            }
            stride *= dim;
        }
    }
    index
}

fn zip_broadcast<T: Copy, U>(
    x: &[T],
    x_shape: &[usize],
    y: &[T],
    y_shape: &[usize],
    f: impl Fn(T, T) -> U,
) -> Result<(Vec<usize>, Vec<U>), String> {
    let shape = broadcast_shape(x_shape, y_shape)?;
    let n = element_count(&shape);
    let out = (0..n)
        .map(|i| f(x[source_index(i, &shape, x_shape)], y[source_index(i, &shape, y_shape)]))
        .collect();
    Ok((shape, out))
}
