// reconcile.rs — Type/shape/value reconciliation of overrides against a graph
//
// Produces one `ResolvedInput` per declared placeholder (graph order) and one
// per cut point (override order). Omitted fields are inferred:
//
//   type:  explicit > all-boolean literal → bool > declared > f32
//   shape: explicit (dynamic dims filled from the value) > inferred from the
//          value and the declared shape > declared
//
// Preconditions: `overrides` come from the parser; `graph` is the original,
//                read-only graph.
// Postconditions: every override target is located and fully typed/shaped.
// Failure modes: DuplicateOverride, InvalidShape, UnknownInput,
//                ShapeMismatch, TypeCoercion. Cut metadata disagreement is a
//                warning, not an error.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{DimSpec, Literal, OverrideSpec, Scalar, ShapeSpec, Span};
use crate::diag::{codes, Diagnostic};
use crate::error::{ErrorKind, FreezeError, Result};
use crate::graph::{Dim, Graph, NodeId, Shape, TensorRef};
use crate::tensor::{ElemType, Tensor};
use crate::validate;

// ── Public types ────────────────────────────────────────────────────────────

/// How a resolved input is realized in the spliced graph.
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    /// Declared placeholder, unchanged.
    PassThrough,
    /// Declared placeholder with a new name, type, or shape.
    Renamed { original: String },
    /// Replaced by a literal constant; no longer a graph input.
    Constant(Tensor),
    /// New placeholder injected at an internal tensor.
    CutInjected { producer: String, slot: u32 },
}

impl InputMode {
    pub fn label(&self) -> &'static str {
        match self {
            InputMode::PassThrough => "pass-through",
            InputMode::Renamed { .. } => "renamed",
            InputMode::Constant(_) => "constant",
            InputMode::CutInjected { .. } => "cut",
        }
    }
}

/// A reconciled input, ready for splicing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    /// Name of the input (or constant) in the spliced graph.
    pub name: String,
    /// The tensor in the original graph this input stands for.
    pub target: TensorRef,
    pub dtype: ElemType,
    pub shape: Shape,
    pub mode: InputMode,
    /// Span of the override entry, when one exists.
    pub span: Option<Span>,
}

impl ResolvedInput {
    /// Whether `target` is an internal tensor rather than a placeholder.
    pub fn is_cut(&self, graph: &Graph) -> bool {
        !graph.node(self.target.node).op.is_placeholder()
    }
}

impl fmt::Display for ResolvedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}{}", self.name, self.mode.label(), self.dtype, self.shape)?;
        match &self.mode {
            InputMode::Renamed { original } => write!(f, " (was {original})"),
            InputMode::CutInjected { producer, slot } => write!(f, " (at {producer}:{slot})"),
            InputMode::PassThrough | InputMode::Constant(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub inputs: Vec<ResolvedInput>,
    pub warnings: Vec<Diagnostic>,
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn reconcile(overrides: &[OverrideSpec], graph: &Graph) -> Result<Resolution> {
    validate::check_duplicates(overrides)?;
    validate::check_shape_dims(overrides)?;

    let mut on_placeholder: HashMap<NodeId, &OverrideSpec> = HashMap::new();
    let mut cuts: Vec<(&OverrideSpec, TensorRef)> = Vec::new();
    let mut located: HashMap<TensorRef, &OverrideSpec> = HashMap::new();
    for o in overrides {
        let tensor = locate(graph, o)?;
        if let Some(first) = located.insert(tensor, o) {
            return Err(FreezeError::new(
                ErrorKind::DuplicateOverride,
                format!(
                    "'{}' and '{}' name the same tensor",
                    first.target.spelled(),
                    o.target.spelled()
                ),
            )
            .with_target(o.target.spelled())
            .with_span(o.span));
        }
        if graph.node(tensor.node).op.is_placeholder() {
            on_placeholder.insert(tensor.node, o);
        } else {
            cuts.push((o, tensor));
        }
    }

    let mut inputs = Vec::new();
    let mut warnings = Vec::new();
    for node in graph.placeholders() {
        let target = TensorRef::new(node.id, 0);
        let declared = &node.outputs[0];
        let resolved = match on_placeholder.get(&node.id) {
            None => ResolvedInput {
                name: node.name.clone(),
                target,
                dtype: declared.dtype,
                shape: declared.shape.clone(),
                mode: InputMode::PassThrough,
                span: None,
            },
            Some(o) => resolve_placeholder(o, &node.name, target, declared.dtype, &declared.shape)?,
        };
        inputs.push(resolved);
    }
    for (o, target) in cuts {
        inputs.push(resolve_cut(o, graph, target, &mut warnings)?);
    }

    Ok(Resolution { inputs, warnings })
}

fn locate(graph: &Graph, o: &OverrideSpec) -> Result<TensorRef> {
    let spelled = o.target.spelled();
    graph.lookup_tensor(&spelled).ok_or_else(|| {
        let known: Vec<String> = graph.placeholders().map(|n| n.name.clone()).collect();
        FreezeError::new(
            ErrorKind::UnknownInput,
            format!(
                "no placeholder or node output named '{}' (declared inputs: {})",
                spelled,
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            ),
        )
        .with_target(spelled.clone())
        .with_span(o.target.span)
    })
}

// ── Placeholders ────────────────────────────────────────────────────────────

fn resolve_placeholder(
    o: &OverrideSpec,
    node_name: &str,
    target: TensorRef,
    declared_type: ElemType,
    declared_shape: &Shape,
) -> Result<ResolvedInput> {
    let dtype = resolve_type(o, Some(declared_type));
    if let Some(value) = &o.value {
        let tensor = build_constant(o, value, dtype, declared_shape)?;
        return Ok(ResolvedInput {
            name: node_name.to_string(),
            target,
            dtype,
            shape: Shape::from_concrete(&tensor.shape),
            mode: InputMode::Constant(tensor),
            span: Some(o.span),
        });
    }

    let shape = match &o.shape {
        Some(spec) => shape_from_spec(spec),
        None => declared_shape.clone(),
    };
    let name = o.target.spelled();
    let mode = if name != node_name || dtype != declared_type || shape != *declared_shape {
        InputMode::Renamed {
            original: node_name.to_string(),
        }
    } else {
        InputMode::PassThrough
    };
    Ok(ResolvedInput {
        name,
        target,
        dtype,
        shape,
        mode,
        span: Some(o.span),
    })
}

// ── Cut points ──────────────────────────────────────────────────────────────

fn resolve_cut(
    o: &OverrideSpec,
    graph: &Graph,
    target: TensorRef,
    warnings: &mut Vec<Diagnostic>,
) -> Result<ResolvedInput> {
    let producer = graph.node(target.node);
    let produced = &producer.outputs[target.slot as usize];
    let name = o.target.spelled();

    if let Some(t) = o.elem_type {
        if t.elem != produced.dtype {
            warnings.push(
                Diagnostic::warning(format!(
                    "cut '{}' overrides type {} of '{}' with {}",
                    name, produced.dtype, producer.name, t.elem
                ))
                .with_code(codes::CUT_METADATA_MISMATCH)
                .with_span(t.span),
            );
        }
    }
    if let Some(spec) = &o.shape {
        let shape = shape_from_spec(spec);
        if !shape.is_compatible(&produced.shape) {
            warnings.push(
                Diagnostic::warning(format!(
                    "cut '{}' overrides shape {} of '{}' with {}",
                    name, produced.shape, producer.name, shape
                ))
                .with_code(codes::CUT_METADATA_MISMATCH)
                .with_span(spec.span),
            );
        }
    }

    let dtype = resolve_type(o, Some(produced.dtype));
    if let Some(value) = &o.value {
        let tensor = build_constant(o, value, dtype, &produced.shape)?;
        return Ok(ResolvedInput {
            name,
            target,
            dtype,
            shape: Shape::from_concrete(&tensor.shape),
            mode: InputMode::Constant(tensor),
            span: Some(o.span),
        });
    }

    let shape = match &o.shape {
        Some(spec) => shape_from_spec(spec),
        None => produced.shape.clone(),
    };
    Ok(ResolvedInput {
        name,
        target,
        dtype,
        shape,
        mode: InputMode::CutInjected {
            producer: producer.name.clone(),
            slot: target.slot,
        },
        span: Some(o.span),
    })
}

// ── Inference rules ─────────────────────────────────────────────────────────

fn resolve_type(o: &OverrideSpec, declared: Option<ElemType>) -> ElemType {
    if let Some(t) = o.elem_type {
        return t.elem;
    }
    if let Some(value) = &o.value {
        let scalars = value.flatten();
        if !scalars.is_empty() && scalars.iter().all(|s| matches!(s, Scalar::Bool(_))) {
            return ElemType::Bool;
        }
    }
    declared.unwrap_or(ElemType::F32)
}

pub fn shape_from_spec(spec: &ShapeSpec) -> Shape {
    Shape::Ranked(
        spec.dims
            .iter()
            .map(|d| match d {
                DimSpec::Fixed(n) => Dim::Fixed((*n).max(0) as u64),
                DimSpec::Dynamic => Dim::Dynamic,
            })
            .collect(),
    )
}

fn build_constant(
    o: &OverrideSpec,
    value: &Literal,
    dtype: ElemType,
    declared: &Shape,
) -> Result<Tensor> {
    let scalars = value.flatten();
    validate::check_coercion(o, dtype, &scalars)?;
    let shape = value_shape(o, value, declared)?;
    Tensor::from_scalars(dtype, shape, &scalars).map_err(|e| {
        FreezeError::new(ErrorKind::ShapeMismatch, e.to_string())
            .with_target(o.target.spelled())
            .with_span(value.span())
    })
}

/// Concrete shape of a literal value.
fn value_shape(o: &OverrideSpec, value: &Literal, declared: &Shape) -> Result<Vec<usize>> {
    let mismatch = |message: String| {
        FreezeError::new(ErrorKind::ShapeMismatch, message)
            .with_target(o.target.spelled())
            .with_span(value.span())
    };
    let natural = value
        .natural_shape()
        .ok_or_else(|| mismatch(format!("ragged literal {value}")))?;
    let count: usize = natural.iter().product();

    if let Some(spec) = &o.shape {
        let explicit = shape_from_spec(spec);
        let dims = explicit.dims().unwrap_or(&[]);
        return fill_dynamic(dims, count).ok_or_else(|| {
            mismatch(format!(
                "value has {} elements (shape {}) but shape {} was given",
                count,
                Shape::from_concrete(&natural),
                explicit
            ))
        });
    }

    if value.is_bare_scalar() {
        return Ok(Vec::new());
    }

    let inferred = match declared {
        Shape::Unknown => Some(vec![count]),
        Shape::Ranked(dims) => match dims.len() {
            0 => (count == 1).then(Vec::new),
            1 => (natural.len() == 1 && Shape::Ranked(dims.clone()).accepts(&[count]))
                .then(|| vec![count]),
            rank if natural.len() == rank => declared.accepts(&natural).then(|| natural.clone()),
            _ if natural.len() == 1 => fill_dynamic(dims, count),
            _ => None,
        },
    };
    inferred.ok_or_else(|| {
        mismatch(format!(
            "value has {} elements (shape {}) which does not fit declared shape {}",
            count,
            Shape::from_concrete(&natural),
            declared
        ))
    })
}

/// Concrete dims for `count` elements: fixed dims must multiply to `count`,
/// a single dynamic dim absorbs the remainder. `None` also covers dims whose
/// product overflows.
fn fill_dynamic(dims: &[Dim], count: usize) -> Option<Vec<usize>> {
    let fixed = |d: &Dim| match d {
        Dim::Fixed(n) => usize::try_from(*n).ok(),
        Dim::Dynamic => Some(1),
    };
    let known = dims
        .iter()
        .try_fold(1usize, |acc, d| fixed(d).and_then(|n| acc.checked_mul(n)))?;
    let fill = match dims.iter().filter(|d| matches!(d, Dim::Dynamic)).count() {
        0 if known == count => 0,
        1 if known > 0 && count % known == 0 => count / known,
        _ => return None,
    };
    dims.iter()
        .map(|d| match d {
            Dim::Fixed(_) => fixed(d),
            Dim::Dynamic => Some(fill),
        })
        .collect()
}
