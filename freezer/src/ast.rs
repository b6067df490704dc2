// ast.rs — Syntax tree for input override text
//
// Mirrors the override grammar: `name[shape]{type}->value`, comma separated.
// Every node carries a `SimpleSpan` into the override text so later phases
// can point diagnostics at the offending entry.
//
// Preconditions: produced by the parser from a lexed override string.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use chumsky::span::SimpleSpan;

use crate::tensor::ElemType;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Target ──

/// The tensor an override refers to: a node name plus an optional output
/// index (`add:0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetName {
    pub node: String,
    pub output: Option<u32>,
    pub span: Span,
}

impl TargetName {
    /// The text as the user spelled it.
    pub fn spelled(&self) -> String {
        match self.output {
            Some(slot) => format!("{}:{}", self.node, slot),
            None => self.node.clone(),
        }
    }

    /// Normalized identity used for duplicate detection: `in1` and `in1:0`
    /// name the same tensor.
    pub fn key(&self) -> (String, u32) {
        (self.node.clone(), self.output.unwrap_or(0))
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spelled())
    }
}

// ── Shape ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimSpec {
    /// A concrete dimension as written; negative values other than `-1`
    /// are rejected by validation.
    Fixed(i64),
    /// `?` or `-1`.
    Dynamic,
}

/// A bracketed shape override. An empty dim list is a scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSpec {
    pub dims: Vec<DimSpec>,
    pub span: Span,
}

impl fmt::Display for ShapeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match d {
                DimSpec::Fixed(n) => write!(f, "{n}")?,
                DimSpec::Dynamic => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

/// A `{type}` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    pub elem: ElemType,
    pub span: Span,
}

// ── Literal values ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v:?}"),
            Scalar::Bool(true) => write!(f, "True"),
            Scalar::Bool(false) => write!(f, "False"),
        }
    }
}

/// A literal value: a bare scalar or a (possibly nested) bracketed list.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Scalar(Scalar, Span),
    List(Vec<Literal>, Span),
}

impl Literal {
    pub fn span(&self) -> Span {
        match self {
            Literal::Scalar(_, span) | Literal::List(_, span) => *span,
        }
    }

    /// All scalars in row-major order.
    pub fn flatten(&self) -> Vec<Scalar> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Scalar>) {
        match self {
            Literal::Scalar(s, _) => out.push(*s),
            Literal::List(items, _) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    pub fn is_bare_scalar(&self) -> bool {
        matches!(self, Literal::Scalar(..))
    }

    /// Shape implied by the bracket nesting, or `None` for ragged lists
    /// (e.g. `[[1 2] [3]]`) and lists mixing scalars with sublists.
    pub fn natural_shape(&self) -> Option<Vec<usize>> {
        match self {
            Literal::Scalar(..) => Some(Vec::new()),
            Literal::List(items, _) => {
                let mut inner: Option<Vec<usize>> = None;
                for item in items {
                    let shape = item.natural_shape()?;
                    match &inner {
                        None => inner = Some(shape),
                        Some(prev) if *prev == shape => {}
                        Some(_) => return None,
                    }
                }
                let mut shape = vec![items.len()];
                shape.extend(inner.unwrap_or_default());
                Some(shape)
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Scalar(s, _) => write!(f, "{s}"),
            Literal::List(items, _) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Override entry ──

/// One `name[shape]{type}->value` entry. Immutable after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideSpec {
    pub target: TargetName,
    pub shape: Option<ShapeSpec>,
    pub elem_type: Option<TypeSpec>,
    pub value: Option<Literal>,
    pub span: Span,
}

impl fmt::Display for OverrideSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(shape) = &self.shape {
            write!(f, "{shape}")?;
        }
        if let Some(ty) = &self.elem_type {
            write!(f, "{{{}}}", ty.elem)?;
        }
        if let Some(value) = &self.value {
            write!(f, "->{value}")?;
        }
        Ok(())
    }
}
