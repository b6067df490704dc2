// tensor.rs — Element types and concrete tensor values
//
// `ElemType` is the closed set of element types an override can name.
// `Tensor` is a dense row-major value used for frozen constants, engine
// feeds, and engine results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Scalar;

// ── Element type ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl ElemType {
    /// Parse a short type token (`f32`, `i32`, `bool`, ...).
    pub fn from_token(token: &str) -> Option<ElemType> {
        match token {
            "f32" | "fp32" | "float" | "float32" => Some(ElemType::F32),
            "f64" | "fp64" | "double" | "float64" => Some(ElemType::F64),
            "i32" | "int32" => Some(ElemType::I32),
            "i64" | "int64" => Some(ElemType::I64),
            "bool" | "boolean" => Some(ElemType::Bool),
            _ => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemType::F32 | ElemType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ElemType::I32 | ElemType::I64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_float() || self.is_integer()
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
            ElemType::I32 => "i32",
            ElemType::I64 => "i64",
            ElemType::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

// ── Tensor ──────────────────────────────────────────────────────────────────

/// Typed element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn elem_type(&self) -> ElemType {
        match self {
            TensorData::F32(_) => ElemType::F32,
            TensorData::F64(_) => ElemType::F64,
            TensorData::I32(_) => ElemType::I32,
            TensorData::I64(_) => ElemType::I64,
            TensorData::Bool(_) => ElemType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

/// Element count does not match the shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShapeError {
    pub shape: Vec<usize>,
    pub len: usize,
}

impl fmt::Display for TensorShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match checked_element_count(&self.shape) {
            Some(n) => write!(f, "shape {:?} holds {} elements, got {}", self.shape, n, self.len),
            None => write!(f, "shape {:?} is too large, got {} elements", self.shape, self.len),
        }
    }
}

impl std::error::Error for TensorShapeError {}

/// Product of dims; the empty shape holds one element.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// `element_count`, or `None` when the product overflows.
pub fn checked_element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Tensor, TensorShapeError> {
        if checked_element_count(&shape) != Some(data.len()) {
            return Err(TensorShapeError {
                len: data.len(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    pub fn f32(shape: Vec<usize>, values: Vec<f32>) -> Result<Tensor, TensorShapeError> {
        Tensor::new(shape, TensorData::F32(values))
    }

    pub fn i32(shape: Vec<usize>, values: Vec<i32>) -> Result<Tensor, TensorShapeError> {
        Tensor::new(shape, TensorData::I32(values))
    }

    pub fn bool(shape: Vec<usize>, values: Vec<bool>) -> Result<Tensor, TensorShapeError> {
        Tensor::new(shape, TensorData::Bool(values))
    }

    pub fn elem_type(&self) -> ElemType {
        self.data.elem_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Build a tensor from already-coerced literal scalars.
    ///
    /// Callers validate coercibility first (see `validate::check_coercion`);
    /// a scalar that does not fit the element type is converted with `as`
    /// semantics rather than rejected here.
    pub fn from_scalars(
        elem: ElemType,
        shape: Vec<usize>,
        scalars: &[Scalar],
    ) -> Result<Tensor, TensorShapeError> {
        let data = match elem {
            ElemType::F32 => TensorData::F32(scalars.iter().map(|s| scalar_f64(s) as f32).collect()),
            ElemType::F64 => TensorData::F64(scalars.iter().map(scalar_f64).collect()),
            ElemType::I32 => TensorData::I32(scalars.iter().map(|s| scalar_i64(s) as i32).collect()),
            ElemType::I64 => TensorData::I64(scalars.iter().map(scalar_i64).collect()),
            ElemType::Bool => TensorData::Bool(scalars.iter().map(scalar_bool).collect()),
        };
        Tensor::new(shape, data)
    }

    /// Values widened to f64, for numeric comparison in tests and reports.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(v) => v.iter().map(|x| *x as f64).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|x| *x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|x| *x as f64).collect(),
            TensorData::Bool(v) => v.iter().map(|x| if *x { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Element-wise closeness with numpy `allclose` default tolerances.
    pub fn allclose(&self, expected: &[f64]) -> bool {
        let actual = self.to_f64_vec();
        actual.len() == expected.len()
            && actual
                .iter()
                .zip(expected)
                .all(|(a, b)| (a - b).abs() <= 1e-8 + 1e-5 * b.abs())
    }
}

fn scalar_f64(s: &Scalar) -> f64 {
    match s {
        Scalar::Int(v) => *v as f64,
        Scalar::Float(v) => *v,
        Scalar::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn scalar_i64(s: &Scalar) -> i64 {
    match s {
        Scalar::Int(v) => *v,
        Scalar::Float(v) => *v as i64,
        Scalar::Bool(b) => *b as i64,
    }
}

fn scalar_bool(s: &Scalar) -> bool {
    match s {
        Scalar::Bool(b) => *b,
        Scalar::Int(v) => *v != 0,
        Scalar::Float(v) => *v != 0.0,
    }
}
