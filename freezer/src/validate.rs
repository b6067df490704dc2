// validate.rs — Pre-splice checks on parsed overrides
//
// All checks run before any graph is touched. Each failure maps to its own
// error kind: duplicates → DuplicateOverride, bad dims → InvalidShape,
// uncoercible literals → TypeCoercion.

use std::collections::HashMap;

use crate::ast::{DimSpec, OverrideSpec, Scalar};
use crate::error::{ErrorKind, FreezeError, Result};
use crate::tensor::ElemType;

/// Reject two entries naming the same tensor (`in1` ≡ `in1:0`).
pub fn check_duplicates(overrides: &[OverrideSpec]) -> Result<()> {
    let mut seen: HashMap<(String, u32), &OverrideSpec> = HashMap::new();
    for o in overrides {
        if let Some(first) = seen.insert(o.target.key(), o) {
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
    }
    Ok(())
}

/// Reject negative dims (other than the dynamic marker), zero-sized
/// non-leading dims, and fixed dims whose product does not fit in `usize`.
pub fn check_shape_dims(overrides: &[OverrideSpec]) -> Result<()> {
    for o in overrides {
        let Some(shape) = &o.shape else { continue };
        let mut elements: Option<usize> = Some(1);
        for (i, dim) in shape.dims.iter().enumerate() {
            let DimSpec::Fixed(n) = *dim else { continue };
            let problem = if n < 0 {
                Some(format!("negative dimension {n} in {shape}"))
            } else if n == 0 && i > 0 {
                Some(format!("zero-sized dimension at position {i} in {shape}"))
            } else {
                elements = elements
                    .zip(usize::try_from(n).ok())
                    .and_then(|(acc, n)| acc.checked_mul(n));
                elements
                    .is_none()
                    .then(|| format!("shape {shape} has too many elements"))
            };
            if let Some(message) = problem {
                return Err(FreezeError::new(ErrorKind::InvalidShape, message)
                    .with_target(o.target.spelled())
                    .with_span(shape.span));
            }
        }
    }
    Ok(())
}

/// Every literal scalar must be representable in the resolved type.
pub fn check_coercion(o: &OverrideSpec, dtype: ElemType, scalars: &[Scalar]) -> Result<()> {
    for scalar in scalars {
        if let Err(reason) = coerce(*scalar, dtype) {
            let span = o.value.as_ref().map(|v| v.span()).unwrap_or(o.span);
            return Err(FreezeError::new(
                ErrorKind::TypeCoercion,
                format!("literal {scalar} cannot be used as {dtype}: {reason}"),
            )
            .with_target(o.target.spelled())
            .with_span(span));
        }
    }
    Ok(())
}

fn coerce(scalar: Scalar, dtype: ElemType) -> std::result::Result<(), &'static str> {
    match (dtype, scalar) {
        (ElemType::Bool, Scalar::Bool(_)) => Ok(()),
        (ElemType::Bool, _) => Err("expected True or False"),
        (_, Scalar::Bool(_)) => Err("boolean literal for a numeric type"),
        (ElemType::F32 | ElemType::F64, _) => Ok(()),
        (ElemType::I32 | ElemType::I64, Scalar::Float(v)) if v.fract() != 0.0 || !v.is_finite() => {
            Err("not an integer")
        }
        (ElemType::I32, Scalar::Int(v)) if i32::try_from(v).is_err() => Err("out of i32 range"),
        (ElemType::I32, Scalar::Float(v)) if v < i32::MIN as f64 || v > i32::MAX as f64 => {
            Err("out of i32 range")
        }
        (ElemType::I32 | ElemType::I64, _) => Ok(()),
    }
}
