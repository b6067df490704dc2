// options.rs — Merge the three override options into one override list
//
// `input` carries the full `name[shape]{type}->value` grammar,
// `freeze_placeholder_with_value` only accepts entries with a value, and
// `input_shape` supplies shapes positionally.
//
// Preconditions: `graph` is the model the overrides will be applied to.
// Postconditions: `input` entries (with shapes attached) come first, followed
//                 by freeze entries, followed by at most one synthesized entry
//                 for a shape applied to the sole unfrozen placeholder.
// Failure modes: Syntax, ShapeMismatch (shape given twice or count mismatch),
//                InvalidShape (shape list cannot be attributed).
// Side effects: none.

use crate::ast::{OverrideSpec, ShapeSpec, TargetName};
use crate::error::{ErrorKind, FreezeError, Result};
use crate::graph::Graph;
use crate::parser::{parse_overrides, parse_shape_list};

/// Resolver options as a library caller or the CLI provides them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeOptions {
    /// `--input`: inputs to keep, rename, retype, reshape, freeze, or cut at.
    pub input: Option<String>,
    /// `--freeze-placeholder-with-value`: entries that must carry `->value`.
    pub freeze_placeholder_with_value: Option<String>,
    /// `--input-shape`: `[1 3],[2]` or `(1,3),(2)`.
    pub input_shape: Option<String>,
}

impl FreezeOptions {
    pub fn with_input(mut self, text: impl Into<String>) -> Self {
        self.input = Some(text.into());
        self
    }

    pub fn with_freeze(mut self, text: impl Into<String>) -> Self {
        self.freeze_placeholder_with_value = Some(text.into());
        self
    }

    pub fn with_input_shape(mut self, text: impl Into<String>) -> Self {
        self.input_shape = Some(text.into());
        self
    }

    /// All option text joined, for fingerprinting.
    pub fn canonical_text(&self) -> String {
        format!(
            "input={}\nfreeze={}\nshape={}\n",
            self.input.as_deref().unwrap_or(""),
            self.freeze_placeholder_with_value.as_deref().unwrap_or(""),
            self.input_shape.as_deref().unwrap_or("")
        )
    }
}

pub fn collect_overrides(options: &FreezeOptions, graph: &Graph) -> Result<Vec<OverrideSpec>> {
    let mut inputs = parse_overrides(options.input.as_deref().unwrap_or(""))?;

    let freezes = parse_overrides(options.freeze_placeholder_with_value.as_deref().unwrap_or(""))?;
    if let Some(missing) = freezes.iter().find(|o| o.value.is_none()) {
        return Err(FreezeError::syntax(
            format!(
                "'{}' in --freeze-placeholder-with-value needs a value ('{}->...')",
                missing.target.spelled(),
                missing.target.spelled()
            ),
            missing.span,
        )
        .with_target(missing.target.spelled()));
    }

    let shapes = parse_shape_list(options.input_shape.as_deref().unwrap_or(""))?;
    let mut extra = None;
    if !shapes.is_empty() {
        if inputs.is_empty() {
            extra = Some(shape_for_sole_input(shapes, &freezes, graph)?);
        } else {
            attach_shapes(&mut inputs, shapes)?;
        }
    }

    inputs.extend(freezes);
    inputs.extend(extra);
    Ok(inputs)
}

fn attach_shapes(inputs: &mut [OverrideSpec], shapes: Vec<ShapeSpec>) -> Result<()> {
    if shapes.len() != inputs.len() {
        return Err(FreezeError::new(
            ErrorKind::ShapeMismatch,
            format!(
                "{} input shapes given for {} inputs",
                shapes.len(),
                inputs.len()
            ),
        ));
    }
    for (entry, shape) in inputs.iter_mut().zip(shapes) {
        if let Some(existing) = &entry.shape {
            return Err(FreezeError::new(
                ErrorKind::ShapeMismatch,
                format!(
                    "'{}' already has shape {}; --input-shape gives {}",
                    entry.target.spelled(),
                    existing,
                    shape
                ),
            )
            .with_target(entry.target.spelled())
            .with_span(existing.span));
        }
        entry.shape = Some(shape);
    }
    Ok(())
}

fn shape_for_sole_input(
    mut shapes: Vec<ShapeSpec>,
    freezes: &[OverrideSpec],
    graph: &Graph,
) -> Result<OverrideSpec> {
    let frozen = |name: &str| {
        freezes
            .iter()
            .any(|o| o.value.is_some() && o.target.key() == (name.to_string(), 0))
    };
    let open: Vec<&str> = graph
        .placeholders()
        .map(|n| n.name.as_str())
        .filter(|name| !frozen(*name))
        .collect();

    if shapes.len() != 1 || open.len() != 1 {
        return Err(FreezeError::new(
            ErrorKind::InvalidShape,
            format!(
                "cannot attribute {} input shape(s) to {} unfrozen input(s) without --input",
                shapes.len(),
                open.len()
            ),
        ));
    }
    let shape = shapes.remove(0);
    let span = shape.span;
    Ok(OverrideSpec {
        target: TargetName {
            node: open[0].to_string(),
            output: None,
            span,
        },
        shape: Some(shape),
        elem_type: None,
        value: None,
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DimSpec;
    use crate::graph::{GraphBuilder, OpKind, Shape};
    use crate::tensor::ElemType;

    fn select_graph() -> Graph {
        GraphBuilder::new()
            .placeholder("in1", ElemType::F32, Shape::Unknown)
            .placeholder("in2", ElemType::F32, Shape::Unknown)
            .placeholder("cond", ElemType::Bool, Shape::Unknown)
            .op("select", OpKind::Select, &["cond", "in1", "in2"])
            .output("select")
            .build()
            .unwrap()
    }

    #[test]
    fn input_entries_come_before_freezes() {
        let opts = FreezeOptions::default()
            .with_input("in1,in2")
            .with_freeze("cond->True");
        let all = collect_overrides(&opts, &select_graph()).unwrap();
        let names: Vec<String> = all.iter().map(|o| o.target.spelled()).collect();
        assert_eq!(names, vec!["in1", "in2", "cond"]);
    }

    #[test]
    fn freeze_entries_need_values() {
        let opts = FreezeOptions::default().with_freeze("cond");
        let err = collect_overrides(&opts, &select_graph()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.target.as_deref(), Some("cond"));
    }

    #[test]
    fn shapes_attach_positionally() {
        let opts = FreezeOptions::default()
            .with_input("in1,in2")
            .with_input_shape("[3],(1,3)");
        let all = collect_overrides(&opts, &select_graph()).unwrap();
        assert_eq!(all[0].shape.as_ref().unwrap().dims, vec![DimSpec::Fixed(3)]);
        assert_eq!(
            all[1].shape.as_ref().unwrap().dims,
            vec![DimSpec::Fixed(1), DimSpec::Fixed(3)]
        );
    }

    #[test]
    fn shape_count_must_match_inputs() {
        let opts = FreezeOptions::default()
            .with_input("in1,in2")
            .with_input_shape("[3]");
        let err = collect_overrides(&opts, &select_graph()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeMismatch);
    }

    #[test]
    fn shape_given_twice() {
        let opts = FreezeOptions::default()
            .with_input("in1[3]")
            .with_input_shape("[3]");
        let err = collect_overrides(&opts, &select_graph()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeMismatch);
        assert!(err.message.contains("already has shape"));
    }

    #[test]
    fn sole_unfrozen_input_takes_shape() {
        let opts = FreezeOptions::default()
            .with_freeze("in1->[2.0 4.0 6.0],cond->True")
            .with_input_shape("[3]");
        let all = collect_overrides(&opts, &select_graph()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].target.spelled(), "in2");
        assert!(all[2].value.is_none());
    }

    #[test]
    fn ambiguous_shape_without_input() {
        let opts = FreezeOptions::default()
            .with_freeze("cond->True")
            .with_input_shape("[3]");
        let err = collect_overrides(&opts, &select_graph()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidShape);
    }

    #[test]
    fn empty_options_yield_nothing() {
        let all = collect_overrides(&FreezeOptions::default(), &select_graph()).unwrap();
        assert!(all.is_empty());
    }
}
