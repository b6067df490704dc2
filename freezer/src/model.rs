// model.rs — JSON interchange for graphs and feeds
//
// A model file is `{"nodes": [...], "outputs": [...]}`. Placeholders carry
// `dtype` and `shape` (`null` or absent = unknown rank, `-1` = dynamic dim);
// constants carry `value`; computed nodes carry `inputs` spelled `node` or
// `node:slot`. Output metadata of computed nodes is not stored; it is
// recomputed by propagation on load.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph::{Dim, Graph, GraphBuilder, GraphError, OpKind, Shape};
use crate::tensor::{ElemType, Tensor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    pub nodes: Vec<NodeDef>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<ElemType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Tensor>,
    /// Number of outputs of a `Split`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<usize>,
}

/// Errors that can occur while reading or writing model and feed files.
#[derive(Debug)]
pub enum ModelError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    Invalid {
        node: String,
        message: String,
    },
    Graph(GraphError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ModelError::Json(e) => write!(f, "malformed JSON: {e}"),
            ModelError::Invalid { node, message } => write!(f, "node '{node}': {message}"),
            ModelError::Graph(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Io { source, .. } => Some(source),
            ModelError::Json(e) => Some(e),
            ModelError::Graph(e) => Some(e),
            ModelError::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Json(e)
    }
}

impl From<GraphError> for ModelError {
    fn from(e: GraphError) -> Self {
        ModelError::Graph(e)
    }
}

// ── Graph <-> GraphDef ──────────────────────────────────────────────────────

impl GraphDef {
    pub fn from_graph(graph: &Graph) -> GraphDef {
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| {
                let mut def = NodeDef {
                    name: node.name.clone(),
                    op: node.op.name().to_string(),
                    inputs: node.inputs.iter().map(|t| graph.tensor_name(*t)).collect(),
                    dtype: None,
                    shape: None,
                    value: None,
                    parts: None,
                };
                match &node.op {
                    OpKind::Placeholder => {
                        def.dtype = Some(node.outputs[0].dtype);
                        def.shape = shape_to_dims(&node.outputs[0].shape);
                    }
                    OpKind::Const(tensor) => def.value = Some(tensor.clone()),
                    OpKind::Split { parts } => def.parts = Some(*parts),
                    _ => {}
                }
                def
            })
            .collect();
        GraphDef {
            nodes,
            outputs: graph.outputs().iter().map(|t| graph.tensor_name(*t)).collect(),
        }
    }

    pub fn into_graph(self) -> Result<Graph, ModelError> {
        let mut builder = GraphBuilder::new();
        for def in self.nodes {
            let invalid = |message: &str| ModelError::Invalid {
                node: def.name.clone(),
                message: message.to_string(),
            };
            let inputs: Vec<&str> = def.inputs.iter().map(String::as_str).collect();
            builder = match def.op.as_str() {
                "Placeholder" => {
                    let dtype = def.dtype.ok_or_else(|| invalid("placeholder needs a dtype"))?;
                    let shape = match &def.shape {
                        None => Shape::Unknown,
                        Some(dims) => dims_to_shape(dims).ok_or_else(|| {
                            invalid("dims must be non-negative, or -1 for a dynamic dim")
                        })?,
                    };
                    builder.placeholder(&def.name, dtype, shape)
                }
                "Const" => {
                    let value = def.value.clone().ok_or_else(|| invalid("constant needs a value"))?;
                    // Deserialization does not check the element count.
                    let value = Tensor::new(value.shape, value.data)
                        .map_err(|e| invalid(&e.to_string()))?;
                    builder.constant(&def.name, value)
                }
                "Split" => {
                    let parts = def.parts.ok_or_else(|| invalid("Split needs 'parts'"))?;
                    builder.op(&def.name, OpKind::Split { parts }, &inputs)
                }
                name => {
                    let op = op_from_name(name)
                        .ok_or_else(|| invalid(&format!("unsupported op '{name}'")))?;
                    builder.op(&def.name, op, &inputs)
                }
            };
        }
        for output in &self.outputs {
            builder = builder.output(output);
        }
        Ok(builder.build()?)
    }
}

fn op_from_name(name: &str) -> Option<OpKind> {
    Some(match name {
        "Identity" => OpKind::Identity,
        "Add" => OpKind::Add,
        "Sub" => OpKind::Sub,
        "Mul" => OpKind::Mul,
        "LogicalAnd" => OpKind::LogicalAnd,
        "Select" => OpKind::Select,
        "IsFinite" => OpKind::IsFinite,
        _ => return None,
    })
}

fn shape_to_dims(shape: &Shape) -> Option<Vec<i64>> {
    shape.dims().map(|dims| {
        dims.iter()
            .map(|d| match d {
                Dim::Fixed(n) => *n as i64,
                Dim::Dynamic => -1,
            })
            .collect()
    })
}

fn dims_to_shape(dims: &[i64]) -> Option<Shape> {
    dims.iter()
        .map(|&d| match d {
            -1 => Some(Dim::Dynamic),
            d if d >= 0 => Some(Dim::Fixed(d as u64)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(Shape::Ranked)
}

// ── Text and file entry points ──────────────────────────────────────────────

pub fn parse_graph(text: &str) -> Result<Graph, ModelError> {
    let def: GraphDef = serde_json::from_str(text)?;
    def.into_graph()
}

pub fn load_graph(path: &Path) -> Result<Graph, ModelError> {
    parse_graph(&read(path)?)
}

/// Pretty JSON for `--emit json`.
pub fn to_json(graph: &Graph) -> Result<String, ModelError> {
    Ok(serde_json::to_string_pretty(&GraphDef::from_graph(graph))?)
}

/// Compact JSON with stable field order, used for fingerprinting.
pub fn canonical_json(graph: &Graph) -> Result<String, ModelError> {
    Ok(serde_json::to_string(&GraphDef::from_graph(graph))?)
}

/// Feeds are a JSON object from input name to tensor.
pub fn parse_feeds(text: &str) -> Result<BTreeMap<String, Tensor>, ModelError> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_feeds(path: &Path) -> Result<BTreeMap<String, Tensor>, ModelError> {
    parse_feeds(&read(path)?)
}

pub fn feeds_to_json(values: &BTreeMap<String, Tensor>) -> Result<String, ModelError> {
    Ok(serde_json::to_string_pretty(values)?)
}

fn read(path: &Path) -> Result<String, ModelError> {
    std::fs::read_to_string(path).map_err(|e| ModelError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    const THREE_INPUTS: &str = r#"{
        "nodes": [
            {"name": "x", "op": "Placeholder", "dtype": "f32", "shape": [3]},
            {"name": "y", "op": "Placeholder", "dtype": "f32", "shape": [-1]},
            {"name": "z", "op": "Placeholder", "dtype": "f32"},
            {"name": "add", "op": "Add", "inputs": ["x", "y"]},
            {"name": "multiply", "op": "Mul", "inputs": ["add", "z"]}
        ],
        "outputs": ["multiply"]
    }"#;

    #[test]
    fn load_propagates_metadata() {
        let g = parse_graph(THREE_INPUTS).unwrap();
        let sigs = g.input_signatures();
        assert_eq!(sigs[1].shape, Shape::Ranked(vec![Dim::Dynamic]));
        assert_eq!(sigs[2].shape, Shape::Unknown);
        let add = g.node(g.find("add").unwrap());
        assert_eq!(add.outputs[0].shape, Shape::fixed(&[3]));
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let g = parse_graph(THREE_INPUTS).unwrap();
        let text = to_json(&g).unwrap();
        let back = parse_graph(&text).unwrap();
        assert_eq!(canonical_json(&g).unwrap(), canonical_json(&back).unwrap());
    }

    #[test]
    fn constants_and_split() {
        let text = r#"{
            "nodes": [
                {"name": "c", "op": "Const", "value": {"shape": [4], "data": {"dtype": "i32", "values": [1, 2, 3, 4]}}},
                {"name": "s", "op": "Split", "inputs": ["c"], "parts": 2},
                {"name": "out", "op": "Identity", "inputs": ["s:1"]}
            ],
            "outputs": ["out"]
        }"#;
        let g = parse_graph(text).unwrap();
        let s = g.node(g.find("s").unwrap());
        assert_eq!(s.outputs.len(), 2);
        let out = g.node(g.find("out").unwrap());
        assert_eq!(g.tensor_name(out.inputs[0]), "s:1");
    }

    #[test]
    fn invalid_models() {
        let missing_dtype = r#"{"nodes": [{"name": "x", "op": "Placeholder"}], "outputs": []}"#;
        assert!(matches!(
            parse_graph(missing_dtype),
            Err(ModelError::Invalid { ref node, .. }) if node == "x"
        ));
        let bad_op = r#"{"nodes": [{"name": "x", "op": "Conv"}], "outputs": []}"#;
        assert!(matches!(parse_graph(bad_op), Err(ModelError::Invalid { .. })));
        let bad_dim =
            r#"{"nodes": [{"name": "x", "op": "Placeholder", "dtype": "f32", "shape": [-2]}], "outputs": []}"#;
        assert!(matches!(parse_graph(bad_dim), Err(ModelError::Invalid { .. })));
        let dangling = r#"{"nodes": [{"name": "y", "op": "Identity", "inputs": ["x"]}], "outputs": []}"#;
        assert!(matches!(parse_graph(dangling), Err(ModelError::Graph(_))));
        assert!(matches!(parse_graph("{"), Err(ModelError::Json(_))));
    }

    #[test]
    fn feeds_parse() {
        let feeds = parse_feeds(
            r#"{"in1": {"shape": [2], "data": {"dtype": "bool", "values": [true, false]}}}"#,
        )
        .unwrap();
        assert_eq!(feeds["in1"].data, TensorData::Bool(vec![true, false]));
    }
}
