// graph.rs — Arena computation graph
//
// Nodes live in a `Vec` indexed by `NodeId`; edges are ordered
// `(producer, output slot)` pairs stored on the consumer. Node names are
// unique and indexed. Graph outputs are tensor refs.
//
// Invariants:
//   - every input ref points at an existing node and a valid output slot;
//   - the graph is acyclic: `add_node` only accepts existing producers and
//     `replace_uses` is only ever pointed at source nodes (no inputs).
//
// Side effects: none.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::tensor::{ElemType, Tensor};

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One output of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorRef {
    pub node: NodeId,
    pub slot: u32,
}

impl TensorRef {
    pub fn new(node: NodeId, slot: u32) -> Self {
        Self { node, slot }
    }
}

// ── Shapes and types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Fixed(u64),
    Dynamic,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{n}"),
            Dim::Dynamic => write!(f, "?"),
        }
    }
}

/// Declared shape: unknown rank, or a ranked list of dims.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Unknown,
    Ranked(Vec<Dim>),
}

impl Shape {
    pub fn fixed(dims: &[u64]) -> Shape {
        Shape::Ranked(dims.iter().map(|d| Dim::Fixed(*d)).collect())
    }

    pub fn scalar() -> Shape {
        Shape::Ranked(Vec::new())
    }

    pub fn from_concrete(dims: &[usize]) -> Shape {
        Shape::Ranked(dims.iter().map(|d| Dim::Fixed(*d as u64)).collect())
    }

    pub fn rank(&self) -> Option<usize> {
        match self {
            Shape::Unknown => None,
            Shape::Ranked(dims) => Some(dims.len()),
        }
    }

    pub fn dims(&self) -> Option<&[Dim]> {
        match self {
            Shape::Unknown => None,
            Shape::Ranked(dims) => Some(dims),
        }
    }

    /// Concrete dims when every dim is fixed.
    pub fn concrete(&self) -> Option<Vec<usize>> {
        self.dims()?
            .iter()
            .map(|d| match d {
                Dim::Fixed(n) => Some(*n as usize),
                Dim::Dynamic => None,
            })
            .collect()
    }

    /// Whether a value of shape `other` could inhabit `self`: unknown ranks
    /// and dynamic dims match anything, fixed dims must agree.
    pub fn is_compatible(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Unknown, _) | (_, Shape::Unknown) => true,
            (Shape::Ranked(a), Shape::Ranked(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| match (x, y) {
                        (Dim::Fixed(p), Dim::Fixed(q)) => p == q,
                        _ => true,
                    })
            }
        }
    }

    pub fn accepts(&self, concrete: &[usize]) -> bool {
        self.is_compatible(&Shape::from_concrete(concrete))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Unknown => write!(f, "[..]"),
            Shape::Ranked(dims) => {
                write!(f, "[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Type and shape metadata for one node output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    pub dtype: ElemType,
    pub shape: Shape,
}

impl TensorInfo {
    pub fn new(dtype: ElemType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn of_tensor(tensor: &Tensor) -> Self {
        Self {
            dtype: tensor.elem_type(),
            shape: Shape::from_concrete(&tensor.shape),
        }
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

// ── Operations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Graph input awaiting a runtime value.
    Placeholder,
    /// Literal value.
    Const(Tensor),
    Identity,
    Add,
    Sub,
    Mul,
    LogicalAnd,
    /// `Select(cond, x, y)`: elementwise `cond ? x : y` with broadcasting.
    Select,
    IsFinite,
    /// Equal split along axis 0 into `parts` outputs.
    Split { parts: usize },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Placeholder => "Placeholder",
            OpKind::Const(_) => "Const",
            OpKind::Identity => "Identity",
            OpKind::Add => "Add",
            OpKind::Sub => "Sub",
            OpKind::Mul => "Mul",
            OpKind::LogicalAnd => "LogicalAnd",
            OpKind::Select => "Select",
            OpKind::IsFinite => "IsFinite",
            OpKind::Split { .. } => "Split",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, OpKind::Placeholder)
    }
}

/// A node in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op: OpKind,
    pub inputs: Vec<TensorRef>,
    /// One entry per output slot.
    pub outputs: Vec<TensorInfo>,
}

/// A declared graph input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSignature {
    pub name: String,
    pub dtype: ElemType,
    pub shape: Shape,
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Structural errors raised while building or propagating a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    DuplicateNode(String),
    UnknownTensor { node: String, input: String },
    UnknownOutput(String),
    Propagation { node: String, message: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateNode(name) => write!(f, "duplicate node name '{name}'"),
            GraphError::UnknownTensor { node, input } => {
                write!(f, "node '{node}' reads unknown tensor '{input}'")
            }
            GraphError::UnknownOutput(name) => write!(f, "graph output '{name}' does not exist"),
            GraphError::Propagation { node, message } => write!(f, "node '{node}': {message}"),
        }
    }
}

impl std::error::Error for GraphError {}

// ── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    outputs: Vec<TensorRef>,
    by_name: HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn outputs(&self) -> &[TensorRef] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Append a node. Inputs must reference existing nodes and slots.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op: OpKind,
        inputs: Vec<TensorRef>,
        outputs: Vec<TensorInfo>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        for input in &inputs {
            if self.tensor_info(*input).is_none() {
                return Err(GraphError::UnknownTensor {
                    node: name,
                    input: format!("#{}:{}", input.node.0, input.slot),
                });
            }
        }
        let id = NodeId(self.nodes.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.nodes.push(Node {
            id,
            name,
            op,
            inputs,
            outputs,
        });
        Ok(id)
    }

    pub fn add_output(&mut self, tensor: TensorRef) -> Result<(), GraphError> {
        if self.tensor_info(tensor).is_none() {
            return Err(GraphError::UnknownOutput(format!(
                "#{}:{}",
                tensor.node.0, tensor.slot
            )));
        }
        self.outputs.push(tensor);
        Ok(())
    }

    /// Rename a node, keeping the name index consistent.
    pub(crate) fn rename_node(&mut self, id: NodeId, name: String) -> Result<(), GraphError> {
        if let Some(existing) = self.by_name.get(&name) {
            if *existing != id {
                return Err(GraphError::DuplicateNode(name));
            }
            return Ok(());
        }
        let old = std::mem::replace(&mut self.nodes[id.index()].name, name.clone());
        self.by_name.remove(&old);
        self.by_name.insert(name, id);
        Ok(())
    }

    pub fn tensor_info(&self, tensor: TensorRef) -> Option<&TensorInfo> {
        self.nodes
            .get(tensor.node.index())?
            .outputs
            .get(tensor.slot as usize)
    }

    /// Resolve a tensor name: an exact node name (slot 0) wins, otherwise a
    /// trailing `:N` selects output `N` of the named node.
    pub fn lookup_tensor(&self, name: &str) -> Option<TensorRef> {
        if let Some(id) = self.find(name) {
            return Some(TensorRef::new(id, 0));
        }
        let (node, slot) = name.rsplit_once(':')?;
        let slot: u32 = slot.parse().ok()?;
        let id = self.find(node)?;
        let tensor = TensorRef::new(id, slot);
        self.tensor_info(tensor).map(|_| tensor)
    }

    /// Display name of a tensor: `node` for slot 0, `node:N` otherwise.
    pub fn tensor_name(&self, tensor: TensorRef) -> String {
        let node = &self.node(tensor.node).name;
        if tensor.slot == 0 {
            node.clone()
        } else {
            format!("{}:{}", node, tensor.slot)
        }
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.op.is_placeholder())
    }

    pub fn input_signatures(&self) -> Vec<InputSignature> {
        self.placeholders()
            .map(|n| InputSignature {
                name: n.name.clone(),
                dtype: n.outputs[0].dtype,
                shape: n.outputs[0].shape.clone(),
            })
            .collect()
    }

    /// Every `(consumer, input position)` reading `tensor`, in node order.
    pub fn consumers(&self, tensor: TensorRef) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        for node in &self.nodes {
            for (pos, input) in node.inputs.iter().enumerate() {
                if *input == tensor {
                    out.push((node.id, pos));
                }
            }
        }
        out
    }

    /// Point every edge reading `from` at `to`, keeping input positions.
    /// Graph outputs are left alone. Returns the number of rewired edges.
    pub(crate) fn replace_uses(&mut self, from: TensorRef, to: TensorRef) -> usize {
        let mut count = 0;
        for node in &mut self.nodes {
            if node.id == to.node {
                continue;
            }
            for input in &mut node.inputs {
                if *input == from {
                    *input = to;
                    count += 1;
                }
            }
        }
        count
    }

    /// Nodes reachable walking backward from the graph outputs.
    pub fn live_nodes(&self) -> Vec<bool> {
        let mut live = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self.outputs.iter().map(|t| t.node).collect();
        while let Some(id) = stack.pop() {
            if live[id.index()] {
                continue;
            }
            live[id.index()] = true;
            for input in &self.nodes[id.index()].inputs {
                stack.push(input.node);
            }
        }
        live
    }

    /// Topological order, ties broken by arena position.
    pub fn topo_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.inputs.len()).collect();
        let mut users: Vec<Vec<usize>> = vec![Vec::new(); n];
        for node in &self.nodes {
            for input in &node.inputs {
                users[input.node.index()].push(node.id.index());
            }
        }
        let mut ready: BTreeSet<usize> = (0..n).filter(|i| pending[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(NodeId(i as u32));
            for &user in &users[i] {
                pending[user] -= 1;
                if pending[user] == 0 {
                    ready.insert(user);
                }
            }
        }
        order
    }

    /// Drop nodes that do not reach an output and renumber the survivors in
    /// topological order. Returns the names of removed nodes in arena order.
    pub(crate) fn prune(&mut self) -> Vec<String> {
        let live = self.live_nodes();
        let removed: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| !live[n.id.index()])
            .map(|n| n.name.clone())
            .collect();

        let order: Vec<NodeId> = self
            .topo_order()
            .into_iter()
            .filter(|id| live[id.index()])
            .collect();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for (new_index, old) in order.iter().enumerate() {
            remap.insert(*old, NodeId(new_index as u32));
        }

        let mut old_nodes: Vec<Option<Node>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(Some)
            .collect();
        self.by_name.clear();
        for old in &order {
            if let Some(mut node) = old_nodes[old.index()].take() {
                node.id = remap[old];
                for input in &mut node.inputs {
                    input.node = remap[&input.node];
                }
                self.by_name.insert(node.name.clone(), node.id);
                self.nodes.push(node);
            }
        }
        for output in &mut self.outputs {
            output.node = remap[&output.node];
        }
        removed
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph: {} nodes, {} inputs, {} outputs",
            self.nodes.len(),
            self.placeholders().count(),
            self.outputs.len()
        )?;
        for node in &self.nodes {
            write!(f, "  %{} {} = {}", node.id.0, node.name, node.op.name())?;
            if let OpKind::Split { parts } = node.op {
                write!(f, "<{parts}>")?;
            }
            if !node.inputs.is_empty() {
                let args: Vec<String> = node.inputs.iter().map(|t| self.tensor_name(*t)).collect();
                write!(f, "({})", args.join(", "))?;
            }
            if let OpKind::Const(tensor) = &node.op {
                write!(f, " {}", format_values(tensor))?;
            }
            let infos: Vec<String> = node.outputs.iter().map(|i| i.to_string()).collect();
            writeln!(f, " : {}", infos.join(", "))?;
        }
        let outs: Vec<String> = self.outputs.iter().map(|t| self.tensor_name(*t)).collect();
        write!(f, "  outputs: {}", outs.join(", "))
    }
}

fn format_values(tensor: &Tensor) -> String {
    use crate::tensor::TensorData;
    match &tensor.data {
        TensorData::F32(v) => format!("{v:?}"),
        TensorData::F64(v) => format!("{v:?}"),
        TensorData::I32(v) => format!("{v:?}"),
        TensorData::I64(v) => format!("{v:?}"),
        TensorData::Bool(v) => format!("{v:?}"),
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Name-based graph construction. Output metadata of computed nodes is
/// filled in by propagation when the graph is built.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<(String, OpKind, Vec<String>, Option<TensorInfo>)>,
    outputs: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(mut self, name: &str, dtype: ElemType, shape: Shape) -> Self {
        self.nodes.push((
            name.to_string(),
            OpKind::Placeholder,
            Vec::new(),
            Some(TensorInfo::new(dtype, shape)),
        ));
        self
    }

    pub fn constant(mut self, name: &str, value: Tensor) -> Self {
        let info = TensorInfo::of_tensor(&value);
        self.nodes
            .push((name.to_string(), OpKind::Const(value), Vec::new(), Some(info)));
        self
    }

    pub fn op(mut self, name: &str, op: OpKind, inputs: &[&str]) -> Self {
        self.nodes.push((
            name.to_string(),
            op,
            inputs.iter().map(|s| s.to_string()).collect(),
            None,
        ));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let mut graph = Graph::new();
        for (name, op, inputs, info) in self.nodes {
            let mut refs = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let tensor = graph
                    .lookup_tensor(input)
                    .ok_or_else(|| GraphError::UnknownTensor {
                        node: name.clone(),
                        input: input.clone(),
                    })?;
                refs.push(tensor);
            }
            // Placeholder metadata until propagation computes the real one.
            let outputs = match (&op, info) {
                (_, Some(info)) => vec![info],
                (OpKind::Split { parts }, None) => {
                    vec![TensorInfo::new(ElemType::F32, Shape::Unknown); *parts]
                }
                (_, None) => vec![TensorInfo::new(ElemType::F32, Shape::Unknown)],
            };
            graph.add_node(name, op, refs, outputs)?;
        }
        for output in &self.outputs {
            let tensor = graph
                .lookup_tensor(output)
                .ok_or_else(|| GraphError::UnknownOutput(output.clone()))?;
            graph.add_output(tensor)?;
        }
        crate::infer::propagate(&mut graph)?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_inputs() -> Graph {
        GraphBuilder::new()
            .placeholder("x", ElemType::F32, Shape::fixed(&[3]))
            .placeholder("y", ElemType::F32, Shape::fixed(&[3]))
            .placeholder("z", ElemType::F32, Shape::fixed(&[3]))
            .op("add", OpKind::Add, &["x", "y"])
            .op("multiply", OpKind::Mul, &["add", "z"])
            .output("multiply")
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_exact_name_then_suffix() {
        let g = three_inputs();
        let add = g.find("add").unwrap();
        assert_eq!(g.lookup_tensor("add"), Some(TensorRef::new(add, 0)));
        assert_eq!(g.lookup_tensor("add:0"), Some(TensorRef::new(add, 0)));
        assert_eq!(g.lookup_tensor("add:1"), None);
        assert_eq!(g.lookup_tensor("nope:0"), None);
    }

    #[test]
    fn input_signatures_in_node_order() {
        let names: Vec<String> = three_inputs()
            .input_signatures()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = GraphBuilder::new()
            .placeholder("x", ElemType::F32, Shape::scalar())
            .placeholder("x", ElemType::F32, Shape::scalar())
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("x".into()));
    }

    #[test]
    fn consumers_preserve_positions() {
        let g = three_inputs();
        let add = g.find("add").unwrap();
        let mul = g.find("multiply").unwrap();
        assert_eq!(g.consumers(TensorRef::new(add, 0)), vec![(mul, 0)]);
    }

    #[test]
    fn prune_drops_unreachable_and_renumbers() {
        let mut g = three_inputs();
        let add = TensorRef::new(g.find("add").unwrap(), 0);
        let cut = g
            .add_node(
                "add:0",
                OpKind::Placeholder,
                Vec::new(),
                vec![TensorInfo::new(ElemType::F32, Shape::fixed(&[3]))],
            )
            .unwrap();
        assert_eq!(g.replace_uses(add, TensorRef::new(cut, 0)), 1);

        let removed = g.prune();
        assert_eq!(removed, vec!["x", "y", "add"]);
        let names: Vec<&str> = g.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["z", "add:0", "multiply"]);
        for (i, node) in g.nodes().iter().enumerate() {
            assert_eq!(node.id.index(), i);
        }
        assert_eq!(g.find("multiply"), Some(NodeId(2)));
        let mul = g.node(NodeId(2));
        assert_eq!(g.tensor_name(mul.inputs[0]), "add:0");
        assert_eq!(g.tensor_name(mul.inputs[1]), "z");
    }

    #[test]
    fn replace_uses_leaves_outputs_alone() {
        let mut g = three_inputs();
        let mul = TensorRef::new(g.find("multiply").unwrap(), 0);
        let src = g
            .add_node(
                "src",
                OpKind::Placeholder,
                Vec::new(),
                vec![TensorInfo::new(ElemType::F32, Shape::fixed(&[3]))],
            )
            .unwrap();
        assert_eq!(g.replace_uses(mul, TensorRef::new(src, 0)), 0);
        assert_eq!(g.outputs(), &[mul]);
    }

    #[test]
    fn shape_compatibility() {
        let a = Shape::Ranked(vec![Dim::Dynamic, Dim::Fixed(3)]);
        assert!(a.is_compatible(&Shape::fixed(&[7, 3])));
        assert!(!a.is_compatible(&Shape::fixed(&[7, 4])));
        assert!(!a.is_compatible(&Shape::fixed(&[3])));
        assert!(Shape::Unknown.is_compatible(&a));
        assert_eq!(a.to_string(), "[?, 3]");
    }
}
