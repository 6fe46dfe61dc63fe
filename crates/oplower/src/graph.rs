//! Read-only view over the portable model graph consumed by op builders.
//!
//! `GraphAccessor` is the seam to the surrounding compiler: builders and the
//! fusion detector only ever read through it. `ModelGraph` is an in-memory
//! implementation used by drivers that assemble graphs programmatically.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::tensor::{DType, Shape, TensorData};

pub type NodeIndex = usize;

pub const QUANTIZE_LINEAR: &str = "QuantizeLinear";
pub const DEQUANTIZE_LINEAR: &str = "DequantizeLinear";

/// Typed node attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
}

/// Descriptor of a named tensor in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub dtype: DType,
    /// `None` when shape inference could not determine the rank.
    pub shape: Option<Shape>,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, dtype: DType, shape: Option<Shape>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }
}

/// A portable operator node. Empty input names denote omitted optional inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub index: NodeIndex,
    pub name: String,
    pub op_type: String,
    pub since_version: i64,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Node {
    /// Returns the name of input `idx` when present and not omitted.
    pub fn input(&self, idx: usize) -> Option<&str> {
        self.inputs
            .get(idx)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn output(&self, idx: usize) -> Option<&str> {
        self.outputs
            .get(idx)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Base for names derived from this node; unnamed nodes use their op type.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.op_type
        } else {
            &self.name
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn attr_f32(&self, name: &str) -> Option<f32> {
        match self.attributes.get(name)? {
            AttributeValue::Float(value) => Some(*value),
            AttributeValue::Int(value) => Some(*value as f32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeUnitKind {
    SingleNode,
    QdqGroup,
}

/// Atomic translation unit: a target node plus the Q/DQ nodes fused to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUnit {
    pub kind: NodeUnitKind,
    pub target: NodeIndex,
    pub dq_nodes: Vec<NodeIndex>,
    pub q_nodes: Vec<NodeIndex>,
}

impl NodeUnit {
    pub fn single(target: NodeIndex) -> Self {
        Self {
            kind: NodeUnitKind::SingleNode,
            target,
            dq_nodes: Vec::new(),
            q_nodes: Vec::new(),
        }
    }

    /// Every node covered by the unit, target last.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.dq_nodes
            .iter()
            .chain(self.q_nodes.iter())
            .copied()
            .chain(std::iter::once(self.target))
    }
}

/// Read-only accessor over the portable graph.
pub trait GraphAccessor {
    /// Node indices in a stable, topologically compatible order.
    fn node_indices(&self) -> Vec<NodeIndex>;
    fn node(&self, index: NodeIndex) -> Option<&Node>;
    fn tensor(&self, name: &str) -> Option<&TensorInfo>;
    /// Returns the payload when `name` is a compile-time constant initializer.
    fn constant_initializer(&self, name: &str) -> Option<&TensorData>;
    /// Nodes consuming `tensor`, in node order.
    fn consumers(&self, tensor: &str) -> Vec<NodeIndex>;
    fn is_graph_output(&self, tensor: &str) -> bool;
    fn node_unit(&self, node: NodeIndex) -> Option<&NodeUnit>;

    /// Every tensor name the graph defines or references.
    fn tensor_names(&self) -> Vec<String>;
}

/// Mutable in-memory graph with a maintained consumer index.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    nodes: Vec<Node>,
    tensors: HashMap<String, TensorInfo>,
    initializers: HashMap<String, TensorData>,
    outputs: HashSet<String>,
    users: HashMap<String, SmallVec<[NodeIndex; 4]>>,
    units: Vec<NodeUnit>,
    unit_of: HashMap<NodeIndex, usize>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: impl Into<String>, dtype: DType, shape: Option<Shape>) {
        let name = name.into();
        self.tensors.insert(name.clone(), TensorInfo::new(name, dtype, shape));
    }

    pub fn add_initializer(&mut self, name: impl Into<String>, data: TensorData, dims: &[usize]) {
        let name = name.into();
        self.tensors.insert(
            name.clone(),
            TensorInfo::new(name.clone(), data.dtype(), Some(Shape::from_static(dims))),
        );
        self.initializers.insert(name, data);
    }

    /// Declares (or re-declares) the descriptor of a node output.
    pub fn set_tensor_info(&mut self, info: TensorInfo) {
        self.tensors.insert(info.name.clone(), info);
    }

    pub fn mark_output(&mut self, name: impl Into<String>) {
        self.outputs.insert(name.into());
    }

    /// Appends a node, indexing its consumers and giving it a single-node unit.
    pub fn add_node(&mut self, spec: NodeSpec) -> NodeIndex {
        let index = self.nodes.len();
        for input in spec.inputs.iter().filter(|name| !name.is_empty()) {
            let users = self.users.entry(input.clone()).or_default();
            if !users.contains(&index) {
                users.push(index);
            }
        }
        self.nodes.push(Node {
            index,
            name: spec.name,
            op_type: spec.op_type,
            since_version: spec.since_version,
            inputs: spec.inputs,
            outputs: spec.outputs,
            attributes: spec.attributes,
        });
        self.unit_of.insert(index, self.units.len());
        self.units.push(NodeUnit::single(index));
        index
    }

    /// Regroups `target` with its surrounding Q/DQ nodes into one unit.
    pub fn group_qdq(&mut self, target: NodeIndex, dq_nodes: &[NodeIndex], q_nodes: &[NodeIndex]) {
        let unit = NodeUnit {
            kind: NodeUnitKind::QdqGroup,
            target,
            dq_nodes: dq_nodes.to_vec(),
            q_nodes: q_nodes.to_vec(),
        };
        let slot = self.units.len();
        for node in unit.nodes() {
            self.unit_of.insert(node, slot);
        }
        self.units.push(unit);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

impl GraphAccessor for ModelGraph {
    fn node_indices(&self) -> Vec<NodeIndex> {
        (0..self.nodes.len()).collect()
    }

    fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index)
    }

    fn tensor(&self, name: &str) -> Option<&TensorInfo> {
        self.tensors.get(name)
    }

    fn constant_initializer(&self, name: &str) -> Option<&TensorData> {
        self.initializers.get(name)
    }

    fn consumers(&self, tensor: &str) -> Vec<NodeIndex> {
        self.users
            .get(tensor)
            .map(|users| users.to_vec())
            .unwrap_or_default()
    }

    fn is_graph_output(&self, tensor: &str) -> bool {
        self.outputs.contains(tensor)
    }

    fn node_unit(&self, node: NodeIndex) -> Option<&NodeUnit> {
        let slot = *self.unit_of.get(&node)?;
        self.units.get(slot)
    }

    fn tensor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tensors.keys().cloned().collect();
        for node in &self.nodes {
            for name in node.inputs.iter().chain(node.outputs.iter()) {
                if !name.is_empty() && !self.tensors.contains_key(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Construction payload for `ModelGraph::add_node`.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub op_type: String,
    pub since_version: i64,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>, since_version: i64) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            since_version,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}
