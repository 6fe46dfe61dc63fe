//! Backend output accumulation.
//!
//! A `BuilderContext` is the single mutable accumulator shared by every op
//! builder during one lowering pass. It is append-only: builders push layers
//! or operations and never revisit earlier entries.

mod layers;
mod program;

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ModelSerdeError;
use crate::graph::GraphAccessor;
use crate::tensor::Scalar;

pub use layers::{
    ActivationParams, ConvertParams, Layer, LayerParams, QuantizationParams, UnaryKind,
    UnaryParams,
};
pub use program::{Argument, NamedValueType, Operation};

/// Format tag written into every serialized `LoweredModel`.
pub const LOWERED_MODEL_FORMAT: &str = "oplower.v1";

fn default_format() -> String {
    LOWERED_MODEL_FORMAT.to_string()
}

/// Which output representation the pass is producing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkKind {
    /// Ordered list of fixed-schema layer records.
    #[default]
    Layers,
    /// Ordered list of named operations with inline constants.
    Program,
}

/// Accumulator interface consumed by op builders and the fusion detector.
pub trait BuilderContext {
    fn graph(&self) -> &dyn GraphAccessor;
    fn sink(&self) -> SinkKind;

    fn is_program(&self) -> bool {
        self.sink() == SinkKind::Program
    }

    /// Allocates a name that collides with no graph tensor and no earlier allocation.
    fn unique_name(&mut self, base: &str) -> String;

    fn add_layer(&mut self, layer: Layer);
    fn add_operation(&mut self, op: Operation);

    /// Attaches `value` to `op` as the constant operand `param`.
    fn add_constant_input(&mut self, op: &mut Operation, param: &str, value: Scalar);

    /// Declares that the builder inlines initializer `name` itself.
    fn add_initializer_to_skip(&mut self, name: &str);
    fn is_initializer_skipped(&self, name: &str) -> bool;
}

/// Default `BuilderContext` over a borrowed graph.
pub struct ModelBuilder<'g> {
    graph: &'g dyn GraphAccessor,
    sink: SinkKind,
    used_names: HashSet<String>,
    name_counters: HashMap<String, u64>,
    layers: Vec<Layer>,
    operations: Vec<Operation>,
    skipped_initializers: BTreeSet<String>,
}

impl<'g> ModelBuilder<'g> {
    pub fn new(graph: &'g dyn GraphAccessor, sink: SinkKind) -> Self {
        Self {
            graph,
            sink,
            used_names: graph.tensor_names().into_iter().collect(),
            name_counters: HashMap::new(),
            layers: Vec::new(),
            operations: Vec::new(),
            skipped_initializers: BTreeSet::new(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn skipped_initializers(&self) -> &BTreeSet<String> {
        &self.skipped_initializers
    }

    pub fn finish(self) -> LoweredModel {
        LoweredModel {
            format: default_format(),
            sink: self.sink,
            layers: self.layers,
            operations: self.operations,
            skipped_initializers: self.skipped_initializers,
        }
    }
}

impl BuilderContext for ModelBuilder<'_> {
    fn graph(&self) -> &dyn GraphAccessor {
        self.graph
    }

    fn sink(&self) -> SinkKind {
        self.sink
    }

    fn unique_name(&mut self, base: &str) -> String {
        if self.used_names.insert(base.to_string()) {
            return base.to_string();
        }
        let counter = self.name_counters.entry(base.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{base}_{counter}");
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn add_layer(&mut self, layer: Layer) {
        tracing::trace!(layer = %layer.name, outputs = ?layer.outputs, "append layer");
        self.layers.push(layer);
    }

    fn add_operation(&mut self, op: Operation) {
        tracing::trace!(op = %op.name, op_type = %op.op_type, "append operation");
        self.operations.push(op);
    }

    fn add_constant_input(&mut self, op: &mut Operation, param: &str, value: Scalar) {
        op.inputs.insert(param.to_string(), Argument::Constant(value));
    }

    fn add_initializer_to_skip(&mut self, name: &str) {
        self.skipped_initializers.insert(name.to_string());
    }

    fn is_initializer_skipped(&self, name: &str) -> bool {
        self.skipped_initializers.contains(name)
    }
}

/// Output of one lowering pass, detached from the source graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredModel {
    #[serde(default = "default_format")]
    pub format: String,
    pub sink: SinkKind,
    pub layers: Vec<Layer>,
    pub operations: Vec<Operation>,
    pub skipped_initializers: BTreeSet<String>,
}

impl LoweredModel {
    pub fn to_json_string(&self) -> Result<String, ModelSerdeError> {
        serde_json::to_string_pretty(self).map_err(ModelSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ModelSerdeError> {
        let model: LoweredModel = serde_json::from_str(src)?;
        model.check_format()
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, ModelSerdeError> {
        bincode::serialize(self).map_err(ModelSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, ModelSerdeError> {
        let model: LoweredModel = bincode::deserialize(bytes)?;
        model.check_format()
    }

    fn check_format(self) -> Result<Self, ModelSerdeError> {
        if self.format != LOWERED_MODEL_FORMAT {
            return Err(ModelSerdeError::FormatMismatch {
                found: self.format,
                expected: LOWERED_MODEL_FORMAT,
            });
        }
        Ok(self)
    }
}
