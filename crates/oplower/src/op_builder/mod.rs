//! Per-operator translation units.
//!
//! Every portable operator type maps to one `OpBuilder`. A builder first
//! decides legality (`is_supported`, pure) and, only when that passed, emits
//! backend primitives into the active sink of a `BuilderContext` (`lower`).

mod activation;
mod clip;
mod qdq;
mod registry;

use crate::error::{LoweringError, LoweringResult};
use crate::graph::{GraphAccessor, Node, TensorInfo};
use crate::model::BuilderContext;
use crate::tensor::DType;

pub use activation::{create_activation_op_builder, ActivationOpBuilder};
pub use clip::{
    clip_min_max, create_clip_op_builder, ClipBounds, ClipOpBuilder, CLIP_INPUT_BOUNDS_SINCE,
};
pub use qdq::{create_qdq_op_builder, quantization_params, QdqOpBuilder};
pub use registry::{BuilderHandle, OpBuilderRegistry, OP_BUILDER_REGISTRARS};

/// Equivalence class of operator types sharing one builder instance.
pub type BuilderFamily = &'static str;

/// Inputs to the legality check.
#[derive(Clone, Copy)]
pub struct OpBuilderInputParams<'a> {
    pub graph: &'a dyn GraphAccessor,
    /// The program sink will be active when lowering.
    pub create_program: bool,
    pub allow_dynamic_shapes: bool,
}

impl<'a> OpBuilderInputParams<'a> {
    pub fn new(graph: &'a dyn GraphAccessor, create_program: bool) -> Self {
        Self {
            graph,
            create_program,
            allow_dynamic_shapes: true,
        }
    }

    pub fn with_dynamic_shapes(mut self, allowed: bool) -> Self {
        self.allow_dynamic_shapes = allowed;
        self
    }
}

pub trait OpBuilder: Send + Sync {
    fn family(&self) -> BuilderFamily;

    /// Whether `lower` implements the program-sink branch.
    fn supports_program_sink(&self) -> bool {
        false
    }

    fn min_supported_opset(&self) -> i64 {
        1
    }

    fn max_supported_opset(&self) -> i64 {
        21
    }

    fn supported_input_types(&self) -> &'static [DType] {
        &[DType::F32]
    }

    /// Operator-specific legality predicate; runs after the generic checks.
    fn is_supported_impl(&self, node: &Node, params: &OpBuilderInputParams<'_>) -> bool {
        let _ = (node, params);
        true
    }

    fn lower_impl(&self, ctx: &mut dyn BuilderContext, node: &Node) -> LoweringResult<()>;

    /// Declares constant inputs this builder inlines itself.
    fn initializers_to_skip(&self, ctx: &mut dyn BuilderContext, node: &Node) {
        let _ = (ctx, node);
    }

    /// Pure legality check. `false` routes the node to the caller's fallback.
    fn is_supported(&self, node: &Node, params: &OpBuilderInputParams<'_>) -> bool {
        if params.create_program && !self.supports_program_sink() {
            tracing::debug!(
                node = %node.name,
                op_type = %node.op_type,
                "builder has no program-sink lowering"
            );
            return false;
        }
        let version = node.since_version;
        if version < self.min_supported_opset() || version > self.max_supported_opset() {
            tracing::debug!(
                node = %node.name,
                op_type = %node.op_type,
                version,
                "operator version outside supported range"
            );
            return false;
        }
        if !has_supported_input(self, node, params) {
            return false;
        }
        self.is_supported_impl(node, params)
    }

    /// Emits the primitives reproducing `node` into the active sink.
    fn lower(&self, ctx: &mut dyn BuilderContext, node: &Node) -> LoweringResult<()> {
        if ctx.is_program() && !self.supports_program_sink() {
            return Err(LoweringError::SinkUnsupported {
                op_type: node.op_type.clone(),
            });
        }
        tracing::debug!(
            node = %node.name,
            op_type = %node.op_type,
            sink = ?ctx.sink(),
            "lowering node"
        );
        self.lower_impl(ctx, node)
    }
}

fn has_supported_input<B: OpBuilder + ?Sized>(
    builder: &B,
    node: &Node,
    params: &OpBuilderInputParams<'_>,
) -> bool {
    let Some(name) = node.input(0) else {
        tracing::debug!(node = %node.name, "node has no data input");
        return false;
    };
    let Some(info) = params.graph.tensor(name) else {
        tracing::debug!(node = %node.name, input = name, "input has no tensor descriptor");
        return false;
    };
    if !builder.supported_input_types().contains(&info.dtype) {
        tracing::debug!(
            node = %node.name,
            input = name,
            dtype = %info.dtype,
            "unsupported input type"
        );
        return false;
    }
    if !params.allow_dynamic_shapes {
        let is_static = info
            .shape
            .as_ref()
            .and_then(|shape| shape.static_dims())
            .is_some();
        if !is_static {
            tracing::debug!(node = %node.name, input = name, "dynamic input shape not allowed");
            return false;
        }
    }
    true
}

/// Returns the name of input `idx` or fails as an invariant violation.
pub(crate) fn required_input<'n>(node: &'n Node, idx: usize) -> LoweringResult<&'n str> {
    node.input(idx).ok_or_else(|| {
        LoweringError::invalid_node(&node.name, &node.op_type, format!("missing input {idx}"))
    })
}

pub(crate) fn required_output<'n>(node: &'n Node, idx: usize) -> LoweringResult<&'n str> {
    node.output(idx).ok_or_else(|| {
        LoweringError::invalid_node(&node.name, &node.op_type, format!("missing output {idx}"))
    })
}

pub(crate) fn tensor_info<'g>(
    graph: &'g dyn GraphAccessor,
    name: &str,
) -> LoweringResult<&'g TensorInfo> {
    graph
        .tensor(name)
        .ok_or_else(|| LoweringError::MissingTensor(name.to_string()))
}
