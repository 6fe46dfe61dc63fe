//! Element-wise clamping.
//!
//! Flat layers have no native clamp, so two-sided clipping is expressed with
//! one-sided thresholds:
//!
//! ```text
//! clip(x, min, max) = -1 * threshold(-1 * threshold(x, min), -max)
//! ```
//!
//! The program sink has `identity`, `relu`, `relu6` and `clip` operations and
//! picks the narrowest one for the bounds.

use crate::error::{LoweringError, LoweringResult};
use crate::graph::{GraphAccessor, Node};
use crate::model::{
    ActivationParams, BuilderContext, Layer, LayerParams, NamedValueType, Operation, UnaryParams,
};
use crate::tensor::{DType, Scalar};

use super::{
    required_input, required_output, tensor_info, OpBuilder, OpBuilderInputParams,
    OpBuilderRegistry, OP_BUILDER_REGISTRARS,
};

/// First `Clip` version that reads bounds from inputs 1 and 2 instead of attributes.
pub const CLIP_INPUT_BOUNDS_SINCE: i64 = 11;

/// Resolved clamp bounds. Absent bounds are the `f32` extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for ClipBounds {
    fn default() -> Self {
        Self {
            min: f32::MIN,
            max: f32::MAX,
        }
    }
}

impl ClipBounds {
    pub fn has_min(&self) -> bool {
        self.min != f32::MIN
    }

    pub fn has_max(&self) -> bool {
        self.max != f32::MAX
    }
}

/// Resolves the bounds of a `Clip` node, failing closed (`None`) when a bound
/// input is not a compile-time constant or has an unsupported element type.
pub fn clip_min_max(graph: &dyn GraphAccessor, node: &Node) -> Option<ClipBounds> {
    let mut bounds = ClipBounds::default();
    if node.since_version < CLIP_INPUT_BOUNDS_SINCE {
        if let Some(min) = node.attr_f32("min") {
            bounds.min = min;
        }
        if let Some(max) = node.attr_f32("max") {
            bounds.max = max;
        }
        return Some(bounds);
    }

    if let Some(min) = constant_bound(graph, node, 1, "min")? {
        bounds.min = min;
    }
    if let Some(max) = constant_bound(graph, node, 2, "max")? {
        bounds.max = max;
    }
    Some(bounds)
}

/// `Some(None)` when the bound input is omitted, `None` when it cannot be resolved.
fn constant_bound(
    graph: &dyn GraphAccessor,
    node: &Node,
    idx: usize,
    which: &str,
) -> Option<Option<f32>> {
    let Some(name) = node.input(idx) else {
        return Some(None);
    };
    let Some(data) = graph.constant_initializer(name) else {
        tracing::debug!(
            node = %node.name,
            input = name,
            "{which} of Clip must be a constant initializer"
        );
        return None;
    };
    if !data.dtype().is_float() {
        tracing::debug!(
            node = %node.name,
            input = name,
            dtype = %data.dtype(),
            "unsupported {which} bound type"
        );
        return None;
    }
    match data.first_f32() {
        Some(value) => Some(Some(value)),
        None => {
            tracing::debug!(node = %node.name, input = name, "{which} bound initializer is empty");
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClipOpBuilder;

impl ClipOpBuilder {
    const FAMILY: &'static str = "clip";

    fn bounds(&self, ctx: &dyn BuilderContext, node: &Node) -> LoweringResult<ClipBounds> {
        clip_min_max(ctx.graph(), node).ok_or_else(|| {
            LoweringError::invalid_node(
                &node.name,
                &node.op_type,
                "clip bounds could not be resolved",
            )
        })
    }

    fn lower_program(
        &self,
        ctx: &mut dyn BuilderContext,
        node: &Node,
        bounds: ClipBounds,
        input: &str,
        output: NamedValueType,
    ) {
        let (has_min, has_max) = (bounds.has_min(), bounds.has_max());
        let op_type = if !has_min && !has_max {
            "identity"
        } else if has_min && has_max && bounds.min == 0.0 && bounds.max == 6.0 {
            "relu6"
        } else if has_min && bounds.min == 0.0 && !has_max {
            "relu"
        } else {
            "clip"
        };

        let dtype = output.dtype;
        let name = ctx.unique_name(&format!("{}_{op_type}", node.label()));
        let mut op = Operation::new(name, op_type);
        op.add_input("x", input);
        if op_type == "clip" {
            ctx.add_constant_input(&mut op, "alpha", Scalar::float_as(bounds.min, dtype));
            ctx.add_constant_input(&mut op, "beta", Scalar::float_as(bounds.max, dtype));
        }
        op.add_output(output);
        ctx.add_operation(op);
    }

    fn lower_layers(
        &self,
        ctx: &mut dyn BuilderContext,
        node: &Node,
        bounds: ClipBounds,
        input: &str,
        output: &str,
    ) {
        let (has_min, has_max) = (bounds.has_min(), bounds.has_max());
        let base = node.label();
        if !has_min && !has_max {
            let layer = Layer::new(
                ctx.unique_name(base),
                LayerParams::Activation(ActivationParams::Linear {
                    alpha: 1.0,
                    beta: 0.0,
                }),
            )
            .with_input(input)
            .with_output(output);
            ctx.add_layer(layer);
            return;
        }

        // Output of the min step; the max step reads from it.
        let min_output = match (has_min, has_max) {
            (_, false) => output.to_string(),
            (true, true) => ctx.unique_name(&format!("{base}_min_output")),
            (false, true) => input.to_string(),
        };

        if has_min {
            let params = if bounds.min == 0.0 {
                LayerParams::Activation(ActivationParams::Relu)
            } else {
                LayerParams::Unary(UnaryParams::threshold(bounds.min))
            };
            let layer = Layer::new(ctx.unique_name(&format!("{base}_Clip_min")), params)
                .with_input(input)
                .with_output(min_output.as_str());
            ctx.add_layer(layer);
        }

        if has_max {
            let threshold_output = ctx.unique_name(&format!("{base}_threshold_output"));
            // max(-1 * min_output, -max)
            let threshold = Layer::new(
                ctx.unique_name(&format!("{base}_Clip_max_threshold")),
                LayerParams::Unary(UnaryParams::threshold(-bounds.max).with_scale(-1.0)),
            )
            .with_input(min_output)
            .with_output(threshold_output.as_str());
            ctx.add_layer(threshold);

            let linear = Layer::new(
                ctx.unique_name(&format!("{base}_Clip_max_linear")),
                LayerParams::Activation(ActivationParams::Linear {
                    alpha: -1.0,
                    beta: 0.0,
                }),
            )
            .with_input(threshold_output)
            .with_output(output);
            ctx.add_layer(linear);
        }
    }
}

impl OpBuilder for ClipOpBuilder {
    fn family(&self) -> &'static str {
        Self::FAMILY
    }

    fn supports_program_sink(&self) -> bool {
        true
    }

    fn supported_input_types(&self) -> &'static [DType] {
        &[DType::F32, DType::F16]
    }

    fn is_supported_impl(&self, node: &Node, params: &OpBuilderInputParams<'_>) -> bool {
        clip_min_max(params.graph, node).is_some()
    }

    fn initializers_to_skip(&self, ctx: &mut dyn BuilderContext, node: &Node) {
        // Program constants are registered generically upstream.
        if ctx.is_program() {
            return;
        }
        if node.since_version >= CLIP_INPUT_BOUNDS_SINCE {
            for idx in [1, 2] {
                if let Some(name) = node.input(idx) {
                    ctx.add_initializer_to_skip(name);
                }
            }
        }
    }

    fn lower_impl(&self, ctx: &mut dyn BuilderContext, node: &Node) -> LoweringResult<()> {
        let input = required_input(node, 0)?;
        let output = required_output(node, 0)?;
        let bounds = self.bounds(ctx, node)?;

        if ctx.is_program() {
            let output = NamedValueType::from(tensor_info(ctx.graph(), output)?);
            self.lower_program(ctx, node, bounds, input, output);
        } else {
            self.lower_layers(ctx, node, bounds, input, output);
        }
        Ok(())
    }
}

pub fn create_clip_op_builder(op_type: &str, registry: &mut OpBuilderRegistry) {
    registry.register(op_type, Box::new(ClipOpBuilder));
}

fn register_clip(registry: &mut OpBuilderRegistry) {
    create_clip_op_builder("Clip", registry);
}

#[linkme::distributed_slice(OP_BUILDER_REGISTRARS)]
static REGISTER_CLIP: fn(&mut OpBuilderRegistry) = register_clip;
