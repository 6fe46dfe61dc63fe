use crate::error::{LoweringError, LoweringResult};
use crate::graph::Node;
use crate::model::{ActivationParams, BuilderContext, Layer, LayerParams, NamedValueType, Operation};
use crate::tensor::Scalar;

use super::{
    required_input, required_output, tensor_info, OpBuilder, OpBuilderInputParams,
    OpBuilderRegistry, OP_BUILDER_REGISTRARS,
};

const LEAKY_RELU_DEFAULT_ALPHA: f32 = 0.01;

/// Single-input activations with a one-to-one primitive in both sinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivationOpBuilder;

impl ActivationOpBuilder {
    const FAMILY: &'static str = "activation";

    fn params(node: &Node) -> Option<ActivationParams> {
        match node.op_type.as_str() {
            "Relu" => Some(ActivationParams::Relu),
            "Sigmoid" => Some(ActivationParams::Sigmoid),
            "Tanh" => Some(ActivationParams::Tanh),
            "LeakyRelu" => Some(ActivationParams::LeakyRelu {
                alpha: node.attr_f32("alpha").unwrap_or(LEAKY_RELU_DEFAULT_ALPHA),
            }),
            _ => None,
        }
    }
}

impl OpBuilder for ActivationOpBuilder {
    fn family(&self) -> &'static str {
        Self::FAMILY
    }

    fn supports_program_sink(&self) -> bool {
        true
    }

    fn is_supported_impl(&self, node: &Node, _params: &OpBuilderInputParams<'_>) -> bool {
        Self::params(node).is_some()
    }

    fn lower_impl(&self, ctx: &mut dyn BuilderContext, node: &Node) -> LoweringResult<()> {
        let input = required_input(node, 0)?;
        let output = required_output(node, 0)?;
        let params = Self::params(node).ok_or_else(|| {
            LoweringError::invalid_node(&node.name, &node.op_type, "not an activation operator")
        })?;

        if ctx.is_program() {
            let output = NamedValueType::from(tensor_info(ctx.graph(), output)?);
            let op_type = match params {
                ActivationParams::Relu => "relu",
                ActivationParams::Sigmoid => "sigmoid",
                ActivationParams::Tanh => "tanh",
                ActivationParams::LeakyRelu { .. } => "leaky_relu",
                ActivationParams::Linear { .. } => "linear",
            };
            let dtype = output.dtype;
            let name = ctx.unique_name(&format!("{}_{op_type}", node.label()));
            let mut op = Operation::new(name, op_type);
            op.add_input("x", input);
            if let ActivationParams::LeakyRelu { alpha } = params {
                ctx.add_constant_input(&mut op, "alpha", Scalar::float_as(alpha, dtype));
            }
            op.add_output(output);
            ctx.add_operation(op);
        } else {
            let layer = Layer::new(ctx.unique_name(node.label()), LayerParams::Activation(params))
                .with_input(input)
                .with_output(output);
            ctx.add_layer(layer);
        }
        Ok(())
    }
}

pub fn create_activation_op_builder(op_type: &str, registry: &mut OpBuilderRegistry) {
    registry.register(op_type, Box::new(ActivationOpBuilder));
}

fn register_activations(registry: &mut OpBuilderRegistry) {
    for op_type in ["Relu", "Sigmoid", "Tanh", "LeakyRelu"] {
        create_activation_op_builder(op_type, registry);
    }
}

#[linkme::distributed_slice(OP_BUILDER_REGISTRARS)]
static REGISTER_ACTIVATIONS: fn(&mut OpBuilderRegistry) = register_activations;
