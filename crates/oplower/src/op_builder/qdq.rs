use crate::error::{LoweringError, LoweringResult};
use crate::graph::{GraphAccessor, Node, DEQUANTIZE_LINEAR, QUANTIZE_LINEAR};
use crate::model::{BuilderContext, Layer, LayerParams, QuantizationParams};
use crate::tensor::DType;

use super::{
    required_input, required_output, OpBuilder, OpBuilderInputParams, OpBuilderRegistry,
    OP_BUILDER_REGISTRARS,
};

/// Resolves the per-tensor scale and zero point of a Q or DQ node.
///
/// Both must be constant scalars; an omitted zero point is `0` of type `ui8`
/// for quantize, and of the input type for dequantize.
pub fn quantization_params(graph: &dyn GraphAccessor, node: &Node) -> Option<QuantizationParams> {
    let scale = graph.constant_initializer(node.input(1)?)?;
    if scale.len() != 1 {
        return None;
    }
    let scale = scale.first_f32()?;

    let (zero_point, dtype) = match node.input(2) {
        Some(name) => {
            let zp = graph.constant_initializer(name)?;
            if zp.len() != 1 {
                return None;
            }
            (zp.first_i64()?, zp.dtype())
        }
        None if node.op_type == DEQUANTIZE_LINEAR => (0, graph.tensor(node.input(0)?)?.dtype),
        None => (0, DType::Ui8),
    };
    if !dtype.is_quantized_storage() {
        return None;
    }
    Some(QuantizationParams {
        scale,
        zero_point,
        dtype,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QdqOpBuilder;

impl QdqOpBuilder {
    const FAMILY: &'static str = "qdq";
}

impl OpBuilder for QdqOpBuilder {
    fn family(&self) -> &'static str {
        Self::FAMILY
    }

    fn min_supported_opset(&self) -> i64 {
        10
    }

    fn supported_input_types(&self) -> &'static [DType] {
        &[DType::F32, DType::Si8, DType::Ui8, DType::Si16, DType::Ui16]
    }

    fn is_supported_impl(&self, node: &Node, params: &OpBuilderInputParams<'_>) -> bool {
        let Some(input) = node.input(0).and_then(|name| params.graph.tensor(name)) else {
            return false;
        };
        let direction_ok = match node.op_type.as_str() {
            QUANTIZE_LINEAR => input.dtype == DType::F32,
            DEQUANTIZE_LINEAR => input.dtype.is_quantized_storage(),
            _ => false,
        };
        if !direction_ok {
            tracing::debug!(
                node = %node.name,
                dtype = %input.dtype,
                "input type does not match quantization direction"
            );
            return false;
        }
        if quantization_params(params.graph, node).is_none() {
            tracing::debug!(node = %node.name, "scale and zero point must be constant scalars");
            return false;
        }
        true
    }

    fn initializers_to_skip(&self, ctx: &mut dyn BuilderContext, node: &Node) {
        if ctx.is_program() {
            return;
        }
        for idx in [1, 2] {
            if let Some(name) = node.input(idx) {
                ctx.add_initializer_to_skip(name);
            }
        }
    }

    fn lower_impl(&self, ctx: &mut dyn BuilderContext, node: &Node) -> LoweringResult<()> {
        let input = required_input(node, 0)?;
        let output = required_output(node, 0)?;
        let quant = quantization_params(ctx.graph(), node).ok_or_else(|| {
            LoweringError::invalid_node(
                &node.name,
                &node.op_type,
                "quantization parameters could not be resolved",
            )
        })?;
        let params = match node.op_type.as_str() {
            QUANTIZE_LINEAR => LayerParams::Quantize(quant),
            DEQUANTIZE_LINEAR => LayerParams::Dequantize(quant),
            other => {
                return Err(LoweringError::invalid_node(
                    &node.name,
                    other,
                    "not a quantize/dequantize operator",
                ))
            }
        };
        let layer = Layer::new(ctx.unique_name(node.label()), params)
            .with_input(input)
            .with_output(output);
        ctx.add_layer(layer);
        Ok(())
    }
}

pub fn create_qdq_op_builder(op_type: &str, registry: &mut OpBuilderRegistry) {
    registry.register(op_type, Box::new(QdqOpBuilder));
}

fn register_qdq(registry: &mut OpBuilderRegistry) {
    create_qdq_op_builder(QUANTIZE_LINEAR, registry);
    create_qdq_op_builder(DEQUANTIZE_LINEAR, registry);
}

#[linkme::distributed_slice(OP_BUILDER_REGISTRARS)]
static REGISTER_QDQ: fn(&mut OpBuilderRegistry) = register_qdq;
