//! Host interpreter for lowered element-wise primitives.
//!
//! Executes a layer list or an operation list over named `f32` vectors. Only
//! the primitives op builders emit are understood; quantized values are
//! carried as `f32` holding the integer code.

use std::collections::HashMap;

use crate::error::{LoweringError, LoweringResult};
use crate::model::{
    ActivationParams, Argument, Layer, LayerParams, Operation, QuantizationParams, UnaryKind,
    UnaryParams,
};
use crate::tensor::DType;

pub type TensorValues = HashMap<String, Vec<f32>>;

/// Runs `layers` in order, starting from `inputs`, and returns every value
/// produced (inputs included).
pub fn evaluate_layers(layers: &[Layer], inputs: TensorValues) -> LoweringResult<TensorValues> {
    let mut values = inputs;
    for layer in layers {
        let [input] = layer.inputs.as_slice() else {
            return Err(LoweringError::evaluation(format!(
                "layer '{}' must have exactly one input",
                layer.name
            )));
        };
        let [output] = layer.outputs.as_slice() else {
            return Err(LoweringError::evaluation(format!(
                "layer '{}' must have exactly one output",
                layer.name
            )));
        };
        let x = lookup(&values, input, &layer.name)?;
        let y = apply_layer(&layer.params, x);
        values.insert(output.clone(), y);
    }
    Ok(values)
}

fn apply_layer(params: &LayerParams, x: &[f32]) -> Vec<f32> {
    match params {
        LayerParams::Activation(activation) => map(x, |v| activate(*activation, v)),
        LayerParams::Unary(unary) => map(x, |v| unary_op(*unary, v)),
        LayerParams::Quantize(q) => map(x, |v| quantize(*q, v)),
        LayerParams::Dequantize(q) => map(x, |v| dequantize(*q, v)),
        LayerParams::Convert(convert) => {
            map(x, |v| quantize(convert.output, dequantize(convert.input, v)))
        }
    }
}

/// Runs `ops` in order; each must read its data operand from parameter `x`.
pub fn evaluate_operations(
    ops: &[Operation],
    inputs: TensorValues,
) -> LoweringResult<TensorValues> {
    let mut values = inputs;
    for op in ops {
        let input = op.value_input("x").ok_or_else(|| {
            LoweringError::evaluation(format!("operation '{}' has no value operand 'x'", op.name))
        })?;
        let [output] = op.outputs.as_slice() else {
            return Err(LoweringError::evaluation(format!(
                "operation '{}' must have exactly one output",
                op.name
            )));
        };
        let x = lookup(&values, input, &op.name)?;
        let y = apply_operation(op, x)?;
        values.insert(output.name.clone(), y);
    }
    Ok(values)
}

fn apply_operation(op: &Operation, x: &[f32]) -> LoweringResult<Vec<f32>> {
    let result = match op.op_type.as_str() {
        "identity" => x.to_vec(),
        "relu" => map(x, |v| v.max(0.0)),
        "relu6" => map(x, |v| v.clamp(0.0, 6.0)),
        "sigmoid" => map(x, sigmoid),
        "tanh" => map(x, f32::tanh),
        "leaky_relu" => {
            let alpha = constant(op, "alpha")?;
            map(x, |v| if v >= 0.0 { v } else { alpha * v })
        }
        "clip" => {
            let alpha = constant(op, "alpha")?;
            let beta = constant(op, "beta")?;
            map(x, |v| v.max(alpha).min(beta))
        }
        "convert" => {
            let input = quant_operands(op, "input")?;
            let output = quant_operands(op, "output")?;
            map(x, |v| quantize(output, dequantize(input, v)))
        }
        other => {
            return Err(LoweringError::evaluation(format!(
                "operation type '{other}' is not supported by the reference evaluator"
            )))
        }
    };
    Ok(result)
}

fn lookup<'v>(values: &'v TensorValues, name: &str, consumer: &str) -> LoweringResult<&'v [f32]> {
    values.get(name).map(Vec::as_slice).ok_or_else(|| {
        LoweringError::evaluation(format!("'{consumer}' reads undefined value '{name}'"))
    })
}

fn constant(op: &Operation, param: &str) -> LoweringResult<f32> {
    match op.inputs.get(param) {
        Some(Argument::Constant(value)) => Ok(value.as_f32()),
        _ => Err(LoweringError::evaluation(format!(
            "operation '{}' has no constant '{param}'",
            op.name
        ))),
    }
}

fn quant_operands(op: &Operation, prefix: &str) -> LoweringResult<QuantizationParams> {
    let scale = constant(op, &format!("{prefix}_scale"))?;
    let zero_point = op.constant(&format!("{prefix}_zero_point")).ok_or_else(|| {
        LoweringError::evaluation(format!(
            "operation '{}' has no constant '{prefix}_zero_point'",
            op.name
        ))
    })?;
    Ok(QuantizationParams {
        scale,
        zero_point: zero_point.as_f32() as i64,
        dtype: zero_point.dtype(),
    })
}

fn map(x: &[f32], f: impl Fn(f32) -> f32) -> Vec<f32> {
    x.iter().map(|&v| f(v)).collect()
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn activate(params: ActivationParams, v: f32) -> f32 {
    match params {
        ActivationParams::Linear { alpha, beta } => alpha * v + beta,
        ActivationParams::Relu => v.max(0.0),
        ActivationParams::Sigmoid => sigmoid(v),
        ActivationParams::Tanh => v.tanh(),
        ActivationParams::LeakyRelu { alpha } => {
            if v >= 0.0 {
                v
            } else {
                alpha * v
            }
        }
    }
}

fn unary_op(params: UnaryParams, v: f32) -> f32 {
    match params.kind {
        UnaryKind::Threshold => (params.scale * v + params.shift).max(params.alpha),
    }
}

fn storage_range(dtype: DType) -> (f32, f32) {
    match dtype {
        DType::Si8 => (i8::MIN as f32, i8::MAX as f32),
        DType::Ui8 => (0.0, u8::MAX as f32),
        DType::Si16 => (i16::MIN as f32, i16::MAX as f32),
        DType::Ui16 => (0.0, u16::MAX as f32),
        _ => (f32::MIN, f32::MAX),
    }
}

fn quantize(q: QuantizationParams, v: f32) -> f32 {
    let (lo, hi) = storage_range(q.dtype);
    ((v / q.scale).round_ties_even() + q.zero_point as f32).clamp(lo, hi)
}

fn dequantize(q: QuantizationParams, v: f32) -> f32 {
    (v - q.zero_point as f32) * q.scale
}
