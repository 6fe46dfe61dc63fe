use serde::{Deserialize, Serialize};

use crate::tensor::DType;

/// Fixed-schema layer record appended to the flat-layer sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub params: LayerParams,
}

impl Layer {
    pub fn new(name: impl Into<String>, params: LayerParams) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

/// Closed parameter union; exactly one case per layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerParams {
    Activation(ActivationParams),
    Unary(UnaryParams),
    Quantize(QuantizationParams),
    Dequantize(QuantizationParams),
    Convert(ConvertParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationParams {
    /// `alpha * x + beta`
    Linear { alpha: f32, beta: f32 },
    Relu,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryKind {
    /// `max(scale * x + shift, alpha)`
    Threshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnaryParams {
    pub kind: UnaryKind,
    pub alpha: f32,
    pub scale: f32,
    pub shift: f32,
}

impl UnaryParams {
    pub fn threshold(alpha: f32) -> Self {
        Self {
            kind: UnaryKind::Threshold,
            alpha,
            scale: 1.0,
            shift: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

/// Per-tensor affine quantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub scale: f32,
    pub zero_point: i64,
    /// Element type of the quantized side.
    pub dtype: DType,
}

/// Direct requantization between two quantized element types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertParams {
    pub input: QuantizationParams,
    pub output: QuantizationParams,
}
