use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::TensorInfo;
use crate::tensor::{DType, Scalar, Shape};

/// Source of a named operation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Reference to a tensor produced elsewhere in the program.
    Value(String),
    /// Constant operand owned by the operation.
    Constant(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValueType {
    pub name: String,
    pub dtype: DType,
    pub shape: Option<Shape>,
}

impl From<&TensorInfo> for NamedValueType {
    fn from(info: &TensorInfo) -> Self {
        Self {
            name: info.name.clone(),
            dtype: info.dtype,
            shape: info.shape.clone(),
        }
    }
}

/// Named operation appended to the program sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub op_type: String,
    pub inputs: BTreeMap<String, Argument>,
    pub outputs: Vec<NamedValueType>,
}

impl Operation {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            inputs: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input(&mut self, param: impl Into<String>, value_name: impl Into<String>) {
        self.inputs.insert(param.into(), Argument::Value(value_name.into()));
    }

    pub fn add_output(&mut self, output: impl Into<NamedValueType>) {
        self.outputs.push(output.into());
    }

    pub fn constant(&self, param: &str) -> Option<Scalar> {
        match self.inputs.get(param)? {
            Argument::Constant(value) => Some(*value),
            Argument::Value(_) => None,
        }
    }

    pub fn value_input(&self, param: &str) -> Option<&str> {
        match self.inputs.get(param)? {
            Argument::Value(name) => Some(name),
            Argument::Constant(_) => None,
        }
    }
}
