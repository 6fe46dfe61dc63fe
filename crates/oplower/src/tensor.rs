use std::{fmt, sync::Arc};

use half::f16;
use serde::{Deserialize, Serialize};

/// Enumerates element types carried by portable graph tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si16,
    Ui16,
    Si32,
    Ui32,
    Si64,
    Bf16,
    F16,
    F32,
    F64,
}

impl DType {
    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::Bf16 | DType::F16 | DType::F32 | DType::F64)
    }

    /// Returns `true` for the 8/16-bit integer types used as quantized storage.
    pub fn is_quantized_storage(self) -> bool {
        matches!(self, DType::Si8 | DType::Ui8 | DType::Si16 | DType::Ui16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::I1 => "i1",
            DType::Si8 => "si8",
            DType::Ui8 => "ui8",
            DType::Si16 => "si16",
            DType::Ui16 => "ui16",
            DType::Si32 => "si32",
            DType::Ui32 => "ui32",
            DType::Si64 => "si64",
            DType::Bf16 => "bf16",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Names a symbolic dimension (e.g. `batch`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().copied().map(Dimension::Static).collect(),
        }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Returns static dimensions when all dims are static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            match dim {
                Dimension::Static(value) => dims.push(*value),
                Dimension::Dynamic(_) => return None,
            }
        }
        Some(dims)
    }
}

/// Typed constant payload of an initializer tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(Vec<f32>),
    F16(Vec<f16>),
    Si8(Vec<i8>),
    Ui8(Vec<u8>),
    Si16(Vec<i16>),
    Ui16(Vec<u16>),
    Si32(Vec<i32>),
    Si64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F16(_) => DType::F16,
            TensorData::Si8(_) => DType::Si8,
            TensorData::Ui8(_) => DType::Ui8,
            TensorData::Si16(_) => DType::Si16,
            TensorData::Ui16(_) => DType::Ui16,
            TensorData::Si32(_) => DType::Si32,
            TensorData::Si64(_) => DType::Si64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F16(v) => v.len(),
            TensorData::Si8(v) => v.len(),
            TensorData::Ui8(v) => v.len(),
            TensorData::Si16(v) => v.len(),
            TensorData::Ui16(v) => v.len(),
            TensorData::Si32(v) => v.len(),
            TensorData::Si64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the first element of a floating-point payload as `f32`.
    pub fn first_f32(&self) -> Option<f32> {
        match self {
            TensorData::F32(v) => v.first().copied(),
            TensorData::F16(v) => v.first().map(|value| value.to_f32()),
            _ => None,
        }
    }

    /// Reads the first element of an integer payload.
    pub fn first_i64(&self) -> Option<i64> {
        match self {
            TensorData::Si8(v) => v.first().map(|&x| i64::from(x)),
            TensorData::Ui8(v) => v.first().map(|&x| i64::from(x)),
            TensorData::Si16(v) => v.first().map(|&x| i64::from(x)),
            TensorData::Ui16(v) => v.first().map(|&x| i64::from(x)),
            TensorData::Si32(v) => v.first().map(|&x| i64::from(x)),
            TensorData::Si64(v) => v.first().copied(),
            TensorData::F32(_) | TensorData::F16(_) => None,
        }
    }
}

/// Scalar immediate used for layer parameters and inline program constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    F32(f32),
    F16(f16),
    Int { value: i64, dtype: DType },
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::F32(_) => DType::F32,
            Scalar::F16(_) => DType::F16,
            Scalar::Int { dtype, .. } => *dtype,
        }
    }

    /// Creates a floating scalar in the requested float dtype (f32 otherwise).
    pub fn float_as(value: f32, dtype: DType) -> Self {
        match dtype {
            DType::F16 => Scalar::F16(f16::from_f32(value)),
            _ => Scalar::F32(value),
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            Scalar::F32(value) => *value,
            Scalar::F16(value) => value.to_f32(),
            Scalar::Int { value, .. } => *value as f32,
        }
    }
}
