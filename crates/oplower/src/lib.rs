pub use linkme;

pub mod capability;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod model;
pub mod op_builder;
pub mod options;
pub mod reference;
pub mod tensor;

pub use capability::{check_graph_support, SupportDiagnostic, SupportReport};
pub use error::{LoweringError, LoweringResult, ModelSerdeError};
pub use fusion::{ConvertFusion, FusionDetector};
pub use graph::{GraphAccessor, ModelGraph, Node, NodeSpec, NodeUnit};
pub use model::{BuilderContext, LoweredModel, ModelBuilder, SinkKind};
pub use op_builder::{OpBuilder, OpBuilderInputParams, OpBuilderRegistry};
pub use options::LoweringOptions;
pub use tensor::{DType, Shape, TensorData};
