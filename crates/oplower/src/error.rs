use thiserror::Error;

/// Failures surfaced while lowering portable nodes into backend primitives.
///
/// Unsupported operators are not errors: they are reported through
/// `OpBuilder::is_supported` and `OpBuilderRegistry::lookup` returning
/// `false`/`None`. These variants cover invariants that legality checks or
/// graph validation should already have guaranteed, so callers abort the pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoweringError {
    #[error("{op_type} node '{node}': {message}")]
    InvalidNode {
        node: String,
        op_type: String,
        message: String,
    },
    #[error("tensor '{0}' has no descriptor in the graph")]
    MissingTensor(String),
    #[error("graph invariant violated: {0}")]
    GraphInvariant(String),
    #[error("{op_type} builder cannot lower into the program sink")]
    SinkUnsupported { op_type: String },
    #[error("reference evaluation failed: {0}")]
    Evaluation(String),
}

impl LoweringError {
    pub fn invalid_node(
        node: impl Into<String>,
        op_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LoweringError::InvalidNode {
            node: node.into(),
            op_type: op_type.into(),
            message: message.into(),
        }
    }

    pub fn graph_invariant(message: impl Into<String>) -> Self {
        LoweringError::GraphInvariant(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        LoweringError::Evaluation(message.into())
    }
}

pub type LoweringResult<T> = Result<T, LoweringError>;

#[derive(Debug, Error)]
pub enum ModelSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("lowered model format '{found}' does not match expected '{expected}'")]
    FormatMismatch {
        found: String,
        expected: &'static str,
    },
}
