use std::path::PathBuf;

use thiserror::Error;

use crate::text::TextError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to load model {}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The explorer only drives models with one input and one output.
    #[error("unsupported model shape: expected 1 input and 1 output, found {inputs} input(s) and {outputs} output(s)")]
    UnsupportedModelShape { inputs: usize, outputs: usize },

    #[error("tensor '{tensor}' has a dynamic dimension at axis {axis}; pin it with --dim {axis}=<size>")]
    DynamicDimension { tensor: String, axis: usize },

    #[error("invalid dimension override for axis {axis}: {reason}")]
    InvalidDimOverride { axis: usize, reason: String },

    #[error("size of tensor '{tensor}' overflows the address space")]
    ElementCountOverflow { tensor: String },

    #[error("tensor '{tensor}' has unsupported element type {ty}")]
    UnsupportedElementType { tensor: String, ty: String },

    #[error("cannot allocate {bytes} bytes for tensor '{tensor}'")]
    Allocation { tensor: String, bytes: usize },

    #[error("{message}")]
    Inference { message: String },

    #[error("model returned {actual} output(s), expected {expected}")]
    OutputMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Text(#[from] TextError),

    #[error("failed to write report")]
    Report(#[from] std::io::Error),
}

impl ProbeError {
    pub fn model_load(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        ProbeError::ModelLoad {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        ProbeError::Inference {
            message: message.into(),
        }
    }
}
