use std::fmt;

use crate::DType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared element type of a model input or output.
///
/// Types the explorer cannot fill or decode are kept by name so the model can
/// still be listed and run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementType {
    Supported(DType),
    Other(String),
}

impl ElementType {
    pub fn dtype(&self) -> Option<DType> {
        match self {
            ElementType::Supported(dtype) => Some(*dtype),
            ElementType::Other(_) => None,
        }
    }
}

impl From<DType> for ElementType {
    fn from(dtype: DType) -> Self {
        ElementType::Supported(dtype)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Supported(dtype) => dtype.fmt(f),
            ElementType::Other(name) => f.write_str(name),
        }
    }
}

/// A declared model input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: ElementType,
    pub rank: usize,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    /// Dimensions as the engine reports them, with -1 for dynamic axes.
    pub fn raw_dims(&self) -> Vec<i64> {
        self.dims
            .iter()
            .map(|d| d.map_or(-1, |d| d as i64))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSpec {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}
