use crate::{Device, ModelArtifact, ModelSpec, OutputValue, ProbeResult, Tensor};

/// Graph optimization applied by the engine when a session is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub device: Device,
    pub optimization: OptLevel,
}

pub trait Backend {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact, config: &SessionConfig) -> ProbeResult<Self::Model>;
}

pub trait BackendModel {
    fn spec(&self) -> &ModelSpec;

    /// Inputs are matched to the declared inputs by position.
    /// Blocks until the engine returns.
    fn infer(&mut self, inputs: Vec<Tensor>) -> ProbeResult<Vec<OutputValue>>;
}
