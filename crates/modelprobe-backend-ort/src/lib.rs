use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use half::f16;
use modelprobe_core::{
    Backend, BackendModel, DType, Device, ElementType, IOName, ModelArtifact, ModelSpec, OptLevel,
    OutputValue, ProbeError, ProbeResult, SessionConfig, Shape, Tensor, TensorSpec,
};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use tracing::{debug, info};

pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Session,
    input_names: Vec<String>,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact, config: &SessionConfig) -> ProbeResult<Self::Model> {
        let ModelArtifact::OnnxPath(path) = artifact;

        let session =
            open_session(path, config).map_err(|e| ProbeError::model_load(path.clone(), e))?;

        let input_names = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let spec = build_model_spec(&session);
        info!(
            path = %path.display(),
            device = %config.device,
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "model loaded"
        );

        Ok(OrtModel {
            spec,
            session,
            input_names,
        })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> ProbeResult<Vec<OutputValue>> {
        self.run(inputs)
            .map_err(|e| ProbeError::inference(format!("{e:#}")))
    }
}

impl OrtModel {
    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<OutputValue>> {
        ensure!(
            inputs.len() == self.input_names.len(),
            "expected {} inputs, got {}",
            self.input_names.len(),
            inputs.len()
        );

        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in self.input_names.iter().zip(inputs) {
            debug!(input = %name, shape = ?input.shape().dims(), dtype = %input.dtype(), "binding input");
            let value = tensor_to_ort_value(input)?;
            ort_inputs.push((name.clone(), SessionInputValue::from(value)));
        }

        let outputs = self.session.run(ort_inputs)?;
        let mut out_values = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let out = ort_value_to_output(&value)
                .with_context(|| format!("failed to read output '{name}'"))?;
            out_values.push(out);
        }

        Ok(out_values)
    }
}

fn open_session(path: &Path, config: &SessionConfig) -> Result<Session> {
    ensure!(path.is_file(), "model file does not exist");

    let builder = Session::builder()
        .context("failed to create ORT session builder")?
        .with_optimization_level(optimization_level(config.optimization))
        .context("failed to configure ORT session builder")?;

    let builder = configure_session_builder(builder, &config.device)?;

    builder
        .commit_from_file(path)
        .context("failed to load ONNX model")
}

fn optimization_level(level: OptLevel) -> GraphOptimizationLevel {
    match level {
        OptLevel::Disable => GraphOptimizationLevel::Disable,
        OptLevel::Basic => GraphOptimizationLevel::Level1,
        OptLevel::Extended => GraphOptimizationLevel::Level2,
        OptLevel::All => GraphOptimizationLevel::Level3,
    }
}

fn build_model_spec(session: &Session) -> ModelSpec {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect();

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect();

    ModelSpec { inputs, outputs }
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
        Device::OpenVino { options } => configure_openvino(builder, options),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build()
            .error_on_failure();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but modelprobe-backend-ort was built without the `cuda` feature")
    }
}

fn configure_openvino(
    builder: SessionBuilder,
    options: &std::collections::BTreeMap<String, String>,
) -> Result<SessionBuilder> {
    #[cfg(feature = "openvino")]
    {
        use ort::execution_providers::openvino::OpenVINOExecutionProvider;
        let mut ep = OpenVINOExecutionProvider::default();
        for (key, value) in options {
            ep = match key.as_str() {
                modelprobe_core::OPENVINO_DEVICE_TYPE => ep.with_device_type(value),
                "num_of_threads" => ep.with_num_threads(
                    value
                        .parse()
                        .with_context(|| format!("invalid num_of_threads: {value}"))?,
                ),
                "cache_dir" => ep.with_cache_dir(value),
                other => bail!("unsupported OpenVINO option: {other}"),
            };
        }
        builder
            .with_execution_providers([ep.build().error_on_failure()])
            .context("failed to enable ORT OpenVINO execution provider")
    }
    #[cfg(not(feature = "openvino"))]
    {
        let _ = (builder, options);
        bail!(
            "OpenVINO requested but modelprobe-backend-ort was built without the `openvino` feature"
        )
    }
}

/// Sequences and maps are listed with no dimensions.
fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> TensorSpec {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        return TensorSpec {
            name: IOName(name.to_string()),
            dtype: ElementType::Other("non-tensor".to_string()),
            rank: 0,
            dims: Vec::new(),
        };
    };

    let dtype = match ort_tensor_element_to_dtype(*ty) {
        Some(dtype) => ElementType::Supported(dtype),
        None => ElementType::Other(ty.to_string()),
    };
    let dims = shape
        .iter()
        .map(|d| if *d < 0 { None } else { Some(*d as usize) })
        .collect::<Vec<_>>();

    TensorSpec {
        name: IOName(name.to_string()),
        dtype,
        rank: shape.len(),
        dims,
    }
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Option<DType> {
    match ty {
        TensorElementType::Float32 => Some(DType::F32),
        TensorElementType::Float16 => Some(DType::F16),
        TensorElementType::Int64 => Some(DType::I64),
        TensorElementType::Int32 => Some(DType::I32),
        TensorElementType::Uint8 => Some(DType::U8),
        _ => None,
    }
}

fn tensor_to_ort_value(tensor: Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.shape().dims().to_vec();
    let numel = tensor
        .shape()
        .numel()
        .context("input element count overflows usize")?;
    let expected_bytes = numel * tensor.dtype().byte_size();
    ensure!(
        tensor.byte_len() == expected_bytes,
        "input byte size mismatch: got {}, expected {}",
        tensor.byte_len(),
        expected_bytes
    );

    let value = match tensor.dtype() {
        DType::F32 => {
            let data = typed_values::<f32>(&tensor)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::F16 => {
            let data = typed_values::<f16>(&tensor)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I64 => {
            let data = typed_values::<i64>(&tensor)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I32 => {
            let data = typed_values::<i32>(&tensor)?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::U8 => {
            let data = tensor.data.to_vec();
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
    };

    Ok(value)
}

fn typed_values<T: modelprobe_core::Element>(tensor: &Tensor) -> Result<Vec<T>> {
    tensor
        .to_vec::<T>()
        .with_context(|| format!("tensor does not hold {} values", T::DTYPE))
}

/// Decodes tensors of known element types; others keep only their shape.
fn ort_value_to_output(value: &ort::value::ValueRef<'_>) -> Result<OutputValue> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims = shape
        .iter()
        .map(|d| usize::try_from(*d).context("output tensor has a negative dimension"))
        .collect::<Result<Vec<_>>>()?;
    let shape = Shape::from_slice(&dims);

    let tensor = match *ty {
        TensorElementType::Float32 => {
            let (_, data) = value.try_extract_tensor::<f32>()?;
            Tensor::from_slice(shape, data)
        }
        TensorElementType::Float16 => {
            let (_, data) = value.try_extract_tensor::<f16>()?;
            Tensor::from_slice(shape, data)
        }
        TensorElementType::Int64 => {
            let (_, data) = value.try_extract_tensor::<i64>()?;
            Tensor::from_slice(shape, data)
        }
        TensorElementType::Int32 => {
            let (_, data) = value.try_extract_tensor::<i32>()?;
            Tensor::from_slice(shape, data)
        }
        TensorElementType::Uint8 => {
            let (_, data) = value.try_extract_tensor::<u8>()?;
            Tensor::from_slice(shape, data)
        }
        other => {
            debug!(ty = %other, "keeping shape only for output");
            return Ok(OutputValue::Opaque {
                ty: other.to_string(),
                shape,
            });
        }
    };

    Ok(OutputValue::Tensor(tensor))
}
