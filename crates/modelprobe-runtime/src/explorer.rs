use std::collections::BTreeMap;
use std::io::Write;

use modelprobe_core::{
    Backend, BackendModel, ModelArtifact, ModelSpec, ProbeError, ProbeResult, SessionConfig,
    Shape, TensorSpec,
};
use rand::Rng;
use tracing::{debug, info};

use crate::{resolve_shape, synthesize, Reporter};

#[derive(Clone, Debug, Default)]
pub struct ExploreOptions {
    /// Axis index to size, applied to dynamic axes of the input.
    pub dim_overrides: BTreeMap<usize, usize>,
}

/// What one explore run saw.
#[derive(Clone, Debug, PartialEq)]
pub struct ExploreSummary {
    pub input: TensorSpec,
    pub output: TensorSpec,
    pub input_shape: Shape,
    pub output_shape: Shape,
}

/// Opens `artifact` with `backend` and explores it. Nothing is run when the
/// model fails to load.
pub fn load_and_explore<B, W, R>(
    backend: &B,
    artifact: &ModelArtifact,
    config: &SessionConfig,
    out: W,
    rng: &mut R,
    options: &ExploreOptions,
) -> ProbeResult<ExploreSummary>
where
    B: Backend,
    W: Write,
    R: Rng + ?Sized,
{
    info!(backend = backend.name(), path = %artifact.path().display(), "loading model");
    let mut model = backend.load(artifact, config)?;
    explore(&mut model, out, rng, options)
}

/// Prints the model's declared inputs and outputs, then runs it once on
/// random data and prints the output shape.
pub fn explore<M, W, R>(
    model: &mut M,
    out: W,
    rng: &mut R,
    options: &ExploreOptions,
) -> ProbeResult<ExploreSummary>
where
    M: BackendModel,
    W: Write,
    R: Rng + ?Sized,
{
    let mut report = Reporter::new(out);

    let spec = model.spec();
    report.io_section("Input", &spec.inputs)?;
    report.io_section("Output", &spec.outputs)?;
    let (input, output) = single_io(spec)?;
    let (input, output) = (input.clone(), output.clone());

    let shape = resolve_shape(&input, &options.dim_overrides)?;
    let tensor = synthesize(&input, shape, rng)?;
    report.input_tensor(tensor.shape())?;
    let input_shape = tensor.shape().clone();

    info!(input = %input.name, shape = ?input_shape.dims(), "running inference");
    report.running()?;
    let outputs = model.infer(vec![tensor])?;
    report.done()?;

    let declared = model.spec().outputs.len();
    if outputs.len() != declared {
        return Err(ProbeError::OutputMismatch {
            expected: declared,
            actual: outputs.len(),
        });
    }
    let output_shape = match outputs.first() {
        Some(first) => first.shape().clone(),
        None => {
            return Err(ProbeError::OutputMismatch {
                expected: 1,
                actual: 0,
            })
        }
    };
    report.output_tensor(&output_shape)?;
    debug!(output = %output.name, shape = ?output_shape.dims(), "inference finished");

    Ok(ExploreSummary {
        input,
        output,
        input_shape,
        output_shape,
    })
}

/// The explorer only drives single-input, single-output models.
pub fn single_io(spec: &ModelSpec) -> ProbeResult<(&TensorSpec, &TensorSpec)> {
    match (spec.inputs.as_slice(), spec.outputs.as_slice()) {
        ([input], [output]) => Ok((input, output)),
        (inputs, outputs) => Err(ProbeError::UnsupportedModelShape {
            inputs: inputs.len(),
            outputs: outputs.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::PathBuf;

    use modelprobe_core::{DType, ElementType, IOName, OutputValue, Tensor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn tensor_spec(name: &str, dims: Vec<Option<usize>>) -> TensorSpec {
        TensorSpec {
            name: IOName(name.to_string()),
            dtype: DType::F32.into(),
            rank: dims.len(),
            dims,
        }
    }

    enum Behavior {
        Echo,
        Fail(&'static str),
        Outputs(usize),
        Opaque(&'static str),
    }

    struct FakeModel {
        spec: ModelSpec,
        behavior: Behavior,
        calls: usize,
        seen: Vec<Tensor>,
    }

    impl FakeModel {
        fn new(spec: ModelSpec, behavior: Behavior) -> Self {
            Self {
                spec,
                behavior,
                calls: 0,
                seen: Vec::new(),
            }
        }

        fn single(input: Vec<Option<usize>>, output: Vec<Option<usize>>) -> Self {
            Self::new(
                ModelSpec {
                    inputs: vec![tensor_spec("data", input)],
                    outputs: vec![tensor_spec("prob", output)],
                },
                Behavior::Echo,
            )
        }
    }

    impl BackendModel for FakeModel {
        fn spec(&self) -> &ModelSpec {
            &self.spec
        }

        fn infer(&mut self, inputs: Vec<Tensor>) -> ProbeResult<Vec<OutputValue>> {
            self.calls += 1;
            self.seen.extend(inputs.iter().cloned());
            match self.behavior {
                Behavior::Echo => Ok(inputs.into_iter().map(OutputValue::from).collect()),
                Behavior::Fail(message) => Err(ProbeError::inference(message)),
                Behavior::Outputs(n) => Ok(vec![OutputValue::from(inputs[0].clone()); n]),
                Behavior::Opaque(ty) => Ok(vec![OutputValue::Opaque {
                    ty: ty.to_string(),
                    shape: inputs[0].shape().clone(),
                }]),
            }
        }
    }

    struct FakeBackend {
        fail: bool,
        loads: Cell<usize>,
    }

    impl Backend for FakeBackend {
        type Model = FakeModel;

        fn name(&self) -> &'static str {
            "fake"
        }

        fn load(&self, artifact: &ModelArtifact, _config: &SessionConfig) -> ProbeResult<FakeModel> {
            self.loads.set(self.loads.get() + 1);
            if self.fail {
                return Err(ProbeError::model_load(artifact.path(), "protobuf parsing failed"));
            }
            Ok(FakeModel::single(vec![Some(1), Some(4)], vec![Some(1), Some(4)]))
        }
    }

    fn run(model: &mut FakeModel, options: &ExploreOptions) -> (ProbeResult<ExploreSummary>, String) {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(42);
        let result = explore(model, &mut out, &mut rng, options);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn explores_single_io_model() {
        let mut model = FakeModel::single(
            vec![Some(1), Some(3), Some(4), Some(4)],
            vec![Some(1), Some(3), Some(4), Some(4)],
        );
        let (result, text) = run(&mut model, &ExploreOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.input_shape, Shape::from_slice(&[1, 3, 4, 4]));
        assert_eq!(summary.output_shape, Shape::from_slice(&[1, 3, 4, 4]));
        assert_eq!(summary.input.name.0, "data");
        assert_eq!(summary.output.name.0, "prob");
        assert_eq!(
            text,
            "Input Node Name/Shape (1):\n\tdata : 1x3x4x4\n\
             Output Node Name/Shape (1):\n\tprob : 1x3x4x4\n\
             \ninput_tensor shape: 1x3x4x4\n\
             Running model...done\n\
             output_tensor_shape: 1x3x4x4\n"
        );

        let values = model.seen[0].to_vec::<f32>().unwrap();
        assert_eq!(values.len(), 48);
        assert!(values.iter().all(|v| (0.0..255.0).contains(v)));
    }

    #[test]
    fn output_of_unknown_type_still_reports_shape() {
        let mut model = FakeModel::single(vec![Some(1), Some(3)], vec![Some(1), Some(3)]);
        model.spec.outputs[0].dtype = ElementType::Other("bool".to_string());
        model.behavior = Behavior::Opaque("bool");

        let (result, text) = run(&mut model, &ExploreOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.output_shape, Shape::from_slice(&[1, 3]));
        assert!(text.contains("Output Node Name/Shape (1):\n\tprob : 1x3\n"));
        assert!(text.ends_with("output_tensor_shape: 1x3\n"));
    }

    #[test]
    fn input_of_unknown_type_is_listed_then_rejected() {
        let mut model = FakeModel::single(vec![Some(2)], vec![Some(2)]);
        model.spec.inputs[0].dtype = ElementType::Other("string".to_string());

        let (result, text) = run(&mut model, &ExploreOptions::default());
        assert!(matches!(result, Err(ProbeError::UnsupportedElementType { .. })));
        assert!(text.contains("\tdata : 2\n"));
        assert_eq!(model.calls, 0);
    }

    #[test]
    fn multi_input_model_is_reported_not_run() {
        let mut model = FakeModel::new(
            ModelSpec {
                inputs: vec![tensor_spec("a", vec![Some(2)]), tensor_spec("b", vec![Some(2)])],
                outputs: vec![tensor_spec("sum", vec![Some(2)])],
            },
            Behavior::Echo,
        );
        let (result, text) = run(&mut model, &ExploreOptions::default());

        assert!(matches!(
            result,
            Err(ProbeError::UnsupportedModelShape {
                inputs: 2,
                outputs: 1
            })
        ));
        assert!(text.contains("Input Node Name/Shape (2):\n\ta : 2\n\tb : 2\n"));
        assert!(text.contains("Output Node Name/Shape (1):\n\tsum : 2\n"));
        assert_eq!(model.calls, 0);
    }

    #[test]
    fn model_without_outputs_is_unsupported() {
        let mut model = FakeModel::new(
            ModelSpec {
                inputs: vec![tensor_spec("a", vec![Some(2)])],
                outputs: Vec::new(),
            },
            Behavior::Echo,
        );
        let (result, _) = run(&mut model, &ExploreOptions::default());
        assert!(matches!(
            result,
            Err(ProbeError::UnsupportedModelShape {
                inputs: 1,
                outputs: 0
            })
        ));
    }

    #[test]
    fn dynamic_input_needs_an_override() {
        let mut model = FakeModel::single(vec![None, Some(3)], vec![None, Some(3)]);
        let (result, text) = run(&mut model, &ExploreOptions::default());

        assert!(matches!(result, Err(ProbeError::DynamicDimension { axis: 0, .. })));
        assert!(text.contains("\tdata : -1x3\n"));
        assert_eq!(model.calls, 0);

        let options = ExploreOptions {
            dim_overrides: BTreeMap::from([(0, 2)]),
        };
        let (result, _) = run(&mut model, &options);
        assert_eq!(result.unwrap().input_shape, Shape::from_slice(&[2, 3]));
    }

    #[test]
    fn inference_failure_surfaces_message() {
        let mut model = FakeModel::single(vec![Some(1)], vec![Some(1)]);
        model.behavior = Behavior::Fail("Got invalid dimensions for input: data");
        let (result, text) = run(&mut model, &ExploreOptions::default());

        let err = result.unwrap_err();
        assert!(matches!(err, ProbeError::Inference { .. }));
        assert_eq!(err.to_string(), "Got invalid dimensions for input: data");
        assert!(text.ends_with("Running model..."));
    }

    #[test]
    fn output_count_must_match_declaration() {
        let mut model = FakeModel::single(vec![Some(1)], vec![Some(1)]);
        model.behavior = Behavior::Outputs(2);
        let (result, _) = run(&mut model, &ExploreOptions::default());
        assert!(matches!(
            result,
            Err(ProbeError::OutputMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn load_failure_stops_before_inference() {
        let backend = FakeBackend {
            fail: true,
            loads: Cell::new(0),
        };
        let artifact = ModelArtifact::OnnxPath(PathBuf::from("broken.onnx"));
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);

        let result = load_and_explore(
            &backend,
            &artifact,
            &SessionConfig::default(),
            &mut out,
            &mut rng,
            &ExploreOptions::default(),
        );

        assert!(matches!(result, Err(ProbeError::ModelLoad { .. })));
        assert_eq!(backend.loads.get(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn load_and_explore_runs_loaded_model() {
        let backend = FakeBackend {
            fail: false,
            loads: Cell::new(0),
        };
        let artifact = ModelArtifact::OnnxPath(PathBuf::from("ok.onnx"));
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);

        let summary = load_and_explore(
            &backend,
            &artifact,
            &SessionConfig::default(),
            &mut out,
            &mut rng,
            &ExploreOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.output_shape, Shape::from_slice(&[1, 4]));
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("output_tensor_shape: 1x4\n"));
    }
}
