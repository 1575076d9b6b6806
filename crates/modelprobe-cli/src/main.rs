mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use cli::{ArgsError, Cli};
use modelprobe_backend_ort::OrtBackend;
use modelprobe_core::{
    text, Device, ModelArtifact, ProbeError, SessionConfig, OPENVINO_DEVICE_TYPE,
};
use modelprobe_runtime::{load_and_explore, ExploreOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

/// -1 as the shell sees it.
const EXIT_FAILURE: u8 = 255;

fn main() -> ExitCode {
    let cli = match cli::parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => return ExitCode::from(handle_args_error(err, &mut io::stdout())),
    };

    init_tracing(&cli.log);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&mut io::stdout(), &err).ok();
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(log: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let device = cli::parse_device(&cli.device, &cli.ep_options)?;
    if let Device::OpenVino { options } = &device {
        if let Some(ty) = options.get(OPENVINO_DEVICE_TYPE) {
            println!("OpenVINO device type is set to: {ty}");
        }
    }

    let options = ExploreOptions {
        dim_overrides: cli::dim_overrides(&cli.dims)?,
    };
    let config = SessionConfig {
        device,
        optimization: cli.opt_level.into(),
    };

    let model_name = text::native_to_utf8(cli.model.as_os_str())
        .unwrap_or_else(|_| cli.model.to_string_lossy().into_owned());
    tracing::info!(model = %model_name, device = %config.device, seed = ?cli.seed, "starting");

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let artifact = ModelArtifact::OnnxPath(cli.model);
    let stdout = std::io::stdout();
    load_and_explore(
        &OrtBackend::new(),
        &artifact,
        &config,
        stdout.lock(),
        &mut rng,
        &options,
    )?;

    Ok(())
}

/// Prints the usage line (or clap's diagnostic) and returns the exit status.
/// `--help` and `--version` exit here with status 0.
fn handle_args_error(err: ArgsError, out: &mut impl Write) -> u8 {
    match err {
        ArgsError::Usage { program } => {
            writeln!(out, "{}", cli::usage_line(&program)).ok();
        }
        ArgsError::Clap(err) => {
            use clap::error::ErrorKind;
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            err.print().ok();
        }
    }
    EXIT_FAILURE
}

fn report_failure(out: &mut impl Write, err: &anyhow::Error) -> io::Result<()> {
    match err.downcast_ref::<ProbeError>() {
        Some(ProbeError::Inference { message }) => {
            writeln!(out, "ERROR running model inference: {message}")
        }
        _ => writeln!(out, "ERROR: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure_text(err: anyhow::Error) -> String {
        let mut out = Vec::new();
        report_failure(&mut out, &err).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn usage_error_prints_usage_and_fails() {
        for args in [&["modelprobe"][..], &["modelprobe", "a.onnx", "b.onnx"][..]] {
            let err = cli::parse_args(args).unwrap_err();
            let mut out = Vec::new();

            assert_eq!(handle_args_error(err, &mut out), EXIT_FAILURE);
            assert_eq!(
                String::from_utf8(out).unwrap(),
                "Usage: modelprobe <onnx_model.onnx>\n"
            );
        }
        assert_eq!(EXIT_FAILURE as i8, -1);
    }

    #[test]
    fn inference_failure_prints_engine_message() {
        let err = anyhow::Error::from(ProbeError::inference(
            "Got invalid dimensions for input: x",
        ));
        assert_eq!(
            failure_text(err),
            "ERROR running model inference: Got invalid dimensions for input: x\n"
        );
    }

    #[test]
    fn inference_failure_is_found_under_context() {
        let err = anyhow::Error::from(ProbeError::inference("backend fault"))
            .context("exploring model.onnx");
        assert_eq!(
            failure_text(err),
            "ERROR running model inference: backend fault\n"
        );
    }

    #[test]
    fn other_failures_print_the_error_chain() {
        let err = anyhow::Error::from(ProbeError::model_load(
            "missing.onnx",
            "model file does not exist",
        ));
        assert_eq!(
            failure_text(err),
            "ERROR: failed to load model missing.onnx: model file does not exist\n"
        );

        let err = anyhow::Error::from(ProbeError::UnsupportedModelShape {
            inputs: 2,
            outputs: 1,
        });
        assert_eq!(
            failure_text(err),
            "ERROR: unsupported model shape: expected 1 input and 1 output, found 2 input(s) and 1 output(s)\n"
        );
    }
}
