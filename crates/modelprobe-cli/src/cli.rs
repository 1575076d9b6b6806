use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use modelprobe_core::{text, Device, OptLevel};

#[derive(Parser, Debug)]
#[command(
    name = "modelprobe",
    version,
    about = "Print an ONNX model's inputs and outputs, then run it once on random data"
)]
pub struct Cli {
    /// Path to the ONNX model file
    #[arg(value_name = "onnx_model.onnx")]
    pub model: PathBuf,

    /// Device for inference (cpu, cuda[:N] or openvino)
    #[arg(long, env = "MODELPROBE_DEVICE", default_value = "cpu")]
    pub device: String,

    /// Execution provider option as KEY=VALUE (OpenVINO only, repeatable)
    #[arg(long = "ep-option", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub ep_options: Vec<(String, String)>,

    /// Graph optimization level
    #[arg(long, env = "MODELPROBE_OPT_LEVEL", value_enum, default_value_t = OptLevelArg::All)]
    pub opt_level: OptLevelArg,

    /// Pin a dynamic input axis as AXIS=SIZE (repeatable)
    #[arg(long = "dim", value_name = "AXIS=SIZE", value_parser = parse_dim)]
    pub dims: Vec<(usize, usize)>,

    /// Seed for the random input; omit for a fresh fill on every run
    #[arg(long, env = "MODELPROBE_SEED")]
    pub seed: Option<u64>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, env = "MODELPROBE_LOG", default_value = "warn")]
    pub log: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OptLevelArg {
    Disable,
    Basic,
    Extended,
    All,
}

impl From<OptLevelArg> for OptLevel {
    fn from(level: OptLevelArg) -> Self {
        match level {
            OptLevelArg::Disable => OptLevel::Disable,
            OptLevelArg::Basic => OptLevel::Basic,
            OptLevelArg::Extended => OptLevel::Extended,
            OptLevelArg::All => OptLevel::All,
        }
    }
}

#[derive(Debug)]
pub enum ArgsError {
    /// Wrong number of positional arguments or an unknown flag.
    Usage { program: String },
    Clap(clap::Error),
}

pub fn parse_args<I, T>(args: I) -> std::result::Result<Cli, ArgsError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let program = program_name(args.first().map(PathBuf::from).as_deref());

    Cli::try_parse_from(&args).map_err(|err| match err.kind() {
        ErrorKind::MissingRequiredArgument
        | ErrorKind::UnknownArgument
        | ErrorKind::TooManyValues
        | ErrorKind::WrongNumberOfValues => ArgsError::Usage { program },
        _ => ArgsError::Clap(err),
    })
}

fn program_name(argv0: Option<&Path>) -> String {
    argv0
        .and_then(Path::file_name)
        .and_then(|name| text::native_to_utf8(name).ok())
        .unwrap_or_else(|| "modelprobe".to_string())
}

pub fn usage_line(program: &str) -> String {
    format!("Usage: {program} <onnx_model.onnx>")
}

pub fn parse_device(raw: &str, ep_options: &[(String, String)]) -> Result<Device> {
    let device = if raw.eq_ignore_ascii_case("cpu") {
        Device::Cpu
    } else if raw.eq_ignore_ascii_case("cuda") {
        Device::Cuda { device_id: 0 }
    } else if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        Device::Cuda { device_id }
    } else if raw.eq_ignore_ascii_case("openvino") {
        Device::openvino_default()
    } else {
        bail!("unsupported device: {raw} (expected cpu, cuda[:N] or openvino)");
    };

    if ep_options.is_empty() {
        return Ok(device);
    }
    match device {
        Device::OpenVino { mut options } => {
            options.extend(ep_options.iter().cloned());
            Ok(Device::OpenVino { options })
        }
        other => bail!("--ep-option is only supported with --device openvino (got {other})"),
    }
}

pub fn dim_overrides(dims: &[(usize, usize)]) -> Result<BTreeMap<usize, usize>> {
    let mut overrides = BTreeMap::new();
    for &(axis, size) in dims {
        if overrides.insert(axis, size).is_some() {
            bail!("axis {axis} is overridden more than once");
        }
    }
    Ok(overrides)
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_dim(raw: &str) -> Result<(usize, usize)> {
    let (axis, size) = raw
        .split_once('=')
        .with_context(|| format!("expected AXIS=SIZE, got '{raw}'"))?;
    let axis = axis.parse().context("invalid axis index")?;
    let size = size.parse().context("invalid axis size")?;
    Ok((axis, size))
}
