use std::io::{self, Write};

use modelprobe_core::{Shape, TensorSpec};

/// Joins dimensions with `x`, e.g. `1x3x224x224`. Dynamic axes print as `-1`.
pub fn print_shape(dims: &[i64]) -> String {
    if dims.is_empty() {
        return "scalar".to_string();
    }
    dims.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join("x")
}

pub fn print_concrete_shape(shape: &Shape) -> String {
    let dims: Vec<i64> = shape.dims().iter().map(|d| *d as i64).collect();
    print_shape(&dims)
}

/// Checked product of the dimensions. The empty shape has one element.
pub fn calculate_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
}

/// Human-readable progress report written to stdout by the CLI.
pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn io_section(&mut self, title: &str, specs: &[TensorSpec]) -> io::Result<()> {
        writeln!(self.out, "{title} Node Name/Shape ({}):", specs.len())?;
        for spec in specs {
            writeln!(self.out, "\t{} : {}", spec.name, print_shape(&spec.raw_dims()))?;
        }
        Ok(())
    }

    pub fn input_tensor(&mut self, shape: &Shape) -> io::Result<()> {
        writeln!(self.out, "\ninput_tensor shape: {}", print_concrete_shape(shape))
    }

    /// No newline: the outcome is appended to the same line.
    pub fn running(&mut self) -> io::Result<()> {
        write!(self.out, "Running model...")?;
        self.out.flush()
    }

    pub fn done(&mut self) -> io::Result<()> {
        writeln!(self.out, "done")
    }

    pub fn output_tensor(&mut self, shape: &Shape) -> io::Result<()> {
        writeln!(self.out, "output_tensor_shape: {}", print_concrete_shape(shape))
    }
}
