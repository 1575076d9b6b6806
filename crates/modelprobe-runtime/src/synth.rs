use std::collections::BTreeMap;

use bytes::Bytes;
use half::f16;
use modelprobe_core::{DType, Element, ProbeError, ProbeResult, Shape, Tensor, TensorSpec};
use rand::Rng;
use tracing::debug;

/// Synthetic values are drawn from `0..FILL_UPPER`.
pub const FILL_UPPER: u32 = 255;

/// Resolves the declared dimensions of `spec` into a concrete shape.
///
/// `overrides` maps axis index to size and may only pin dynamic axes. A
/// dynamic axis without an override is an error: no size is assumed.
pub fn resolve_shape(spec: &TensorSpec, overrides: &BTreeMap<usize, usize>) -> ProbeResult<Shape> {
    if let Some((&axis, _)) = overrides.range(spec.dims.len()..).next() {
        return Err(ProbeError::InvalidDimOverride {
            axis,
            reason: format!("tensor '{}' has rank {}", spec.name, spec.dims.len()),
        });
    }

    let mut dims = Vec::with_capacity(spec.dims.len());
    for (axis, dim) in spec.dims.iter().enumerate() {
        let resolved = match (dim, overrides.get(&axis)) {
            (Some(fixed), None) => *fixed,
            (None, Some(size)) => *size,
            (Some(fixed), Some(_)) => {
                return Err(ProbeError::InvalidDimOverride {
                    axis,
                    reason: format!("axis is fixed to {fixed}"),
                })
            }
            (None, None) => {
                return Err(ProbeError::DynamicDimension {
                    tensor: spec.name.0.clone(),
                    axis,
                })
            }
        };
        dims.push(resolved);
    }

    Ok(Shape::from_slice(&dims))
}

/// Builds a tensor of `shape` filled with random integers in `0..FILL_UPPER`,
/// stored as the element type `spec` declares.
///
/// The byte size must fit in `isize::MAX` and the buffer is reserved up
/// front, so oversized declarations fail with an error instead of aborting.
pub fn synthesize<R: Rng + ?Sized>(
    spec: &TensorSpec,
    shape: Shape,
    rng: &mut R,
) -> ProbeResult<Tensor> {
    let dtype = spec
        .dtype
        .dtype()
        .ok_or_else(|| ProbeError::UnsupportedElementType {
            tensor: spec.name.0.clone(),
            ty: spec.dtype.to_string(),
        })?;
    let overflow = || ProbeError::ElementCountOverflow {
        tensor: spec.name.0.clone(),
    };
    let numel = shape.numel().ok_or_else(overflow)?;
    let bytes = numel
        .checked_mul(dtype.byte_size())
        .filter(|bytes| *bytes <= isize::MAX as usize)
        .ok_or_else(overflow)?;
    debug!(tensor = %spec.name, numel, bytes, dtype = %dtype, "synthesizing input");

    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| ProbeError::Allocation {
            tensor: spec.name.0.clone(),
            bytes,
        })?;

    let mut draw = || rng.gen_range(0..FILL_UPPER);
    for _ in 0..numel {
        let v = draw();
        match dtype {
            DType::F32 => (v as f32).write_le(&mut buf),
            DType::F16 => f16::from_f32(v as f32).write_le(&mut buf),
            DType::I64 => i64::from(v).write_le(&mut buf),
            DType::I32 => (v as i32).write_le(&mut buf),
            DType::U8 => (v as u8).write_le(&mut buf),
        }
    }

    Ok(Tensor::from_cpu_bytes(dtype, shape, Bytes::from(buf)))
}
