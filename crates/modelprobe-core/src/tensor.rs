use std::fmt;

use bytes::Bytes;
use half::f16;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        };
        f.write_str(name)
    }
}

/// A fully resolved shape. Dynamic axes never reach this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Product of all dimensions; `None` on overflow. A scalar holds one element.
    pub fn numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Element types that can be stored in a [`Tensor`].
pub trait Element: Copy {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty => $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_element!(f32 => DType::F32);
impl_element!(f16 => DType::F16);
impl_element!(i64 => DType::I64);
impl_element!(i32 => DType::I32);
impl_element!(u8 => DType::U8);

/// CPU tensor with little-endian element storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, data: Bytes) -> Self {
        Self {
            desc: TensorDesc { dtype, shape },
            data,
        }
    }

    pub fn from_slice<T: Element>(shape: Shape, values: &[T]) -> Self {
        let mut buf = Vec::with_capacity(std::mem::size_of_val(values));
        for v in values {
            v.write_le(&mut buf);
        }
        Self::from_cpu_bytes(T::DTYPE, shape, Bytes::from(buf))
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decodes the elements; `None` when `T` does not match the stored dtype.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        if T::DTYPE != self.desc.dtype {
            return None;
        }
        Some(
            self.data
                .chunks_exact(T::DTYPE.byte_size())
                .map(T::read_le)
                .collect(),
        )
    }
}

/// One model output as returned by a backend.
///
/// Outputs whose element type has no [`DType`] keep only their shape.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputValue {
    Tensor(Tensor),
    Opaque { ty: String, shape: Shape },
}

impl OutputValue {
    pub fn shape(&self) -> &Shape {
        match self {
            OutputValue::Tensor(tensor) => tensor.shape(),
            OutputValue::Opaque { shape, .. } => shape,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            OutputValue::Tensor(tensor) => Some(tensor),
            OutputValue::Opaque { .. } => None,
        }
    }
}

impl From<Tensor> for OutputValue {
    fn from(tensor: Tensor) -> Self {
        OutputValue::Tensor(tensor)
    }
}
