use bytemuck::{Pod, Zeroable};
use derive_more::Display;
use half::f16;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Describes how the bytes of a storage are interpreted.
///
/// The storage never looks inside a [`DataType`] beyond [`DataType::size`] and type matching.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    #[default]
    Uninitialized,
    F32,
    F16,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    PackedU4x8,
    PackedU8x4,
    PackedF32x4,
    PackedF16x4,
}

impl DataType {
    /// Returns the size of one item in bytes. Zero for [`DataType::Uninitialized`].
    pub const fn size(self) -> usize {
        match self {
            DataType::Uninitialized => 0,
            DataType::F32 => size_of::<f32>(),
            DataType::F16 => size_of::<f16>(),
            DataType::F64 => size_of::<f64>(),
            DataType::I8 => size_of::<i8>(),
            DataType::I16 => size_of::<i16>(),
            DataType::I32 => size_of::<i32>(),
            DataType::I64 => size_of::<i64>(),
            DataType::U8 => size_of::<u8>(),
            DataType::U16 => size_of::<u16>(),
            DataType::U32 => size_of::<u32>(),
            DataType::U64 => size_of::<u64>(),
            DataType::Bool => size_of::<Bool>(),
            DataType::PackedU4x8 => size_of::<PackedU4x8>(),
            DataType::PackedU8x4 => size_of::<PackedU8x4>(),
            DataType::PackedF32x4 => size_of::<PackedF32x4>(),
            DataType::PackedF16x4 => size_of::<PackedF16x4>(),
        }
    }

    /// Returns number of element packed in this data type.
    pub const fn count(self) -> usize {
        match self {
            DataType::Uninitialized => 0,
            DataType::PackedU4x8 => 8,
            DataType::PackedU8x4 => 4,
            DataType::PackedF32x4 => 4,
            DataType::PackedF16x4 => 4,
            _ => 1,
        }
    }

    #[inline]
    pub const fn is_initialized(self) -> bool {
        !matches!(self, DataType::Uninitialized)
    }

    /// The data type describing items of `T`.
    #[inline]
    pub const fn of<T: Scalar>() -> Self {
        T::DATA_TYPE
    }

    /// Checks if this data type describes items of `T`.
    #[inline]
    pub fn is<T: Scalar>(self) -> bool {
        self == T::DATA_TYPE
    }
}

macro_rules! impl_bytemuck {
    ($ty:ty) => {
        unsafe impl ::bytemuck::Zeroable for $ty {}
        unsafe impl ::bytemuck::Pod for $ty {}
    };
}

/// A one-byte boolean. Any non-zero byte reads as `true`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Bool(pub u8);

impl From<bool> for Bool {
    #[inline]
    fn from(value: bool) -> Self {
        Self(value as u8)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(value: Bool) -> Self {
        value.0 != 0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PackedU4x8(pub u32);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PackedU8x4(pub u32);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct PackedF32x4(pub [f32; 4]);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct PackedF16x4(pub [f16; 4]);

impl_bytemuck!(Bool);
impl_bytemuck!(PackedU4x8);
impl_bytemuck!(PackedU8x4);
impl_bytemuck!(PackedF32x4);
impl_bytemuck!(PackedF16x4);

/// An element type that a storage can be viewed as.
pub trait Scalar: Sized + Zeroable + Pod + Send + Sync + sealed::Sealed {
    const DATA_TYPE: DataType;
}

macro_rules! impl_scalar {
    ($($ty:ty => $data_type:ident),+ $(,)?) => {
        $(
            impl Scalar for $ty {
                const DATA_TYPE: DataType = DataType::$data_type;
            }

            impl sealed::Sealed for $ty {}
        )+
    };
}

impl_scalar! {
    f32 => F32,
    f16 => F16,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    Bool => Bool,
    PackedU4x8 => PackedU4x8,
    PackedU8x4 => PackedU8x4,
    PackedF32x4 => PackedF32x4,
    PackedF16x4 => PackedF16x4,
}

mod sealed {
    pub trait Sealed {}
}
