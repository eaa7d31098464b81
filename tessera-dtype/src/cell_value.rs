//! A single scalar cell of any numeric datatype.

use std::cmp::Ordering;
use std::fmt::Display;

use paste::paste;
use tessera_error::{tessera_err, TesseraError, TesseraResult};

use crate::{Datatype, NativeCellType, ToLeBytes, TryFromLeBytes};

/// A scalar value tagged with its numeric [`Datatype`].
///
/// Domain bounds and tile extents cross the schema boundary as
/// `CellValue`s; interior code extracts the native type once and stays
/// monomorphic from there.
#[derive(Debug, Clone, Copy)]
pub enum CellValue {
    /// An `i8` cell
    Int8(i8),
    /// A `u8` cell
    UInt8(u8),
    /// An `i16` cell
    Int16(i16),
    /// A `u16` cell
    UInt16(u16),
    /// An `i32` cell
    Int32(i32),
    /// A `u32` cell
    UInt32(u32),
    /// An `i64` cell
    Int64(i64),
    /// A `u64` cell
    UInt64(u64),
    /// An `f32` cell
    Float32(f32),
    /// An `f64` cell
    Float64(f64),
}

macro_rules! as_cell {
    ($T:ty, $Arm:tt) => {
        paste! {
            #[doc = "Access the value as `" $T "`, returning `None` when the tag differs."]
            pub fn [<as_ $T>](self) -> Option<$T> {
                match self {
                    CellValue::$Arm(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl CellValue {
    /// The datatype tag of this value.
    pub fn datatype(&self) -> Datatype {
        match self {
            Self::Int8(_) => Datatype::Int8,
            Self::UInt8(_) => Datatype::UInt8,
            Self::Int16(_) => Datatype::Int16,
            Self::UInt16(_) => Datatype::UInt16,
            Self::Int32(_) => Datatype::Int32,
            Self::UInt32(_) => Datatype::UInt32,
            Self::Int64(_) => Datatype::Int64,
            Self::UInt64(_) => Datatype::UInt64,
            Self::Float32(_) => Datatype::Float32,
            Self::Float64(_) => Datatype::Float64,
        }
    }

    /// Decode one scalar of `datatype` from a little-endian byte slice.
    pub fn from_le_bytes(datatype: Datatype, bytes: &[u8]) -> TesseraResult<Self> {
        if !datatype.is_numeric() {
            return Err(tessera_err!(
                "cannot decode a cell value of non-numeric datatype {}",
                datatype
            ));
        }
        crate::match_each_numeric_datatype!(datatype, |$T| {
            <$T>::try_from_le_bytes(bytes).map(CellValue::from)
        })
    }

    /// Whether the value is NaN. Always `false` for integer tags.
    pub fn is_nan(&self) -> bool {
        match self {
            Self::Float32(v) => v.is_nan(),
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Whether the value is finite. Always `true` for integer tags.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float32(v) => v.is_finite(),
            Self::Float64(v) => v.is_finite(),
            _ => true,
        }
    }

    as_cell!(i8, Int8);
    as_cell!(u8, UInt8);
    as_cell!(i16, Int16);
    as_cell!(u16, UInt16);
    as_cell!(i32, Int32);
    as_cell!(u32, UInt32);
    as_cell!(i64, Int64);
    as_cell!(u64, UInt64);
    as_cell!(f32, Float32);
    as_cell!(f64, Float64);
}

impl ToLeBytes for CellValue {
    fn to_le_bytes(&self) -> &[u8] {
        match self {
            Self::Int8(v) => v.to_le_bytes(),
            Self::UInt8(v) => v.to_le_bytes(),
            Self::Int16(v) => v.to_le_bytes(),
            Self::UInt16(v) => v.to_le_bytes(),
            Self::Int32(v) => v.to_le_bytes(),
            Self::UInt32(v) => v.to_le_bytes(),
            Self::Int64(v) => v.to_le_bytes(),
            Self::UInt64(v) => v.to_le_bytes(),
            Self::Float32(v) => v.to_le_bytes(),
            Self::Float64(v) => v.to_le_bytes(),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for CellValue {
    /// Values of different tags are unordered; floats compare with a
    /// total ordering so NaN bounds behave deterministically.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int8(a), Self::Int8(b)) => Some(a.total_compare(*b)),
            (Self::UInt8(a), Self::UInt8(b)) => Some(a.total_compare(*b)),
            (Self::Int16(a), Self::Int16(b)) => Some(a.total_compare(*b)),
            (Self::UInt16(a), Self::UInt16(b)) => Some(a.total_compare(*b)),
            (Self::Int32(a), Self::Int32(b)) => Some(a.total_compare(*b)),
            (Self::UInt32(a), Self::UInt32(b)) => Some(a.total_compare(*b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.total_compare(*b)),
            (Self::UInt64(a), Self::UInt64(b)) => Some(a.total_compare(*b)),
            (Self::Float32(a), Self::Float32(b)) => Some(a.total_compare(*b)),
            (Self::Float64(a), Self::Float64(b)) => Some(a.total_compare(*b)),
            (..) => None,
        }
    }
}

macro_rules! impl_cell_value {
    ($T:ty, $Arm:tt) => {
        impl From<$T> for CellValue {
            fn from(value: $T) -> Self {
                CellValue::$Arm(value)
            }
        }

        impl TryFrom<CellValue> for $T {
            type Error = TesseraError;

            fn try_from(value: CellValue) -> Result<Self, Self::Error> {
                match value {
                    CellValue::$Arm(v) => Ok(v),
                    other => Err(tessera_err!(
                        "cannot read cell value {} as {}",
                        other,
                        <$T as NativeCellType>::DATATYPE
                    )),
                }
            }
        }
    };
}

impl_cell_value!(i8, Int8);
impl_cell_value!(u8, UInt8);
impl_cell_value!(i16, Int16);
impl_cell_value!(u16, UInt16);
impl_cell_value!(i32, Int32);
impl_cell_value!(u32, UInt32);
impl_cell_value!(i64, Int64);
impl_cell_value!(u64, UInt64);
impl_cell_value!(f32, Float32);
impl_cell_value!(f64, Float64);

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int8(v) => write!(f, "{}i8", v),
            Self::UInt8(v) => write!(f, "{}u8", v),
            Self::Int16(v) => write!(f, "{}i16", v),
            Self::UInt16(v) => write!(f, "{}u16", v),
            Self::Int32(v) => write!(f, "{}i32", v),
            Self::UInt32(v) => write!(f, "{}u32", v),
            Self::Int64(v) => write!(f, "{}i64", v),
            Self::UInt64(v) => write!(f, "{}u64", v),
            Self::Float32(v) => write!(f, "{}f32", v),
            Self::Float64(v) => write!(f, "{}f64", v),
        }
    }
}
