//! Native Rust counterparts of the numeric datatypes.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};

use num_traits::{FromPrimitive, Num, NumCast};
use tessera_error::{tessera_err, TesseraError, TesseraResult};

use crate::{CellValue, Datatype};

/// A trait for native Rust types that correspond 1:1 to a numeric
/// [`Datatype`].
pub trait NativeCellType:
    Send
    + Sync
    + Clone
    + Copy
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Default
    + Num
    + NumCast
    + FromPrimitive
    + ToLeBytes
    + TryFromLeBytes
    + Into<CellValue>
    + TryFrom<CellValue, Error = TesseraError>
{
    /// The datatype tag that corresponds to this native type.
    const DATATYPE: Datatype;

    /// Whether this instance (`self`) is NaN.
    /// For integer types, this is always `false`.
    fn is_nan(self) -> bool;

    /// Whether this instance (`self`) is finite.
    /// For integer types, this is always `true`.
    fn is_finite(self) -> bool;

    /// Compare another instance of this type to `self`, providing a
    /// total ordering.
    fn total_compare(self, other: Self) -> Ordering;
}

macro_rules! native_cell_type {
    ($T:ty, $datatype:tt) => {
        impl NativeCellType for $T {
            const DATATYPE: Datatype = Datatype::$datatype;

            fn is_nan(self) -> bool {
                false
            }

            fn is_finite(self) -> bool {
                true
            }

            fn total_compare(self, other: Self) -> Ordering {
                self.cmp(&other)
            }
        }
    };
}

macro_rules! native_float_cell_type {
    ($T:ty, $datatype:tt) => {
        impl NativeCellType for $T {
            const DATATYPE: Datatype = Datatype::$datatype;

            fn is_nan(self) -> bool {
                <$T>::is_nan(self)
            }

            fn is_finite(self) -> bool {
                <$T>::is_finite(self)
            }

            fn total_compare(self, other: Self) -> Ordering {
                self.total_cmp(&other)
            }
        }
    };
}

native_cell_type!(i8, Int8);
native_cell_type!(u8, UInt8);
native_cell_type!(i16, Int16);
native_cell_type!(u16, UInt16);
native_cell_type!(i32, Int32);
native_cell_type!(u32, UInt32);
native_cell_type!(i64, Int64);
native_cell_type!(u64, UInt64);
native_float_cell_type!(f32, Float32);
native_float_cell_type!(f64, Float64);

/// A trait for types that can be viewed as a little-endian byte slice.
pub trait ToLeBytes: Sized {
    /// Returns this value's bytes in little-endian order.
    fn to_le_bytes(&self) -> &[u8];
}

/// A trait for types that can be decoded from a little-endian byte slice.
pub trait TryFromLeBytes: Sized {
    /// Attempts to decode a little-endian byte slice into this type.
    fn try_from_le_bytes(bytes: &[u8]) -> TesseraResult<Self>;
}

macro_rules! le_bytes {
    ($T:ty) => {
        impl ToLeBytes for $T {
            #[inline]
            fn to_le_bytes(&self) -> &[u8] {
                // The crate is gated on little-endian targets, so the
                // in-memory representation already has the wire order.
                let raw_ptr = self as *const $T as *const u8;
                unsafe { std::slice::from_raw_parts(raw_ptr, std::mem::size_of::<$T>()) }
            }
        }

        impl TryFromLeBytes for $T {
            fn try_from_le_bytes(bytes: &[u8]) -> TesseraResult<Self> {
                let bytes: [u8; std::mem::size_of::<$T>()] = bytes.try_into().map_err(|_| {
                    tessera_err!(
                        "expected {} bytes for {}, got {}",
                        std::mem::size_of::<$T>(),
                        <$T as NativeCellType>::DATATYPE,
                        bytes.len()
                    )
                })?;
                Ok(<$T>::from_le_bytes(bytes))
            }
        }
    };
}

le_bytes!(i8);
le_bytes!(u8);
le_bytes!(i16);
le_bytes!(u16);
le_bytes!(i32);
le_bytes!(u32);
le_bytes!(i64);
le_bytes!(u64);
le_bytes!(f32);
le_bytes!(f64);
