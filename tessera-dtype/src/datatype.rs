//! Datatype tags and tag-directed dispatch.

use std::fmt::{Display, Formatter};

use tessera_error::{tessera_err, TesseraError};

/// The storage datatype of a dimension or attribute.
///
/// The discriminants are stable: they are written to disk and exposed
/// through the C ABI of the wrapping library, so they must never be
/// reordered or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Datatype {
    /// A 32-bit signed integer
    Int32 = 0,
    /// A 64-bit signed integer
    Int64 = 1,
    /// A 32-bit floating point number
    Float32 = 2,
    /// A 64-bit floating point number
    Float64 = 3,
    /// A single byte interpreted as a character
    Char = 4,
    /// An 8-bit signed integer
    Int8 = 5,
    /// An 8-bit unsigned integer
    UInt8 = 6,
    /// A 16-bit signed integer
    Int16 = 7,
    /// A 16-bit unsigned integer
    UInt16 = 8,
    /// A 32-bit unsigned integer
    UInt32 = 9,
    /// A 64-bit unsigned integer
    UInt64 = 10,
    /// ASCII string data
    StringAscii = 11,
    /// UTF-8 string data
    StringUtf8 = 12,
    /// UTF-16 string data
    StringUtf16 = 13,
    /// UTF-32 string data
    StringUtf32 = 14,
    /// UCS-2 string data
    StringUcs2 = 15,
    /// UCS-4 string data
    StringUcs4 = 16,
    /// Untyped payload bytes
    Any = 17,
}

/// Macro to match over each numeric datatype, binding the corresponding
/// native type (from [`NativeCellType`][crate::NativeCellType]).
///
/// Callers must rule out non-numeric tags first; a non-numeric tag
/// reaching the macro is a logic error and panics.
#[macro_export]
macro_rules! match_each_numeric_datatype {
    ($self:expr, | $_:tt $T:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $T:ident ) => ( $($body)* )}
        use $crate::Datatype;
        match $self {
            Datatype::Int8 => __with__! { i8 },
            Datatype::UInt8 => __with__! { u8 },
            Datatype::Int16 => __with__! { i16 },
            Datatype::UInt16 => __with__! { u16 },
            Datatype::Int32 => __with__! { i32 },
            Datatype::UInt32 => __with__! { u32 },
            Datatype::Int64 => __with__! { i64 },
            Datatype::UInt64 => __with__! { u64 },
            Datatype::Float32 => __with__! { f32 },
            Datatype::Float64 => __with__! { f64 },
            other => panic!("unsupported datatype {}", other),
        }
    })
}

/// Macro to match over each integer datatype, binding the corresponding
/// native type (from [`NativeCellType`][crate::NativeCellType]).
#[macro_export]
macro_rules! match_each_integer_datatype {
    ($self:expr, | $_:tt $T:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $T:ident ) => ( $($body)* )}
        use $crate::Datatype;
        match $self {
            Datatype::Int8 => __with__! { i8 },
            Datatype::UInt8 => __with__! { u8 },
            Datatype::Int16 => __with__! { i16 },
            Datatype::UInt16 => __with__! { u16 },
            Datatype::Int32 => __with__! { i32 },
            Datatype::UInt32 => __with__! { u32 },
            Datatype::Int64 => __with__! { i64 },
            Datatype::UInt64 => __with__! { u64 },
            other => panic!("unsupported datatype {}", other),
        }
    })
}

/// Macro to match over each floating point datatype, binding the
/// corresponding native type.
#[macro_export]
macro_rules! match_each_float_datatype {
    ($self:expr, | $_:tt $T:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $T:ident ) => ( $($body)* )}
        use $crate::Datatype;
        match $self {
            Datatype::Float32 => __with__! { f32 },
            Datatype::Float64 => __with__! { f64 },
            other => panic!("unsupported datatype {}", other),
        }
    })
}

impl Datatype {
    /// Returns `true` iff this datatype is a signed integer type.
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Returns `true` iff this datatype is an unsigned integer type.
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// Returns `true` iff this datatype is an integer type.
    pub const fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Returns `true` iff this datatype is a floating point type.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns `true` iff this datatype supports ordered range
    /// comparisons (the ten integer and floating point tags).
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Returns `true` iff this datatype is one of the string tags.
    pub const fn is_string(self) -> bool {
        matches!(
            self,
            Self::StringAscii
                | Self::StringUtf8
                | Self::StringUtf16
                | Self::StringUtf32
                | Self::StringUcs2
                | Self::StringUcs4
        )
    }

    /// Returns the size in bytes of one element of this datatype, or
    /// `None` for [`Datatype::Any`], whose elements have no fixed size.
    pub const fn cell_size(self) -> Option<u64> {
        match self {
            Self::Int8 | Self::UInt8 | Self::Char | Self::StringAscii | Self::StringUtf8 => Some(1),
            Self::Int16 | Self::UInt16 | Self::StringUtf16 | Self::StringUcs2 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::StringUtf32 | Self::StringUcs4 => {
                Some(4)
            }
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::Any => None,
        }
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int32 => write!(f, "int32"),
            Self::Int64 => write!(f, "int64"),
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::Char => write!(f, "char"),
            Self::Int8 => write!(f, "int8"),
            Self::UInt8 => write!(f, "uint8"),
            Self::Int16 => write!(f, "int16"),
            Self::UInt16 => write!(f, "uint16"),
            Self::UInt32 => write!(f, "uint32"),
            Self::UInt64 => write!(f, "uint64"),
            Self::StringAscii => write!(f, "string_ascii"),
            Self::StringUtf8 => write!(f, "string_utf8"),
            Self::StringUtf16 => write!(f, "string_utf16"),
            Self::StringUtf32 => write!(f, "string_utf32"),
            Self::StringUcs2 => write!(f, "string_ucs2"),
            Self::StringUcs4 => write!(f, "string_ucs4"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl TryFrom<u8> for Datatype {
    type Error = TesseraError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Int32,
            1 => Self::Int64,
            2 => Self::Float32,
            3 => Self::Float64,
            4 => Self::Char,
            5 => Self::Int8,
            6 => Self::UInt8,
            7 => Self::Int16,
            8 => Self::UInt16,
            9 => Self::UInt32,
            10 => Self::UInt64,
            11 => Self::StringAscii,
            12 => Self::StringUtf8,
            13 => Self::StringUtf16,
            14 => Self::StringUtf32,
            15 => Self::StringUcs2,
            16 => Self::StringUcs4,
            17 => Self::Any,
            other => return Err(tessera_err!("unknown datatype tag {}", other)),
        })
    }
}
