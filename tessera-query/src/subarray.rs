//! Subarrays and their validation against the array domain.

use tessera_dtype::{
    match_each_numeric_datatype, Datatype, NativeCellType, ToLeBytes, TryFromLeBytes,
};
use tessera_error::{tessera_bail, tessera_err, LogExt, QueryError, TesseraError, TesseraResult};
use tessera_schema::{ArraySchema, Domain};

/// A hyper-rectangle within the array domain: `2 * dim_num` scalars of
/// the domain datatype, where `[2i]` is the inclusive low and `[2i + 1]`
/// the inclusive high of dimension `i`.
///
/// The storage is tagged once per subarray; everything downstream of the
/// tag dispatch operates on a native slice.
#[derive(Debug, Clone, PartialEq)]
pub enum Subarray {
    /// Ranges over an `int8` domain
    Int8(Vec<i8>),
    /// Ranges over a `uint8` domain
    UInt8(Vec<u8>),
    /// Ranges over an `int16` domain
    Int16(Vec<i16>),
    /// Ranges over a `uint16` domain
    UInt16(Vec<u16>),
    /// Ranges over an `int32` domain
    Int32(Vec<i32>),
    /// Ranges over a `uint32` domain
    UInt32(Vec<u32>),
    /// Ranges over an `int64` domain
    Int64(Vec<i64>),
    /// Ranges over a `uint64` domain
    UInt64(Vec<u64>),
    /// Ranges over a `float32` domain
    Float32(Vec<f32>),
    /// Ranges over a `float64` domain
    Float64(Vec<f64>),
}

macro_rules! subarray_conversions {
    ($T:ty, $Arm:tt) => {
        impl From<Vec<$T>> for Subarray {
            fn from(values: Vec<$T>) -> Self {
                Subarray::$Arm(values)
            }
        }

        impl<'a> TryFrom<&'a Subarray> for &'a [$T] {
            type Error = TesseraError;

            fn try_from(subarray: &'a Subarray) -> Result<Self, Self::Error> {
                match subarray {
                    Subarray::$Arm(values) => Ok(values.as_slice()),
                    other => Err(tessera_err!(
                        "cannot view a {} subarray as {}",
                        other.datatype(),
                        <$T as NativeCellType>::DATATYPE
                    )),
                }
            }
        }
    };
}

subarray_conversions!(i8, Int8);
subarray_conversions!(u8, UInt8);
subarray_conversions!(i16, Int16);
subarray_conversions!(u16, UInt16);
subarray_conversions!(i32, Int32);
subarray_conversions!(u32, UInt32);
subarray_conversions!(i64, Int64);
subarray_conversions!(u64, UInt64);
subarray_conversions!(f32, Float32);
subarray_conversions!(f64, Float64);

fn encode<T: NativeCellType>(values: &[T]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<T>());
    for value in values {
        bytes.extend_from_slice(value.to_le_bytes());
    }
    bytes
}

impl Subarray {
    /// The datatype of the stored scalars.
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

    /// The number of stored scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    /// `true` iff no scalars are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of `[lo, hi]` range pairs.
    pub fn num_ranges(&self) -> usize {
        self.len() / 2
    }

    /// Decode `2 * dim_num` little-endian scalars of `datatype`.
    pub fn from_le_bytes(datatype: Datatype, raw: &[u8]) -> TesseraResult<Self> {
        if !datatype.is_numeric() {
            return Err(QueryError::UnsupportedDomainType(datatype.to_string()).into()).logged();
        }
        match_each_numeric_datatype!(datatype, |$T| {
            let width = std::mem::size_of::<$T>();
            if raw.len() % (2 * width) != 0 {
                tessera_bail!(
                    "subarray byte length {} is not a multiple of a {} range width {}",
                    raw.len(),
                    datatype,
                    2 * width
                );
            }
            let values = raw
                .chunks_exact(width)
                .map(<$T>::try_from_le_bytes)
                .collect::<TesseraResult<Vec<_>>>()?;
            Ok(Subarray::from(values))
        })
    }

    /// Encode the scalars in little-endian order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int8(v) => encode(v),
            Self::UInt8(v) => encode(v),
            Self::Int16(v) => encode(v),
            Self::UInt16(v) => encode(v),
            Self::Int32(v) => encode(v),
            Self::UInt32(v) => encode(v),
            Self::Int64(v) => encode(v),
            Self::UInt64(v) => encode(v),
            Self::Float32(v) => encode(v),
            Self::Float64(v) => encode(v),
        }
    }
}

/// Check a subarray against the array domain.
///
/// `None` means "the entire domain" and is always accepted. Domains of
/// non-numeric datatype do not support range comparisons and are
/// rejected with [`QueryError::UnsupportedDomainType`].
pub fn check_subarray_bounds(
    schema: &ArraySchema,
    subarray: Option<&Subarray>,
) -> TesseraResult<()> {
    let Some(subarray) = subarray else {
        return Ok(());
    };
    let domain = schema.domain();
    let datatype = domain.datatype();
    if !datatype.is_numeric() {
        return Err(QueryError::UnsupportedDomainType(datatype.to_string()).into()).logged();
    }
    if subarray.datatype() != datatype {
        tessera_bail!(
            "subarray datatype {} does not match domain datatype {}",
            subarray.datatype(),
            datatype
        );
    }
    if subarray.num_ranges() != domain.dim_num() || subarray.len() % 2 != 0 {
        tessera_bail!(
            "subarray has {} scalars; expected {} (two per dimension)",
            subarray.len(),
            2 * domain.dim_num()
        );
    }
    match_each_numeric_datatype!(datatype, |$T| {
        let ranges: &[$T] = subarray.try_into()?;
        check_bounds_typed(ranges, domain)
    })
}

fn check_bounds_typed<T: NativeCellType>(ranges: &[T], domain: &Domain) -> TesseraResult<()> {
    for (i, dimension) in domain.dimensions().iter().enumerate() {
        let Some(bounds) = dimension.domain() else {
            tessera_bail!("dimension '{}' has no domain", dimension.name());
        };
        let [lo, hi] = bounds.as_pair::<T>()?;
        let (range_lo, range_hi) = (ranges[2 * i], ranges[2 * i + 1]);
        if range_lo < lo || range_hi > hi {
            return Err(QueryError::SubarrayOutOfBounds(format!(
                "range [{}, {}] exceeds domain [{}, {}] on dimension '{}'",
                range_lo,
                range_hi,
                lo,
                hi,
                dimension.name()
            ))
            .into())
            .logged();
        }
        if range_lo > range_hi {
            return Err(QueryError::InvalidSubarrayRange(format!(
                "range [{}, {}] on dimension '{}' is empty",
                range_lo,
                range_hi,
                dimension.name()
            ))
            .into())
            .logged();
        }
    }
    Ok(())
}
