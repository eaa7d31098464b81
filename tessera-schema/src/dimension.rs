//! Dimensions: named, typed axes of the array domain.

use std::fmt::{Display, Formatter};
use std::io;

use bytes::{Buf, BufMut};
use num_traits::Zero;
use tessera_dtype::{
    match_each_float_datatype, match_each_integer_datatype, match_each_numeric_datatype, CellValue,
    Datatype, NativeCellType, ToLeBytes,
};
use tessera_error::{tessera_bail, LogExt, SchemaError, TesseraResult};

/// The inclusive `[lo, hi]` bounds of one dimension.
///
/// Both endpoints always carry the dimension's datatype tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainBounds {
    lo: CellValue,
    hi: CellValue,
}

impl DomainBounds {
    /// Pair two endpoints. The endpoints must share a datatype; ordering
    /// is validated by [`Dimension::set_domain`], not here.
    pub fn new(lo: CellValue, hi: CellValue) -> TesseraResult<Self> {
        if lo.datatype() != hi.datatype() {
            tessera_bail!(
                "domain endpoints must share a datatype, got {} and {}",
                lo.datatype(),
                hi.datatype()
            );
        }
        Ok(Self { lo, hi })
    }

    /// The datatype of both endpoints.
    pub fn datatype(&self) -> Datatype {
        self.lo.datatype()
    }

    /// The inclusive lower bound.
    pub fn lo(&self) -> CellValue {
        self.lo
    }

    /// The inclusive upper bound.
    pub fn hi(&self) -> CellValue {
        self.hi
    }

    /// Extract both endpoints as the native type `T`.
    pub fn as_pair<T: NativeCellType>(&self) -> TesseraResult<[T; 2]> {
        Ok([T::try_from(self.lo)?, T::try_from(self.hi)?])
    }

    /// The domain range: `hi - lo + 1` for integer datatypes (wrapping,
    /// matching the storage format's modular arithmetic) and `hi - lo`
    /// for floating point datatypes.
    pub fn range(&self) -> TesseraResult<CellValue> {
        let datatype = self.datatype();
        if datatype.is_integer() {
            match_each_integer_datatype!(datatype, |$T| {
                let [lo, hi] = self.as_pair::<$T>()?;
                Ok(CellValue::from(hi.wrapping_sub(lo).wrapping_add(1)))
            })
        } else {
            match_each_float_datatype!(datatype, |$T| {
                let [lo, hi] = self.as_pair::<$T>()?;
                Ok(CellValue::from(hi - lo))
            })
        }
    }
}

impl Display for DomainBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// A dimension of an array domain.
///
/// Created unset, then populated via [`set_domain`][Self::set_domain]
/// and optionally [`set_tile_extent`][Self::set_tile_extent] before the
/// dimension is frozen inside an [`ArraySchema`][crate::ArraySchema].
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    name: String,
    datatype: Datatype,
    domain: Option<DomainBounds>,
    tile_extent: Option<CellValue>,
}

impl Dimension {
    /// Create a new dimension with no domain and no tile extent. An
    /// empty name makes the dimension anonymous.
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            domain: None,
            tile_extent: None,
        }
    }

    /// The dimension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` iff this is an anonymous (unlabeled) dimension.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// The dimension datatype.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// The domain, if set.
    pub fn domain(&self) -> Option<&DomainBounds> {
        self.domain.as_ref()
    }

    /// The tile extent, if set.
    pub fn tile_extent(&self) -> Option<CellValue> {
        self.tile_extent
    }

    /// Set the domain from two consecutive little-endian scalars of the
    /// dimension datatype.
    pub fn set_domain(&mut self, raw: &[u8]) -> TesseraResult<()> {
        if !self.datatype.is_numeric() {
            return Err(SchemaError::UnsupportedDomainType(self.datatype.to_string()).into())
                .logged();
        }
        // Numeric datatypes always have a fixed cell size.
        let width = self.datatype.cell_size().unwrap_or(0) as usize;
        if raw.len() != 2 * width {
            return Err(SchemaError::InvalidDomain(format!(
                "expected {} bytes for a {} domain, got {}",
                2 * width,
                self.datatype,
                raw.len()
            ))
            .into())
            .logged();
        }
        let lo = CellValue::from_le_bytes(self.datatype, &raw[..width])?;
        let hi = CellValue::from_le_bytes(self.datatype, &raw[width..])?;
        self.install_domain(DomainBounds::new(lo, hi)?)
    }

    /// Set the domain from native endpoints.
    pub fn set_domain_typed<T: NativeCellType>(&mut self, lo: T, hi: T) -> TesseraResult<()> {
        if T::DATATYPE != self.datatype {
            return Err(SchemaError::InvalidDomain(format!(
                "endpoint datatype {} does not match dimension datatype {}",
                T::DATATYPE,
                self.datatype
            ))
            .into())
            .logged();
        }
        self.install_domain(DomainBounds::new(lo.into(), hi.into())?)
    }

    fn install_domain(&mut self, bounds: DomainBounds) -> TesseraResult<()> {
        if bounds.lo().is_nan() || bounds.hi().is_nan() {
            return Err(
                SchemaError::InvalidDomain("domain endpoints must not be NaN".to_string()).into(),
            )
            .logged();
        }
        if !bounds.lo().is_finite() || !bounds.hi().is_finite() {
            return Err(
                SchemaError::InvalidDomain("domain endpoints must be finite".to_string()).into(),
            )
            .logged();
        }
        if bounds.lo() > bounds.hi() {
            return Err(SchemaError::InvalidDomain(format!(
                "lower bound {} exceeds upper bound {}",
                bounds.lo(),
                bounds.hi()
            ))
            .into())
            .logged();
        }
        self.domain = Some(bounds);
        Ok(())
    }

    /// Set the tile extent from one little-endian scalar of the
    /// dimension datatype. The domain must be set first.
    pub fn set_tile_extent(&mut self, raw: &[u8]) -> TesseraResult<()> {
        let width = self.datatype.cell_size().unwrap_or(0) as usize;
        if !self.datatype.is_numeric() || raw.len() != width {
            return Err(SchemaError::InvalidTileExtent(format!(
                "expected {} bytes for a {} tile extent, got {}",
                width,
                self.datatype,
                raw.len()
            ))
            .into())
            .logged();
        }
        let extent = CellValue::from_le_bytes(self.datatype, raw)?;
        self.install_tile_extent(extent)
    }

    /// Set the tile extent from a native scalar.
    pub fn set_tile_extent_typed<T: NativeCellType>(&mut self, extent: T) -> TesseraResult<()> {
        if T::DATATYPE != self.datatype {
            return Err(SchemaError::InvalidTileExtent(format!(
                "extent datatype {} does not match dimension datatype {}",
                T::DATATYPE,
                self.datatype
            ))
            .into())
            .logged();
        }
        self.install_tile_extent(extent.into())
    }

    fn install_tile_extent(&mut self, extent: CellValue) -> TesseraResult<()> {
        let Some(bounds) = self.domain else {
            return Err(SchemaError::InvalidTileExtent(
                "domain must be set before the tile extent".to_string(),
            )
            .into())
            .logged();
        };
        match_each_numeric_datatype!(self.datatype, |$T| {
            let extent: $T = extent.try_into()?;
            if extent <= <$T as Zero>::zero() {
                return Err(SchemaError::InvalidTileExtent(format!(
                    "tile extent {} must be greater than zero",
                    extent
                ))
                .into())
                .logged();
            }
            if self.datatype.is_integer() {
                let range: $T = bounds.range()?.try_into()?;
                if extent > range {
                    return Err(SchemaError::InvalidTileExtent(format!(
                        "tile extent {} exceeds the domain range {}",
                        extent, range
                    ))
                    .into())
                    .logged();
                }
            }
            self.tile_extent = Some(CellValue::from(extent));
            Ok(())
        })
    }

    /// If the tile extent is unset, default it to the full domain range.
    pub fn set_null_tile_extent_to_range(&mut self) -> TesseraResult<()> {
        if self.tile_extent.is_some() {
            return Ok(());
        }
        let Some(bounds) = self.domain else {
            return Err(SchemaError::InvalidTileExtent(
                "domain must be set before the tile extent".to_string(),
            )
            .into())
            .logged();
        };
        self.tile_extent = Some(bounds.range()?);
        Ok(())
    }

    /// Serialize into the binary form
    /// `name_len:u32 | name | domain | has_extent:u8 | [extent]`, all
    /// scalars little-endian. The datatype is not written; it is implied
    /// by the containing schema.
    pub fn serialize(&self, buf: &mut impl BufMut) -> TesseraResult<()> {
        let Some(bounds) = &self.domain else {
            tessera_bail!("cannot serialize dimension '{}'; domain is not set", self.name);
        };
        buf.put_u32_le(self.name.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(bounds.lo().to_le_bytes());
        buf.put_slice(bounds.hi().to_le_bytes());
        match &self.tile_extent {
            Some(extent) => {
                buf.put_u8(1);
                buf.put_slice(extent.to_le_bytes());
            }
            None => buf.put_u8(0),
        }
        Ok(())
    }

    /// Deserialize a dimension written by [`serialize`][Self::serialize].
    /// The datatype is supplied externally by the containing schema.
    pub fn deserialize(buf: &mut impl Buf, datatype: Datatype) -> TesseraResult<Self> {
        let width = match datatype.cell_size() {
            Some(width) if datatype.is_numeric() => width as usize,
            _ => {
                return Err(SchemaError::UnsupportedDomainType(datatype.to_string()).into())
                    .logged()
            }
        };

        if buf.remaining() < 4 {
            tessera_bail!("truncated dimension; missing name length");
        }
        let name_len = buf.get_u32_le() as usize;
        if buf.remaining() < name_len {
            tessera_bail!("truncated dimension; missing name bytes");
        }
        let mut name_bytes = vec![0u8; name_len];
        buf.copy_to_slice(&mut name_bytes);
        let name = String::from_utf8(name_bytes)
            .map_err(|e| tessera_error::tessera_err!("dimension name is not UTF-8; {}", e))?;

        let mut dimension = Dimension::new(name, datatype);

        if buf.remaining() < 2 * width {
            tessera_bail!("truncated dimension; missing domain bytes");
        }
        let mut domain_bytes = vec![0u8; 2 * width];
        buf.copy_to_slice(&mut domain_bytes);
        dimension.set_domain(&domain_bytes)?;

        if buf.remaining() < 1 {
            tessera_bail!("truncated dimension; missing tile extent flag");
        }
        match buf.get_u8() {
            0 => {}
            1 => {
                if buf.remaining() < width {
                    tessera_bail!("truncated dimension; missing tile extent bytes");
                }
                let mut extent_bytes = vec![0u8; width];
                buf.copy_to_slice(&mut extent_bytes);
                dimension.set_tile_extent(&extent_bytes)?;
            }
            other => tessera_bail!("corrupt dimension; tile extent flag is {}", other),
        }

        Ok(dimension)
    }

    /// Dump the dimension contents in ASCII form.
    pub fn dump(&self, out: &mut impl io::Write) -> io::Result<()> {
        writeln!(out, "### Dimension ###")?;
        if self.is_anonymous() {
            writeln!(out, "- Name: <anonymous>")?;
        } else {
            writeln!(out, "- Name: {}", self.name)?;
        }
        writeln!(out, "- Type: {}", self.datatype)?;
        match &self.domain {
            Some(bounds) => writeln!(out, "- Domain: {}", bounds)?,
            None => writeln!(out, "- Domain: <unset>")?,
        }
        match &self.tile_extent {
            Some(extent) => writeln!(out, "- Tile extent: {}", extent)?,
            None => writeln!(out, "- Tile extent: <unset>")?,
        }
        Ok(())
    }
}
