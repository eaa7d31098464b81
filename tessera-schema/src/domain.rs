//! The array domain: an ordered sequence of dimensions.

use tessera_dtype::Datatype;
use tessera_error::{tessera_bail, TesseraResult};

use crate::Dimension;

/// The coordinate space of an array. All dimensions share one datatype,
/// the domain type.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    datatype: Datatype,
    dimensions: Vec<Dimension>,
}

impl Domain {
    /// Create an empty domain of the given datatype.
    pub fn new(datatype: Datatype) -> Self {
        Self {
            datatype,
            dimensions: Vec::new(),
        }
    }

    /// The shared datatype of every dimension.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Append a dimension. The dimension must carry the domain datatype
    /// and an installed domain range.
    pub fn add_dimension(&mut self, dimension: Dimension) -> TesseraResult<()> {
        if dimension.datatype() != self.datatype {
            tessera_bail!(
                "cannot add dimension '{}' of type {} to a {} domain",
                dimension.name(),
                dimension.datatype(),
                self.datatype
            );
        }
        if dimension.domain().is_none() {
            tessera_bail!(
                "cannot add dimension '{}'; its domain is not set",
                dimension.name()
            );
        }
        self.dimensions.push(dimension);
        Ok(())
    }

    /// The number of dimensions.
    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    /// The `i`-th dimension, if any.
    pub fn dimension(&self, i: usize) -> Option<&Dimension> {
        self.dimensions.get(i)
    }

    /// All dimensions in order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }
}
