//! The array schema: domain plus attributes.

use std::sync::Arc;

use tessera_error::{tessera_bail, TesseraResult};

use crate::{Attribute, Domain};

/// The immutable description of an array.
///
/// Built once, then shared behind an [`Arc`] by every query that
/// references the array. Queries never mutate a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    domain: Domain,
    attributes: Vec<Attribute>,
}

impl ArraySchema {
    /// Create a schema over the given domain with no attributes yet.
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute. Attribute names must be unique.
    pub fn add_attribute(&mut self, attribute: Attribute) -> TesseraResult<()> {
        if self.attribute(attribute.name()).is_some() {
            tessera_bail!("attribute '{}' already exists in the schema", attribute.name());
        }
        self.attributes.push(attribute);
        Ok(())
    }

    /// Freeze the schema for sharing across queries.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The array domain.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// All attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The number of attributes.
    pub fn attribute_num(&self) -> usize {
        self.attributes.len()
    }
}
