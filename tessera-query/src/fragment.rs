//! In-memory fragment metadata.
//!
//! A fragment is the unit a write commits: a cell count plus the payload
//! written for each attribute. Readers consume committed fragments
//! through the same structure.

use std::collections::BTreeMap;

use tessera_error::{tessera_bail, TesseraResult};

/// The payload one write produced for a single attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct AttributeData {
    /// Raw payload bytes (cell values, or the values of a
    /// variable-length attribute).
    pub(crate) data: Vec<u8>,
    /// Byte offsets of each cell into `data`, present iff the attribute
    /// is variable-length.
    pub(crate) offsets: Option<Vec<u64>>,
}

/// Metadata and payloads of one committed (or staged) fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentMetadata {
    uri: String,
    cell_num: u64,
    attributes: BTreeMap<String, AttributeData>,
}

impl FragmentMetadata {
    pub(crate) fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cell_num: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// The fragment URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The number of cells the fragment holds.
    pub fn cell_num(&self) -> u64 {
        self.cell_num
    }

    /// The names of the attributes the fragment stores.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&AttributeData> {
        self.attributes.get(name)
    }

    /// Append one write batch. The first batch fixes the attribute set;
    /// every later batch must cover the same attributes with the same
    /// fixed/variable shape. Variable-length offsets are rebased onto
    /// the end of the already-staged values.
    pub(crate) fn append(
        &mut self,
        cell_num: u64,
        batch: BTreeMap<String, AttributeData>,
    ) -> TesseraResult<()> {
        if self.attributes.is_empty() {
            self.attributes = batch;
            self.cell_num = cell_num;
            return Ok(());
        }

        if !self.attributes.keys().eq(batch.keys()) {
            tessera_bail!(
                "write batches for fragment '{}' must cover the same attributes",
                self.uri
            );
        }
        for (name, incoming) in batch {
            // Keys were checked above, so the entry exists.
            let Some(existing) = self.attributes.get_mut(&name) else {
                tessera_bail!("fragment '{}' is missing attribute '{}'", self.uri, name);
            };
            match (existing.offsets.as_mut(), incoming.offsets) {
                (Some(offsets), Some(incoming_offsets)) => {
                    let base = existing.data.len() as u64;
                    offsets.extend(incoming_offsets.iter().map(|offset| offset + base));
                    existing.data.extend_from_slice(&incoming.data);
                }
                (None, None) => existing.data.extend_from_slice(&incoming.data),
                _ => tessera_bail!(
                    "attribute '{}' changed between fixed and variable-length \
                     across write batches",
                    name
                ),
            }
        }
        self.cell_num += cell_num;
        Ok(())
    }
}
