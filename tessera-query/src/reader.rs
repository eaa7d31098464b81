//! The read engine: drains committed fragments into caller buffers.

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use tessera_error::{LogExt, TesseraError, TesseraResult};
use tessera_schema::ArraySchema;

use crate::buffer::{expect_fixed_attribute, expect_var_attribute};
use crate::fragment::AttributeData;
use crate::{
    AttributeBuffer, DataBuffer, FragmentMetadata, Layout, OffsetsBuffer, SizeSlot, Subarray,
};

fn engine_err(message: String) -> TesseraError {
    TesseraError::Engine(message)
}

/// Serves cells from a set of committed fragments, filling the caller's
/// buffers one round at a time. When a round fills the buffers before
/// the cells run out the reader reports itself incomplete and resumes
/// from its cursor on the next round.
#[derive(Debug)]
pub(crate) struct Reader {
    schema: Arc<ArraySchema>,
    layout: Layout,
    subarray: Option<Subarray>,
    buffers: BTreeMap<String, AttributeBuffer>,
    fragments: Vec<Arc<FragmentMetadata>>,
    /// Per-attribute fragment payloads, concatenated in fragment order
    /// at init time.
    assembled: BTreeMap<String, AttributeData>,
    total_cells: u64,
    cursor: u64,
    emitted: u64,
    incomplete: bool,
    initialized: bool,
}

impl Reader {
    pub(crate) fn new(schema: Arc<ArraySchema>, fragments: Vec<Arc<FragmentMetadata>>) -> Self {
        Self {
            schema,
            layout: Layout::RowMajor,
            subarray: None,
            buffers: BTreeMap::new(),
            fragments,
            assembled: BTreeMap::new(),
            total_cells: 0,
            cursor: 0,
            emitted: 0,
            incomplete: true,
            initialized: false,
        }
    }

    pub(crate) fn schema(&self) -> &Arc<ArraySchema> {
        &self.schema
    }

    pub(crate) fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    pub(crate) fn subarray(&self) -> Option<&Subarray> {
        self.subarray.as_ref()
    }

    pub(crate) fn set_subarray(&mut self, subarray: Option<Subarray>) {
        self.subarray = subarray;
    }

    pub(crate) fn fragment_metadata(&self) -> &[Arc<FragmentMetadata>] {
        &self.fragments
    }

    pub(crate) fn fragment_num(&self) -> usize {
        self.fragments.len()
    }

    pub(crate) fn fragment_uris(&self) -> Vec<String> {
        self.fragments
            .iter()
            .map(|fragment| fragment.uri().to_string())
            .collect_vec()
    }

    pub(crate) fn last_fragment_uri(&self) -> Option<String> {
        self.fragments
            .last()
            .map(|fragment| fragment.uri().to_string())
    }

    /// `true` iff cells remain beyond the reader's cursor.
    pub(crate) fn incomplete(&self) -> bool {
        self.incomplete
    }

    /// `true` iff no read round has produced any cells yet.
    pub(crate) fn no_results(&self) -> bool {
        self.emitted == 0
    }

    pub(crate) fn buffers(&self) -> &BTreeMap<String, AttributeBuffer> {
        &self.buffers
    }

    pub(crate) fn set_buffer(
        &mut self,
        attribute: &str,
        data: DataBuffer,
        data_size: SizeSlot,
    ) -> TesseraResult<()> {
        expect_fixed_attribute(&self.schema, attribute)?;
        self.buffers
            .insert(attribute.to_string(), AttributeBuffer::Fixed { data, data_size });
        Ok(())
    }

    pub(crate) fn set_var_buffer(
        &mut self,
        attribute: &str,
        offsets: OffsetsBuffer,
        offsets_size: SizeSlot,
        values: DataBuffer,
        values_size: SizeSlot,
    ) -> TesseraResult<()> {
        expect_var_attribute(&self.schema, attribute)?;
        self.buffers.insert(
            attribute.to_string(),
            AttributeBuffer::Var {
                offsets,
                offsets_size,
                values,
                values_size,
            },
        );
        Ok(())
    }

    pub(crate) fn install_buffer(&mut self, attribute: &str, buffer: AttributeBuffer) {
        self.buffers.insert(attribute.to_string(), buffer);
    }

    /// Assemble the fragment payloads for every registered attribute and
    /// reset the cursor.
    pub(crate) fn init(&mut self) -> TesseraResult<()> {
        if self.buffers.is_empty() {
            return Err(engine_err(
                "cannot initialize reader; no attribute buffers are set".to_string(),
            ))
            .logged();
        }

        self.total_cells = self.fragments.iter().map(|f| f.cell_num()).sum();
        self.assembled.clear();
        for (name, buffer) in &self.buffers {
            let mut merged = AttributeData {
                data: Vec::new(),
                offsets: buffer.is_var().then(Vec::new),
            };
            for fragment in &self.fragments {
                let Some(part) = fragment.attribute(name) else {
                    return Err(engine_err(format!(
                        "fragment '{}' does not contain attribute '{name}'",
                        fragment.uri()
                    )))
                    .logged();
                };
                match (merged.offsets.as_mut(), part.offsets.as_ref()) {
                    (Some(offsets), Some(part_offsets)) => {
                        let base = merged.data.len() as u64;
                        offsets.extend(part_offsets.iter().map(|offset| offset + base));
                    }
                    (None, None) => {}
                    _ => {
                        return Err(engine_err(format!(
                            "attribute '{name}' is registered with a different \
                             shape than fragment '{}' stores",
                            fragment.uri()
                        )))
                        .logged();
                    }
                }
                merged.data.extend_from_slice(&part.data);
            }
            self.assembled.insert(name.clone(), merged);
        }

        self.cursor = 0;
        self.emitted = 0;
        self.incomplete = self.total_cells > 0;
        self.initialized = true;
        Ok(())
    }

    /// Serve the next round of cells.
    ///
    /// Copies as many cells as every registered buffer can hold, writes
    /// the produced byte counts into the size slots, and advances the
    /// cursor. A round that cannot hold a single cell produces zero
    /// bytes and leaves the reader incomplete.
    pub(crate) fn read(&mut self) -> TesseraResult<()> {
        if !self.initialized {
            return Err(engine_err("reader is not initialized".to_string())).logged();
        }

        let remaining = self.total_cells - self.cursor;
        let mut round_cells = remaining;
        for (name, buffer) in &self.buffers {
            let Some(source) = self.assembled.get(name) else {
                return Err(engine_err(format!("attribute '{name}' was not assembled"))).logged();
            };
            let fits = match buffer {
                AttributeBuffer::Fixed { data, data_size } => {
                    let cell_size = self.fixed_cell_size(name)?;
                    let capacity = data_size.get().min(data.len() as u64);
                    capacity / cell_size
                }
                AttributeBuffer::Var {
                    offsets,
                    offsets_size,
                    values,
                    values_size,
                } => {
                    let Some(source_offsets) = source.offsets.as_deref() else {
                        return Err(engine_err(format!(
                            "attribute '{name}' has no assembled offsets"
                        )))
                        .logged();
                    };
                    let offsets_capacity = (offsets_size.get() / 8).min(offsets.len() as u64);
                    let values_capacity = values_size.get().min(values.len() as u64);
                    let start = byte_offset(source_offsets, source.data.len(), self.cursor);
                    let mut fits = 0u64;
                    while fits < remaining.min(offsets_capacity) {
                        let end =
                            byte_offset(source_offsets, source.data.len(), self.cursor + fits + 1);
                        if end - start > values_capacity {
                            break;
                        }
                        fits += 1;
                    }
                    fits
                }
            };
            round_cells = round_cells.min(fits);
        }

        for (name, buffer) in &self.buffers {
            let Some(source) = self.assembled.get(name) else {
                return Err(engine_err(format!("attribute '{name}' was not assembled"))).logged();
            };
            match buffer {
                AttributeBuffer::Fixed { data, data_size } => {
                    let cell_size = self.fixed_cell_size(name)?;
                    let from = (self.cursor * cell_size) as usize;
                    let to = ((self.cursor + round_cells) * cell_size) as usize;
                    data.copy_from(&source.data[from..to])?;
                    data_size.set(round_cells * cell_size);
                }
                AttributeBuffer::Var {
                    offsets,
                    offsets_size,
                    values,
                    values_size,
                } => {
                    // Checked when sizing the round.
                    let Some(source_offsets) = source.offsets.as_deref() else {
                        return Err(engine_err(format!(
                            "attribute '{name}' has no assembled offsets"
                        )))
                        .logged();
                    };
                    let start = byte_offset(source_offsets, source.data.len(), self.cursor);
                    let end =
                        byte_offset(source_offsets, source.data.len(), self.cursor + round_cells);
                    let rebased: Vec<u64> = source_offsets
                        [self.cursor as usize..(self.cursor + round_cells) as usize]
                        .iter()
                        .map(|offset| offset - start)
                        .collect();
                    offsets.copy_from(&rebased)?;
                    offsets_size.set(round_cells * 8);
                    values.copy_from(&source.data[start as usize..end as usize])?;
                    values_size.set(end - start);
                }
            }
        }

        self.cursor += round_cells;
        self.emitted += round_cells;
        self.incomplete = self.cursor < self.total_cells;
        Ok(())
    }

    fn fixed_cell_size(&self, name: &str) -> TesseraResult<u64> {
        self.schema
            .attribute(name)
            .and_then(|attribute| attribute.cell_size())
            .ok_or_else(|| engine_err(format!("attribute '{name}' has no fixed cell size")))
    }
}

/// The byte position of `cell` within an assembled values payload.
fn byte_offset(offsets: &[u64], data_len: usize, cell: u64) -> u64 {
    offsets
        .get(cell as usize)
        .copied()
        .unwrap_or(data_len as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tessera_dtype::Datatype;
    use tessera_schema::{Attribute, Dimension, Domain};

    use super::*;

    fn schema() -> Arc<ArraySchema> {
        let mut dim = Dimension::new("rows", Datatype::UInt64);
        dim.set_domain_typed(0_u64, 99_u64).unwrap();
        let mut domain = Domain::new(Datatype::UInt64);
        domain.add_dimension(dim).unwrap();
        let mut schema = ArraySchema::new(domain);
        schema
            .add_attribute(Attribute::new("a", Datatype::UInt64))
            .unwrap();
        schema
            .add_attribute(Attribute::new("s", Datatype::StringUtf8).var_sized())
            .unwrap();
        schema.into_shared()
    }

    fn fragment_with_cells(uri: &str, values: &[u64]) -> Arc<FragmentMetadata> {
        let mut fragment = FragmentMetadata::new(uri);
        let mut batch = BTreeMap::new();
        batch.insert(
            "a".to_string(),
            AttributeData {
                data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
                offsets: None,
            },
        );
        fragment.append(values.len() as u64, batch).unwrap();
        Arc::new(fragment)
    }

    #[test]
    fn drains_in_rounds() {
        let cells: Vec<u64> = (0..10).collect();
        let mut reader = Reader::new(schema(), vec![fragment_with_cells("f", &cells)]);

        let data = DataBuffer::zeroed(32); // four cells per round
        let size = SizeSlot::new(32);
        reader.set_buffer("a", data.clone(), size.clone()).unwrap();
        reader.init().unwrap();

        let mut seen = Vec::new();
        let mut rounds = 0;
        loop {
            size.set(32);
            reader.read().unwrap();
            rounds += 1;
            let produced = size.get() as usize;
            let bytes = data.to_vec();
            for chunk in bytes[..produced].chunks_exact(8) {
                seen.push(u64::from_le_bytes(chunk.try_into().unwrap()));
            }
            if !reader.incomplete() {
                break;
            }
        }

        assert_eq!(rounds, 3);
        assert_eq!(seen, cells);
        assert!(!reader.no_results());
    }

    #[test]
    fn concatenates_fragments() {
        let mut reader = Reader::new(
            schema(),
            vec![
                fragment_with_cells("f1", &[1, 2, 3]),
                fragment_with_cells("f2", &[4, 5]),
            ],
        );
        assert_eq!(reader.fragment_num(), 2);
        assert_eq!(reader.fragment_uris(), vec!["f1", "f2"]);
        assert_eq!(reader.last_fragment_uri().as_deref(), Some("f2"));

        let data = DataBuffer::zeroed(64);
        let size = SizeSlot::new(64);
        reader.set_buffer("a", data.clone(), size.clone()).unwrap();
        reader.init().unwrap();
        reader.read().unwrap();

        assert!(!reader.incomplete());
        assert_eq!(size.get(), 40);
        let bytes = data.to_vec();
        let seen: Vec<u64> = bytes[..40]
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn var_attributes_rebase_offsets() {
        let mut fragment = FragmentMetadata::new("f");
        let mut batch = BTreeMap::new();
        batch.insert(
            "s".to_string(),
            AttributeData {
                data: b"aabbbcc".to_vec(),
                offsets: Some(vec![0, 2, 5]),
            },
        );
        fragment.append(3, batch).unwrap();

        let mut reader = Reader::new(schema(), vec![Arc::new(fragment)]);
        let offsets = OffsetsBuffer::zeroed(2);
        let offsets_size = SizeSlot::new(16);
        let values = DataBuffer::zeroed(8);
        let values_size = SizeSlot::new(8);
        reader
            .set_var_buffer(
                "s",
                offsets.clone(),
                offsets_size.clone(),
                values.clone(),
                values_size.clone(),
            )
            .unwrap();
        reader.init().unwrap();

        // Round one: the offsets buffer limits the round to two cells.
        reader.read().unwrap();
        assert!(reader.incomplete());
        assert_eq!(offsets_size.get(), 16);
        assert_eq!(offsets.to_vec(), vec![0, 2]);
        assert_eq!(values_size.get(), 5);
        assert_eq!(&values.to_vec()[..5], b"aabbb");

        // Round two: the final cell.
        offsets_size.set(16);
        values_size.set(8);
        reader.read().unwrap();
        assert!(!reader.incomplete());
        assert_eq!(offsets_size.get(), 8);
        assert_eq!(offsets.to_vec()[..1], [0]);
        assert_eq!(values_size.get(), 2);
        assert_eq!(&values.to_vec()[..2], b"cc");
    }

    #[test]
    fn too_small_buffer_makes_no_progress() {
        let mut reader = Reader::new(schema(), vec![fragment_with_cells("f", &[1, 2])]);
        let data = DataBuffer::zeroed(4); // smaller than one cell
        let size = SizeSlot::new(4);
        reader.set_buffer("a", data, size.clone()).unwrap();
        reader.init().unwrap();

        reader.read().unwrap();
        assert!(reader.incomplete());
        assert_eq!(size.get(), 0);
        assert!(reader.no_results());
    }

    #[test]
    fn empty_fragments_complete_immediately() {
        let mut reader = Reader::new(schema(), Vec::new());
        reader
            .set_buffer("a", DataBuffer::zeroed(8), SizeSlot::new(8))
            .unwrap();
        reader.init().unwrap();
        assert!(!reader.incomplete());
        reader.read().unwrap();
        assert!(!reader.incomplete());
        assert!(reader.no_results());
    }

    #[test]
    fn init_requires_buffers() {
        let mut reader = Reader::new(schema(), Vec::new());
        assert!(reader.init().is_err());
        assert!(reader.read().is_err());
    }
}
