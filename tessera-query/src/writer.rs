//! The write engine: stages cells into a fragment and commits it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_error::{LogExt, TesseraError, TesseraResult};
use tessera_schema::ArraySchema;

use crate::buffer::{check_var_attr_offsets, expect_fixed_attribute, expect_var_attribute};
use crate::fragment::AttributeData;
use crate::{
    AttributeBuffer, DataBuffer, FragmentMetadata, Layout, OffsetsBuffer, SizeSlot,
    StorageManager, Subarray,
};

fn engine_err(message: String) -> TesseraError {
    TesseraError::Engine(message)
}

/// Writes caller buffers into a staged fragment and commits the
/// fragment on finalize. Tile layout, filtering and compression happen
/// below this engine and are not its concern.
#[derive(Debug)]
pub(crate) struct Writer {
    storage: Arc<StorageManager>,
    schema: Arc<ArraySchema>,
    layout: Layout,
    subarray: Option<Subarray>,
    buffers: BTreeMap<String, AttributeBuffer>,
    fragment_uri: Option<String>,
    staged: Option<FragmentMetadata>,
    cells_written: u64,
    initialized: bool,
}

impl Writer {
    pub(crate) fn new(storage: Arc<StorageManager>, schema: Arc<ArraySchema>) -> Self {
        Self {
            storage,
            schema,
            layout: Layout::RowMajor,
            subarray: None,
            buffers: BTreeMap::new(),
            fragment_uri: None,
            staged: None,
            cells_written: 0,
            initialized: false,
        }
    }

    pub(crate) fn schema(&self) -> &Arc<ArraySchema> {
        &self.schema
    }

    pub(crate) fn set_storage(&mut self, storage: Arc<StorageManager>) {
        self.storage = storage;
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

    pub(crate) fn fragment_uri(&self) -> Option<&str> {
        self.fragment_uri.as_deref()
    }

    pub(crate) fn set_fragment_uri(&mut self, uri: impl Into<String>) {
        self.fragment_uri = Some(uri.into());
    }

    pub(crate) fn cells_written(&self) -> u64 {
        self.cells_written
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

    pub(crate) fn init(&mut self) -> TesseraResult<()> {
        if self.buffers.is_empty() {
            return Err(engine_err(
                "cannot initialize writer; no attribute buffers are set".to_string(),
            ))
            .logged();
        }
        self.initialized = true;
        Ok(())
    }

    /// Snapshot every registered buffer into the staged fragment.
    ///
    /// All buffers must agree on the number of cells they carry; a write
    /// completes in a single round.
    pub(crate) fn write(&mut self) -> TesseraResult<()> {
        if !self.initialized {
            return Err(engine_err("writer is not initialized".to_string())).logged();
        }

        let mut batch = BTreeMap::new();
        let mut batch_cells: Option<u64> = None;
        for (name, buffer) in &self.buffers {
            let Some(attribute) = self.schema.attribute(name) else {
                return Err(engine_err(format!(
                    "attribute '{name}' is not part of the array schema"
                )))
                .logged();
            };
            let (cells, payload) = match buffer {
                AttributeBuffer::Fixed { data, data_size } => {
                    let size = data_size.get();
                    let Some(cell_size) = attribute.cell_size() else {
                        return Err(engine_err(format!(
                            "attribute '{name}' has no fixed cell size"
                        )))
                        .logged();
                    };
                    if size % cell_size != 0 {
                        return Err(engine_err(format!(
                            "buffer size {size} for attribute '{name}' is not a \
                             multiple of the cell size {cell_size}"
                        )))
                        .logged();
                    }
                    let bytes = data.with(|bytes| -> TesseraResult<Vec<u8>> {
                        if (size as usize) > bytes.len() {
                            return Err(engine_err(format!(
                                "buffer for attribute '{name}' claims {size} bytes \
                                 but holds {}",
                                bytes.len()
                            )));
                        }
                        Ok(bytes[..size as usize].to_vec())
                    })?;
                    (
                        size / cell_size,
                        AttributeData {
                            data: bytes,
                            offsets: None,
                        },
                    )
                }
                AttributeBuffer::Var {
                    offsets,
                    offsets_size,
                    values,
                    values_size,
                } => {
                    let staged_offsets = offsets.with(|offsets| -> TesseraResult<Vec<u64>> {
                        check_var_attr_offsets(offsets, offsets_size.get(), values_size.get())?;
                        let num_offsets = (offsets_size.get() / 8) as usize;
                        Ok(offsets[..num_offsets].to_vec())
                    })?;
                    let size = values_size.get();
                    let bytes = values.with(|bytes| -> TesseraResult<Vec<u8>> {
                        if (size as usize) > bytes.len() {
                            return Err(engine_err(format!(
                                "values buffer for attribute '{name}' claims {size} \
                                 bytes but holds {}",
                                bytes.len()
                            )));
                        }
                        Ok(bytes[..size as usize].to_vec())
                    })?;
                    (
                        staged_offsets.len() as u64,
                        AttributeData {
                            data: bytes,
                            offsets: Some(staged_offsets),
                        },
                    )
                }
            };
            match batch_cells {
                None => batch_cells = Some(cells),
                Some(previous) if previous != cells => {
                    return Err(engine_err(format!(
                        "attribute buffers disagree on the cell count \
                         ({previous} vs {cells} for '{name}')"
                    )))
                    .logged();
                }
                Some(_) => {}
            }
            batch.insert(name.clone(), payload);
        }

        let cells = batch_cells.unwrap_or(0);
        if self.staged.is_none() {
            let uri = self
                .fragment_uri
                .clone()
                .unwrap_or_else(|| self.storage.generate_fragment_uri());
            self.staged = Some(FragmentMetadata::new(uri));
        }
        // Staged above, so the entry exists.
        if let Some(staged) = self.staged.as_mut() {
            staged.append(cells, batch)?;
        }
        self.cells_written += cells;
        Ok(())
    }

    /// Commit the staged fragment, if any. Safe to call repeatedly.
    pub(crate) fn finalize(&mut self) -> TesseraResult<()> {
        if let Some(staged) = self.staged.take() {
            let committed = self.storage.commit_fragment(staged)?;
            self.fragment_uri = Some(committed.uri().to_string());
        }
        Ok(())
    }
}
