//! The query facade.
//!
//! A [`Query`] coordinates one read or write against an array: it
//! validates the caller's subarray and buffer registrations, routes
//! every engine-facing operation to its [`Reader`] or [`Writer`], and
//! owns the status lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use tessera_error::{tessera_bail, LogExt, QueryError, TesseraResult};
use tessera_schema::ArraySchema;

use crate::buffer::check_var_attr_offsets;
use crate::ops::Span;
use crate::reader::Reader;
use crate::subarray::check_subarray_bounds;
use crate::writer::Writer;
use crate::{
    AttributeBuffer, DataBuffer, FragmentMetadata, Layout, OffsetsBuffer, QueryStatus, QueryType,
    SizeSlot, StorageManager, Subarray,
};

/// The engine behind a query: exactly one of the two concrete variants,
/// fixed at construction by the query type.
enum Engine {
    Read(Reader),
    Write(Writer),
}

type Callback = Box<dyn FnMut() + Send>;

/// A read or write against one array.
///
/// A query is single-threaded: callers that share one instance must
/// serialize access externally. Distinct queries are independent.
pub struct Query {
    query_type: QueryType,
    status: QueryStatus,
    layout: Layout,
    callback: Option<Callback>,
    storage: Arc<StorageManager>,
    engine: Engine,
}

impl Query {
    /// Create a query over `schema`.
    ///
    /// `fragment_metadata` feeds the reader of a [`QueryType::Read`]
    /// query and is ignored for writes.
    pub fn new(
        storage: Arc<StorageManager>,
        query_type: QueryType,
        schema: Arc<ArraySchema>,
        fragment_metadata: Vec<Arc<FragmentMetadata>>,
    ) -> Self {
        let engine = match query_type {
            QueryType::Read => Engine::Read(Reader::new(schema, fragment_metadata)),
            QueryType::Write => Engine::Write(Writer::new(Arc::clone(&storage), schema)),
        };
        Self {
            query_type,
            status: QueryStatus::Uninitialized,
            layout: Layout::RowMajor,
            callback: None,
            storage,
            engine,
        }
    }

    /// Create an independent query sharing only the non-owned references
    /// (schema, storage manager, fragment metadata). Status and layout
    /// are copied. The buffer registry, the subarray and the callback
    /// are not copied; buffers and subarray arrive through
    /// [`merge_from`][Self::merge_from].
    pub fn fork(&self) -> Self {
        let mut fork = Query::new(
            Arc::clone(&self.storage),
            self.query_type,
            Arc::clone(self.array_schema()),
            self.fragment_metadata().to_vec(),
        );
        fork.status = self.status;
        fork.layout = self.layout;
        match &mut fork.engine {
            Engine::Read(reader) => reader.set_layout(self.layout),
            Engine::Write(writer) => writer.set_layout(self.layout),
        }
        fork
    }

    /// The query type, immutable after construction.
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// The current lifecycle status.
    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// The cell layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The array schema the query runs against.
    pub fn array_schema(&self) -> &Arc<ArraySchema> {
        match &self.engine {
            Engine::Read(reader) => reader.schema(),
            Engine::Write(writer) => writer.schema(),
        }
    }

    /// The storage manager the query runs against.
    pub fn storage_manager(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Replace the storage manager reference.
    pub fn set_storage_manager(&mut self, storage: Arc<StorageManager>) {
        if let Engine::Write(writer) = &mut self.engine {
            writer.set_storage(Arc::clone(&storage));
        }
        self.storage = storage;
    }

    /// The names of every attribute with a registered buffer.
    pub fn attributes(&self) -> Vec<String> {
        self.buffers().keys().cloned().collect_vec()
    }

    /// The registered buffers, keyed by attribute name. The handles are
    /// cheap clones sharing the caller's payloads.
    pub fn attribute_buffers(&self) -> BTreeMap<String, AttributeBuffer> {
        self.buffers().clone()
    }

    fn buffers(&self) -> &BTreeMap<String, AttributeBuffer> {
        match &self.engine {
            Engine::Read(reader) => reader.buffers(),
            Engine::Write(writer) => writer.buffers(),
        }
    }

    /// Store the layout and notify the engine.
    pub fn set_layout(&mut self, layout: Layout) -> TesseraResult<()> {
        self.layout = layout;
        match &mut self.engine {
            Engine::Read(reader) => reader.set_layout(layout),
            Engine::Write(writer) => writer.set_layout(layout),
        }
        Ok(())
    }

    /// Register a completion callback, invoked synchronously exactly
    /// once per terminal transition of `process`.
    pub fn set_callback(&mut self, callback: impl FnMut() + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// The installed subarray, if any.
    pub fn subarray(&self) -> Option<&Subarray> {
        match &self.engine {
            Engine::Read(reader) => reader.subarray(),
            Engine::Write(writer) => writer.subarray(),
        }
    }

    /// Install a subarray after validating it against the domain.
    /// `None` selects the entire domain.
    ///
    /// On success the status resets to
    /// [`QueryStatus::Uninitialized`], invalidating any read progress; a
    /// validation failure leaves the query untouched.
    pub fn set_subarray(&mut self, subarray: Option<Subarray>) -> TesseraResult<()> {
        check_subarray_bounds(self.array_schema(), subarray.as_ref())?;
        match &mut self.engine {
            Engine::Read(reader) => reader.set_subarray(subarray),
            Engine::Write(writer) => writer.set_subarray(subarray),
        }
        self.status = QueryStatus::Uninitialized;
        Ok(())
    }

    /// Install a subarray from `2 * dim_num` raw little-endian scalars
    /// of the domain datatype.
    pub fn set_subarray_from_le_bytes(&mut self, raw: Option<&[u8]>) -> TesseraResult<()> {
        let subarray = match raw {
            Some(raw) => Some(Subarray::from_le_bytes(
                self.array_schema().domain().datatype(),
                raw,
            )?),
            None => None,
        };
        self.set_subarray(subarray)
    }

    /// Register a fixed-length attribute buffer with the engine.
    pub fn set_buffer(
        &mut self,
        attribute: &str,
        data: DataBuffer,
        data_size: SizeSlot,
    ) -> TesseraResult<()> {
        match &mut self.engine {
            Engine::Read(reader) => reader.set_buffer(attribute, data, data_size),
            Engine::Write(writer) => writer.set_buffer(attribute, data, data_size),
        }
        .logged()
    }

    /// Register a variable-length attribute buffer with the engine.
    pub fn set_var_buffer(
        &mut self,
        attribute: &str,
        offsets: OffsetsBuffer,
        offsets_size: SizeSlot,
        values: DataBuffer,
        values_size: SizeSlot,
    ) -> TesseraResult<()> {
        match &mut self.engine {
            Engine::Read(reader) => {
                reader.set_var_buffer(attribute, offsets, offsets_size, values, values_size)
            }
            Engine::Write(writer) => {
                writer.set_var_buffer(attribute, offsets, offsets_size, values, values_size)
            }
        }
        .logged()
    }

    /// Validate the offsets contract of a registered variable-length
    /// buffer. An attribute with no variable-length registration fails
    /// with [`QueryError::NullBuffer`].
    pub fn check_var_attr_offsets(&self, attribute: &str) -> TesseraResult<()> {
        match self.buffers().get(attribute) {
            Some(AttributeBuffer::Var {
                offsets,
                offsets_size,
                values: _,
                values_size,
            }) => offsets.with(|offsets| {
                check_var_attr_offsets(offsets, offsets_size.get(), values_size.get())
            }),
            _ => Err(QueryError::NullBuffer.into()).logged(),
        }
    }

    /// Initialize the query.
    ///
    /// Delegates to the engine only from
    /// [`QueryStatus::Uninitialized`]; on any other status this is an
    /// idempotent re-entry that lands on [`QueryStatus::InProgress`].
    pub fn init(&mut self) -> TesseraResult<()> {
        let _span = Span::enter("query::init");
        if self.status == QueryStatus::Uninitialized {
            match &mut self.engine {
                Engine::Read(reader) => reader.init()?,
                Engine::Write(writer) => writer.init()?,
            }
        }
        self.status = QueryStatus::InProgress;
        Ok(())
    }

    /// Run one processing round.
    ///
    /// Fails with [`QueryError::NotInitialized`] before `init`. A
    /// cancelled query is inert: processing it is a no-op returning
    /// `Ok`. An engine error moves the query to
    /// [`QueryStatus::Failed`] and surfaces the error.
    pub fn process(&mut self) -> TesseraResult<()> {
        let _span = Span::enter("query::process");
        match self.status {
            QueryStatus::Uninitialized => {
                return Err(QueryError::NotInitialized.into()).logged();
            }
            QueryStatus::Failed => return Ok(()),
            _ => {}
        }
        self.status = QueryStatus::InProgress;

        let result = match &mut self.engine {
            Engine::Read(reader) => reader.read(),
            Engine::Write(writer) => writer.write(),
        };
        if let Err(err) = result {
            self.status = QueryStatus::Failed;
            return Err(err).logged();
        }

        let completed = match &self.engine {
            Engine::Write(_) => true,
            Engine::Read(reader) => !reader.incomplete(),
        };
        if completed {
            // The callback observes the terminal transition before the
            // caller can observe the status.
            if let Some(callback) = self.callback.as_mut() {
                callback();
            }
            self.status = QueryStatus::Completed;
        } else {
            self.status = QueryStatus::Incomplete;
        }
        Ok(())
    }

    /// Finalize the query. A write commits its staged fragment; an
    /// uninitialized or cancelled query is a no-op returning `Ok`.
    pub fn finalize(&mut self) -> TesseraResult<()> {
        let _span = Span::enter("query::finalize");
        if matches!(
            self.status,
            QueryStatus::Uninitialized | QueryStatus::Failed
        ) {
            return Ok(());
        }
        if let Engine::Write(writer) = &mut self.engine {
            writer.finalize().logged()?;
        }
        self.status = QueryStatus::Completed;
        Ok(())
    }

    /// Cancel the query: best-effort, idempotent, always `Ok`. The
    /// status becomes [`QueryStatus::Failed`]; an engine call already
    /// in flight is not interrupted.
    pub fn cancel(&mut self) -> TesseraResult<()> {
        self.status = QueryStatus::Failed;
        Ok(())
    }

    /// `true` iff a read round has produced cells. Always `false` for
    /// writes and for uninitialized queries.
    pub fn has_results(&self) -> bool {
        if self.status == QueryStatus::Uninitialized {
            return false;
        }
        match &self.engine {
            Engine::Read(reader) => !reader.no_results(),
            Engine::Write(_) => false,
        }
    }

    /// The fragment metadata served by a read. Empty for writes.
    pub fn fragment_metadata(&self) -> &[Arc<FragmentMetadata>] {
        match &self.engine {
            Engine::Read(reader) => reader.fragment_metadata(),
            Engine::Write(_) => &[],
        }
    }

    /// The number of fragments served by a read. Zero for writes.
    pub fn fragment_num(&self) -> usize {
        match &self.engine {
            Engine::Read(reader) => reader.fragment_num(),
            Engine::Write(_) => 0,
        }
    }

    /// The URIs of the fragments served by a read. Empty for writes.
    pub fn fragment_uris(&self) -> Vec<String> {
        match &self.engine {
            Engine::Read(reader) => reader.fragment_uris(),
            Engine::Write(_) => Vec::new(),
        }
    }

    /// The URI of the newest fragment served by a read. `None` for
    /// writes.
    pub fn last_fragment_uri(&self) -> Option<String> {
        match &self.engine {
            Engine::Read(reader) => reader.last_fragment_uri(),
            Engine::Write(_) => None,
        }
    }

    /// Name the fragment a write will commit. Ignored for reads.
    pub fn set_fragment_uri(&mut self, uri: &str) {
        if let Engine::Write(writer) = &mut self.engine {
            writer.set_fragment_uri(uri);
        }
    }

    /// Merge a deserialized donor query into this one: status and
    /// layout are copied, the donor's subarray is re-installed through
    /// the validating path (resetting the status), and the donor's
    /// buffers are merged via [`merge_buffers`][Self::merge_buffers].
    ///
    /// The receiver's schema stays authoritative; the donor's schema
    /// reference is discarded with the donor.
    pub fn merge_from(&mut self, donor: Query) -> TesseraResult<()> {
        let _span = Span::enter("query::merge_from");
        if donor.query_type() != self.query_type {
            tessera_bail!(
                "cannot merge a {} query into a {} query",
                donor.query_type(),
                self.query_type
            );
        }
        self.status = donor.status();
        self.set_layout(donor.layout())?;
        if let Some(subarray) = donor.subarray().cloned() {
            self.set_subarray(Some(subarray))?;
        }
        self.merge_buffers(donor.attribute_buffers())
    }

    /// Merge donor buffers into the registry.
    ///
    /// For an attribute the receiver already has registered, the donor's
    /// payload is copied into the receiver's buffer after a size check;
    /// the donor's transient handles are dropped afterwards. An
    /// attribute new to the receiver has the donor's handles installed
    /// wholesale.
    ///
    /// The merge is not atomic: a size mismatch aborts the loop,
    /// already-merged attributes stay merged, and the donor's remaining
    /// buffers are dropped with the donor.
    pub fn merge_buffers(
        &mut self,
        donor_buffers: BTreeMap<String, AttributeBuffer>,
    ) -> TesseraResult<()> {
        for (name, donor_buffer) in donor_buffers {
            let existing = self.buffers().get(&name).cloned();
            match (existing, donor_buffer) {
                (
                    Some(AttributeBuffer::Fixed { data, data_size }),
                    AttributeBuffer::Fixed {
                        data: donor_data,
                        data_size: donor_size,
                    },
                ) => {
                    if data_size.get() != donor_size.get() {
                        return Err(QueryError::BufferSizeMismatch {
                            existing: data_size.get(),
                            incoming: donor_size.get(),
                        }
                        .into())
                        .logged();
                    }
                    let payload = donor_data.to_vec();
                    data.copy_from(&payload[..donor_size.get() as usize])?;
                }
                (
                    Some(AttributeBuffer::Var {
                        offsets,
                        offsets_size,
                        values,
                        values_size,
                    }),
                    AttributeBuffer::Var {
                        offsets: donor_offsets,
                        offsets_size: donor_offsets_size,
                        values: donor_values,
                        values_size: donor_values_size,
                    },
                ) => {
                    if offsets_size.get() != donor_offsets_size.get() {
                        return Err(QueryError::BufferSizeMismatch {
                            existing: offsets_size.get(),
                            incoming: donor_offsets_size.get(),
                        }
                        .into())
                        .logged();
                    }
                    let donor_payload = donor_offsets.to_vec();
                    offsets.copy_from(&donor_payload[..(donor_offsets_size.get() / 8) as usize])?;

                    if values_size.get() != donor_values_size.get() {
                        return Err(QueryError::BufferSizeMismatch {
                            existing: values_size.get(),
                            incoming: donor_values_size.get(),
                        }
                        .into())
                        .logged();
                    }
                    let donor_payload = donor_values.to_vec();
                    values.copy_from(&donor_payload[..donor_values_size.get() as usize])?;
                }
                (Some(_), _) => {
                    tessera_bail!(
                        "attribute '{}' is registered with a different shape than \
                         the incoming buffer",
                        name
                    );
                }
                (None, donor_buffer) => match &mut self.engine {
                    Engine::Read(reader) => reader.install_buffer(&name, donor_buffer),
                    Engine::Write(writer) => writer.install_buffer(&name, donor_buffer),
                },
            }
        }
        Ok(())
    }

    /// Cells written so far by a write query. Zero for reads.
    pub fn cells_written(&self) -> u64 {
        match &self.engine {
            Engine::Write(writer) => writer.cells_written(),
            Engine::Read(_) => 0,
        }
    }

    /// The URI of the fragment a write committed or will commit. `None`
    /// for reads.
    pub fn fragment_uri(&self) -> Option<&str> {
        match &self.engine {
            Engine::Write(writer) => writer.fragment_uri(),
            Engine::Read(_) => None,
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("query_type", &self.query_type)
            .field("status", &self.status)
            .field("layout", &self.layout)
            .field("attributes", &self.attributes())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
