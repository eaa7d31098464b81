//! The query core of the tessera array engine.
//!
//! A [`Query`] is the single entry point for reading or writing an
//! array: it validates the caller's subarray and I/O buffer layout
//! against the array schema, routes operations to the read or write
//! engine, and manages the status lifecycle
//! (`UNINITIALIZED → INPROGRESS → {INCOMPLETE, COMPLETED, FAILED}`).
//!
//! The engines here serve cells from in-memory fragments; tile layout,
//! filtering, compression and the I/O pipeline live below this crate.

pub use buffer::{
    check_var_attr_offsets, AttributeBuffer, DataBuffer, OffsetsBuffer, SizeSlot,
};
pub use fragment::FragmentMetadata;
pub use query::Query;
pub use status::{Layout, QueryStatus, QueryType};
pub use storage::StorageManager;
pub use subarray::{check_subarray_bounds, Subarray};

mod buffer;
mod fragment;
mod ops;
mod query;
mod reader;
mod status;
mod storage;
mod subarray;
mod writer;

#[cfg(test)]
mod tests;
