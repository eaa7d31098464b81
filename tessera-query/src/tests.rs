//! End-to-end query scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tessera_dtype::Datatype;
use tessera_error::{QueryError, TesseraError};
use tessera_schema::{ArraySchema, Attribute, Dimension, Domain};

use crate::{
    DataBuffer, Layout, OffsetsBuffer, Query, QueryStatus, QueryType, SizeSlot, StorageManager,
    Subarray,
};

fn int32_schema() -> Arc<ArraySchema> {
    let mut dim = Dimension::new("rows", Datatype::Int32);
    dim.set_domain_typed(0_i32, 9_i32).unwrap();
    let mut domain = Domain::new(Datatype::Int32);
    domain.add_dimension(dim).unwrap();
    let mut schema = ArraySchema::new(domain);
    schema
        .add_attribute(Attribute::new("a", Datatype::Int32))
        .unwrap();
    schema.into_shared()
}

fn uint64_schema() -> Arc<ArraySchema> {
    let mut dim = Dimension::new("rows", Datatype::UInt64);
    dim.set_domain_typed(0_u64, 99_u64).unwrap();
    let mut domain = Domain::new(Datatype::UInt64);
    domain.add_dimension(dim).unwrap();
    let mut schema = ArraySchema::new(domain);
    schema
        .add_attribute(Attribute::new("a", Datatype::UInt64))
        .unwrap();
    schema.into_shared()
}

fn float64_schema() -> Arc<ArraySchema> {
    let mut dim = Dimension::new("x", Datatype::Float64);
    dim.set_domain_typed(0.0_f64, 1.0_f64).unwrap();
    let mut domain = Domain::new(Datatype::Float64);
    domain.add_dimension(dim).unwrap();
    let mut schema = ArraySchema::new(domain);
    schema
        .add_attribute(Attribute::new("a", Datatype::Float64))
        .unwrap();
    schema.into_shared()
}

fn var_schema() -> Arc<ArraySchema> {
    let mut dim = Dimension::new("rows", Datatype::Int32);
    dim.set_domain_typed(0_i32, 9_i32).unwrap();
    let mut domain = Domain::new(Datatype::Int32);
    domain.add_dimension(dim).unwrap();
    let mut schema = ArraySchema::new(domain);
    schema
        .add_attribute(Attribute::new("s", Datatype::StringUtf8).var_sized())
        .unwrap();
    schema.into_shared()
}

fn le_bytes<T: Copy, const N: usize>(values: &[T], encode: impl Fn(T) -> [u8; N]) -> Vec<u8> {
    values.iter().flat_map(|&v| encode(v)).collect()
}

#[test]
fn write_fixed_attribute() {
    let storage = Arc::new(StorageManager::new());
    let mut query = Query::new(
        Arc::clone(&storage),
        QueryType::Write,
        int32_schema(),
        Vec::new(),
    );

    query
        .set_subarray(Some(Subarray::from(vec![0_i32, 9])))
        .unwrap();
    let values: Vec<i32> = (0..10).collect();
    query
        .set_buffer(
            "a",
            DataBuffer::new(le_bytes(&values, i32::to_le_bytes)),
            SizeSlot::new(40),
        )
        .unwrap();

    query.init().unwrap();
    assert_eq!(query.status(), QueryStatus::InProgress);
    query.process().unwrap();
    query.finalize().unwrap();

    assert_eq!(query.status(), QueryStatus::Completed);
    assert_eq!(query.cells_written(), 10);
    assert_eq!(storage.fragment_num(), 1);
    let fragment = &storage.fragments()[0];
    assert_eq!(fragment.cell_num(), 10);
    assert_eq!(
        fragment.attribute("a").unwrap().data,
        le_bytes(&values, i32::to_le_bytes)
    );
    assert_eq!(query.fragment_uri(), Some(fragment.uri()));
}

#[test]
fn read_incomplete_then_complete() {
    let storage = Arc::new(StorageManager::new());
    let schema = uint64_schema();

    // Commit a 100-cell fragment.
    let mut write = Query::new(
        Arc::clone(&storage),
        QueryType::Write,
        Arc::clone(&schema),
        Vec::new(),
    );
    let values: Vec<u64> = (0..100).collect();
    write
        .set_buffer(
            "a",
            DataBuffer::new(le_bytes(&values, u64::to_le_bytes)),
            SizeSlot::new(800),
        )
        .unwrap();
    write.init().unwrap();
    write.process().unwrap();
    write.finalize().unwrap();

    // Read it back five cells at a time.
    let mut read = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        schema,
        storage.fragments(),
    );
    let data = DataBuffer::zeroed(40);
    let size = SizeSlot::new(40);
    read.set_buffer("a", data.clone(), size.clone()).unwrap();

    let completions = Arc::new(AtomicU32::new(0));
    let observer = Arc::clone(&completions);
    read.set_callback(move || {
        observer.fetch_add(1, Ordering::Relaxed);
    });

    read.init().unwrap();

    let mut seen = Vec::new();
    let mut rounds = 0;
    loop {
        size.set(40);
        read.process().unwrap();
        rounds += 1;
        assert_eq!(size.get(), 40, "each full round produces 40 bytes");
        for chunk in data.to_vec()[..size.get() as usize].chunks_exact(8) {
            seen.push(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
        match read.status() {
            QueryStatus::Incomplete => continue,
            QueryStatus::Completed => break,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(rounds, 20);
    assert_eq!(seen, values);
    assert_eq!(completions.load(Ordering::Relaxed), 1);
    assert!(read.has_results());
}

#[test]
fn var_length_round_trip() {
    let storage = Arc::new(StorageManager::new());
    let schema = var_schema();

    let mut write = Query::new(
        Arc::clone(&storage),
        QueryType::Write,
        Arc::clone(&schema),
        Vec::new(),
    );
    write
        .set_var_buffer(
            "s",
            OffsetsBuffer::new(vec![0, 2, 3]),
            SizeSlot::new(24),
            DataBuffer::new(b"hiaworld".to_vec()),
            SizeSlot::new(8),
        )
        .unwrap();
    write.init().unwrap();
    write.process().unwrap();
    write.finalize().unwrap();
    assert_eq!(write.cells_written(), 3);

    let mut read = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        schema,
        storage.fragments(),
    );
    let offsets = OffsetsBuffer::zeroed(3);
    let offsets_size = SizeSlot::new(24);
    let values = DataBuffer::zeroed(8);
    let values_size = SizeSlot::new(8);
    read.set_var_buffer(
        "s",
        offsets.clone(),
        offsets_size.clone(),
        values.clone(),
        values_size.clone(),
    )
    .unwrap();
    read.init().unwrap();
    read.process().unwrap();

    assert_eq!(read.status(), QueryStatus::Completed);
    assert_eq!(offsets_size.get(), 24);
    assert_eq!(offsets.to_vec(), vec![0, 2, 3]);
    assert_eq!(values_size.get(), 8);
    assert_eq!(values.to_vec(), b"hiaworld".to_vec());
}

#[test]
fn var_offsets_rejection_cites_the_offender() {
    let err = crate::check_var_attr_offsets(&[0, 5, 5, 8], 32, 10).unwrap_err();
    let TesseraError::Query(QueryError::InvalidOffsets(message)) = err else {
        panic!("expected InvalidOffsets");
    };
    assert!(message.contains('5'), "message '{message}' cites the repeat");
}

#[test]
fn unregistered_var_attribute_is_a_null_buffer() {
    let query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Read,
        var_schema(),
        Vec::new(),
    );
    let err = query.check_var_attr_offsets("s").unwrap_err();
    assert!(matches!(
        err,
        TesseraError::Query(QueryError::NullBuffer)
    ));
}

#[test]
fn float64_subarray_out_of_bounds_leaves_status() {
    let mut query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Write,
        float64_schema(),
        Vec::new(),
    );
    query
        .set_buffer("a", DataBuffer::zeroed(8), SizeSlot::new(8))
        .unwrap();
    query.init().unwrap();
    assert_eq!(query.status(), QueryStatus::InProgress);

    let err = query
        .set_subarray(Some(Subarray::from(vec![0.5_f64, 1.5])))
        .unwrap_err();
    assert!(matches!(
        err,
        TesseraError::Query(QueryError::SubarrayOutOfBounds(_))
    ));
    // A failed validation never touches the lifecycle.
    assert_eq!(query.status(), QueryStatus::InProgress);
    assert!(query.subarray().is_none());
}

#[test]
fn subarray_install_resets_status() {
    let mut query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Write,
        float64_schema(),
        Vec::new(),
    );
    query
        .set_buffer("a", DataBuffer::zeroed(8), SizeSlot::new(8))
        .unwrap();
    query.init().unwrap();

    query
        .set_subarray(Some(Subarray::from(vec![0.25_f64, 0.75])))
        .unwrap();
    assert_eq!(query.status(), QueryStatus::Uninitialized);

    // Processing now requires a fresh init.
    let err = query.process().unwrap_err();
    assert!(matches!(
        err,
        TesseraError::Query(QueryError::NotInitialized)
    ));
}

#[test]
fn cancel_mid_flight() {
    let storage = Arc::new(StorageManager::new());
    let mut query = Query::new(
        Arc::clone(&storage),
        QueryType::Write,
        int32_schema(),
        Vec::new(),
    );
    query
        .set_buffer("a", DataBuffer::zeroed(40), SizeSlot::new(40))
        .unwrap();
    query.init().unwrap();

    query.cancel().unwrap();
    assert_eq!(query.status(), QueryStatus::Failed);

    // A cancelled query is inert but keeps returning Ok.
    query.process().unwrap();
    assert_eq!(query.status(), QueryStatus::Failed);
    query.finalize().unwrap();
    assert_eq!(query.status(), QueryStatus::Failed);
    assert_eq!(storage.fragment_num(), 0);

    // Idempotent.
    query.cancel().unwrap();
    assert_eq!(query.status(), QueryStatus::Failed);
}

#[test]
fn finalize_uninitialized_is_a_no_op() {
    let mut query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Write,
        int32_schema(),
        Vec::new(),
    );
    query.finalize().unwrap();
    assert_eq!(query.status(), QueryStatus::Uninitialized);
}

#[test]
fn merge_copies_matching_buffers() {
    let schema = int32_schema();
    let storage = Arc::new(StorageManager::new());
    let mut receiver = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        Arc::clone(&schema),
        Vec::new(),
    );
    let receiver_data = DataBuffer::new(vec![0u8; 40]);
    receiver
        .set_buffer("a", receiver_data.clone(), SizeSlot::new(40))
        .unwrap();

    let mut donor = receiver.fork();
    let payload: Vec<u8> = (0..40).collect();
    donor
        .set_buffer("a", DataBuffer::new(payload.clone()), SizeSlot::new(40))
        .unwrap();
    donor
        .set_subarray(Some(Subarray::from(vec![0_i32, 9])))
        .unwrap();

    receiver.merge_from(donor).unwrap();

    assert_eq!(receiver_data.to_vec(), payload);
    assert_eq!(
        receiver.subarray(),
        Some(&Subarray::from(vec![0_i32, 9]))
    );
    // Re-installing the subarray resets the lifecycle.
    assert_eq!(receiver.status(), QueryStatus::Uninitialized);
}

#[test]
fn merge_installs_new_attributes_wholesale() {
    let schema = int32_schema();
    let storage = Arc::new(StorageManager::new());
    let mut receiver = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        Arc::clone(&schema),
        Vec::new(),
    );

    let mut donor = receiver.fork();
    let donor_data = DataBuffer::new(vec![3u8; 40]);
    donor
        .set_buffer("a", donor_data.clone(), SizeSlot::new(40))
        .unwrap();

    receiver.merge_from(donor).unwrap();

    assert_eq!(receiver.attributes(), vec!["a"]);
    // The receiver took over the donor's handle rather than copying.
    donor_data.with_mut(|bytes| bytes[0] = 9);
    let installed = receiver.attribute_buffers();
    let crate::AttributeBuffer::Fixed { data, .. } = installed.get("a").unwrap() else {
        panic!("expected a fixed buffer");
    };
    assert_eq!(data.to_vec()[0], 9);
}

#[test]
fn merge_size_mismatch_leaves_receiver_untouched() {
    let schema = int32_schema();
    let storage = Arc::new(StorageManager::new());
    let mut receiver = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        Arc::clone(&schema),
        Vec::new(),
    );
    let receiver_data = DataBuffer::new(vec![7u8; 40]);
    receiver
        .set_buffer("a", receiver_data.clone(), SizeSlot::new(40))
        .unwrap();

    let mut donor = receiver.fork();
    donor
        .set_buffer("a", DataBuffer::new(vec![9u8; 48]), SizeSlot::new(48))
        .unwrap();

    let err = receiver.merge_from(donor).unwrap_err();
    let TesseraError::Query(QueryError::BufferSizeMismatch { existing, incoming }) = err else {
        panic!("expected BufferSizeMismatch");
    };
    assert_eq!((existing, incoming), (40, 48));
    assert_eq!(receiver_data.to_vec(), vec![7u8; 40]);
}

#[test]
fn merge_rejects_mismatched_query_types() {
    let schema = int32_schema();
    let storage = Arc::new(StorageManager::new());
    let mut receiver = Query::new(
        Arc::clone(&storage),
        QueryType::Read,
        Arc::clone(&schema),
        Vec::new(),
    );
    let donor = Query::new(storage, QueryType::Write, schema, Vec::new());
    assert!(receiver.merge_from(donor).is_err());
}

#[test]
fn one_sided_operations_return_benign_defaults() {
    let storage = Arc::new(StorageManager::new());
    let mut write = Query::new(
        Arc::clone(&storage),
        QueryType::Write,
        int32_schema(),
        Vec::new(),
    );
    assert!(write.fragment_uris().is_empty());
    assert_eq!(write.fragment_num(), 0);
    assert!(write.last_fragment_uri().is_none());
    assert!(write.fragment_metadata().is_empty());
    assert!(!write.has_results());

    let mut read = Query::new(storage, QueryType::Read, int32_schema(), Vec::new());
    // Ignored for reads.
    read.set_fragment_uri("__fragment_1");
    assert!(read.fragment_uri().is_none());
    assert_eq!(read.cells_written(), 0);

    write.set_fragment_uri("__custom");
    assert_eq!(write.fragment_uri(), Some("__custom"));
}

#[test]
fn layout_is_stored_and_forked() {
    let mut query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Read,
        int32_schema(),
        Vec::new(),
    );
    assert_eq!(query.layout(), Layout::RowMajor);
    query.set_layout(Layout::GlobalOrder).unwrap();

    let fork = query.fork();
    assert_eq!(fork.layout(), Layout::GlobalOrder);
    assert_eq!(fork.status(), QueryStatus::Uninitialized);
    assert!(fork.attributes().is_empty());
    assert!(fork.subarray().is_none());
}

#[test]
fn raw_subarray_bytes_are_decoded_against_the_domain_type() {
    let mut query = Query::new(
        Arc::new(StorageManager::new()),
        QueryType::Write,
        int32_schema(),
        Vec::new(),
    );
    let mut raw = 2_i32.to_le_bytes().to_vec();
    raw.extend_from_slice(&7_i32.to_le_bytes());
    query.set_subarray_from_le_bytes(Some(&raw)).unwrap();
    assert_eq!(query.subarray(), Some(&Subarray::from(vec![2_i32, 7])));

    query.set_subarray_from_le_bytes(None).unwrap();
    assert!(query.subarray().is_none());
}
