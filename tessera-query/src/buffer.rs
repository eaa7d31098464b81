//! Caller-owned I/O buffers and their layout contracts.
//!
//! A query never owns the memory it reads into or writes from. The
//! caller keeps a handle to each payload and registers cheap clones of
//! those handles with the query; sizes travel through a shared
//! [`SizeSlot`] so the engine can report the byte counts it actually
//! produced on a read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tessera_error::{tessera_bail, LogExt, QueryError, TesseraResult};
use tessera_schema::{ArraySchema, Attribute};

/// A shared handle to a caller-owned byte payload.
#[derive(Clone, Debug, Default)]
pub struct DataBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl DataBuffer {
    /// Wrap an owned payload in a shareable handle.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    /// A zero-filled payload of `len` bytes, the usual shape of an
    /// output buffer handed to a read query.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.with(|bytes| bytes.len())
    }

    /// `true` iff the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the payload bytes.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` over the payload bytes mutably.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut guard = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy the payload out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with(|bytes| bytes.to_vec())
    }

    /// Copy `src` over the front of the payload. The payload must be at
    /// least as long as `src`.
    pub(crate) fn copy_from(&self, src: &[u8]) -> TesseraResult<()> {
        self.with_mut(|dst| {
            if dst.len() < src.len() {
                tessera_bail!(
                    "cannot copy {} bytes into a buffer of {} bytes",
                    src.len(),
                    dst.len()
                );
            }
            dst[..src.len()].copy_from_slice(src);
            Ok(())
        })
    }
}

/// A shared handle to a caller-owned offsets payload.
#[derive(Clone, Debug, Default)]
pub struct OffsetsBuffer {
    offsets: Arc<Mutex<Vec<u64>>>,
}

impl OffsetsBuffer {
    /// Wrap an owned offsets payload in a shareable handle.
    pub fn new(offsets: Vec<u64>) -> Self {
        Self {
            offsets: Arc::new(Mutex::new(offsets)),
        }
    }

    /// A zero-filled offsets payload with room for `len` offsets.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u64; len])
    }

    /// The number of offsets the payload can hold.
    pub fn len(&self) -> usize {
        self.with(|offsets| offsets.len())
    }

    /// `true` iff the payload holds no offsets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the offsets.
    pub fn with<R>(&self, f: impl FnOnce(&[u64]) -> R) -> R {
        let guard = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` over the offsets mutably.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<u64>) -> R) -> R {
        let mut guard = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy the offsets out.
    pub fn to_vec(&self) -> Vec<u64> {
        self.with(|offsets| offsets.to_vec())
    }

    /// Copy `src` over the front of the payload.
    pub(crate) fn copy_from(&self, src: &[u64]) -> TesseraResult<()> {
        self.with_mut(|dst| {
            if dst.len() < src.len() {
                tessera_bail!(
                    "cannot copy {} offsets into a buffer holding {}",
                    src.len(),
                    dst.len()
                );
            }
            dst[..src.len()].copy_from_slice(src);
            Ok(())
        })
    }
}

/// The writable size location shared between caller and engine.
///
/// On registration the slot holds the usable byte capacity; after a
/// read round the engine overwrites it with the byte count produced.
#[derive(Clone, Debug, Default)]
pub struct SizeSlot {
    bytes: Arc<AtomicU64>,
}

impl SizeSlot {
    /// A slot holding `bytes`.
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: Arc::new(AtomicU64::new(bytes)),
        }
    }

    /// Read the slot.
    pub fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Overwrite the slot.
    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Relaxed);
    }
}

/// The buffers registered for one attribute.
#[derive(Clone, Debug)]
pub enum AttributeBuffer {
    /// A fixed-length attribute: one payload plus its size slot.
    Fixed {
        /// Payload bytes.
        data: DataBuffer,
        /// Usable payload bytes in; produced payload bytes out.
        data_size: SizeSlot,
    },
    /// A variable-length attribute: offsets into a values payload.
    Var {
        /// Byte offsets of each cell into `values`.
        offsets: OffsetsBuffer,
        /// Usable offsets bytes in; produced offsets bytes out.
        offsets_size: SizeSlot,
        /// Concatenated cell payloads.
        values: DataBuffer,
        /// Usable values bytes in; produced values bytes out.
        values_size: SizeSlot,
    },
}

impl AttributeBuffer {
    /// `true` iff this is a variable-length registration.
    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var { .. })
    }
}

/// Validate the variable-length offsets contract.
///
/// With `n = offsets_size / 8`: an empty offsets buffer is valid; a
/// non-empty one must be strictly ascending with every offset below
/// `values_size`.
pub fn check_var_attr_offsets(
    offsets: &[u64],
    offsets_size: u64,
    values_size: u64,
) -> TesseraResult<()> {
    let num_offsets = (offsets_size / 8) as usize;
    if num_offsets == 0 {
        return Ok(());
    }
    if offsets.len() < num_offsets {
        tessera_bail!(
            "offsets buffer holds {} offsets but offsets_size {} implies {}",
            offsets.len(),
            offsets_size,
            num_offsets
        );
    }

    let mut prev_offset = offsets[0];
    if prev_offset >= values_size {
        return Err(QueryError::InvalidOffsets(format!(
            "offset {} specified for buffer of size {}",
            prev_offset, values_size
        ))
        .into())
        .logged();
    }

    for (i, &offset) in offsets.iter().enumerate().take(num_offsets).skip(1) {
        if offset <= prev_offset {
            return Err(QueryError::InvalidOffsets(format!(
                "offset {} at position {} must be strictly greater than offset {}",
                offset, i, prev_offset
            ))
            .into())
            .logged();
        }
        if offset >= values_size {
            return Err(QueryError::InvalidOffsets(format!(
                "offset {} specified for buffer of size {}",
                offset, values_size
            ))
            .into())
            .logged();
        }
        prev_offset = offset;
    }

    Ok(())
}

/// Look up `name` in the schema, requiring a fixed-length attribute.
pub(crate) fn expect_fixed_attribute<'a>(
    schema: &'a ArraySchema,
    name: &str,
) -> TesseraResult<&'a Attribute> {
    let Some(attribute) = schema.attribute(name) else {
        tessera_bail!("invalid buffer; attribute '{}' does not exist in the array schema", name);
    };
    if attribute.is_var_sized() {
        tessera_bail!(
            "invalid buffer; attribute '{}' is variable-length and requires an offsets buffer",
            name
        );
    }
    Ok(attribute)
}

/// Look up `name` in the schema, requiring a variable-length attribute.
pub(crate) fn expect_var_attribute<'a>(
    schema: &'a ArraySchema,
    name: &str,
) -> TesseraResult<&'a Attribute> {
    let Some(attribute) = schema.attribute(name) else {
        tessera_bail!("invalid buffer; attribute '{}' does not exist in the array schema", name);
    };
    if !attribute.is_var_sized() {
        tessera_bail!("invalid buffer; attribute '{}' is fixed-length", name);
    }
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tessera_error::TesseraError;

    use super::*;

    #[test]
    fn handles_share_state() {
        let data = DataBuffer::new(vec![0u8; 4]);
        let alias = data.clone();
        alias.with_mut(|bytes| bytes[0] = 7);
        assert_eq!(data.to_vec(), vec![7, 0, 0, 0]);

        let size = SizeSlot::new(4);
        let alias = size.clone();
        alias.set(2);
        assert_eq!(size.get(), 2);
    }

    #[test]
    fn copy_from_is_a_prefix_copy() {
        let data = DataBuffer::new(vec![9u8; 4]);
        data.copy_from(&[1, 2]).unwrap();
        assert_eq!(data.to_vec(), vec![1, 2, 9, 9]);
        assert!(data.copy_from(&[0u8; 5]).is_err());
    }

    #[test]
    fn empty_offsets_are_valid() {
        assert!(check_var_attr_offsets(&[], 0, 0).is_ok());
        // Size zero means "no offsets" regardless of the payload length.
        assert!(check_var_attr_offsets(&[0, 1, 2], 0, 10).is_ok());
    }

    #[test]
    fn single_offset_at_values_size_is_rejected() {
        let err = check_var_attr_offsets(&[10], 8, 10).unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Query(QueryError::InvalidOffsets(_))
        ));
    }

    #[rstest]
    #[case(&[0, 5, 5, 8], 10, "5")] // repeated offset
    #[case(&[0, 5, 3, 8], 10, "3")] // descending offset
    #[case(&[0, 5, 8, 12], 10, "12")] // beyond the values buffer
    fn bad_offsets_name_the_offender(
        #[case] offsets: &[u64],
        #[case] values_size: u64,
        #[case] offender: &str,
    ) {
        let err =
            check_var_attr_offsets(offsets, offsets.len() as u64 * 8, values_size).unwrap_err();
        let TesseraError::Query(QueryError::InvalidOffsets(message)) = err else {
            panic!("expected InvalidOffsets, got {err}");
        };
        assert!(
            message.contains(offender),
            "message '{message}' should cite offset {offender}"
        );
        assert!(message.contains(&values_size.to_string()) || message.contains("greater than"));
    }

    #[test]
    fn ascending_offsets_pass() {
        assert!(check_var_attr_offsets(&[0, 3, 5, 9], 32, 10).is_ok());
        // offsets[0] need not be zero
        assert!(check_var_attr_offsets(&[2, 3, 5], 24, 10).is_ok());
        // only the first n offsets are validated
        assert!(check_var_attr_offsets(&[0, 3, 99], 16, 10).is_ok());
    }

    #[test]
    fn randomized_offsets_uphold_the_contract() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..256 {
            let len = rng.gen_range(1..32usize);
            let mut offsets = Vec::with_capacity(len);
            let mut next = 0u64;
            for _ in 0..len {
                offsets.push(next);
                next += rng.gen_range(1..16u64);
            }
            let values_size = offsets.last().unwrap() + rng.gen_range(1..16u64);
            let offsets_size = len as u64 * 8;

            assert!(check_var_attr_offsets(&offsets, offsets_size, values_size).is_ok());

            // Any repeated offset breaks strict ascent.
            if len >= 2 {
                let i = rng.gen_range(1..len);
                let mut broken = offsets.clone();
                broken[i] = broken[i - 1];
                assert!(check_var_attr_offsets(&broken, offsets_size, values_size).is_err());
            }

            // And the last offset never reaches the values size.
            assert!(check_var_attr_offsets(&offsets, offsets_size, *offsets.last().unwrap()).is_err());
        }
    }
}
