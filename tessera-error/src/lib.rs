//! Error types shared across the tessera workspace.
//!
//! Schema construction and query execution each have a structured error
//! kind; everything else funnels through [`TesseraError`]. Fallible
//! functions across the workspace return [`TesseraResult`].

use thiserror::Error;

/// The result type used throughout tessera.
pub type TesseraResult<T> = Result<T, TesseraError>;

/// Errors raised while building or validating an array schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The dimension domain is malformed (inverted bounds, non-finite
    /// endpoints, or a byte payload of the wrong width).
    #[error("invalid domain; {0}")]
    InvalidDomain(String),

    /// The tile extent is non-positive, exceeds the domain range, or was
    /// set before the domain.
    #[error("invalid tile extent; {0}")]
    InvalidTileExtent(String),

    /// The operation requires an ordered numeric domain type.
    #[error("unsupported domain type {0}")]
    UnsupportedDomainType(String),
}

/// Errors raised while configuring or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `process` was called before `init`.
    #[error("cannot process query; query is not initialized")]
    NotInitialized,

    /// The query has no array schema to validate against.
    #[error("cannot check subarray; array schema not set")]
    SchemaNotSet,

    /// A variable-length attribute is missing one of its buffers.
    #[error("cannot use null offset buffers")]
    NullBuffer,

    /// The offsets buffer violates the variable-length layout contract.
    #[error("invalid offsets; {0}")]
    InvalidOffsets(String),

    /// A subarray range falls outside the dimension domain.
    #[error("subarray out of bounds; {0}")]
    SubarrayOutOfBounds(String),

    /// A subarray range has its lower bound above its upper bound.
    #[error("subarray lower bound is larger than upper bound; {0}")]
    InvalidSubarrayRange(String),

    /// A buffer merge found differently sized buffers for one attribute.
    #[error(
        "existing buffer in query object is a different size ({existing}) \
         vs new query object buffer size ({incoming})"
    )]
    BufferSizeMismatch {
        /// Size in bytes of the buffer already registered on the receiver.
        existing: u64,
        /// Size in bytes of the incoming buffer.
        incoming: u64,
    },

    /// The domain type does not support ordered range comparisons.
    #[error("unsupported domain type {0}")]
    UnsupportedDomainType(String),
}

/// The unified error type for the tessera workspace.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// A schema-level validation failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A query-level validation or lifecycle failure.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// An error surfaced verbatim from a reader or writer engine.
    #[error("engine error; {0}")]
    Engine(String),

    /// An I/O error from the storage layer.
    #[error("I/O error; {0}")]
    Io(#[from] std::io::Error),

    /// A malformed argument that has no more specific kind.
    #[error("invalid argument; {0}")]
    InvalidArgument(String),
}

/// Construct a [`TesseraError::InvalidArgument`] from format arguments.
#[macro_export]
macro_rules! tessera_err {
    ($($tt:tt)+) => {
        $crate::TesseraError::InvalidArgument(format!($($tt)+))
    };
}

/// Return early with a [`TesseraError::InvalidArgument`].
#[macro_export]
macro_rules! tessera_bail {
    ($($tt:tt)+) => {
        return Err($crate::tessera_err!($($tt)+).into())
    };
}

/// Extension trait that emits an error to the log sink as it is handed
/// back to the caller. The error value is never altered.
pub trait LogExt {
    /// Log the contained error, if any, and pass `self` through.
    fn logged(self) -> Self;
}

impl<T> LogExt for TesseraResult<T> {
    fn logged(self) -> Self {
        if let Err(err) = &self {
            log::debug!("{err}");
        }
        self
    }
}
