//! Query lifecycle enumerations.
//!
//! The discriminants of all three enums are stable: they are exposed
//! through the C ABI of the wrapping library.

use std::fmt::{Display, Formatter};

use tessera_error::{tessera_err, TesseraError};

/// Whether a query reads from or writes to the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryType {
    /// The query reads cells from committed fragments.
    Read = 0,
    /// The query writes cells into a new fragment.
    Write = 1,
}

/// The lifecycle status of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryStatus {
    /// The query hit an error or was cancelled.
    Failed = 0,
    /// The query produced every requested cell.
    Completed = 1,
    /// The query is between `init` and a terminal status.
    InProgress = 2,
    /// A read round filled the caller's buffers before draining all
    /// cells; call `process` again with reset buffers.
    Incomplete = 3,
    /// The query has not been initialized.
    Uninitialized = 4,
}

impl QueryStatus {
    /// `true` iff no further processing can change the status without a
    /// reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The order in which cells are materialized or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Layout {
    /// Row-major cell order within the subarray.
    RowMajor = 0,
    /// Column-major cell order within the subarray.
    ColMajor = 1,
    /// The global cell order of the array.
    GlobalOrder = 2,
    /// No prescribed order.
    Unordered = 3,
}

impl Display for QueryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
        }
    }
}

impl Display for QueryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed => write!(f, "FAILED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::InProgress => write!(f, "INPROGRESS"),
            Self::Incomplete => write!(f, "INCOMPLETE"),
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
        }
    }
}

impl Display for Layout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowMajor => write!(f, "ROW_MAJOR"),
            Self::ColMajor => write!(f, "COL_MAJOR"),
            Self::GlobalOrder => write!(f, "GLOBAL_ORDER"),
            Self::Unordered => write!(f, "UNORDERED"),
        }
    }
}

impl TryFrom<u8> for QueryType {
    type Error = TesseraError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            other => Err(tessera_err!("unknown query type tag {}", other)),
        }
    }
}

impl TryFrom<u8> for QueryStatus {
    type Error = TesseraError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Completed),
            2 => Ok(Self::InProgress),
            3 => Ok(Self::Incomplete),
            4 => Ok(Self::Uninitialized),
            other => Err(tessera_err!("unknown query status tag {}", other)),
        }
    }
}

impl TryFrom<u8> for Layout {
    type Error = TesseraError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::RowMajor),
            1 => Ok(Self::ColMajor),
            2 => Ok(Self::GlobalOrder),
            3 => Ok(Self::Unordered),
            other => Err(tessera_err!("unknown layout tag {}", other)),
        }
    }
}
