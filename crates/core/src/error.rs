//! Error types for the shard write path
//!
//! Layer errors (`CodecError`, `LimitError`) convert into the crate-wide
//! `Error` so lower layers can use `?` freely. The engine turns every `Error`
//! into a `WriteResult` with an explicit status before it leaves a shard.

use thiserror::Error;

use crate::limits::LimitError;

/// Result type alias for stepshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors decoding or encoding a CELLVEC payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer ended before the declared content
    #[error("Payload truncated while reading {0}")]
    Truncated(&'static str),

    /// Declared shape does not match the number of cells
    #[error("Cell matrix declares {rows} rows x {cols} columns but holds {cells} cells")]
    ShapeMismatch {
        /// Declared rows
        rows: u64,
        /// Declared columns
        cols: u64,
        /// Cells actually present
        cells: u64,
    },

    /// Extra bytes after the last cell
    #[error("Payload has {0} trailing bytes after the cell matrix")]
    TrailingBytes(usize),

    /// Fixed-width cell with the wrong width
    #[error("{column_type} cell must be {expected} bytes, got {actual}")]
    CellSize {
        /// Column type name
        column_type: &'static str,
        /// Expected width
        expected: usize,
        /// Actual width
        actual: usize,
    },

    /// Utf8 cell that is not valid UTF-8
    #[error("Utf8 cell holds invalid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced by the write path
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed payload
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Size limit exceeded
    #[error("{0}")]
    Limit(#[from] LimitError),

    /// Request shape is invalid
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Unknown table or column
    #[error("Scheme error: {0}")]
    Scheme(String),

    /// Row-level constraint failed (e.g. INSERT of an existing key)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Storage engine failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Plan arrived for an unknown, expired or already executed transaction
    #[error("Coordination error: {0}")]
    Coordination(String),
}
