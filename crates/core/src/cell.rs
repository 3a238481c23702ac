//! Cells, column types and typed values
//!
//! A `Cell` is the untyped unit carried in a write payload: a byte string or
//! NULL. It only acquires meaning when decoded against a column's
//! `ColumnType`, producing a `Value`. Key ordering in storage is the
//! derived ordering of `Value`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 32-bit unsigned integer, 4 bytes little-endian
    Uint32,
    /// 64-bit unsigned integer, 8 bytes little-endian
    Uint64,
    /// UTF-8 string
    Utf8,
}

impl ColumnType {
    /// Encoded width for fixed-size types
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ColumnType::Uint32 => Some(4),
            ColumnType::Uint64 => Some(8),
            ColumnType::Utf8 => None,
        }
    }

    /// Type name as written in schemas
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Uint32 => "Uint32",
            ColumnType::Uint64 => "Uint64",
            ColumnType::Utf8 => "Utf8",
        }
    }

    /// Parse a schema type name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Uint32" => Some(ColumnType::Uint32),
            "Uint64" => Some(ColumnType::Uint64),
            "Utf8" => Some(ColumnType::Utf8),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Untyped payload cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Absent value
    Null,
    /// Raw bytes
    Data(Vec<u8>),
}

impl Cell {
    /// Cell holding a little-endian `u32`
    pub fn from_u32(v: u32) -> Self {
        Cell::Data(v.to_le_bytes().to_vec())
    }

    /// Cell holding a little-endian `u64`
    pub fn from_u64(v: u64) -> Self {
        Cell::Data(v.to_le_bytes().to_vec())
    }

    /// Cell holding UTF-8 bytes
    pub fn from_string(s: &str) -> Self {
        Cell::Data(s.as_bytes().to_vec())
    }

    /// Cell holding arbitrary bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Cell::Data(bytes.into())
    }

    /// Data size in bytes; NULL counts as zero
    pub fn size(&self) -> usize {
        match self {
            Cell::Null => 0,
            Cell::Data(bytes) => bytes.len(),
        }
    }

    /// True for NULL cells
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Raw bytes, `None` for NULL
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cell::Null => None,
            Cell::Data(bytes) => Some(bytes),
        }
    }
}

/// Typed column value
///
/// Ordering is the storage key order: NULL sorts first, integers
/// numerically, strings bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// NULL
    Null,
    /// Uint32 value
    Uint32(u32),
    /// Uint64 value
    Uint64(u64),
    /// Utf8 value
    Utf8(String),
}

impl Value {
    /// Decode a cell according to the column type
    pub fn decode(cell: &Cell, column_type: ColumnType) -> Result<Value, CodecError> {
        let bytes = match cell {
            Cell::Null => return Ok(Value::Null),
            Cell::Data(bytes) => bytes,
        };

        if let Some(expected) = column_type.fixed_size() {
            if bytes.len() != expected {
                return Err(CodecError::CellSize {
                    column_type: column_type.name(),
                    expected,
                    actual: bytes.len(),
                });
            }
        }

        match column_type {
            ColumnType::Uint32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                Ok(Value::Uint32(u32::from_le_bytes(raw)))
            }
            ColumnType::Uint64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(Value::Uint64(u64::from_le_bytes(raw)))
            }
            ColumnType::Utf8 => String::from_utf8(bytes.clone())
                .map(Value::Utf8)
                .map_err(|_| CodecError::InvalidUtf8),
        }
    }

    /// Encode back into an untyped cell
    pub fn to_cell(&self) -> Cell {
        match self {
            Value::Null => Cell::Null,
            Value::Uint32(v) => Cell::from_u32(*v),
            Value::Uint64(v) => Cell::from_u64(*v),
            Value::Utf8(s) => Cell::from_string(s),
        }
    }

    /// True for NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Encoded data size in bytes
    pub fn size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Uint32(_) => 4,
            Value::Uint64(_) => 8,
            Value::Utf8(s) => s.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Uint32(v) => write!(f, "{}", v),
            Value::Uint64(v) => write!(f, "{}", v),
            Value::Utf8(s) => f.write_str(s),
        }
    }
}
