//! CELLVEC payload codec
//!
//! A serialized cell matrix is the row content of one write operation.
//!
//! ## Format
//!
//! ```text
//! rows: u32 LE
//! cols: u16 LE
//! rows * cols cells, row-major:
//!   len: u32 LE  (u32::MAX = NULL)
//!   bytes[len]
//! ```

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::cell::Cell;
use crate::error::CodecError;

/// Length marker for a NULL cell
pub const NULL_CELL_LEN: u32 = u32::MAX;

const HEADER_LEN: usize = 6;

/// Row-major matrix of untyped cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMatrix {
    cells: Vec<Cell>,
    rows: u32,
    cols: u16,
}

impl CellMatrix {
    /// Build a matrix from row-major cells
    pub fn new(cells: Vec<Cell>, rows: u32, cols: u16) -> Result<Self, CodecError> {
        let expected = rows as u64 * cols as u64;
        if cells.len() as u64 != expected || (cols == 0 && rows > 0) {
            return Err(CodecError::ShapeMismatch {
                rows: rows as u64,
                cols: cols as u64,
                cells: cells.len() as u64,
            });
        }
        Ok(CellMatrix { cells, rows, cols })
    }

    /// Build a matrix from a list of equally sized rows
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Result<Self, CodecError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let row_count = rows.len();
        let cells: Vec<Cell> = rows.into_iter().flatten().collect();
        if cols > u16::MAX as usize || row_count > u32::MAX as usize {
            return Err(CodecError::ShapeMismatch {
                rows: row_count as u64,
                cols: cols as u64,
                cells: cells.len() as u64,
            });
        }
        CellMatrix::new(cells, row_count as u32, cols as u16)
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows as usize
    }

    /// Number of columns
    pub fn col_count(&self) -> usize {
        self.cols as usize
    }

    /// Iterate rows as cell slices
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.col_count().max(1))
    }

    /// Cell at `(row, col)`
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.row_count() || col >= self.col_count() {
            return None;
        }
        self.cells.get(row * self.col_count() + col)
    }

    /// Serialize into a payload buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let data_len: usize = self.cells.iter().map(|c| 4 + c.size()).sum();
        let mut buf = vec![0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.rows);
        LittleEndian::write_u16(&mut buf[4..6], self.cols);
        buf.reserve(data_len);

        let mut len = [0u8; 4];
        for cell in &self.cells {
            match cell {
                Cell::Null => {
                    LittleEndian::write_u32(&mut len, NULL_CELL_LEN);
                    buf.extend_from_slice(&len);
                }
                Cell::Data(bytes) => {
                    LittleEndian::write_u32(&mut len, bytes.len() as u32);
                    buf.extend_from_slice(&len);
                    buf.extend_from_slice(bytes);
                }
            }
        }
        buf
    }

    /// Consume the matrix, producing its payload buffer
    pub fn release_buffer(self) -> Vec<u8> {
        self.to_bytes()
    }

    /// Parse a payload buffer
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Cursor::new(bytes);
        let rows = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::Truncated("row count"))?;
        let cols = reader
            .read_u16::<LittleEndian>()
            .map_err(|_| CodecError::Truncated("column count"))?;

        // Every cell needs at least its 4-byte length, so a header promising
        // more cells than that is corrupt; reject before allocating.
        let declared = rows as u64 * cols as u64;
        let remaining = (bytes.len() - HEADER_LEN) as u64;
        if declared > remaining / 4 || (cols == 0 && rows > 0) {
            return Err(CodecError::ShapeMismatch {
                rows: rows as u64,
                cols: cols as u64,
                cells: remaining / 4,
            });
        }

        let mut cells = Vec::with_capacity(declared as usize);
        for _ in 0..declared {
            let len = reader
                .read_u32::<LittleEndian>()
                .map_err(|_| CodecError::Truncated("cell length"))?;
            if len == NULL_CELL_LEN {
                cells.push(Cell::Null);
                continue;
            }
            let left = bytes.len() as u64 - reader.position();
            if len as u64 > left {
                return Err(CodecError::Truncated("cell data"));
            }
            let mut data = vec![0u8; len as usize];
            reader
                .read_exact(&mut data)
                .map_err(|_| CodecError::Truncated("cell data"))?;
            cells.push(Cell::Data(data));
        }

        let trailing = bytes.len() - reader.position() as usize;
        if trailing != 0 {
            return Err(CodecError::TrailingBytes(trailing));
        }

        CellMatrix::new(cells, rows, cols)
    }
}
