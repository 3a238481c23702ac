//! Core types for the shard write path
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifiers: TxId, ShardId, CoordinatorId, TableId, ColumnId
//! - Step / StepWindow: coordinator timestamps and placement bounds
//! - Cell / Value / ColumnType: untyped payload cells and typed values
//! - CellMatrix: the CELLVEC payload codec
//! - Limits: the row key size threshold
//! - Write protocol messages: WriteRequest, WriteResult, Propose, Plan
//! - Proposal helpers: window intersection across PREPARED results
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod cellvec;
pub mod error;
pub mod limits;
pub mod proposal;
pub mod types;
pub mod write;

pub use cell::{Cell, ColumnType, Value};
pub use cellvec::CellMatrix;
pub use error::{CodecError, Error, Result};
pub use limits::{LimitError, Limits, MAX_WRITE_KEY_SIZE};
pub use proposal::{intersect_windows, ProposeError};
pub use types::{
    ColumnId, CoordinatorId, ShardId, Step, StepWindow, TableId, TabletInfo, TxId, WindowError,
};
pub use write::{
    DataFormat, Issue, IssueSeverity, OperationKind, Plan, Propose, RowOperation,
    TableAccessStats, TxStats, WriteMode, WriteRequest, WriteResult, WriteStatus,
};
