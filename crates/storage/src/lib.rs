//! Storage layer for a shard
//!
//! This crate is the storage engine the write path applies rows to:
//! - TableSchema / Catalog: typed table definitions, looked up by id or path
//! - StorageEngine: the boundary trait the engine depends on
//! - MemTableStore: BTreeMap-per-table store behind one RwLock, atomic
//!   batch application, ordered scans
//! - format_rows: read-back rendering used by end-to-end checks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod read;
pub mod schema;
pub mod store;

pub use read::format_rows;
pub use schema::{Catalog, ColumnSchema, TableSchema, TableSchemaBuilder};
pub use store::{MemTableStore, Row, RowEffect, RowVersion, RowWrite, StorageEngine, WriteBatch};
