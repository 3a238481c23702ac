//! stepshard - the shard side of a distributed write protocol
//!
//! Clients submit row mutations to shards either as single-shard immediate
//! writes or as participants of a multi-shard transaction. A distributed
//! write is prepared on every shard, proposed to a coordinator with the
//! intersection of the shards' step windows, and executed by each shard at
//! the single step the coordinator assigns.
//!
//! # Quick Start
//!
//! ```ignore
//! use stepshard::{ColumnType, Domain, ShardConfig, ShardId, TableId, TableSchema, TxId, WriteMode};
//!
//! let domain = Domain::new(ShardConfig::default())?;
//! domain.add_shard(ShardId(1))?;
//! let table = domain.create_table(
//!     ShardId(1),
//!     TableSchema::builder(TableId(1), "/Root/table-1")
//!         .key_column("key", ColumnType::Uint32)
//!         .column("value", ColumnType::Uint32)
//!         .build()?,
//! )?;
//! let result = domain.write(ShardId(1), stepshard::upsert_request(TxId(100), WriteMode::Immediate, &table, 3)?)?;
//! ```
//!
//! # Architecture
//!
//! - `stepshard-core`: ids, steps and windows, the CELLVEC codec, protocol messages
//! - `stepshard-storage`: table schemas and the in-memory storage engine
//! - `stepshard-concurrency`: payload leases, prepared and pending transactions, result notifier
//! - `stepshard-engine`: shards, coordinator and the `Domain` facade

pub use stepshard_concurrency::{ResultKey, ResultNotifier};
pub use stepshard_core::*;
pub use stepshard_engine::*;
pub use stepshard_storage::{MemTableStore, Row, StorageEngine, TableSchema, TableSchemaBuilder};
