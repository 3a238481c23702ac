//! Storage engine boundary and the in-memory table store
//!
//! The write path only talks to storage through `StorageEngine`. A batch is
//! applied atomically: it is checked in full before anything is mutated, and
//! the whole mutation happens under one write lock, so readers never observe
//! a partially applied batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stepshard_core::{ColumnId, Error, OperationKind, Result, Step, TableId, TxId, Value};

use crate::read::format_rows;
use crate::schema::{Catalog, TableSchema};

/// Version stamped on every row written by a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowVersion {
    /// Commit step (zero for immediate writes)
    pub step: Step,
    /// Writing transaction
    pub tx_id: TxId,
}

/// One decoded row mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWrite {
    /// Target table
    pub table_id: TableId,
    /// Operation kind
    pub kind: OperationKind,
    /// Primary key values in key order
    pub key: Vec<Value>,
    /// Non-key column values
    pub columns: Vec<(ColumnId, Value)>,
}

impl RowWrite {
    /// Bytes carried by this write
    pub fn size(&self) -> u64 {
        let key: usize = self.key.iter().map(Value::size).sum();
        let columns: usize = self.columns.iter().map(|(_, v)| v.size()).sum();
        (key + columns) as u64
    }
}

/// Row mutations applied as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    /// Version stamped on written rows
    pub version: RowVersion,
    /// Writes in application order
    pub writes: Vec<RowWrite>,
}

/// What a single `RowWrite` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEffect {
    /// Row was written
    Written {
        /// Bytes written
        bytes: u64,
    },
    /// Row was erased (or was already absent)
    Erased,
    /// UPDATE of a missing row; nothing happened
    Skipped,
}

/// A row as returned by a scan, columns in schema order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Values in schema declaration order
    pub values: Vec<Value>,
    /// Version of the last write
    pub version: RowVersion,
}

/// Storage engine used by a shard
///
/// Thread safety: all methods may be called concurrently.
pub trait StorageEngine: Send + Sync {
    /// Register a table
    fn create_table(&self, schema: TableSchema) -> Result<Arc<TableSchema>>;

    /// Look up a table by id
    fn table(&self, id: TableId) -> Option<Arc<TableSchema>>;

    /// Look up a table by path name
    fn table_by_name(&self, name: &str) -> Option<Arc<TableSchema>>;

    /// Apply a batch atomically, returning one effect per write
    ///
    /// # Errors
    ///
    /// Returns an error (and mutates nothing) if any write targets an unknown
    /// table, has a malformed key, or violates a constraint.
    fn apply(&self, batch: &WriteBatch) -> Result<Vec<RowEffect>>;

    /// All rows of a table in primary key order
    fn scan(&self, id: TableId) -> Result<Vec<Row>>;

    /// Render a table as `col = value, ...` lines in key order
    fn read_table(&self, name: &str) -> Result<String> {
        let schema = self
            .table_by_name(name)
            .ok_or_else(|| Error::Scheme(format!("Unknown table {}", name)))?;
        let rows = self.scan(schema.id())?;
        Ok(format_rows(&schema, &rows))
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    values: BTreeMap<ColumnId, Value>,
    version: RowVersion,
}

type TableRows = BTreeMap<Vec<Value>, StoredRow>;

/// In-memory `StorageEngine`
///
/// `BTreeMap` per table keyed by the primary key values, all tables behind a
/// single `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct MemTableStore {
    catalog: Catalog,
    data: RwLock<HashMap<TableId, TableRows>>,
    applied_batches: AtomicU64,
    fail_next_apply: Mutex<Option<String>>,
}

impl MemTableStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches applied so far
    pub fn applied_batches(&self) -> u64 {
        self.applied_batches.load(Ordering::SeqCst)
    }

    /// Number of rows in a table
    pub fn row_count(&self, id: TableId) -> usize {
        self.data.read().get(&id).map(BTreeMap::len).unwrap_or(0)
    }

    /// Make the next `apply` fail with a storage error
    pub fn inject_apply_failure(&self, message: impl Into<String>) {
        *self.fail_next_apply.lock() = Some(message.into());
    }

    fn check(&self, data: &HashMap<TableId, TableRows>, batch: &WriteBatch) -> Result<Vec<RowEffect>> {
        // Existence of keys touched earlier in this batch
        let mut overlay: HashMap<(TableId, &[Value]), bool> = HashMap::new();
        let mut effects = Vec::with_capacity(batch.writes.len());

        for write in &batch.writes {
            let schema = self
                .catalog
                .get(write.table_id)
                .ok_or_else(|| Error::Scheme(format!("Unknown table id {}", write.table_id)))?;
            let rows = data
                .get(&write.table_id)
                .ok_or_else(|| Error::Scheme(format!("Unknown table id {}", write.table_id)))?;
            if write.key.len() != schema.key_columns().len() {
                return Err(Error::InvalidOperation(format!(
                    "Key for table {} has {} values, expected {}",
                    schema.name(),
                    write.key.len(),
                    schema.key_columns().len()
                )));
            }

            let slot = (write.table_id, write.key.as_slice());
            let exists = overlay
                .get(&slot)
                .copied()
                .unwrap_or_else(|| rows.contains_key(&write.key));

            let effect = match write.kind {
                OperationKind::Insert if exists => {
                    return Err(Error::Constraint(format!(
                        "Conflict with existing key in table {}",
                        schema.name()
                    )));
                }
                OperationKind::Update if !exists => RowEffect::Skipped,
                OperationKind::Delete => RowEffect::Erased,
                _ => RowEffect::Written {
                    bytes: write.size(),
                },
            };
            let exists_after = match effect {
                RowEffect::Written { .. } => true,
                RowEffect::Erased => false,
                RowEffect::Skipped => exists,
            };
            overlay.insert(slot, exists_after);
            effects.push(effect);
        }
        Ok(effects)
    }
}

impl StorageEngine for MemTableStore {
    fn create_table(&self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        let schema = self.catalog.register(schema)?;
        self.data.write().insert(schema.id(), BTreeMap::new());
        debug!(target: "stepshard::storage", table = %schema.name(), "Table created");
        Ok(schema)
    }

    fn table(&self, id: TableId) -> Option<Arc<TableSchema>> {
        self.catalog.get(id)
    }

    fn table_by_name(&self, name: &str) -> Option<Arc<TableSchema>> {
        self.catalog.by_name(name)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<Vec<RowEffect>> {
        if let Some(message) = self.fail_next_apply.lock().take() {
            return Err(Error::Storage(message));
        }

        let mut data = self.data.write();
        let effects = self.check(&data, batch)?;

        for (write, effect) in batch.writes.iter().zip(&effects) {
            let Some(rows) = data.get_mut(&write.table_id) else {
                continue;
            };
            match (effect, write.kind) {
                (RowEffect::Skipped, _) => {}
                (RowEffect::Erased, _) => {
                    rows.remove(&write.key);
                }
                (RowEffect::Written { .. }, OperationKind::Upsert | OperationKind::Update) => {
                    let row = rows.entry(write.key.clone()).or_insert_with(|| StoredRow {
                        values: BTreeMap::new(),
                        version: batch.version,
                    });
                    row.version = batch.version;
                    for (column, value) in &write.columns {
                        row.values.insert(*column, value.clone());
                    }
                }
                (RowEffect::Written { .. }, _) => {
                    rows.insert(
                        write.key.clone(),
                        StoredRow {
                            values: write.columns.iter().cloned().collect(),
                            version: batch.version,
                        },
                    );
                }
            }
        }

        self.applied_batches.fetch_add(1, Ordering::SeqCst);
        Ok(effects)
    }

    fn scan(&self, id: TableId) -> Result<Vec<Row>> {
        let schema = self
            .catalog
            .get(id)
            .ok_or_else(|| Error::Scheme(format!("Unknown table id {}", id)))?;
        let data = self.data.read();
        let Some(rows) = data.get(&id) else {
            return Ok(Vec::new());
        };

        let rows = rows
            .iter()
            .map(|(key, stored)| {
                let mut key_values = key.iter();
                let values = schema
                    .columns()
                    .iter()
                    .map(|column| {
                        if column.key {
                            key_values.next().cloned().unwrap_or(Value::Null)
                        } else {
                            stored.values.get(&column.id).cloned().unwrap_or(Value::Null)
                        }
                    })
                    .collect();
                Row {
                    values,
                    version: stored.version,
                }
            })
            .collect();
        Ok(rows)
    }
}
