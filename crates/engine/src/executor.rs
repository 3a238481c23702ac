//! Write Executor
//!
//! Applies decoded row writes to storage as one batch and turns the
//! per-row effects into per-table access statistics.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use stepshard_core::{Error, Result, Step, TableId, TxId, TxStats};
use stepshard_storage::{RowEffect, RowVersion, RowWrite, StorageEngine, TableSchema, WriteBatch};

/// Applies row writes atomically and accounts for them
#[derive(Clone)]
pub struct WriteExecutor {
    storage: Arc<dyn StorageEngine>,
}

impl WriteExecutor {
    /// Executor over `storage`
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        WriteExecutor { storage }
    }

    /// Apply `writes` in order, stamped with `step` and `tx_id`
    ///
    /// Either every write is applied or none is.
    pub fn execute(&self, tx_id: TxId, step: Step, writes: Vec<RowWrite>) -> Result<TxStats> {
        let batch = WriteBatch {
            version: RowVersion { step, tx_id },
            writes,
        };
        let effects = self.storage.apply(&batch)?;

        let mut schemas: HashMap<TableId, Arc<TableSchema>> = HashMap::new();
        let mut stats = TxStats::default();
        for (write, effect) in batch.writes.iter().zip(effects) {
            let schema = match schemas.get(&write.table_id) {
                Some(schema) => Arc::clone(schema),
                None => {
                    let schema = self.storage.table(write.table_id).ok_or_else(|| {
                        Error::Scheme(format!("Unknown table id {}", write.table_id))
                    })?;
                    schemas.insert(write.table_id, Arc::clone(&schema));
                    schema
                }
            };
            let name = schema.name();
            match effect {
                RowEffect::Written { bytes } => stats.record_update(write.table_id, name, bytes),
                RowEffect::Erased => stats.record_erase(write.table_id, name),
                RowEffect::Skipped => stats.touch(write.table_id, name),
            }
        }

        debug!(target: "stepshard::write", tx_id = %tx_id, step = %step, rows = batch.writes.len(), "Batch applied");
        Ok(stats)
    }
}
