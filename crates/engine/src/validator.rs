//! Request validation
//!
//! Turns a `WriteRequest` plus its payload lease into decoded `RowWrite`s,
//! or rejects it as a whole. Validation never touches storage state beyond
//! schema lookups, so a rejected request leaves nothing behind.
//!
//! Row key sizes are checked for every row of every operation before
//! anything is decoded, and each oversized key yields its own issue.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use stepshard_concurrency::PayloadLease;
use stepshard_core::{
    Cell, CellMatrix, DataFormat, Error, Issue, Limits, RowOperation, ShardId, TxId, Value,
    WriteRequest, WriteResult, WriteStatus,
};
use stepshard_storage::{ColumnSchema, RowWrite, StorageEngine, TableSchema};

/// A request refused before execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Failure status
    pub status: WriteStatus,
    /// One issue per violation
    pub issues: Vec<Issue>,
}

impl Rejection {
    /// BAD_REQUEST with a single issue
    pub fn bad_request(message: impl Into<String>) -> Self {
        Rejection {
            status: WriteStatus::BadRequest,
            issues: vec![Issue::error(message)],
        }
    }

    /// Result reported for the rejected request
    pub fn into_result(self, origin: ShardId, tx_id: TxId) -> WriteResult {
        WriteResult::failure(origin, tx_id, self.status, self.issues)
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Rejection {
            status: WriteStatus::from(&err),
            issues: vec![Issue::from(&err)],
        }
    }
}

/// Enforces the serialized row key size threshold
#[derive(Debug, Clone)]
pub struct RowKeyValidator {
    limits: Limits,
}

impl RowKeyValidator {
    /// Validator for the given limits
    pub fn new(limits: Limits) -> Self {
        RowKeyValidator { limits }
    }

    /// Serialized size of a key made of `cells`
    pub fn key_size(cells: &[Cell]) -> usize {
        cells.iter().map(Cell::size).sum()
    }

    /// Check one key, producing the issue to report when it is too large
    pub fn check(&self, cells: &[Cell]) -> Result<(), Issue> {
        self.limits
            .validate_key_size(Self::key_size(cells))
            .map_err(|e| Issue::from(&Error::from(e)))
    }
}

/// Validates and decodes write requests against a shard's tables
pub struct RequestValidator<'a> {
    storage: &'a dyn StorageEngine,
    keys: RowKeyValidator,
}

struct CheckedOperation<'r> {
    op: &'r RowOperation,
    schema: Arc<TableSchema>,
    matrix: CellMatrix,
}

impl<'a> RequestValidator<'a> {
    /// Validator over `storage` with the given limits
    pub fn new(storage: &'a dyn StorageEngine, limits: Limits) -> Self {
        RequestValidator {
            storage,
            keys: RowKeyValidator::new(limits),
        }
    }

    /// Validate every operation of `request` and decode its rows
    ///
    /// Writes are returned in operation order, rows in payload order.
    pub fn validate(
        &self,
        request: &WriteRequest,
        payloads: &PayloadLease,
    ) -> Result<Vec<RowWrite>, Rejection> {
        if request.operations.is_empty() {
            return Err(Rejection::bad_request(format!(
                "Write request for transaction {} has no operations",
                request.tx_id
            )));
        }

        let mut checked = Vec::with_capacity(request.operations.len());
        for op in &request.operations {
            checked.push(self.check_operation(op, payloads)?);
        }

        let key_issues: Vec<Issue> = checked
            .iter()
            .flat_map(|c| {
                let key_len = c.schema.key_columns().len();
                c.matrix.rows().filter_map(move |row| self.keys.check(&row[..key_len]).err())
            })
            .collect();
        if !key_issues.is_empty() {
            warn!(target: "stepshard::write", tx_id = %request.tx_id, violations = key_issues.len(), "Row key size limit exceeded");
            return Err(Rejection {
                status: WriteStatus::BadRequest,
                issues: key_issues,
            });
        }

        let mut writes = Vec::new();
        for c in &checked {
            decode_rows(c, &mut writes)?;
        }
        Ok(writes)
    }

    fn check_operation<'r>(
        &self,
        op: &'r RowOperation,
        payloads: &PayloadLease,
    ) -> Result<CheckedOperation<'r>, Rejection> {
        let schema = self.storage.table(op.table_id).ok_or_else(|| {
            Rejection::from(Error::Scheme(format!("Unknown table id {}", op.table_id)))
        })?;

        if op.format != DataFormat::CellVec {
            return Err(Rejection::bad_request(format!(
                "Unsupported payload format {:?} for table {}, only CELLVEC is accepted",
                op.format,
                schema.name()
            )));
        }

        check_columns(&schema, op)?;

        let bytes = payloads.get(op.payload_index).map_err(Error::from)?;
        let matrix = CellMatrix::from_bytes(bytes).map_err(Error::from)?;
        if matrix.row_count() > 0 && matrix.col_count() != op.column_ids.len() {
            return Err(Rejection::bad_request(format!(
                "Payload has {} columns but the operation lists {} column ids",
                matrix.col_count(),
                op.column_ids.len()
            )));
        }

        Ok(CheckedOperation { op, schema, matrix })
    }
}

/// Column ids must exist, be unique, and start with the key columns in key
/// order. DELETE carries key columns only.
fn check_columns(schema: &TableSchema, op: &RowOperation) -> Result<(), Rejection> {
    let key_columns = schema.key_columns();
    if op.column_ids.len() < key_columns.len()
        || op.column_ids[..key_columns.len()] != key_columns[..]
    {
        return Err(Rejection::bad_request(format!(
            "Operation on table {} must list the key columns {:?} first, got {:?}",
            schema.name(),
            key_columns.iter().map(|id| id.get()).collect::<Vec<_>>(),
            op.column_ids.iter().map(|id| id.get()).collect::<Vec<_>>()
        )));
    }

    let mut seen = HashSet::new();
    for id in &op.column_ids {
        if schema.column(*id).is_none() {
            return Err(Rejection::bad_request(format!(
                "Unknown column id {} in table {}",
                id,
                schema.name()
            )));
        }
        if !seen.insert(*id) {
            return Err(Rejection::bad_request(format!(
                "Column id {} is listed twice for table {}",
                id,
                schema.name()
            )));
        }
    }

    if op.kind.is_erase() && op.column_ids.len() != key_columns.len() {
        return Err(Rejection::bad_request(format!(
            "Erase on table {} must carry key columns only",
            schema.name()
        )));
    }
    Ok(())
}

fn decode_rows(checked: &CheckedOperation<'_>, out: &mut Vec<RowWrite>) -> Result<(), Rejection> {
    let columns: Vec<&ColumnSchema> = checked
        .op
        .column_ids
        .iter()
        .filter_map(|id| checked.schema.column(*id))
        .collect();
    let key_len = checked.schema.key_columns().len();

    for row in checked.matrix.rows() {
        let mut values = Vec::with_capacity(row.len());
        for (cell, column) in row.iter().zip(&columns) {
            let value = Value::decode(cell, column.column_type).map_err(|e| {
                Rejection::bad_request(format!(
                    "Column '{}' of table {}: {}",
                    column.name,
                    checked.schema.name(),
                    e
                ))
            })?;
            values.push(value);
        }
        let columns = values
            .split_off(key_len)
            .into_iter()
            .zip(&checked.op.column_ids[key_len..])
            .map(|(value, id)| (*id, value))
            .collect();
        out.push(RowWrite {
            table_id: checked.schema.id(),
            kind: checked.op.kind,
            key: values,
            columns,
        });
    }
    Ok(())
}
