//! Write protocol messages
//!
//! - WriteRequest / RowOperation: what a client submits to a shard
//! - WriteResult / WriteStatus / Issue / TxStats: what the shard reports
//! - Propose: client → coordinator, naming participants and the step window
//! - Plan: coordinator → shard, carrying the assigned step
//!
//! Row content travels out of band in the request's payload list; an
//! operation only references its payload by index.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::types::{ColumnId, CoordinatorId, ShardId, Step, StepWindow, TableId, TabletInfo, TxId};

/// How the shard should execute a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMode {
    /// Execute now on this shard only, report `Step = 0`
    Immediate,
    /// Validate and park the operations until a coordinator plans a step
    Prepare,
}

/// Row operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Insert the row or update the given columns of an existing row
    Upsert,
    /// Overwrite the whole row; columns not written become NULL
    Replace,
    /// Insert a new row; fails if the key already exists
    Insert,
    /// Update the given columns of existing rows; missing rows are skipped
    Update,
    /// Erase rows; the payload carries key columns only
    Delete,
}

impl OperationKind {
    /// True for kinds that only carry key columns
    pub fn is_erase(self) -> bool {
        matches!(self, OperationKind::Delete)
    }
}

/// Encoding of an operation's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    /// Serialized cell matrix (`CellMatrix`)
    CellVec,
    /// Arrow record batch; not accepted by this write path
    Arrow,
}

/// A single row-level operation against one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOperation {
    /// Operation kind
    pub kind: OperationKind,
    /// Target table
    pub table_id: TableId,
    /// Columns present in each payload row, key columns first
    pub column_ids: Vec<ColumnId>,
    /// Index into the request's payload list
    pub payload_index: usize,
    /// Payload encoding
    pub format: DataFormat,
}

/// A write submitted to one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Transaction id, also reported as the order id
    pub tx_id: TxId,
    /// Execution mode
    pub mode: WriteMode,
    /// Operations, applied in order
    pub operations: Vec<RowOperation>,
    /// Payload blobs referenced by `RowOperation::payload_index`
    pub payloads: Vec<Vec<u8>>,
}

impl WriteRequest {
    /// Empty request
    pub fn new(tx_id: TxId, mode: WriteMode) -> Self {
        WriteRequest {
            tx_id,
            mode,
            operations: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Register a payload blob and return its index
    pub fn add_data_to_payload(&mut self, data: Vec<u8>) -> usize {
        self.payloads.push(data);
        self.payloads.len() - 1
    }

    /// Append an operation
    pub fn add_operation(
        &mut self,
        kind: OperationKind,
        table_id: TableId,
        column_ids: Vec<ColumnId>,
        payload_index: usize,
        format: DataFormat,
    ) -> &mut Self {
        self.operations.push(RowOperation {
            kind,
            table_id,
            column_ids,
            payload_index,
            format,
        });
        self
    }
}

/// Outcome of a write or of a planned execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteStatus {
    /// Rows are durably applied and visible
    Completed,
    /// Operations are parked awaiting a plan
    Prepared,
    /// Request is malformed or violates a limit
    BadRequest,
    /// Request references an unknown table or column
    SchemeError,
    /// A row-level constraint failed
    ConstraintViolation,
    /// Storage engine failure
    InternalError,
    /// Plan for an unknown, expired or already executed transaction
    StaleCoordination,
}

impl WriteStatus {
    /// True for every status except `Prepared`
    pub fn is_terminal(self) -> bool {
        !matches!(self, WriteStatus::Prepared)
    }

    /// True for `Completed` and `Prepared`
    pub fn is_success(self) -> bool {
        matches!(self, WriteStatus::Completed | WriteStatus::Prepared)
    }

    /// Wire-style name
    pub fn as_str(self) -> &'static str {
        match self {
            WriteStatus::Completed => "STATUS_COMPLETED",
            WriteStatus::Prepared => "STATUS_PREPARED",
            WriteStatus::BadRequest => "STATUS_BAD_REQUEST",
            WriteStatus::SchemeError => "STATUS_SCHEME_ERROR",
            WriteStatus::ConstraintViolation => "STATUS_CONSTRAINT_VIOLATION",
            WriteStatus::InternalError => "STATUS_INTERNAL_ERROR",
            WriteStatus::StaleCoordination => "STATUS_STALE_COORDINATION",
        }
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Error> for WriteStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::Codec(_) | Error::Limit(_) | Error::InvalidOperation(_) => {
                WriteStatus::BadRequest
            }
            Error::Scheme(_) => WriteStatus::SchemeError,
            Error::Constraint(_) => WriteStatus::ConstraintViolation,
            Error::Coordination(_) => WriteStatus::StaleCoordination,
            Error::Storage(_) | Error::Serialization(_) => WriteStatus::InternalError,
        }
    }
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueSeverity {
    /// The request failed because of this issue
    Error,
    /// Informational
    Warning,
}

/// Human-readable diagnostic attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// Severity
    pub severity: IssueSeverity,
    /// Message text
    pub message: String,
}

impl Issue {
    /// Error-severity issue
    pub fn error(message: impl Into<String>) -> Self {
        Issue {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    /// Warning-severity issue
    pub fn warning(message: impl Into<String>) -> Self {
        Issue {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&Error> for Issue {
    fn from(err: &Error) -> Self {
        Issue::error(err.to_string())
    }
}

/// Access counters for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAccessStats {
    /// Table id
    pub table_id: TableId,
    /// Table path name, e.g. `/Root/table-1`
    pub table_name: String,
    /// Rows written (upserted, replaced, inserted or updated)
    pub update_row_count: u64,
    /// Bytes written
    pub update_bytes: u64,
    /// Rows erased
    pub erase_row_count: u64,
}

/// Per-table access statistics of one transaction
///
/// Tables appear in the order they were first touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStats {
    /// One entry per touched table
    pub table_access_stats: Vec<TableAccessStats>,
}

impl TxStats {
    fn entry(&mut self, table_id: TableId, table_name: &str) -> &mut TableAccessStats {
        let pos = match self
            .table_access_stats
            .iter()
            .position(|s| s.table_id == table_id)
        {
            Some(pos) => pos,
            None => {
                self.table_access_stats.push(TableAccessStats {
                    table_id,
                    table_name: table_name.to_string(),
                    update_row_count: 0,
                    update_bytes: 0,
                    erase_row_count: 0,
                });
                self.table_access_stats.len() - 1
            }
        };
        &mut self.table_access_stats[pos]
    }

    /// Count one written row of `bytes` bytes
    pub fn record_update(&mut self, table_id: TableId, table_name: &str, bytes: u64) {
        let entry = self.entry(table_id, table_name);
        entry.update_row_count += 1;
        entry.update_bytes += bytes;
    }

    /// Count one erased row
    pub fn record_erase(&mut self, table_id: TableId, table_name: &str) {
        self.entry(table_id, table_name).erase_row_count += 1;
    }

    /// Make sure a table appears even if no row was touched
    pub fn touch(&mut self, table_id: TableId, table_name: &str) {
        self.entry(table_id, table_name);
    }

    /// Stats for one table
    pub fn table(&self, table_id: TableId) -> Option<&TableAccessStats> {
        self.table_access_stats
            .iter()
            .find(|s| s.table_id == table_id)
    }

    /// True if no table was touched
    pub fn is_empty(&self) -> bool {
        self.table_access_stats.is_empty()
    }
}

/// Result reported by a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Outcome
    pub status: WriteStatus,
    /// Shard that produced this result
    pub origin: ShardId,
    /// Transaction id
    pub tx_id: TxId,
    /// Order id; equals `tx_id` for the proposing client
    pub order_id: TxId,
    /// Commit step; zero for immediate writes and non-completed results
    pub step: Step,
    /// Per-table statistics
    pub tx_stats: TxStats,
    /// Diagnostics; non-empty whenever the status is not a success
    pub issues: Vec<Issue>,
    /// Step window (PREPARED only)
    pub window: Option<StepWindow>,
    /// Coordinators to propose to (PREPARED only)
    pub domain_coordinators: Vec<CoordinatorId>,
    /// Tablet identity (PREPARED only)
    pub tablet_info: Option<TabletInfo>,
}

impl WriteResult {
    fn base(status: WriteStatus, origin: ShardId, tx_id: TxId) -> Self {
        WriteResult {
            status,
            origin,
            tx_id,
            order_id: tx_id,
            step: Step::ZERO,
            tx_stats: TxStats::default(),
            issues: Vec::new(),
            window: None,
            domain_coordinators: Vec::new(),
            tablet_info: None,
        }
    }

    /// COMPLETED result at `step`
    pub fn completed(origin: ShardId, tx_id: TxId, step: Step, tx_stats: TxStats) -> Self {
        WriteResult {
            step,
            tx_stats,
            ..Self::base(WriteStatus::Completed, origin, tx_id)
        }
    }

    /// PREPARED result carrying the window and the coordinators
    pub fn prepared(
        origin: ShardId,
        tx_id: TxId,
        window: StepWindow,
        domain_coordinators: Vec<CoordinatorId>,
    ) -> Self {
        WriteResult {
            window: Some(window),
            domain_coordinators,
            tablet_info: Some(TabletInfo { tablet_id: origin }),
            ..Self::base(WriteStatus::Prepared, origin, tx_id)
        }
    }

    /// Failed result with explicit issues
    pub fn failure(origin: ShardId, tx_id: TxId, status: WriteStatus, issues: Vec<Issue>) -> Self {
        debug_assert!(!issues.is_empty(), "failed results must carry an issue");
        WriteResult {
            issues,
            ..Self::base(status, origin, tx_id)
        }
    }

    /// Failed result derived from an error
    pub fn from_error(origin: ShardId, tx_id: TxId, err: &Error) -> Self {
        Self::failure(origin, tx_id, WriteStatus::from(err), vec![Issue::from(err)])
    }

    /// Window lower bound, zero when absent
    pub fn min_step(&self) -> Step {
        self.window.map(|w| w.min_step()).unwrap_or(Step::ZERO)
    }

    /// Window upper bound, zero when absent
    pub fn max_step(&self) -> Step {
        self.window.map(|w| w.max_step()).unwrap_or(Step::ZERO)
    }

    /// Issue messages joined for diagnostics
    pub fn issues_text(&self) -> String {
        self.issues
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Client → coordinator: order this transaction across `shards`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Propose {
    /// Transaction id
    pub tx_id: TxId,
    /// Participating shards
    pub shards: Vec<ShardId>,
    /// Intersection of every participant's window
    pub window: StepWindow,
}

/// Coordinator → shard: execute `tx_id` at `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plan {
    /// Transaction id
    pub tx_id: TxId,
    /// Assigned step
    pub step: Step,
}
