//! Shared shard state for the write protocol
//!
//! This crate holds the per-shard mutable state that must be synchronized
//! per transaction rather than behind one global lock:
//! - PayloadStore: request blobs held for the lifetime of a request
//! - PreparedTxStore: prepared operation sets, persisted and cached by TxId
//! - PendingTable: prepared transactions awaiting a plan (at most one
//!   concurrent execution per TxId)
//! - ResultNotifier: asynchronous result delivery to waiting clients

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod notifier;
pub mod payload;
pub mod pending;
pub mod prepared;

pub use notifier::{ResultKey, ResultNotifier, DEFAULT_RESULT_RETENTION};
pub use payload::{PayloadError, PayloadLease, PayloadStore};
pub use pending::{ClaimError, ExecutionClaim, PendingState, PendingTable};
pub use prepared::{CacheStats, PreparedError, PreparedTx, PreparedTxStore};
