//! Pending transaction table
//!
//! Tracks every prepared-but-unplanned transaction of a shard together with
//! its step window. Entries are sharded by `TxId` (`DashMap`), so unrelated
//! transactions never contend. Claiming an entry for execution flips it to
//! `Executing` under the entry's shard lock, which guarantees at most one
//! concurrent execution per `TxId`; the claim removes the entry when it is
//! dropped, whatever the outcome of the execution.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use stepshard_core::{Error, Step, StepWindow, TxId};

/// Reasons a transaction cannot be registered or claimed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// PREPARE for a transaction already pending
    #[error("transaction {0} is already prepared")]
    AlreadyPending(TxId),

    /// Plan for a transaction this shard does not know (never prepared,
    /// already executed, expired and dropped, or aborted)
    #[error("Transaction {0} is not pending on this shard")]
    UnknownTx(TxId),

    /// A second plan arrived while the first is executing
    #[error("Transaction {0} is already executing")]
    AlreadyExecuting(TxId),

    /// Window closed without a plan
    #[error("Transaction {tx_id} expired: window ended at step {max_step}, now at step {now}")]
    Expired {
        /// Transaction
        tx_id: TxId,
        /// End of its window
        max_step: Step,
        /// Current time
        now: Step,
    },

    /// Plan step is outside the prepared window
    #[error("Plan step {step} for transaction {tx_id} is outside the prepared window {window}")]
    OutsideWindow {
        /// Transaction
        tx_id: TxId,
        /// Planned step
        step: Step,
        /// Prepared window
        window: StepWindow,
    },
}

impl ClaimError {
    /// Transaction the error is about
    pub fn tx_id(&self) -> TxId {
        match self {
            ClaimError::AlreadyPending(tx_id)
            | ClaimError::UnknownTx(tx_id)
            | ClaimError::AlreadyExecuting(tx_id) => *tx_id,
            ClaimError::Expired { tx_id, .. } | ClaimError::OutsideWindow { tx_id, .. } => *tx_id,
        }
    }
}

impl From<ClaimError> for Error {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::AlreadyPending(_) => Error::InvalidOperation(e.to_string()),
            _ => Error::Coordination(e.to_string()),
        }
    }
}

/// Lifecycle state of a pending entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting for a plan
    Prepared,
    /// A plan was accepted and the operation set is being applied
    Executing {
        /// Step being executed
        step: Step,
    },
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    window: StepWindow,
    state: PendingState,
}

/// Prepared transactions awaiting a plan, keyed by `TxId`
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: DashMap<TxId, PendingEntry>,
}

impl PendingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly prepared transaction
    pub fn register(&self, tx_id: TxId, window: StepWindow) -> Result<(), ClaimError> {
        match self.entries.entry(tx_id) {
            Entry::Occupied(_) => Err(ClaimError::AlreadyPending(tx_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingEntry {
                    window,
                    state: PendingState::Prepared,
                });
                Ok(())
            }
        }
    }

    /// Claim a transaction for execution at `step`
    ///
    /// The step must lie inside the prepared window. An out-of-window plan
    /// drops the transaction as part of the rejection, so a retried plan
    /// sees `UnknownTx`. Time-based expiry is handled by `expire`.
    pub fn claim(&self, tx_id: TxId, step: Step) -> Result<ExecutionClaim<'_>, ClaimError> {
        let Entry::Occupied(mut occupied) = self.entries.entry(tx_id) else {
            return Err(ClaimError::UnknownTx(tx_id));
        };

        let entry = *occupied.get();
        if let PendingState::Executing { .. } = entry.state {
            return Err(ClaimError::AlreadyExecuting(tx_id));
        }
        if !entry.window.contains(step) {
            occupied.remove();
            return Err(ClaimError::OutsideWindow {
                tx_id,
                step,
                window: entry.window,
            });
        }

        occupied.get_mut().state = PendingState::Executing { step };
        Ok(ExecutionClaim {
            table: self,
            tx_id,
            step,
            window: entry.window,
        })
    }

    /// Drop every `Prepared` entry whose window ended before `now`
    ///
    /// Executing entries are left to their claim. Returns one `Expired`
    /// error per dropped transaction.
    pub fn expire(&self, now: Step) -> Vec<ClaimError> {
        let mut expired = Vec::new();
        self.entries.retain(|tx_id, entry| {
            let drop_it =
                entry.state == PendingState::Prepared && entry.window.is_expired_at(now);
            if drop_it {
                expired.push(ClaimError::Expired {
                    tx_id: *tx_id,
                    max_step: entry.window.max_step(),
                    now,
                });
            }
            !drop_it
        });
        expired
    }

    /// Remove a prepared entry without executing it
    pub fn remove(&self, tx_id: TxId) -> bool {
        self.entries.remove(&tx_id).is_some()
    }

    /// State of a transaction, if pending
    pub fn state(&self, tx_id: TxId) -> Option<PendingState> {
        self.entries.get(&tx_id).map(|e| e.state)
    }

    /// Window of a transaction, if pending
    pub fn window(&self, tx_id: TxId) -> Option<StepWindow> {
        self.entries.get(&tx_id).map(|e| e.window)
    }

    /// Number of pending transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusive right to execute one pending transaction
///
/// Dropping the claim removes the transaction from the pending table.
#[derive(Debug)]
pub struct ExecutionClaim<'a> {
    table: &'a PendingTable,
    tx_id: TxId,
    step: Step,
    window: StepWindow,
}

impl ExecutionClaim<'_> {
    /// Claimed transaction
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Step being executed
    pub fn step(&self) -> Step {
        self.step
    }

    /// Prepared window
    pub fn window(&self) -> StepWindow {
        self.window
    }
}

impl Drop for ExecutionClaim<'_> {
    fn drop(&mut self) {
        self.table.entries.remove(&self.tx_id);
    }
}
