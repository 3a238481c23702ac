//! Transaction Preparer
//!
//! Parks a validated operation set until a coordinator plans it. Preparing
//! derives the step window from the shard clock, persists the operation set
//! and registers the transaction as pending. The PREPARED result carries
//! everything the client needs to build its proposal.

use std::sync::Arc;

use tracing::debug;

use stepshard_concurrency::{PendingTable, PreparedTx, PreparedTxStore};
use stepshard_core::{CoordinatorId, Error, Result, ShardId, Step, TxId, WriteResult};
use stepshard_storage::RowWrite;

use crate::clock::StepWindowPolicy;

/// Prepares distributed-mode writes on one shard
pub struct TransactionPreparer {
    origin: ShardId,
    policy: Box<dyn StepWindowPolicy>,
    pending: Arc<PendingTable>,
    prepared: Arc<PreparedTxStore>,
    coordinators: Vec<CoordinatorId>,
}

impl TransactionPreparer {
    /// Preparer for shard `origin`
    pub fn new(
        origin: ShardId,
        policy: Box<dyn StepWindowPolicy>,
        pending: Arc<PendingTable>,
        prepared: Arc<PreparedTxStore>,
        coordinators: Vec<CoordinatorId>,
    ) -> Self {
        TransactionPreparer {
            origin,
            policy,
            pending,
            prepared,
            coordinators,
        }
    }

    /// Replace the window policy
    pub fn set_policy(&mut self, policy: Box<dyn StepWindowPolicy>) {
        self.policy = policy;
    }

    /// Prepare `writes` for `tx_id` at time `now`
    ///
    /// On error nothing stays pending for the transaction.
    pub fn prepare(&self, tx_id: TxId, writes: Vec<RowWrite>, now: Step) -> Result<WriteResult> {
        let window = self.policy.window_at(now).map_err(|e| {
            Error::Coordination(format!("Cannot derive a step window at step {}: {}", now, e))
        })?;

        self.pending.register(tx_id, window)?;
        let rows = writes.len();
        if let Err(e) = self.prepared.insert(PreparedTx {
            tx_id,
            window,
            writes,
        }) {
            self.pending.remove(tx_id);
            return Err(e.into());
        }

        debug!(target: "stepshard::prepare", shard = %self.origin, tx_id = %tx_id, min_step = %window.min_step(), max_step = %window.max_step(), rows, "Transaction prepared");
        Ok(WriteResult::prepared(
            self.origin,
            tx_id,
            window,
            self.coordinators.clone(),
        ))
    }
}
