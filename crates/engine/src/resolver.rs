//! Distributed Commit Resolver
//!
//! Executes a prepared transaction once the coordinator's plan arrives.
//! The plan step must lie inside the prepared window; the pending claim
//! guarantees the operation set runs at most once, and the transaction is
//! forgotten afterwards whatever the outcome.

use std::sync::Arc;

use tracing::{error, info, warn};

use stepshard_concurrency::{ClaimError, PendingTable, PreparedTxStore};
use stepshard_core::{Error, Plan, ShardId, WriteResult};

use crate::executor::WriteExecutor;

/// Outcome of handling one plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Result for the planned transaction
    pub result: WriteResult,
    /// True if the result concludes a transaction the client is waiting
    /// for and must be published to the notifier
    pub publish: bool,
}

/// Resolves plans against a shard's pending transactions
pub struct CommitResolver {
    origin: ShardId,
    pending: Arc<PendingTable>,
    prepared: Arc<PreparedTxStore>,
    executor: WriteExecutor,
}

impl CommitResolver {
    /// Resolver for shard `origin`
    pub fn new(
        origin: ShardId,
        pending: Arc<PendingTable>,
        prepared: Arc<PreparedTxStore>,
        executor: WriteExecutor,
    ) -> Self {
        CommitResolver {
            origin,
            pending,
            prepared,
            executor,
        }
    }

    /// Validate and execute a plan
    ///
    /// A plan for an unknown or already executing transaction is answered
    /// but not published: the waiting client (if any) is owed the result
    /// of the first plan, not of the stray one. A plan outside the window
    /// drops the transaction and its failure is published.
    pub fn resolve(&self, plan: Plan) -> PlanOutcome {
        let claim = match self.pending.claim(plan.tx_id, plan.step) {
            Ok(claim) => claim,
            Err(e) => {
                let publish = matches!(e, ClaimError::OutsideWindow { .. });
                if publish {
                    self.prepared.remove(plan.tx_id);
                }
                warn!(target: "stepshard::plan", shard = %self.origin, tx_id = %plan.tx_id, step = %plan.step, error = %e, "Plan rejected");
                return PlanOutcome {
                    result: WriteResult::from_error(self.origin, plan.tx_id, &Error::from(e)),
                    publish,
                };
            }
        };

        let result = match self.execute(plan) {
            Ok(result) => {
                info!(target: "stepshard::plan", shard = %self.origin, tx_id = %plan.tx_id, step = %plan.step, min_step = %claim.window().min_step(), max_step = %claim.window().max_step(), "Planned transaction completed");
                result
            }
            Err(e) => {
                error!(target: "stepshard::plan", shard = %self.origin, tx_id = %plan.tx_id, step = %plan.step, error = %e, "Planned transaction failed");
                WriteResult::from_error(self.origin, plan.tx_id, &e)
            }
        };
        drop(claim);

        PlanOutcome {
            result,
            publish: true,
        }
    }

    fn execute(&self, plan: Plan) -> Result<WriteResult, Error> {
        let loaded = self.prepared.get(plan.tx_id);
        self.prepared.remove(plan.tx_id);
        let tx = loaded?.ok_or_else(|| {
            Error::Storage(format!("Prepared transaction {} is missing", plan.tx_id))
        })?;
        let writes = Arc::try_unwrap(tx)
            .map(|tx| tx.writes)
            .unwrap_or_else(|tx| tx.writes.clone());

        let stats = self.executor.execute(plan.tx_id, plan.step, writes)?;
        Ok(WriteResult::completed(self.origin, plan.tx_id, plan.step, stats))
    }
}
