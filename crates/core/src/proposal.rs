//! Client-side proposal construction
//!
//! After every participant answered PREPARED, the client intersects their
//! windows and sends one `Propose` to a coordinator of the domain. An empty
//! intersection means the transaction cannot be ordered and must be aborted
//! by the client.

use thiserror::Error;

use crate::error::Error;
use crate::types::{ShardId, Step, StepWindow, TxId};
use crate::write::{Propose, WriteResult, WriteStatus};

/// Reasons a transaction cannot be proposed or planned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposeError {
    /// No PREPARED results were supplied
    #[error("Transaction has no participants")]
    NoParticipants,

    /// A participant did not answer PREPARED
    #[error("Shard {shard} answered {status} instead of STATUS_PREPARED")]
    NotPrepared {
        /// Participant
        shard: ShardId,
        /// Status it reported
        status: WriteStatus,
    },

    /// A PREPARED result without a window
    #[error("Shard {0} reported no step window")]
    MissingWindow(ShardId),

    /// Results belong to different transactions
    #[error("Result from shard {shard} is for transaction {actual}, expected {expected}")]
    TxMismatch {
        /// Participant
        shard: ShardId,
        /// Transaction being proposed
        expected: TxId,
        /// Transaction in the result
        actual: TxId,
    },

    /// Participant windows do not overlap
    #[error("Step windows of the participants do not intersect: min step {min_step} > max step {max_step}")]
    EmptyIntersection {
        /// Largest lower bound
        min_step: Step,
        /// Smallest upper bound
        max_step: Step,
    },

    /// The coordinator has no route to a participant
    #[error("Shard {0} is not known to the coordinator")]
    UnknownShard(ShardId),

    /// No step in the window is still available
    #[error("Window {window} has elapsed, next available step is {next_step}")]
    WindowElapsed {
        /// Proposed window
        window: StepWindow,
        /// Earliest step the coordinator could assign
        next_step: Step,
    },

    /// The plan could not be handed to a participant
    #[error("Plan delivery to shard {shard} failed: {reason}")]
    DeliveryFailed {
        /// Participant
        shard: ShardId,
        /// Transport failure
        reason: String,
    },
}

impl From<ProposeError> for Error {
    fn from(e: ProposeError) -> Self {
        Error::Coordination(e.to_string())
    }
}

/// Intersect the windows of a set of PREPARED results
///
/// `min_step` is the largest lower bound and `max_step` the smallest upper
/// bound. The result must still satisfy `min_step < max_step`.
pub fn intersect_windows(results: &[WriteResult]) -> Result<StepWindow, ProposeError> {
    let mut windows = results.iter().map(|result| {
        if result.status != WriteStatus::Prepared {
            return Err(ProposeError::NotPrepared {
                shard: result.origin,
                status: result.status,
            });
        }
        result.window.ok_or(ProposeError::MissingWindow(result.origin))
    });

    let first = windows.next().ok_or(ProposeError::NoParticipants)??;
    windows.try_fold(first, |acc, window| {
        let window = window?;
        acc.intersect(&window).ok_or(ProposeError::EmptyIntersection {
            min_step: acc.min_step().max(window.min_step()),
            max_step: acc.max_step().min(window.max_step()),
        })
    })
}

impl Propose {
    /// Build the proposal for `tx_id` from every participant's PREPARED result
    pub fn from_prepared(tx_id: TxId, results: &[WriteResult]) -> Result<Propose, ProposeError> {
        if let Some(other) = results.iter().find(|r| r.tx_id != tx_id) {
            return Err(ProposeError::TxMismatch {
                shard: other.origin,
                expected: tx_id,
                actual: other.tx_id,
            });
        }
        let window = intersect_windows(results)?;
        let mut shards: Vec<ShardId> = results.iter().map(|r| r.origin).collect();
        shards.sort_unstable();
        shards.dedup();
        Ok(Propose {
            tx_id,
            shards,
            window,
        })
    }
}
