//! Step coordinator
//!
//! Orders distributed transactions: for each proposal it assigns one step
//! inside the proposed window, later than every step it assigned before,
//! and sends the same plan to every participant.
//!
//! The coordinator owns the domain's `StepClock` and moves it forward to
//! each assigned step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use stepshard_core::{CoordinatorId, Plan, Propose, ProposeError, ShardId, Step};

use crate::clock::StepClock;

/// Destination of plans for one shard
pub trait PlanSink: Send + Sync {
    /// Hand a plan to the shard; must not block on its execution
    fn deliver(&self, plan: Plan) -> Result<(), ProposeError>;

    /// Domain time reached `now`; no plan at or before `now` will follow
    ///
    /// Sent to every registered shard after each planned step, in the same
    /// order as plans, so a shard can drop transactions whose window ended
    /// before `now`. Must not block.
    fn clock_advanced(&self, _now: Step) {}
}

/// Coordinator of one domain
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering: they are observational only.
/// Step assignment itself is serialized by the `last_step` mutex.
pub struct Coordinator {
    id: CoordinatorId,
    clock: StepClock,
    routes: RwLock<HashMap<ShardId, Arc<dyn PlanSink>>>,
    last_step: Mutex<Step>,
    total_proposed: AtomicU64,
    total_planned: AtomicU64,
    total_rejected: AtomicU64,
}

impl Coordinator {
    /// Coordinator `id` driving `clock`
    pub fn new(id: CoordinatorId, clock: StepClock) -> Self {
        Coordinator {
            id,
            last_step: Mutex::new(clock.now()),
            clock,
            routes: RwLock::new(HashMap::new()),
            total_proposed: AtomicU64::new(0),
            total_planned: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Coordinator id
    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    /// Clock driven by this coordinator
    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    /// Route plans for `shard` to `sink`
    pub fn register_shard(&self, shard: ShardId, sink: Arc<dyn PlanSink>) {
        self.routes.write().insert(shard, sink);
        debug!(target: "stepshard::coordinator", coordinator = %self.id, shard = %shard, "Shard registered");
    }

    /// Assign a step to a proposed transaction and plan it on every
    /// participant
    ///
    /// The step is the earliest one that is inside the window and later
    /// than both the clock and every previously assigned step. Nothing is
    /// planned if any participant is unknown or the window has elapsed.
    pub fn propose(&self, propose: Propose) -> Result<Step, ProposeError> {
        self.total_proposed.fetch_add(1, Ordering::Relaxed);
        let result = self.plan(&propose);
        match &result {
            Ok(step) => {
                self.total_planned.fetch_add(1, Ordering::Relaxed);
                info!(target: "stepshard::coordinator", coordinator = %self.id, tx_id = %propose.tx_id, step = %step, shards = propose.shards.len(), "Transaction planned");
            }
            Err(e) => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(target: "stepshard::coordinator", coordinator = %self.id, tx_id = %propose.tx_id, window = %propose.window, error = %e, "Proposal rejected");
            }
        }
        result
    }

    fn plan(&self, propose: &Propose) -> Result<Step, ProposeError> {
        if propose.shards.is_empty() {
            return Err(ProposeError::NoParticipants);
        }
        let sinks: Vec<(ShardId, Arc<dyn PlanSink>)> = {
            let routes = self.routes.read();
            propose
                .shards
                .iter()
                .map(|shard| {
                    routes
                        .get(shard)
                        .map(|sink| (*shard, Arc::clone(sink)))
                        .ok_or(ProposeError::UnknownShard(*shard))
                })
                .collect::<Result<_, _>>()?
        };

        // Held through delivery so plans reach each shard in step order.
        let mut last = self.last_step.lock();
        let next_step = Step((*last).max(self.clock.now()).get().saturating_add(1));
        let step = next_step.max(propose.window.min_step());
        if step > propose.window.max_step() {
            return Err(ProposeError::WindowElapsed {
                window: propose.window,
                next_step,
            });
        }
        *last = step;
        self.clock.advance_to(step);

        let plan = Plan {
            tx_id: propose.tx_id,
            step,
        };
        for (shard, sink) in sinks {
            sink.deliver(plan)?;
            debug!(target: "stepshard::coordinator", coordinator = %self.id, tx_id = %plan.tx_id, shard = %shard, step = %step, "Plan sent");
        }
        // Still under `last_step`: every later plan carries a greater step.
        for sink in self.routes.read().values() {
            sink.clock_advanced(step);
        }
        Ok(step)
    }

    /// Get coordinator metrics
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            total_proposed: self.total_proposed.load(Ordering::Relaxed),
            total_planned: self.total_planned.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            last_step: *self.last_step.lock(),
        }
    }
}

/// Coordinator metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Proposals received
    pub total_proposed: u64,
    /// Proposals that were planned
    pub total_planned: u64,
    /// Proposals that were rejected
    pub total_rejected: u64,
    /// Last assigned step
    pub last_step: Step,
}
